// Create-Cluster Pipeline
// Modules and tasks that bring up a kubeadm cluster from prepared hosts

pub mod steps;
pub mod templates;

pub use steps::{InstallRuntimeStep, JoinWorkerStep, VerifyHostStep};

use crate::config::ClusterConfig;
use crate::error::PlanningError;
use crate::execution::{RetryPolicy, RuntimeContext};
use crate::inventory::{Host, Role};
use crate::plan::{ExecutionFragment, HostSelector, ModulePipeline, StepTask, Task, TaskModule};
use crate::step::{CommandStep, FileContents, GatherFactsStep, WriteFileStep};

use std::sync::Arc;
use std::time::Duration;

/// The full bring-up pipeline; modules run in order, each after the
/// previous one finished on every host.
pub fn create_cluster_pipeline(cluster: &ClusterConfig) -> ModulePipeline {
    ModulePipeline::sequential("create-cluster")
        .module(preflight())
        .module(prepare_hosts(cluster))
        .module(etcd())
        .module(control_plane(cluster))
        .module(workers())
}

fn preflight() -> TaskModule {
    TaskModule::parallel("preflight")
        .task(
            StepTask::new("connectivity", HostSelector::All)
                .step(CommandStep::new("ping", "true").with_description("confirm the host answers")),
        )
        .task(StepTask::new("gather-facts", HostSelector::All).step(GatherFactsStep::new()))
        .task(StepTask::new("verify-os", HostSelector::All).step(VerifyHostStep::new()))
}

fn prepare_hosts(cluster: &ClusterConfig) -> TaskModule {
    TaskModule::sequential("prepare-hosts")
        .task(
            StepTask::new("disable-swap", HostSelector::All).step(
                CommandStep::new("swapoff", r"swapoff -a && sed -i '/\sswap\s/ s/^#*/#/' /etc/fstab")
                    .elevated()
                    .with_check(r#"test -z "$(swapon --noheadings)""#),
            ),
        )
        .task(
            StepTask::new("kernel-modules", HostSelector::All).step(
                WriteFileStep::new("modules-load", templates::MODULES_LOAD_PATH, templates::modules_load())
                    .elevated()
                    .then_run(
                        templates::KERNEL_MODULES
                            .iter()
                            .map(|m| format!("modprobe {}", m))
                            .collect::<Vec<_>>()
                            .join(" && "),
                    ),
            ),
        )
        .task(
            StepTask::new("sysctl", HostSelector::All).step(
                WriteFileStep::new("sysctl-conf", templates::SYSCTL_PATH, templates::sysctl_conf())
                    .elevated()
                    .then_run("sysctl --system"),
            ),
        )
        .task(
            StepTask::new("container-runtime", HostSelector::All)
                .step(InstallRuntimeStep::new(cluster.container_runtime.clone()))
                // package manager locks are often held briefly after boot
                .with_retry(RetryPolicy::new(3).with_backoff(Duration::from_secs(2))),
        )
}

fn etcd() -> TaskModule {
    TaskModule::sequential("etcd").task(EtcdConfigTask).task(
        StepTask::new("etcd-service", HostSelector::roles([Role::ETCD])).step(
            CommandStep::new("enable", "systemctl daemon-reload && systemctl enable --now etcd")
                .elevated()
                .with_check("systemctl is-active --quiet etcd")
                .with_rollback("systemctl disable --now etcd"),
        ),
    )
}

fn control_plane(cluster: &ClusterConfig) -> TaskModule {
    TaskModule::sequential("control-plane")
        .task(KubeadmInitTask {
            work_dir: cluster.work_dir.clone(),
        })
        .task(
            StepTask::new("admin-kubeconfig", HostSelector::ControlHost).step(
                CommandStep::new(
                    "copy",
                    format!(
                        "mkdir -p /root/.kube && install -m 0600 {} /root/.kube/config",
                        templates::ADMIN_CONF_PATH
                    ),
                )
                .elevated()
                .with_check(format!("cmp -s {} /root/.kube/config", templates::ADMIN_CONF_PATH)),
            ),
        )
}

fn workers() -> TaskModule {
    TaskModule::parallel("workers").task(
        StepTask::new("kubeadm-join", HostSelector::roles([Role::WORKER]))
            .step(JoinWorkerStep::new())
            .with_retry(RetryPolicy::new(3).with_backoff(Duration::from_secs(5))),
    )
}

fn etcd_members(ctx: &RuntimeContext) -> Result<Vec<Arc<Host>>, PlanningError> {
    ctx.hosts_with_role(Role::ETCD)
}

/// Writes the etcd environment and unit; every member's file lists the
/// whole membership, so the task resolves the role while planning.
struct EtcdConfigTask;

impl Task for EtcdConfigTask {
    fn name(&self) -> &str {
        "etcd-config"
    }

    fn plan(&self, ctx: &RuntimeContext) -> Result<ExecutionFragment, PlanningError> {
        let members = etcd_members(ctx)?;
        let refs: Vec<&Host> = members.iter().map(|h| h.as_ref()).collect();
        let initial_cluster = templates::etcd_initial_cluster(&refs);
        let cluster = ctx.cluster().clone();
        let env = FileContents::rendered(move |host| templates::etcd_env(&cluster, host, &initial_cluster));

        StepTask::new(self.name(), HostSelector::roles([Role::ETCD]))
            .step(
                WriteFileStep::new("env", templates::ETCD_ENV_PATH, env)
                    .with_mode(0o600)
                    .elevated(),
            )
            .step(WriteFileStep::new("unit", templates::ETCD_UNIT_PATH, templates::etcd_unit()).elevated())
            .plan(ctx)
    }
}

/// Renders the kubeadm configuration for the control host and runs
/// `kubeadm init` once
struct KubeadmInitTask {
    work_dir: String,
}

impl Task for KubeadmInitTask {
    fn name(&self) -> &str {
        "kubeadm-init"
    }

    fn plan(&self, ctx: &RuntimeContext) -> Result<ExecutionFragment, PlanningError> {
        let Some(endpoint) = ctx.control_plane_endpoint() else {
            return Ok(ExecutionFragment::new());
        };
        let members = etcd_members(ctx)?;
        let refs: Vec<&Host> = members.iter().map(|h| h.as_ref()).collect();
        let config = templates::kubeadm_config(ctx.cluster(), &endpoint, &templates::etcd_endpoints(&refs));
        let config_path = format!("{}/kubeadm.yaml", self.work_dir);

        StepTask::new(self.name(), HostSelector::ControlHost)
            .step(
                CommandStep::new("workdir", format!("mkdir -p {}", self.work_dir))
                    .elevated()
                    .with_check(format!("test -d {}", self.work_dir)),
            )
            .step(WriteFileStep::new("config", config_path.clone(), config).elevated())
            .step(
                CommandStep::new("init", format!("kubeadm init --config {} --upload-certs", config_path))
                    .elevated()
                    .with_check(format!("test -f {}", templates::ADMIN_CONF_PATH))
                    .with_rollback("kubeadm reset -f")
                    .with_timeout(Duration::from_secs(600)),
            )
            .plan(ctx)
    }
}
