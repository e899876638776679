// Cluster Steps
// Steps whose behaviour depends on host facts or on other hosts

use crate::cluster::templates::KUBELET_CONF_PATH;
use crate::connector::{shell_quote, ExecOptions};
use crate::inventory::{Host, InitSystem, Role};
use crate::step::{Step, StepContext, StepError, StepMeta, StepOutput};

use tracing::{debug, info};

const SUPPORTED_OS: [&str; 7] = ["ubuntu", "debian", "centos", "rhel", "rocky", "almalinux", "fedora"];

/// Fails hosts whose OS or resources cannot run their roles
#[derive(Debug, Clone)]
pub struct VerifyHostStep {
    meta: StepMeta,
    min_control_plane_cpus: u32,
    min_control_plane_memory_mb: u64,
}

impl Default for VerifyHostStep {
    fn default() -> Self {
        Self {
            meta: StepMeta::new("verify", "verify operating system and resources"),
            min_control_plane_cpus: 2,
            min_control_plane_memory_mb: 1700,
        }
    }
}

impl VerifyHostStep {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Step for VerifyHostStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> Result<StepOutput, StepError> {
        let facts = ctx.facts(host).await?;

        if !SUPPORTED_OS.contains(&facts.os.id.as_str()) {
            return Err(StepError::failed(format!(
                "unsupported operating system '{}'",
                facts.os.pretty_name
            )));
        }

        if host.has_role(Role::CONTROL_PLANE) {
            if facts.cpu_cores < self.min_control_plane_cpus {
                return Err(StepError::failed(format!(
                    "control plane needs {} CPUs, found {}",
                    self.min_control_plane_cpus, facts.cpu_cores
                )));
            }
            if facts.memory_mb < self.min_control_plane_memory_mb {
                return Err(StepError::failed(format!(
                    "control plane needs {} MB of memory, found {}",
                    self.min_control_plane_memory_mb, facts.memory_mb
                )));
            }
        }

        Ok(StepOutput::unchanged().with_message(format!("{} on {}", facts.os.pretty_name, facts.arch)))
    }

    fn describe(&self, host: &Host) -> Option<String> {
        Some(format!("{}: verify operating system and resources", host))
    }
}

/// Installs the container runtime with the host's package manager
#[derive(Debug, Clone)]
pub struct InstallRuntimeStep {
    meta: StepMeta,
    runtime: String,
}

impl InstallRuntimeStep {
    pub fn new(runtime: impl Into<String>) -> Self {
        let runtime = runtime.into();
        Self {
            meta: StepMeta::new("install", format!("install {}", runtime)),
            runtime,
        }
    }
}

#[async_trait::async_trait]
impl Step for InstallRuntimeStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> Result<StepOutput, StepError> {
        let facts = ctx.facts(host).await?;
        let install = facts
            .package_manager
            .install_command(&[self.runtime.as_str()])
            .ok_or_else(|| {
                StepError::failed(format!("no known package manager on {}", facts.os.pretty_name))
            })?;

        let elevated = ExecOptions::elevated();
        ctx.exec(host, &install, &elevated).await?;
        if facts.init_system == InitSystem::Systemd {
            let enable = format!("systemctl enable --now {}", self.runtime);
            ctx.exec(host, &enable, &elevated).await?;
        }

        info!(parent: ctx.span(), host = %host, runtime = %self.runtime, "container runtime installed");
        Ok(StepOutput::changed())
    }

    async fn check(&self, ctx: &StepContext, host: &Host) -> Result<bool, StepError> {
        ctx.probe(host, &format!("command -v {}", shell_quote(&self.runtime)))
            .await
    }

    fn describe(&self, host: &Host) -> Option<String> {
        Some(format!("{}: install {}", host, self.runtime))
    }
}

/// Joins a worker using a token minted on the control host
#[derive(Debug, Clone)]
pub struct JoinWorkerStep {
    meta: StepMeta,
}

impl Default for JoinWorkerStep {
    fn default() -> Self {
        Self {
            meta: StepMeta::new("join", "join the cluster as a worker"),
        }
    }
}

impl JoinWorkerStep {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Step for JoinWorkerStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> Result<StepOutput, StepError> {
        let control = ctx
            .runtime()
            .control_host()
            .ok_or_else(|| StepError::failed("inventory has no control host"))?;

        let elevated = ExecOptions::elevated();
        let minted = ctx
            .exec(&control, "kubeadm token create --print-join-command", &elevated)
            .await?;
        let join = minted.stdout.trim();
        if !join.starts_with("kubeadm join") {
            return Err(StepError::failed(format!(
                "unexpected join command from {}: '{}'",
                control, join
            )));
        }

        debug!(parent: ctx.span(), host = %host, control = %control, "joining");
        ctx.exec(host, join, &elevated).await?;
        Ok(StepOutput::changed().with_message(format!("joined via {}", control)))
    }

    async fn check(&self, ctx: &StepContext, host: &Host) -> Result<bool, StepError> {
        ctx.probe(host, &format!("test -f {}", KUBELET_CONF_PATH)).await
    }

    async fn rollback(&self, ctx: &StepContext, host: &Host) -> Result<(), StepError> {
        ctx.exec(host, "kubeadm reset -f", &ExecOptions::elevated())
            .await
            .map(|_| ())
    }

    fn describe(&self, host: &Host) -> Option<String> {
        Some(format!("{}: kubeadm join using a token from the control host", host))
    }
}
