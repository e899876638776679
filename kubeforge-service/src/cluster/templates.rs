// Cluster Templates
// Rendered artifacts written to hosts during cluster bring-up

use crate::config::ClusterConfig;
use crate::inventory::Host;

pub const MODULES_LOAD_PATH: &str = "/etc/modules-load.d/kubernetes.conf";
pub const SYSCTL_PATH: &str = "/etc/sysctl.d/99-kubernetes.conf";
pub const ETCD_ENV_PATH: &str = "/etc/etcd/etcd.env";
pub const ETCD_UNIT_PATH: &str = "/etc/systemd/system/etcd.service";
pub const ADMIN_CONF_PATH: &str = "/etc/kubernetes/admin.conf";
pub const KUBELET_CONF_PATH: &str = "/etc/kubernetes/kubelet.conf";

pub const KERNEL_MODULES: [&str; 2] = ["overlay", "br_netfilter"];

pub fn modules_load() -> String {
    let mut body = String::new();
    for module in KERNEL_MODULES {
        body.push_str(module);
        body.push('\n');
    }
    body
}

pub fn sysctl_conf() -> String {
    [
        "net.bridge.bridge-nf-call-iptables = 1",
        "net.bridge.bridge-nf-call-ip6tables = 1",
        "net.ipv4.ip_forward = 1",
    ]
    .iter()
    .map(|line| format!("{}\n", line))
    .collect()
}

/// `name=https://address:2380` for every etcd member
pub fn etcd_initial_cluster(members: &[&Host]) -> String {
    members
        .iter()
        .map(|h| format!("{}=https://{}:2380", h.name, h.address))
        .collect::<Vec<_>>()
        .join(",")
}

/// Client endpoints of every etcd member
pub fn etcd_endpoints(members: &[&Host]) -> Vec<String> {
    members
        .iter()
        .map(|h| format!("https://{}:2379", h.address))
        .collect()
}

pub fn etcd_env(cluster: &ClusterConfig, host: &Host, initial_cluster: &str) -> String {
    format!(
        "ETCD_NAME={name}\n\
         ETCD_DATA_DIR=/var/lib/etcd\n\
         ETCD_LISTEN_PEER_URLS=https://{addr}:2380\n\
         ETCD_LISTEN_CLIENT_URLS=https://{addr}:2379,https://127.0.0.1:2379\n\
         ETCD_INITIAL_ADVERTISE_PEER_URLS=https://{addr}:2380\n\
         ETCD_ADVERTISE_CLIENT_URLS=https://{addr}:2379\n\
         ETCD_INITIAL_CLUSTER={initial}\n\
         ETCD_INITIAL_CLUSTER_STATE=new\n\
         ETCD_INITIAL_CLUSTER_TOKEN={token}\n",
        name = host.name,
        addr = host.address,
        initial = initial_cluster,
        token = cluster.name,
    )
}

pub fn etcd_unit() -> String {
    "[Unit]\n\
     Description=etcd key-value store\n\
     After=network-online.target\n\
     \n\
     [Service]\n\
     EnvironmentFile=/etc/etcd/etcd.env\n\
     ExecStart=/usr/local/bin/etcd\n\
     Restart=always\n\
     RestartSec=5\n\
     LimitNOFILE=65536\n\
     \n\
     [Install]\n\
     WantedBy=multi-user.target\n"
        .to_string()
}

/// kubeadm `ClusterConfiguration`; external etcd when endpoints are given
pub fn kubeadm_config(cluster: &ClusterConfig, endpoint: &str, etcd: &[String]) -> String {
    let mut body = format!(
        "apiVersion: kubeadm.k8s.io/v1beta3\n\
         kind: ClusterConfiguration\n\
         clusterName: {name}\n\
         kubernetesVersion: {version}\n\
         controlPlaneEndpoint: {endpoint}\n\
         networking:\n\
         \x20 podSubnet: {pods}\n\
         \x20 serviceSubnet: {services}\n\
         \x20 dnsDomain: {domain}\n",
        name = cluster.name,
        version = cluster.kubernetes_version,
        endpoint = endpoint,
        pods = cluster.pod_cidr,
        services = cluster.service_cidr,
        domain = cluster.cluster_domain,
    );
    if !etcd.is_empty() {
        body.push_str("etcd:\n  external:\n    endpoints:\n");
        for url in etcd {
            body.push_str(&format!("      - {}\n", url));
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etcd_env_lists_all_members() {
        let a = Host::new("etcd1", "10.0.0.1");
        let b = Host::new("etcd2", "10.0.0.2");
        let initial = etcd_initial_cluster(&[&a, &b]);
        assert_eq!(
            initial,
            "etcd1=https://10.0.0.1:2380,etcd2=https://10.0.0.2:2380"
        );

        let env = etcd_env(&ClusterConfig::default(), &b, &initial);
        assert!(env.contains("ETCD_NAME=etcd2\n"));
        assert!(env.contains("ETCD_LISTEN_PEER_URLS=https://10.0.0.2:2380\n"));
        assert!(env.contains(&format!("ETCD_INITIAL_CLUSTER={}\n", initial)));
    }

    #[test]
    fn test_kubeadm_config_external_etcd() {
        let cluster = ClusterConfig::default();
        let stacked = kubeadm_config(&cluster, "10.0.0.10:6443", &[]);
        assert!(stacked.contains("controlPlaneEndpoint: 10.0.0.10:6443\n"));
        assert!(stacked.contains("  podSubnet: 10.244.0.0/16\n"));
        assert!(!stacked.contains("etcd:"));

        let external = kubeadm_config(
            &cluster,
            "10.0.0.10:6443",
            &["https://10.0.0.1:2379".to_string()],
        );
        assert!(external.ends_with("    endpoints:\n      - https://10.0.0.1:2379\n"));
    }

    #[test]
    fn test_static_files() {
        assert_eq!(modules_load(), "overlay\nbr_netfilter\n");
        assert!(sysctl_conf().contains("net.ipv4.ip_forward = 1\n"));
        assert!(etcd_unit().contains("EnvironmentFile=/etc/etcd/etcd.env"));
    }
}
