// Host Facts
// Static and dynamic attributes gathered once per host and cached for a run

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Section separator emitted by the facts probe
const SECTION_MARKER: &str = "--kubeforge-facts--";

/// Shell probe that prints every fact section in a fixed order
pub const FACTS_PROBE: &str = "cat /etc/os-release 2>/dev/null; echo '--kubeforge-facts--'; \
uname -r; echo '--kubeforge-facts--'; \
uname -m; echo '--kubeforge-facts--'; \
hostname; echo '--kubeforge-facts--'; \
nproc 2>/dev/null || getconf _NPROCESSORS_ONLN; echo '--kubeforge-facts--'; \
grep MemTotal /proc/meminfo 2>/dev/null; echo '--kubeforge-facts--'; \
for pm in apt-get dnf yum zypper apk; do command -v $pm >/dev/null 2>&1 && echo $pm; done; \
echo '--kubeforge-facts--'; \
if [ -d /run/systemd/system ]; then echo systemd; else cat /proc/1/comm 2>/dev/null; fi";

/// Operating system identity from /etc/os-release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    /// `ID` field (e.g. "ubuntu", "rocky")
    pub id: String,
    /// `VERSION_ID` field
    pub version_id: String,
    /// `PRETTY_NAME` field
    pub pretty_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Zypper,
    Apk,
    #[default]
    Unknown,
}

impl PackageManager {
    /// Non-interactive install command for the given packages
    pub fn install_command(&self, packages: &[&str]) -> Option<String> {
        let list = packages.join(" ");
        match self {
            PackageManager::Apt => Some(format!(
                "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
                list
            )),
            PackageManager::Dnf => Some(format!("dnf install -y {}", list)),
            PackageManager::Yum => Some(format!("yum install -y {}", list)),
            PackageManager::Zypper => Some(format!("zypper --non-interactive install {}", list)),
            PackageManager::Apk => Some(format!("apk add --no-cache {}", list)),
            PackageManager::Unknown => None,
        }
    }

    fn from_binary(name: &str) -> Self {
        match name {
            "apt-get" => PackageManager::Apt,
            "dnf" => PackageManager::Dnf,
            "yum" => PackageManager::Yum,
            "zypper" => PackageManager::Zypper,
            "apk" => PackageManager::Apk,
            _ => PackageManager::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitSystem {
    Systemd,
    OpenRc,
    SysVinit,
    #[default]
    Unknown,
}

/// Facts describing one host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts {
    pub hostname: String,
    pub os: OsInfo,
    pub kernel: String,
    pub arch: String,
    pub package_manager: PackageManager,
    pub init_system: InitSystem,
    pub cpu_cores: u32,
    pub memory_mb: u64,
}

impl Facts {
    /// Parse the output of [`FACTS_PROBE`]
    pub fn parse_probe(output: &str) -> Result<Self, String> {
        let sections: Vec<&str> = output.split(SECTION_MARKER).collect();
        if sections.len() < 8 {
            return Err(format!(
                "expected 8 facts sections, found {}",
                sections.len()
            ));
        }

        let os = parse_os_release(sections[0]);
        let kernel = sections[1].trim().to_string();
        let arch = sections[2].trim().to_string();
        let hostname = sections[3].trim().to_string();
        let cpu_cores = sections[4]
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid cpu count '{}': {}", sections[4].trim(), e))?;
        let memory_mb = parse_meminfo(sections[5])?;
        let package_manager = sections[6]
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(PackageManager::from_binary)
            .unwrap_or_default();
        let init_system = match sections[7].trim() {
            "systemd" => InitSystem::Systemd,
            "openrc" | "openrc-init" => InitSystem::OpenRc,
            "init" => InitSystem::SysVinit,
            _ => InitSystem::Unknown,
        };

        Ok(Self {
            hostname,
            os,
            kernel,
            arch,
            package_manager,
            init_system,
            cpu_cores,
            memory_mb,
        })
    }
}

/// Parse KEY=value pairs from /etc/os-release, stripping quotes
fn parse_os_release(content: &str) -> OsInfo {
    let fields: HashMap<&str, String> = content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim().trim_matches('"').to_string()))
        .collect();

    OsInfo {
        id: fields.get("ID").cloned().unwrap_or_default(),
        version_id: fields.get("VERSION_ID").cloned().unwrap_or_default(),
        pretty_name: fields.get("PRETTY_NAME").cloned().unwrap_or_default(),
    }
}

/// Parse "MemTotal:  16314488 kB" into megabytes
fn parse_meminfo(content: &str) -> Result<u64, String> {
    let line = content
        .lines()
        .find(|l| l.starts_with("MemTotal"))
        .ok_or_else(|| "MemTotal missing from meminfo".to_string())?;
    let kb = line
        .split_whitespace()
        .nth(1)
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| format!("invalid MemTotal line '{}'", line))?;
    Ok(kb / 1024)
}
