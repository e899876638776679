// SSH Connector
// Drives the system ssh client in batch mode to reach remote hosts

use crate::connector::local::{run_command, run_process};
use crate::connector::{elevate, shell_quote, CommandOutput, Connector, ConnectorError, ExecOptions};
use crate::inventory::Host;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Settings shared by every SSH connection of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Explicit ssh binary; resolved from PATH when unset
    pub binary: Option<PathBuf>,
    /// Private key passed with `-i`
    pub identity_file: Option<PathBuf>,
    /// `ConnectTimeout` in seconds
    pub connect_timeout_secs: u64,
    /// Enforce known_hosts verification
    pub strict_host_key_checking: bool,
    /// Additional raw ssh arguments
    pub extra_args: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: None,
            identity_file: None,
            connect_timeout_secs: 10,
            strict_host_key_checking: false,
            extra_args: Vec::new(),
        }
    }
}

/// Connector that shells out to `ssh user@host -- command`
#[derive(Debug, Clone)]
pub struct SshConnector {
    host: Host,
    config: SshConfig,
}

impl SshConnector {
    pub fn new(host: Host) -> Self {
        Self::with_config(host, SshConfig::default())
    }

    pub fn with_config(host: Host, config: SshConfig) -> Self {
        Self { host, config }
    }

    fn binary(&self) -> Result<PathBuf, ConnectorError> {
        if let Some(binary) = &self.config.binary {
            return Ok(binary.clone());
        }
        which::which("ssh").map_err(|e| ConnectorError::Spawn {
            program: "ssh".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, e.to_string()),
        })
    }

    /// Arguments preceding the remote command
    pub fn ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                if self.config.strict_host_key_checking {
                    "yes"
                } else {
                    "no"
                }
            ),
            "-p".to_string(),
            self.host.port.to_string(),
        ];
        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args.push(format!("{}@{}", self.host.user, self.host.address));
        args.push("--".to_string());
        args
    }

    fn remote_command(&self, remote: &str) -> Result<Command, ConnectorError> {
        let mut cmd = Command::new(self.binary()?);
        cmd.args(self.ssh_args());
        cmd.arg(remote);
        Ok(cmd)
    }
}

#[async_trait::async_trait]
impl Connector for SshConnector {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn execute(
        &self,
        command: &str,
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ConnectorError> {
        let remote = if options.elevated {
            elevate(command)
        } else {
            command.to_string()
        };
        let cmd = self.remote_command(&remote)?;
        run_command(cmd, "ssh", None, options.timeout, cancel).await
    }

    async fn read_file(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ConnectorError> {
        let cmd = self.remote_command(&format!("cat {}", shell_quote(path)))?;
        let output = run_process(cmd, "ssh", None, None, cancel).await?;
        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.contains("No such file") {
            Err(ConnectorError::NotFound {
                path: path.to_string(),
            })
        } else {
            Err(ConnectorError::CommandFailed {
                command: format!("cat {}", path),
                exit_code: output.status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }

    async fn write_file(
        &self,
        contents: &[u8],
        path: &str,
        mode: u32,
        elevated: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        let script = format!(
            "cat > {path} && chmod {mode:o} {path}",
            path = shell_quote(path),
            mode = mode
        );
        let remote = if elevated { elevate(&script) } else { script };
        let cmd = self.remote_command(&remote)?;
        run_command(cmd, "ssh", Some(contents.to_vec()), None, cancel)
            .await?
            .into_result(&format!("write {}", path))
            .map(|_| ())
    }

    async fn path_exists(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ConnectorError> {
        let cmd = self.remote_command(&format!("test -e {}", shell_quote(path)))?;
        let output = run_command(cmd, "ssh", None, None, cancel).await?;
        match output.exit_code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(ConnectorError::CommandFailed {
                command: format!("test -e {}", path),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_args() {
        let mut host = Host::new("node1", "10.0.0.1");
        host.port = 2222;
        host.user = "ops".to_string();
        let connector = SshConnector::with_config(
            host,
            SshConfig {
                identity_file: Some(PathBuf::from("/keys/id_ed25519")),
                ..Default::default()
            },
        );

        let args = connector.ssh_args();
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(args.windows(2).any(|w| w == ["-i", "/keys/id_ed25519"]));
        assert_eq!(&args[args.len() - 2..], ["ops@10.0.0.1", "--"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let connector = SshConnector::with_config(
            Host::new("node1", "10.0.0.1"),
            SshConfig {
                binary: Some(PathBuf::from("/nonexistent/ssh")),
                ..Default::default()
            },
        );
        let result = connector
            .execute("true", &ExecOptions::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ConnectorError::Spawn { .. })));
    }
}
