// Local Connector
// Runs commands and file operations on the machine kubeforge itself runs on

use crate::connector::{elevate, shell_quote, CommandOutput, Connector, ConnectorError, ExecOptions};
use crate::inventory::Host;

use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Connector for hosts reached without a network hop
#[derive(Debug, Clone)]
pub struct LocalConnector {
    host: Host,
    shell: &'static str,
}

impl LocalConnector {
    pub fn new(host: Host) -> Self {
        Self { host, shell: "sh" }
    }

    fn shell_command(&self, command: &str, elevated: bool) -> Command {
        let script = if elevated {
            elevate(command)
        } else {
            command.to_string()
        };
        let mut cmd = Command::new(self.shell);
        cmd.arg("-c").arg(script);
        cmd
    }
}

/// Run a prepared command to completion, honoring timeout and cancellation.
///
/// The child is killed when the wait is abandoned.
pub(crate) async fn run_command(
    cmd: Command,
    program: &str,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<CommandOutput, ConnectorError> {
    let output = run_process(cmd, program, stdin, timeout, cancel).await?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
    })
}

/// Like [`run_command`] but keeps stdout as raw bytes
pub(crate) async fn run_process(
    mut cmd: Command,
    program: &str,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Output, ConnectorError> {
    if cancel.is_cancelled() {
        return Err(ConnectorError::Cancelled);
    }

    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ConnectorError::Spawn {
        program: program.to_string(),
        source,
    })?;

    // Stdin is written inside the bounded wait, never ahead of it
    let feed = child.stdin.take().zip(stdin);
    let wait = async move {
        let write = async move {
            match feed {
                Some((mut pipe, bytes)) => {
                    pipe.write_all(&bytes).await?;
                    pipe.shutdown().await
                }
                None => Ok(()),
            }
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;
        match written {
            // Exited without draining stdin; its status says what happened
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(output),
            Err(e) => Err(e),
            Ok(()) => Ok(output),
        }
    };
    let output = match timeout {
        Some(limit) => tokio::select! {
            result = tokio::time::timeout(limit, wait) => match result {
                Ok(output) => output?,
                Err(_) => return Err(ConnectorError::Timeout(limit)),
            },
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
        },
        None => tokio::select! {
            output = wait => output?,
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
        },
    };

    Ok(output)
}

#[async_trait::async_trait]
impl Connector for LocalConnector {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn execute(
        &self,
        command: &str,
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ConnectorError> {
        let cmd = self.shell_command(command, options.elevated);
        run_command(cmd, self.shell, None, options.timeout, cancel).await
    }

    async fn read_file(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ConnectorError> {
        tokio::select! {
            result = tokio::fs::read(path) => result.map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ConnectorError::NotFound { path: path.to_string() },
                _ => ConnectorError::Io(e),
            }),
            _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
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
        if elevated {
            let script = format!(
                "tee {path} >/dev/null && chmod {mode:o} {path}",
                path = shell_quote(path),
                mode = mode
            );
            let cmd = self.shell_command(&script, true);
            return run_command(cmd, self.shell, Some(contents.to_vec()), None, cancel)
                .await?
                .into_result(&format!("write {}", path))
                .map(|_| ());
        }

        tokio::select! {
            result = write_with_mode(path, contents, mode) => result.map_err(ConnectorError::Io),
            _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
        }
    }

    async fn path_exists(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ConnectorError> {
        tokio::select! {
            result = tokio::fs::try_exists(path) => result.map_err(ConnectorError::Io),
            _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
        }
    }
}

async fn write_with_mode(path: &str, contents: &[u8], mode: u32) -> io::Result<()> {
    tokio::fs::write(path, contents).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn connector() -> LocalConnector {
        LocalConnector::new(Host::local("localhost"))
    }

    #[tokio::test]
    async fn test_execute_captures_output_and_exit_code() {
        let cancel = CancellationToken::new();
        let output = connector()
            .execute("echo hello; echo oops >&2; exit 3", &ExecOptions::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let cancel = CancellationToken::new();
        let options = ExecOptions::default().with_timeout(Duration::from_millis(100));
        let result = connector().execute("sleep 5", &options, &cancel).await;

        assert!(matches!(result, Err(ConnectorError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_execute_honors_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = connector()
            .execute("sleep 5", &ExecOptions::default(), &cancel)
            .await;

        assert!(matches!(result, Err(ConnectorError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_stdin_is_delivered() {
        let cancel = CancellationToken::new();
        let output = run_command(shell("cat"), "sh", Some(b"payload".to_vec()), None, &cancel)
            .await
            .unwrap();

        assert_eq!(output.stdout, "payload");
        assert_eq!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_unread_stdin_still_honors_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = run_process(
            shell("sleep 4"),
            "sh",
            Some(vec![b'x'; 1024 * 1024]),
            Some(Duration::from_millis(200)),
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(ConnectorError::Cancelled)), "{:?}", result);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unread_stdin_still_times_out() {
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();
        let result = run_process(
            shell("sleep 4"),
            "sh",
            Some(vec![b'x'; 1024 * 1024]),
            Some(Duration::from_millis(100)),
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(ConnectorError::Timeout(_))), "{:?}", result);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubelet.conf");
        let path = path.to_str().unwrap();
        let cancel = CancellationToken::new();
        let local = connector();

        assert!(!local.path_exists(path, &cancel).await.unwrap());
        local
            .write_file(b"apiVersion: v1\n", path, 0o600, false, &cancel)
            .await
            .unwrap();
        assert!(local.path_exists(path, &cancel).await.unwrap());
        assert_eq!(
            local.read_file(path, &cancel).await.unwrap(),
            b"apiVersion: v1\n".to_vec()
        );

        let missing = local.read_file("/nonexistent/kubeforge", &cancel).await;
        assert!(matches!(missing, Err(ConnectorError::NotFound { .. })));
    }
}
