// In-Memory Connector
// Scripted command table and virtual filesystem for dry tests of steps and plans

use crate::connector::{CommandOutput, Connector, ConnectorError, ExecOptions};
use crate::inventory::{Facts, Host};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct ScriptedResponse {
    pattern: String,
    output: CommandOutput,
    remaining: Option<usize>,
}

/// Connector that never leaves the process.
///
/// Commands are matched against scripted responses by substring, first
/// registered wins; unmatched commands succeed with empty output. Mutating
/// calls (`execute`, `write_file`) and reads (`read_file`, `path_exists`,
/// `gather_facts`) are counted separately.
#[derive(Debug)]
pub struct MemoryConnector {
    host: Host,
    facts: Option<Facts>,
    delay: Option<Duration>,
    script: Mutex<Vec<ScriptedResponse>>,
    files: Mutex<HashMap<String, (Vec<u8>, u32)>>,
    executed: Mutex<Vec<String>>,
    mutations: AtomicUsize,
    reads: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryConnector {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            facts: None,
            delay: None,
            script: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
            mutations: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    /// Facts returned by `gather_facts`
    pub fn with_facts(mut self, facts: Facts) -> Self {
        self.facts = Some(facts);
        self
    }

    /// Simulated latency for every `execute`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Respond to commands containing `pattern`
    pub fn with_response(self, pattern: impl Into<String>, output: CommandOutput) -> Self {
        lock(&self.script).push(ScriptedResponse {
            pattern: pattern.into(),
            output,
            remaining: None,
        });
        self
    }

    /// Fail commands containing `pattern` with the given exit code
    pub fn with_failure(self, pattern: impl Into<String>, exit_code: i32, stderr: &str) -> Self {
        self.with_response(pattern, failed_output(exit_code, stderr))
    }

    /// Fail commands containing `pattern` for the first `times` matches only
    pub fn with_transient_failure(
        self,
        pattern: impl Into<String>,
        times: usize,
        stderr: &str,
    ) -> Self {
        lock(&self.script).push(ScriptedResponse {
            pattern: pattern.into(),
            output: failed_output(1, stderr),
            remaining: Some(times),
        });
        self
    }

    /// Seed the virtual filesystem
    pub fn with_file(self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        lock(&self.files).insert(path.into(), (contents.into(), 0o644));
        self
    }

    /// Contents of a virtual file
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(path).map(|(bytes, _)| bytes.clone())
    }

    /// Mode of a virtual file
    pub fn file_mode(&self, path: &str) -> Option<u32> {
        lock(&self.files).get(path).map(|(_, mode)| *mode)
    }

    /// Commands passed to `execute`, in call order
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Total number of connector calls of any kind
    pub fn call_count(&self) -> usize {
        self.mutation_count() + self.read_count()
    }

    fn respond(&self, command: &str) -> CommandOutput {
        let mut script = lock(&self.script);
        for entry in script.iter_mut() {
            if !command.contains(&entry.pattern) {
                continue;
            }
            match entry.remaining.as_mut() {
                Some(0) => continue,
                Some(n) => *n -= 1,
                None => {}
            }
            return entry.output.clone();
        }
        CommandOutput {
            exit_code: Some(0),
            ..Default::default()
        }
    }
}

fn failed_output(exit_code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: Some(exit_code),
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn execute(
        &self,
        command: &str,
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ConnectorError> {
        if cancel.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        lock(&self.executed).push(command.to_string());

        if let Some(delay) = self.delay {
            let sleep = tokio::time::sleep(delay);
            match options.timeout {
                Some(limit) if limit < delay => tokio::select! {
                    _ = tokio::time::sleep(limit) => return Err(ConnectorError::Timeout(limit)),
                    _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
                },
                _ => tokio::select! {
                    _ = sleep => {}
                    _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
                },
            }
        }

        Ok(self.respond(command))
    }

    async fn read_file(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ConnectorError> {
        if cancel.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.file(path).ok_or_else(|| ConnectorError::NotFound {
            path: path.to_string(),
        })
    }

    async fn write_file(
        &self,
        contents: &[u8],
        path: &str,
        mode: u32,
        _elevated: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        if cancel.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        lock(&self.files).insert(path.to_string(), (contents.to_vec(), mode));
        Ok(())
    }

    async fn path_exists(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ConnectorError> {
        if cancel.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.files).contains_key(path))
    }

    async fn gather_facts(&self, cancel: &CancellationToken) -> Result<Facts, ConnectorError> {
        if cancel.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.facts
            .clone()
            .ok_or_else(|| ConnectorError::InvalidFacts(format!("no facts for {}", self.host)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_and_counters() {
        let cancel = CancellationToken::new();
        let connector = MemoryConnector::new(Host::new("node1", "10.0.0.1"))
            .with_failure("kubeadm init", 1, "port 6443 in use")
            .with_file("/etc/hostname", "node1\n");

        let ok = connector
            .execute("swapoff -a", &ExecOptions::default(), &cancel)
            .await
            .unwrap();
        assert!(ok.success());

        let failed = connector
            .execute("kubeadm init --config x", &ExecOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(failed.exit_code, Some(1));
        assert_eq!(failed.stderr, "port 6443 in use");

        assert!(connector.path_exists("/etc/hostname", &cancel).await.unwrap());
        assert_eq!(connector.mutation_count(), 2);
        assert_eq!(connector.read_count(), 1);
        assert_eq!(
            connector.executed(),
            vec!["swapoff -a", "kubeadm init --config x"]
        );
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let cancel = CancellationToken::new();
        let connector = MemoryConnector::new(Host::new("node1", "10.0.0.1"))
            .with_transient_failure("apt-get", 2, "lock held");

        for expected in [Some(1), Some(1), Some(0)] {
            let output = connector
                .execute("apt-get install -y socat", &ExecOptions::default(), &cancel)
                .await
                .unwrap();
            assert_eq!(output.exit_code, expected);
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let cancel = CancellationToken::new();
        let connector = MemoryConnector::new(Host::new("node1", "10.0.0.1"));
        connector
            .write_file(b"net.ipv4.ip_forward = 1\n", "/etc/sysctl.d/k8s.conf", 0o644, true, &cancel)
            .await
            .unwrap();

        assert_eq!(
            connector.read_file("/etc/sysctl.d/k8s.conf", &cancel).await.unwrap(),
            b"net.ipv4.ip_forward = 1\n".to_vec()
        );
        assert_eq!(connector.file_mode("/etc/sysctl.d/k8s.conf"), Some(0o644));
        assert!(matches!(
            connector.read_file("/missing", &cancel).await,
            Err(ConnectorError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delay_honors_timeout_and_cancel() {
        let connector = MemoryConnector::new(Host::new("node1", "10.0.0.1"))
            .with_delay(Duration::from_secs(5));

        let options = ExecOptions::default().with_timeout(Duration::from_millis(20));
        let result = connector
            .execute("sleep", &options, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ConnectorError::Timeout(_))));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = connector
            .execute("sleep", &ExecOptions::default(), &cancel)
            .await;
        assert!(matches!(result, Err(ConnectorError::Cancelled)));
    }
}
