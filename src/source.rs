//! Where access log lines come from
//!
//! A [`LogSource`] finds the process currently emitting the ingress access
//! log and opens a follow-mode stream of its output. The tailer owns
//! reconnection; sources only need to report failures.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::process::{Child, Command};

use crate::config::TailerConfig;
use crate::tailer::TailError;

#[async_trait]
pub trait LogSource: Send + Sync {
    /// Identify the current log-emitting target
    async fn discover(&self) -> Result<String, TailError>;

    /// Open a stream that blocks for new lines instead of ending at the
    /// current end of the log
    async fn open_follow(&self, target: &str) -> Result<LogStream, TailError>;
}

/// Longest line kept in memory; longer lines are drained and skipped
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// One read from a [`LogStream`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    /// Line text including its terminator, if any
    Complete(String),
    /// Line longer than the stream's limit; its bytes were discarded
    Oversized { len: usize },
}

/// Newline-delimited stream of log output
pub struct LogStream {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    max_line: usize,
    // Killed on drop, so abandoning a stream also stops its producer
    _child: Option<Child>,
}

impl LogStream {
    pub fn new(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            max_line: MAX_LINE_BYTES,
            _child: None,
        }
    }

    fn from_child(reader: impl AsyncBufRead + Send + Unpin + 'static, child: Child) -> Self {
        Self {
            reader: Box::new(reader),
            max_line: MAX_LINE_BYTES,
            _child: Some(child),
        }
    }

    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Read the next line; `None` at end of stream.
    ///
    /// At most `max_line` bytes are buffered. The rest of a longer line is
    /// consumed up to its newline and the line comes back as
    /// [`LogLine::Oversized`].
    ///
    /// Not cancel-safe: a partially read line is lost if the future is
    /// dropped, which only happens when the stream is being abandoned.
    pub async fn next_line(&mut self) -> std::io::Result<Option<LogLine>> {
        let mut buf = Vec::new();
        let mut len = 0;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if len == 0 {
                    return Ok(None);
                }
                break;
            }

            let (used, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            if len + used <= self.max_line {
                buf.extend_from_slice(&available[..used]);
            }
            len += used;
            self.reader.consume(used);

            if done {
                break;
            }
        }

        if len > self.max_line {
            return Ok(Some(LogLine::Oversized { len }));
        }
        Ok(Some(LogLine::Complete(
            String::from_utf8_lossy(&buf).into_owned(),
        )))
    }
}

/// Follows the first ingress controller pod through `kubectl`
pub struct KubectlSource {
    kubectl: String,
    namespace: String,
    label_selector: String,
}

impl KubectlSource {
    pub fn new(config: &TailerConfig) -> Self {
        Self {
            kubectl: config.kubectl.clone(),
            namespace: config.namespace.clone(),
            label_selector: config.label_selector.clone(),
        }
    }

    fn discover_command(&self) -> Command {
        let mut cmd = Command::new(&self.kubectl);
        cmd.args(["get", "pods", "--namespace", &self.namespace])
            .args(["--output", "jsonpath={.items[0].metadata.name}"]);
        if !self.label_selector.is_empty() {
            cmd.args(["--selector", &self.label_selector]);
        }
        cmd
    }

    fn follow_command(&self, pod: &str) -> Command {
        let mut cmd = Command::new(&self.kubectl);
        cmd.args(["logs", "--follow", "--namespace", &self.namespace, pod])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl LogSource for KubectlSource {
    async fn discover(&self) -> Result<String, TailError> {
        let output = self.discover_command().output().await.map_err(|e| {
            TailError::Discovery(format!("failed to run {}: {}", self.kubectl, e))
        })?;

        if !output.status.success() {
            return Err(TailError::Discovery(format!(
                "{} get pods exited with {}: {}",
                self.kubectl,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let pod = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if pod.is_empty() {
            return Err(TailError::Discovery(format!(
                "no pods found in namespace {}",
                self.namespace
            )));
        }

        Ok(pod)
    }

    async fn open_follow(&self, target: &str) -> Result<LogStream, TailError> {
        let mut child = self.follow_command(target).spawn().map_err(|e| TailError::Open {
            target: target.to_string(),
            reason: e.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| TailError::Open {
            target: target.to_string(),
            reason: "stdout was not captured".to_string(),
        })?;

        Ok(LogStream::from_child(tokio::io::BufReader::new(stdout), child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tailer_config(selector: &str) -> TailerConfig {
        TailerConfig {
            namespace: "ingress-nginx".to_string(),
            label_selector: selector.to_string(),
            kubectl: "kubectl".to_string(),
            stall_timeout_seconds: 300,
            restart_seconds: 60,
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn complete(text: &str) -> Option<LogLine> {
        Some(LogLine::Complete(text.to_string()))
    }

    #[tokio::test]
    async fn test_next_line_until_end() {
        let mut stream = LogStream::new(Cursor::new(b"first\nsecond\npartial".to_vec()));

        assert_eq!(stream.next_line().await.unwrap(), complete("first\n"));
        assert_eq!(stream.next_line().await.unwrap(), complete("second\n"));
        assert_eq!(stream.next_line().await.unwrap(), complete("partial"));
        assert_eq!(stream.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_line_replaces_invalid_utf8() {
        let mut stream = LogStream::new(Cursor::new(b"ok \xff\n".to_vec()));
        let Some(LogLine::Complete(line)) = stream.next_line().await.unwrap() else {
            panic!("expected a complete line");
        };
        assert!(line.starts_with("ok "));
        assert!(line.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let mut payload = vec![b'x'; 100];
        payload.extend_from_slice(b"\nshort\n");
        // Small read buffer so the long line spans several fills
        let reader = tokio::io::BufReader::with_capacity(8, Cursor::new(payload));
        let mut stream = LogStream::new(reader).with_max_line(16);

        assert_eq!(
            stream.next_line().await.unwrap(),
            Some(LogLine::Oversized { len: 101 })
        );
        assert_eq!(stream.next_line().await.unwrap(), complete("short\n"));
        assert_eq!(stream.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_line_at_end_of_stream() {
        let mut stream = LogStream::new(Cursor::new(vec![b'x'; 40])).with_max_line(16);
        assert_eq!(
            stream.next_line().await.unwrap(),
            Some(LogLine::Oversized { len: 40 })
        );
        assert_eq!(stream.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_line_at_limit_is_kept() {
        let mut stream = LogStream::new(Cursor::new(b"0123456789abcde\n".to_vec())).with_max_line(16);
        assert_eq!(stream.next_line().await.unwrap(), complete("0123456789abcde\n"));
    }

    #[test]
    fn test_discover_command_args() {
        let source = KubectlSource::new(&tailer_config(""));
        assert_eq!(
            args(&source.discover_command()),
            vec![
                "get",
                "pods",
                "--namespace",
                "ingress-nginx",
                "--output",
                "jsonpath={.items[0].metadata.name}",
            ]
        );

        let source = KubectlSource::new(&tailer_config("app.kubernetes.io/component=controller"));
        let discover = args(&source.discover_command());
        assert_eq!(
            discover[discover.len() - 2..],
            ["--selector", "app.kubernetes.io/component=controller"]
        );
    }

    #[test]
    fn test_follow_command_args() {
        let source = KubectlSource::new(&tailer_config(""));
        assert_eq!(
            args(&source.follow_command("ingress-nginx-controller-abc")),
            vec![
                "logs",
                "--follow",
                "--namespace",
                "ingress-nginx",
                "ingress-nginx-controller-abc",
            ]
        );
    }

    #[tokio::test]
    async fn test_discover_fails_without_kubectl() {
        let mut config = tailer_config("");
        config.kubectl = "/nonexistent/kubectl".to_string();
        let source = KubectlSource::new(&config);

        let err = source.discover().await.unwrap_err();
        assert!(matches!(err, TailError::Discovery(_)));
    }
}
