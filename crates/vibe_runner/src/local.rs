//! Runner for processes on the local machine.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{CommandSpec, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ProcessOutput, ProcessRunner};

/// Output line from a running process.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: chrono::DateTime<Utc>,
    pub stream: LogStream,
    pub message: String,
}

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Log handler callback type.
pub type LogHandler = Arc<dyn Fn(LogLine) + Send + Sync>;

/// Runs commands as child processes of the current one.
///
/// Each child leads its own process group. On timeout the whole group is
/// killed, so shells started in command mode take their children with them.
#[derive(Clone, Default)]
pub struct LocalRunner {
    log_handler: Option<LogHandler>,
}

impl LocalRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a log handler for streamed output lines.
    pub fn with_log_handler(mut self, handler: LogHandler) -> Self {
        self.log_handler = Some(handler);
        self
    }

    /// Drain `source` to EOF. Lines are decoded lossily so invalid UTF-8
    /// never stops the read.
    fn collect<R>(&self, source: R, stream: LogStream, stream_logs: bool) -> JoinHandle<String>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let log_handler = self.log_handler.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(source);
            let mut output = String::new();
            let mut raw = Vec::new();
            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("[{}] read failed: {}", stream, e);
                        break;
                    }
                }

                let decoded = String::from_utf8_lossy(&raw);
                let line = decoded.trim_end_matches('\n').trim_end_matches('\r');
                output.push_str(line);
                output.push('\n');
                if stream_logs {
                    debug!("[{}] {}", stream, line);
                    if let Some(handler) = &log_handler {
                        handler(LogLine {
                            timestamp: Utc::now(),
                            stream,
                            message: line.to_string(),
                        });
                    }
                }
            }
            output
        })
    }

    async fn execute(
        &self,
        spec: &CommandSpec,
        run_config: &RunConfig,
    ) -> RunnerResult<(i64, String, String)> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).envs(&spec.env).kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(if spec.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("Executing: {}", spec.display());

        let mut child = cmd
            .spawn()
            .map_err(|e| RunnerError::spawn_failed(&spec.program, e.to_string()))?;
        let pid = child.id();

        if let (Some(input), Some(mut stdin)) = (spec.input.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                let _ = stdin.write_all(input.as_bytes()).await;
                let _ = stdin.write_all(b"\n").await;
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stderr was not captured".to_string()))?;

        let stdout_task = self.collect(stdout, LogStream::Stdout, run_config.stream_logs);
        let stderr_task = self.collect(stderr, LogStream::Stderr, run_config.stream_logs);

        // One deadline covers both the exit and draining the pipes.
        let deadline = (run_config.timeout_seconds > 0)
            .then(|| Instant::now() + Duration::from_secs(run_config.timeout_seconds));

        let waited = match deadline {
            Some(deadline) => timeout_at(deadline, child.wait()).await,
            None => Ok(child.wait().await),
        };
        let status = match waited {
            Ok(status) => status.map_err(|e| {
                RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?,
            Err(_) => {
                kill_group(pid);
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(RunnerError::Timeout(run_config.timeout_seconds));
            }
        };

        let streams = async {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            (stdout, stderr)
        };
        tokio::pin!(streams);

        let drained = match deadline {
            Some(deadline) => timeout_at(deadline, streams.as_mut()).await.ok(),
            None => Some(streams.as_mut().await),
        };
        let (stdout_output, stderr_output) = match drained {
            Some(output) => output,
            None => {
                warn!(
                    "{} exited but its output is still held open; stopping its process group",
                    spec.program
                );
                kill_group(pid);
                streams.await
            }
        };

        let exit_code = status.code().map(i64::from).unwrap_or(-1);

        Ok((exit_code, stdout_output, stderr_output))
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: killpg only sends a signal; the group id is the leader's pid.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[async_trait]
impl ProcessRunner for LocalRunner {
    async fn run(&self, spec: &CommandSpec, run_config: &RunConfig) -> RunnerResult<ProcessOutput> {
        let started_at = Utc::now();
        let (exit_code, stdout, stderr) = self.execute(spec, run_config).await?;
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        if exit_code == 0 {
            info!("{} completed in {}ms", spec.program, duration_ms);
        } else {
            error!(
                "{} failed with exit code {} after {}ms",
                spec.program, exit_code, duration_ms
            );
        }

        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let runner = LocalRunner::new();
        let spec = CommandSpec::shell("echo out; echo err >&2; exit 3");

        let output = runner.run(&spec, &RunConfig::default()).await.unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_feeds_stdin() {
        let runner = LocalRunner::new();
        let spec = CommandSpec::shell("read a; read b; echo \"$a-$b\"").input("5\n8");

        let output = runner.run(&spec, &RunConfig::default()).await.unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "5-8\n");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "here").unwrap();

        let spec = CommandSpec::shell("cat marker.txt").cwd(temp.path());
        let output = LocalRunner::new().run(&spec, &RunConfig::default()).await.unwrap();

        assert_eq!(output.stdout, "here\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let spec = CommandSpec::shell("sleep 5");
        let started = Instant::now();

        let result = LocalRunner::new()
            .run(&spec, &RunConfig::default().timeout(1))
            .await;

        assert!(matches!(result, Err(RunnerError::Timeout(1))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_keeps_draining() {
        let spec = CommandSpec::shell(
            "printf '\\377\\n'; head -c 300000 /dev/zero | tr '\\0' a; echo; echo tail; exit 0",
        );

        let output = LocalRunner::new()
            .run(&spec, &RunConfig::default().timeout(10))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.starts_with('\u{FFFD}'));
        assert!(output.stdout.ends_with("\ntail\n"));
        assert!(output.stdout.len() > 300_000);
    }

    #[tokio::test]
    async fn test_background_child_cannot_hold_run_open() {
        let spec = CommandSpec::shell("sleep 6 & echo started");
        let started = Instant::now();

        let output = LocalRunner::new()
            .run(&spec, &RunConfig::default().timeout(1))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "started\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_whole_process_group() {
        let temp = tempfile::tempdir().unwrap();
        let spec = CommandSpec::shell("(sleep 2; touch survived) & sleep 10").cwd(temp.path());

        let result = LocalRunner::new()
            .run(&spec, &RunConfig::default().timeout(1))
            .await;
        assert!(matches!(result, Err(RunnerError::Timeout(1))));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!temp.path().join("survived").exists());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let spec = CommandSpec::new("definitely-not-a-real-binary-4242");
        let result = LocalRunner::new().run(&spec, &RunConfig::default()).await;
        assert!(matches!(result, Err(RunnerError::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn test_log_handler_receives_lines() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let runner = LocalRunner::new().with_log_handler(Arc::new(move |line: LogLine| {
            sink.lock().push((line.stream, line.message));
        }));

        runner
            .run(
                &CommandSpec::shell("echo hello"),
                &RunConfig::default().stream_logs(true),
            )
            .await
            .unwrap();

        assert_eq!(seen.lock().clone(), vec![(LogStream::Stdout, "hello".to_string())]);
    }
}
