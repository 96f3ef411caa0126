//! Mock process runner for testing.
//!
//! Provides a configurable mock implementation of the ProcessRunner trait
//! so harness and fix-loop tests can run without spawning interpreters.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::{CommandSpec, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ProcessOutput, ProcessRunner};

/// Predefined mock response for a process execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
            timed_out: false,
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
            timed_out: false,
        }
    }

    /// The process never finishes; the runner reports a timeout.
    pub fn timeout() -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            timed_out: true,
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub input: Option<String>,
    pub timeout_seconds: u64,
}

impl CapturedCall {
    /// Program and arguments joined with spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Responses served to commands whose line contains `pattern`.
#[derive(Debug, Clone)]
struct ResponseRule {
    pattern: String,
    responses: Vec<MockResponse>,
    served: usize,
}

impl ResponseRule {
    fn next(&mut self) -> MockResponse {
        let index = self.served.min(self.responses.len().saturating_sub(1));
        self.served += 1;
        self.responses
            .get(index)
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }
}

/// Mock process runner for testing.
///
/// Every call is captured. Responses come from the first rule whose pattern
/// occurs in the command line, otherwise from the default queue; a queue
/// that runs dry keeps returning its last response.
#[derive(Clone, Default)]
pub struct MockRunner {
    rules: Arc<RwLock<Vec<ResponseRule>>>,
    fallback: Arc<RwLock<Option<ResponseRule>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response to the default queue.
    pub fn add_response(self, response: MockResponse) -> Self {
        {
            let mut fallback = self.fallback.write();
            let rule = fallback.get_or_insert_with(|| ResponseRule {
                pattern: String::new(),
                responses: Vec::new(),
                served: 0,
            });
            rule.responses.push(response);
        }
        self
    }

    /// Serve `responses` in order to commands containing `pattern`.
    pub fn on_command(self, pattern: impl Into<String>, responses: Vec<MockResponse>) -> Self {
        self.rules.write().push(ResponseRule {
            pattern: pattern.into(),
            responses,
            served: 0,
        });
        self
    }

    /// Set a failure to simulate.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Calls whose command line contains `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.command_line().contains(pattern))
            .cloned()
            .collect()
    }

    fn next_response(&self, command_line: &str) -> MockResponse {
        let mut rules = self.rules.write();
        if let Some(rule) = rules
            .iter_mut()
            .find(|r| command_line.contains(r.pattern.as_str()))
        {
            return rule.next();
        }
        drop(rules);

        self.fallback
            .write()
            .as_mut()
            .map(ResponseRule::next)
            .unwrap_or_else(|| MockResponse::success(""))
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec, run_config: &RunConfig) -> RunnerResult<ProcessOutput> {
        let call = CapturedCall {
            program: spec.program.clone(),
            args: spec.args.clone(),
            cwd: spec.cwd.clone(),
            input: spec.input.clone(),
            timeout_seconds: run_config.timeout_seconds,
        };
        let command_line = call.command_line();
        self.captured_calls.write().push(call);

        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }

        let response = self.next_response(&command_line);
        if response.timed_out {
            return Err(RunnerError::Timeout(run_config.timeout_seconds));
        }

        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ProcessOutput {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}
