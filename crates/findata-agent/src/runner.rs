//! Script runner: subprocess isolation with preamble, timeout, and capture
//!
//! Executes arbitrary generated program text in a fresh OS process. The
//! isolation contract is deliberately modest: new process, bounded
//! wall-clock time, captured combined output. Retry logic lives in the
//! engine, never here.

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::prompts;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of one subprocess execution; immutable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Whether the process exited zero
    pub success: bool,

    /// Captured output: stdout alone on success, stdout + stderr on failure
    pub output: String,

    /// Wall-clock time the execution took
    pub elapsed: Duration,
}

/// Runs generated scripts in isolated subprocesses
pub struct ScriptRunner {
    config: Arc<AgentConfig>,
    preamble: String,
}

impl ScriptRunner {
    /// Create a runner; the preamble is derived from the configuration
    pub fn new(config: Arc<AgentConfig>) -> Self {
        let preamble = prompts::build_preamble(&config);
        Self { config, preamble }
    }

    /// Replace the preamble (e.g., an empty one for non-Python programs)
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Execute program text in a fresh subprocess
    ///
    /// Writes preamble + code to `<temp_scripts_dir>/<script_identifier>`,
    /// spawns the configured interpreter on it with cwd = project root, and
    /// waits for exit or timeout. `script_identifier` must be a safe,
    /// per-invocation-unique filename component; the caller owns that
    /// uniqueness scheme.
    pub async fn execute(&self, code: &str, script_identifier: &str) -> Result<ExecutionResult> {
        let start = Instant::now();

        tokio::fs::create_dir_all(&self.config.temp_scripts_dir).await?;
        let script_path = self.config.temp_scripts_dir.join(script_identifier);

        let full_code = format!("{}\n{}", self.preamble, code);
        tokio::fs::write(&script_path, full_code).await?;

        debug!(script = %script_path.display(), "Executing generated script");

        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(&script_path)
            .current_dir(&self.config.project_root)
            .env("PYTHONPATH", self.python_path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the in-flight future on timeout must not leak the
            // child process
            .kill_on_drop(true);
        if let Some(token) = &self.config.tushare_token {
            command.env("TUSHARE_TOKEN", token);
        }

        let result = match tokio::time::timeout(self.config.exec_timeout, command.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if output.status.success() {
                    ExecutionResult {
                        success: true,
                        output: stdout.trim().to_string(),
                        elapsed: start.elapsed(),
                    }
                } else {
                    // A legitimate error message from the generated program
                    // needs to reach the repair step as full context
                    ExecutionResult {
                        success: false,
                        output: format!("{stdout}\n{stderr}").trim().to_string(),
                        elapsed: start.elapsed(),
                    }
                }
            }
            Ok(Err(e)) => {
                return Err(AgentError::Execution(format!(
                    "failed to spawn {}: {e}",
                    self.config.interpreter
                )));
            }
            Err(_) => {
                warn!(script = %script_path.display(), "Execution timed out");
                ExecutionResult {
                    success: false,
                    output: format!(
                        "Execution timed out after {} seconds.",
                        self.config.exec_timeout.as_secs()
                    ),
                    elapsed: start.elapsed(),
                }
            }
        };

        if !self.config.keep_scripts {
            // Best-effort cleanup only
            let _ = tokio::fs::remove_file(&script_path).await;
        }

        Ok(result)
    }

    /// Project root prepended so generated code can resolve sibling helpers
    fn python_path(&self) -> String {
        let root = self.config.project_root.display().to_string();
        match std::env::var("PYTHONPATH") {
            Ok(existing) if !existing.is_empty() => format!("{root}:{existing}"),
            _ => root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shell-based config so tests need no Python toolchain
    fn shell_runner(dir: &std::path::Path, timeout: Duration) -> ScriptRunner {
        let config = AgentConfig::builder()
            .project_root(dir)
            .interpreter("sh")
            .exec_timeout(timeout)
            .build()
            .unwrap();
        ScriptRunner::new(Arc::new(config)).with_preamble("")
    }

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell_runner(dir.path(), Duration::from_secs(10));

        let result = runner.execute("echo hello", "ok.sh").await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn test_failure_concatenates_streams() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell_runner(dir.path(), Duration::from_secs(10));

        let result = runner
            .execute("echo partial; echo broken >&2; exit 3", "fail.sh")
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("partial"));
        assert!(result.output.contains("broken"));
    }

    #[tokio::test]
    async fn test_idempotent_for_deterministic_programs() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell_runner(dir.path(), Duration::from_secs(10));

        let first = runner.execute("echo stable", "a.sh").await.unwrap();
        let second = runner.execute("echo stable", "b.sh").await.unwrap();
        assert_eq!((first.success, first.output), (second.success, second.output));
    }

    #[tokio::test]
    async fn test_timeout_returns_failure_within_bound() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell_runner(dir.path(), Duration::from_secs(1));

        let start = Instant::now();
        let result = runner.execute("sleep 30", "slow.sh").await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("timed out"));
        // Bounded by timeout plus small overhead, never the sleep duration
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_preamble_prefixed_before_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            shell_runner(dir.path(), Duration::from_secs(10)).with_preamble("echo from-preamble");

        let result = runner.execute("echo from-code", "pre.sh").await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "from-preamble\nfrom-code");
    }

    #[tokio::test]
    async fn test_scratch_script_kept_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let runner = shell_runner(dir.path(), Duration::from_secs(10));

        runner.execute("echo x", "kept.sh").await.unwrap();
        assert!(dir.path().join("workspace/temp_scripts/kept.sh").exists());
    }

    #[tokio::test]
    async fn test_scratch_script_removed_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::builder()
            .project_root(dir.path())
            .interpreter("sh")
            .keep_scripts(false)
            .build()
            .unwrap();
        let runner = ScriptRunner::new(Arc::new(config)).with_preamble("");

        runner.execute("echo x", "gone.sh").await.unwrap();
        assert!(!dir.path().join("workspace/temp_scripts/gone.sh").exists());
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_infrastructure_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::builder()
            .project_root(dir.path())
            .interpreter("definitely-not-an-interpreter")
            .build()
            .unwrap();
        let runner = ScriptRunner::new(Arc::new(config)).with_preamble("");

        let result = runner.execute("echo x", "x.sh").await;
        assert!(matches!(result, Err(AgentError::Execution(_))));
    }
}
