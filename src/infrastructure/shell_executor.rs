//! A concrete [`AgentExecutor`] that shells out via `tokio::process::Command`
//! (spec §1, the one host-pluggable seam; §4.2's whitelist is the
//! SecurityGate's concern, not this executor's).
//!
//! Grounded on `abathur::services::hook_executor::HookExecutor::run_script`'s
//! piped-stdio idiom, narrowed to SHELL-kind tasks; every other task kind is
//! a demo no-op success so the engine has something runnable end-to-end
//! without a real agent runtime wired in.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::models::{Task, TaskKind, TaskResult};
use crate::domain::ports::{AgentExecutor, DispatchOutcome};

/// Runs `SHELL` tasks' `payload["command"]` as a child process; every other
/// kind returns an immediate synthetic success (spec ambient stack: a
/// runnable default executor, not a spec module in its own right).
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellAgentExecutor;

#[async_trait]
impl AgentExecutor for ShellAgentExecutor {
    async fn execute(&self, task: &Task) -> Result<DispatchOutcome, String> {
        if task.kind != TaskKind::Shell {
            return Ok(DispatchOutcome::simple(TaskResult::success(
                format!("no-op executor: nothing to run for {}", task.kind),
                0,
            )));
        }

        let Some(command) = task.payload.get("command").and_then(|v| v.as_str()) else {
            return Err(format!("task {} is SHELL but payload has no \"command\" string", task.id));
        };

        info!(task_id = %task.id, %command, "executing shell command");
        let started = Instant::now();
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| format!("failed to spawn shell for task {}: {err}", task.id))?;

        let duration_ms = started.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(task_id = %task.id, exit_code = output.status.code(), "shell command finished");

        let result = TaskResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration_ms,
        };
        Ok(DispatchOutcome::simple(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn runs_shell_command_and_captures_stdout() {
        let executor = ShellAgentExecutor;
        let mut payload = BTreeMap::new();
        payload.insert("command".to_string(), serde_json::Value::String("echo hi".to_string()));
        let task = Task::new("t1", TaskKind::Shell, "builder").with_payload(payload);

        let outcome = executor.execute(&task).await.unwrap();
        assert_eq!(outcome.result.exit_code, 0);
        assert_eq!(outcome.result.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn non_shell_task_is_a_synthetic_success() {
        let executor = ShellAgentExecutor;
        let task = Task::new("t1", TaskKind::Code, "builder");
        let outcome = executor.execute(&task).await.unwrap();
        assert!(outcome.result.is_success());
    }

    #[tokio::test]
    async fn shell_task_without_command_errors() {
        let executor = ShellAgentExecutor;
        let task = Task::new("t1", TaskKind::Shell, "builder");
        assert!(executor.execute(&task).await.is_err());
    }
}
