//! Delegated tasks run as local processes.

use async_trait::async_trait;
use tracing::debug;

use super::command::{run, Invocation};
use super::types::{TaskError, TaskOutput, TaskRequest, TaskRunner};

/// Environment variable carrying the JSON rotation context.
pub const TASK_CONTEXT_ENV: &str = "VAULTKEEPER_TASK_CONTEXT";

pub struct CommandTaskRunner {
    cwd: Option<String>,
}

impl CommandTaskRunner {
    pub fn new(cwd: Option<String>) -> Self {
        Self { cwd }
    }
}

#[async_trait]
impl TaskRunner for CommandTaskRunner {
    async fn run(&self, request: TaskRequest) -> Result<TaskOutput, TaskError> {
        debug!(task = %request.task, timeout_secs = request.timeout.as_secs(), "running delegated task");
        let stdout = run(Invocation {
            command: &request.task,
            extra_args: &request.args,
            cwd: self.cwd.as_deref(),
            env: vec![(TASK_CONTEXT_ENV, request.context.to_string())],
            timeout: request.timeout,
        })
        .await?;
        Ok(TaskOutput { stdout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn request(task: &str) -> TaskRequest {
        TaskRequest {
            task: task.to_string(),
            args: Vec::new(),
            context: json!({"policyId": "rp_1"}),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn stdout_is_trimmed() {
        let runner = CommandTaskRunner::new(None);
        let out = runner
            .run(TaskRequest {
                args: vec!["world".into()],
                ..request("echo hello")
            })
            .await
            .unwrap();
        assert_eq!(out.stdout.as_str(), "hello world");
    }

    #[tokio::test]
    async fn context_is_exported() {
        let runner = CommandTaskRunner::new(None);
        let out = runner
            .run(request("printenv VAULTKEEPER_TASK_CONTEXT"))
            .await
            .unwrap();
        let context: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
        assert_eq!(context["policyId"], "rp_1");
    }

    #[tokio::test]
    async fn empty_task_is_rejected() {
        let err = CommandTaskRunner::new(None).run(request("   ")).await.unwrap_err();
        assert!(matches!(err, TaskError::Empty));
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let err = CommandTaskRunner::new(None).run(request("false")).await.unwrap_err();
        assert!(matches!(err, TaskError::Exit { .. }));
    }
}
