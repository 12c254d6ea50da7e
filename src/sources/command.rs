//! Local process execution shared by the `exec` source and the task runner.
//!
//! Commands are split on whitespace and run without a shell, with stdin
//! closed, a timeout, and a cap on captured output.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;
use zeroize::Zeroizing;

use super::types::{ExternalValueSource, SourceResolution, TaskError};

/// Default execution time for `exec` lookups.
pub const EXEC_TIMEOUT_SECS: u64 = 30;

/// Maximum captured stdout (1 MB).
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// A fully prepared invocation.
pub(crate) struct Invocation<'a> {
    pub command: &'a str,
    pub extra_args: &'a [String],
    pub cwd: Option<&'a str>,
    pub env: Vec<(&'a str, String)>,
    pub timeout: Duration,
}

/// Run the invocation and return trimmed stdout.
pub(crate) async fn run(invocation: Invocation<'_>) -> Result<Zeroizing<String>, TaskError> {
    let mut parts = invocation.command.split_whitespace();
    let program = parts.next().ok_or(TaskError::Empty)?;

    if is_dangerous_command(program) {
        return Err(TaskError::Rejected(program.to_string()));
    }

    let mut cmd = Command::new(program);
    cmd.args(parts).args(invocation.extra_args);
    if let Some(cwd) = invocation.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &invocation.env {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(invocation.timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(TaskError::Spawn {
                program: program.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(TaskError::TimedOut {
                program: program.to_string(),
                timeout: invocation.timeout,
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(program, status = %output.status, stderr = %stderr, "command failed");
        return Err(TaskError::Exit {
            program: program.to_string(),
            status: output.status,
            stderr,
        });
    }
    if output.stdout.len() > MAX_OUTPUT_BYTES {
        return Err(TaskError::OutputTooLarge(MAX_OUTPUT_BYTES));
    }

    let stdout = Zeroizing::new(output.stdout);
    Ok(Zeroizing::new(String::from_utf8_lossy(&stdout).trim().to_string()))
}

/// Programs never run on behalf of a policy.
pub(crate) fn is_dangerous_command(program: &str) -> bool {
    let basename = program.rsplit('/').next().unwrap_or(program);

    matches!(
        basename,
        "rm" | "rmdir" | "mkfs" | "dd" | "shutdown" | "reboot"
            | "halt" | "poweroff" | "kill" | "killall" | "pkill"
            | "format" | "fdisk" | "parted"
    )
}

// ============================================================================
// exec source
// ============================================================================

/// `external` strategy source whose reference is a command line; stdout is
/// the value.
pub struct ExecSource {
    cwd: Option<String>,
    timeout: Duration,
}

impl ExecSource {
    pub fn new(cwd: Option<String>) -> Self {
        Self {
            cwd,
            timeout: Duration::from_secs(EXEC_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ExternalValueSource for ExecSource {
    fn name(&self) -> &str {
        "exec"
    }

    async fn fetch(&self, reference: &str) -> SourceResolution {
        let result = run(Invocation {
            command: reference,
            extra_args: &[],
            cwd: self.cwd.as_deref(),
            env: Vec::new(),
            timeout: self.timeout,
        })
        .await;

        match result {
            Ok(value) if value.is_empty() => {
                SourceResolution::NotFound(format!("command '{reference}' produced empty output"))
            }
            Ok(value) => SourceResolution::Resolved(value),
            Err(e) => SourceResolution::Failed(e.to_string()),
        }
    }
}
