//! Core types for value sources and delegated tasks.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

// ============================================================================
// External value sources
// ============================================================================

/// Result of asking an external system for a value.
#[derive(Debug)]
pub enum SourceResolution {
    Resolved(Zeroizing<String>),
    /// The source ran but has nothing under that reference.
    NotFound(String),
    Failed(String),
}

impl SourceResolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, SourceResolution::Resolved(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            SourceResolution::Resolved(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            SourceResolution::Failed(msg) | SourceResolution::NotFound(msg) => Some(msg),
            SourceResolution::Resolved(_) => None,
        }
    }
}

/// A named external system able to hand out a fresh value for a reference.
#[async_trait]
pub trait ExternalValueSource: Send + Sync {
    /// Name used in `regenerationStrategy.parameters.system`.
    fn name(&self) -> &str;

    async fn fetch(&self, reference: &str) -> SourceResolution;
}

/// Lookup table from system name to source.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn ExternalValueSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `env` and `exec` sources.
    pub fn with_builtin(cwd: Option<String>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::EnvSource::new()));
        registry.register(Arc::new(super::ExecSource::new(cwd)));
        registry
    }

    pub fn register(&mut self, source: Arc<dyn ExternalValueSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn get(&self, system: &str) -> Option<Arc<dyn ExternalValueSource>> {
        self.sources.get(system).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ============================================================================
// Delegated tasks
// ============================================================================

#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Program and arguments, split on whitespace. No shell is involved.
    pub task: String,
    /// Extra arguments appended after those in `task`.
    pub args: Vec<String>,
    /// Rotation context handed to the task (never contains secret values).
    pub context: serde_json::Value,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct TaskOutput {
    /// Trimmed stdout.
    pub stdout: Zeroizing<String>,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("empty command")]
    Empty,

    #[error("command '{0}' is not allowed")]
    Rejected(String),

    #[error("failed to execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("'{program}' timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("output exceeds {0} bytes")]
    OutputTooLarge(usize),
}

/// Runs delegated tasks for hooks and the delegated-task strategy.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, request: TaskRequest) -> Result<TaskOutput, TaskError>;
}
