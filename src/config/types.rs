use serde::{Deserialize, Serialize};

use super::defaults::*;

// ============================================================================
// Vault Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Encrypted vault file. Defaults to `<stateDir>/vault.enc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Key-derivation salt file. Defaults to `<stateDir>/vault.salt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt_path: Option<String>,
    /// Name of the environment variable holding the master key.
    #[serde(default = "default_master_key_env")]
    pub master_key_env: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: None,
            salt_path: None,
            master_key_env: default_master_key_env(),
        }
    }
}

// ============================================================================
// Rotation Configuration
// ============================================================================

/// Defaults applied to newly created rotation policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationConfig {
    #[serde(default = "default_rotation_interval")]
    pub default_interval: String,
    #[serde(default = "default_true")]
    pub versioning_enabled: bool,
    #[serde(default = "default_max_versions")]
    pub max_versions_to_keep: usize,
    #[serde(default = "default_created_by")]
    pub created_by: String,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            default_interval: default_rotation_interval(),
            versioning_enabled: true,
            max_versions_to_keep: default_max_versions(),
            created_by: default_created_by(),
        }
    }
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_rotations: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            max_concurrent_rotations: DEFAULT_MAX_CONCURRENT,
        }
    }
}

// ============================================================================
// Hooks, Notifications and Tasks
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksConfig {
    #[serde(default = "default_hook_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// HMAC key for `X-Vaultkeeper-Signature` on outgoing webhooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_HOOK_TIMEOUT_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            signing_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsConfig {
    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_NOTIFICATION_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksConfig {
    /// Working directory for delegated tasks and `exec` sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default = "default_task_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            cwd: None,
            timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Silent,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Silent => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LoggingLevel,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_true() -> bool {
    true
}

fn default_master_key_env() -> String {
    DEFAULT_MASTER_KEY_ENV.to_string()
}

fn default_rotation_interval() -> String {
    DEFAULT_ROTATION_INTERVAL.to_string()
}

fn default_max_versions() -> usize {
    DEFAULT_MAX_VERSIONS_TO_KEEP
}

fn default_created_by() -> String {
    DEFAULT_CREATED_BY.to_string()
}

fn default_tick_interval_secs() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_hook_timeout_secs() -> u64 {
    DEFAULT_HOOK_TIMEOUT_SECS
}

fn default_notification_timeout_secs() -> u64 {
    DEFAULT_NOTIFICATION_TIMEOUT_SECS
}

fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}
