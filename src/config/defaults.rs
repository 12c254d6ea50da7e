//! Default configuration constants used across the system.

/// Environment variable holding the vault master key.
pub const DEFAULT_MASTER_KEY_ENV: &str = "VAULTKEEPER_MASTER_KEY";

/// Vault file name inside the state directory.
pub const VAULT_FILE_NAME: &str = "vault.enc";

/// Key-derivation salt file name inside the state directory.
pub const SALT_FILE_NAME: &str = "vault.salt";

/// Rotation interval for new policies.
pub const DEFAULT_ROTATION_INTERVAL: &str = "30d";

/// History bound for new policies.
pub const DEFAULT_MAX_VERSIONS_TO_KEEP: usize = 5;

/// `createdBy` for policies created without one.
pub const DEFAULT_CREATED_BY: &str = "vaultkeeper";

/// Scheduler tick interval.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;

/// Concurrent rotations per tick and concurrent hooks per timing.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Hook timeout when the hook does not set one.
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 30;

/// Per-channel notification delivery timeout.
pub const DEFAULT_NOTIFICATION_TIMEOUT_SECS: u64 = 10;

/// Delegated task timeout when the strategy does not set one.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 30;
