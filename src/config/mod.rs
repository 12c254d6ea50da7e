mod defaults;
mod io;
mod types;
mod validation;

pub use defaults::*;
pub use io::*;
pub use types::*;
pub use validation::*;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rotation::{HookSettings, PolicyDefaults, RotationInterval, SchedulerSettings};

/// Top-level vaultkeeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    /// State directory for the vault and its salt.
    #[serde(skip)]
    pub state_dir: PathBuf,

    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(find_config_file);

        let mut config = match config_path {
            Some(config_path) if config_path.exists() => {
                let mut config = load_config_file(&config_path)?;
                config.source = Some(config_path);
                config
            }
            Some(config_path) => {
                anyhow::bail!("Config file '{}' does not exist", config_path.display())
            }
            None => Config::default(),
        };

        // Apply environment variable overrides
        config.apply_env_overrides()?;

        // Resolve state directory
        config.state_dir = resolve_state_dir();

        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &str) -> Result<()> {
        let path = Path::new(path);
        let rendered = render_config_file(path, &Config::default())?;
        std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write config file '{}'", path.display()))?;
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("VAULTKEEPER_VAULT_PATH") {
            if !path.is_empty() {
                self.vault.path = Some(path);
            }
        }

        if let Ok(secs) = std::env::var("VAULTKEEPER_TICK_SECS") {
            self.scheduler.tick_interval_secs = parse_tick_secs(&secs)?;
        }

        if let Ok(secret) = std::env::var("VAULTKEEPER_HOOK_SIGNING_SECRET") {
            if !secret.is_empty() {
                self.hooks.signing_secret = Some(secret);
            }
        }
        Ok(())
    }

    pub fn vault_path(&self) -> PathBuf {
        self.vault
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.state_dir.join(VAULT_FILE_NAME))
    }

    pub fn salt_path(&self) -> PathBuf {
        self.vault
            .salt_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.state_dir.join(SALT_FILE_NAME))
    }

    pub fn policy_defaults(&self) -> PolicyDefaults {
        PolicyDefaults {
            rotation_interval: RotationInterval::parse(&self.rotation.default_interval),
            versioning_enabled: self.rotation.versioning_enabled,
            max_versions_to_keep: self.rotation.max_versions_to_keep,
            created_by: self.rotation.created_by.clone(),
        }
    }

    pub fn hook_settings(&self) -> HookSettings {
        HookSettings {
            default_timeout: Duration::from_secs(self.hooks.default_timeout_secs),
            max_concurrent: self.hooks.max_concurrent,
            signing_secret: self.hooks.signing_secret.clone(),
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick_interval: Duration::from_secs(self.scheduler.tick_interval_secs),
            max_concurrent_rotations: self.scheduler.max_concurrent_rotations,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault: VaultConfig::default(),
            rotation: RotationConfig::default(),
            scheduler: SchedulerConfig::default(),
            hooks: HooksConfig::default(),
            notifications: NotificationsConfig::default(),
            tasks: TasksConfig::default(),
            logging: LoggingConfig::default(),
            state_dir: resolve_state_dir(),
            source: None,
        }
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("vaultkeeper.json"),
        PathBuf::from("vaultkeeper.yaml"),
        PathBuf::from("vaultkeeper.yml"),
        PathBuf::from("vaultkeeper.toml"),
    ];

    for path in &candidates {
        if path.exists() {
            return Some(path.clone());
        }
    }

    // Check home directory
    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".vaultkeeper").join("config.json");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Resolve the state directory for persistent data.
fn resolve_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VAULTKEEPER_STATE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|h| h.join(".vaultkeeper"))
        .unwrap_or_else(|| PathBuf::from(".vaultkeeper"))
}

/// Load configuration from a file path.
fn load_config_file(path: &Path) -> Result<Config> {
    let value = read_config_file_snapshot(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("Invalid configuration in '{}'", path.display()))
}

fn parse_tick_secs(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("VAULTKEEPER_TICK_SECS must be a whole number of seconds, got '{raw}'"))
}
