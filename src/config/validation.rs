use super::Config;
use crate::rotation::RotationInterval;
use anyhow::Result;
use tracing::warn;

/// Validation errors for configuration.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn error(path: &str, message: &str) -> ConfigValidationError {
    ConfigValidationError {
        path: path.to_string(),
        message: message.to_string(),
    }
}

/// Validate a configuration object.
pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    if config.vault.master_key_env.trim().is_empty() {
        errors.push(error(
            "vault.masterKeyEnv",
            "Master key environment variable name is required",
        ));
    }

    match RotationInterval::parse(&config.rotation.default_interval) {
        RotationInterval::Unparsed(_) => errors.push(error(
            "rotation.defaultInterval",
            "Expected a cadence (daily, weekly, monthly, quarterly, yearly) or <N><d|w|M|y>",
        )),
        RotationInterval::Custom => {
            warn!("rotation.defaultInterval is 'custom'; new policies will use the 90 day fallback")
        }
        _ => {}
    }

    if config.rotation.versioning_enabled && config.rotation.max_versions_to_keep == 0 {
        errors.push(error(
            "rotation.maxVersionsToKeep",
            "Must be greater than 0 when versioning is enabled",
        ));
    }

    if config.scheduler.tick_interval_secs == 0 {
        errors.push(error("scheduler.tickIntervalSecs", "Must be greater than 0"));
    }

    if config.scheduler.max_concurrent_rotations == 0 {
        errors.push(error("scheduler.maxConcurrentRotations", "Must be greater than 0"));
    }

    if config.hooks.default_timeout_secs == 0 {
        errors.push(error("hooks.defaultTimeoutSecs", "Must be greater than 0"));
    }

    if config.hooks.max_concurrent == 0 {
        errors.push(error("hooks.maxConcurrent", "Must be greater than 0"));
    }

    if let Some(secret) = &config.hooks.signing_secret {
        if secret.len() < 16 {
            warn!("hooks.signingSecret is shorter than 16 characters");
        }
    }

    if config.notifications.timeout_secs == 0 {
        errors.push(error("notifications.timeoutSecs", "Must be greater than 0"));
    }

    if config.tasks.timeout_secs == 0 {
        errors.push(error("tasks.timeoutSecs", "Must be greater than 0"));
    }

    errors
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}
