use anyhow::{bail, Context, Result};
use std::path::Path;

/// Maximum size for a config file (1 MB).
pub const MAX_CONFIG_FILE_BYTES: u64 = 1024 * 1024;

/// Read a configuration file into a JSON value.
///
/// Symlinks at the final path component and oversized files are rejected.
/// The format follows the extension: YAML, TOML, otherwise JSON5 (which
/// accepts plain JSON).
pub fn read_config_file_snapshot(path: &Path) -> Result<serde_json::Value> {
    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("Cannot stat config file '{}'", path.display()))?;

    if metadata.file_type().is_symlink() {
        bail!(
            "Config file '{}' is a symlink, refusing to follow it",
            path.display()
        );
    }

    if metadata.len() > MAX_CONFIG_FILE_BYTES {
        bail!(
            "Config file '{}' is {} bytes, exceeds limit of {} bytes",
            path.display(),
            metadata.len(),
            MAX_CONFIG_FILE_BYTES,
        );
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let value = match ext {
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in '{}'", path.display()))?,
        "toml" => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in '{}'", path.display()))?,
        _ => json5::from_str(&content)
            .with_context(|| format!("Invalid JSON in '{}'", path.display()))?,
    };
    Ok(value)
}

/// Serialize `value` in the format implied by `path`'s extension.
pub fn render_config_file<T: serde::Serialize>(path: &Path, value: &T) -> Result<String> {
    let rendered = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::to_string(value)?,
        Some("toml") => toml::to_string_pretty(value)?,
        _ => serde_json::to_string_pretty(value)?,
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_yaml_toml_and_json5() {
        let dir = TempDir::new().unwrap();

        let yaml = dir.path().join("c.yaml");
        std::fs::write(&yaml, "scheduler:\n  tickIntervalSecs: 5\n").unwrap();
        assert_eq!(read_config_file_snapshot(&yaml).unwrap()["scheduler"]["tickIntervalSecs"], 5);

        let toml = dir.path().join("c.toml");
        std::fs::write(&toml, "[scheduler]\ntickIntervalSecs = 7\n").unwrap();
        assert_eq!(read_config_file_snapshot(&toml).unwrap()["scheduler"]["tickIntervalSecs"], 7);

        let json = dir.path().join("c.json");
        std::fs::write(&json, "{ // comment\n scheduler: { tickIntervalSecs: 9, }, }").unwrap();
        assert_eq!(read_config_file_snapshot(&json).unwrap()["scheduler"]["tickIntervalSecs"], 9);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlinks() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real.json");
        std::fs::write(&real, "{}").unwrap();
        let link = dir.path().join("link.json");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let err = read_config_file_snapshot(&link).unwrap_err();
        assert!(err.to_string().contains("symlink"));
    }

    #[test]
    fn rejects_oversized_files() {
        let dir = TempDir::new().unwrap();
        let big = dir.path().join("big.json");
        std::fs::write(&big, vec![b' '; (MAX_CONFIG_FILE_BYTES + 1) as usize]).unwrap();
        assert!(read_config_file_snapshot(&big).is_err());
    }
}
