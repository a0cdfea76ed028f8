//! Configuration loading for the linecheck daemon
//!
//! The daemon reads one [`StaticConfig`] TOML file at startup. A missing file
//! is created with every default filled in, so an operator always has a
//! complete file to edit.

use linecheck_core::{LineCheckError, Result, StaticConfig};
use std::path::Path;
use tokio::fs;
use tracing::info;

/// Load and validate the config at `path`, creating it with defaults if missing.
pub async fn load(path: &Path) -> Result<StaticConfig> {
    info!("Loading configuration from: {}", path.display());

    let config = if path.exists() {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| LineCheckError::Config(format!("Failed to read config file: {}", e)))?;
        StaticConfig::from_toml(&content)
            .map_err(|e| LineCheckError::Config(format!("Failed to parse config file: {}", e)))?
    } else {
        info!(
            "Config not found at {}. Creating with defaults.",
            path.display()
        );
        write_defaults(path).await?
    };

    config.validate()?;
    Ok(config)
}

async fn write_defaults(path: &Path) -> Result<StaticConfig> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            LineCheckError::Config(format!(
                "Failed to create config directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let config = StaticConfig::default();
    let toml_str = config
        .to_toml()
        .map_err(|e| LineCheckError::Config(format!("Failed to serialize config: {}", e)))?;
    fs::write(path, &toml_str)
        .await
        .map_err(|e| LineCheckError::Config(format!("Failed to write config file: {}", e)))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = load(&path).await.unwrap();
        assert_eq!(config.run.timeout_ticks, 90);
        assert!(path.exists());

        let written = fs::read_to_string(&path).await.unwrap();
        assert!(written.contains("[thresholds]"));
        // the written file loads back
        assert!(load(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[thresholds]\nsata = 350\n").await.unwrap();

        let config = load(&path).await.unwrap();
        assert_eq!(config.thresholds.sata, 350);
        assert_eq!(config.thresholds.nvme, 1000);
        assert_eq!(config.probe.retry_count, 5);
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        fs::write(&path, "[run]\ntimeout_ticks = 0\n").await.unwrap();
        assert!(matches!(load(&path).await, Err(LineCheckError::Config(_))));

        fs::write(&path, "[run]\npark_refresh_ms = 0\n").await.unwrap();
        let err = load(&path).await.unwrap_err();
        assert!(err.to_string().contains("run.park_refresh_ms must be positive"));

        fs::write(&path, "[run\n").await.unwrap();
        let err = load(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
