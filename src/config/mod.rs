pub mod schema;

pub use schema::PlatformConfig;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Config file name inside the home directory.
pub const CONFIG_FILE: &str = "agentmint.toml";

/// Overrides `inference_api_key` from the file when set and non-empty.
pub const API_KEY_ENV: &str = "AGENTMINT_INFERENCE_API_KEY";

/// Default home directory (~/.agentmint).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".agentmint"))
        .unwrap_or_else(|| PathBuf::from(".agentmint"))
}

/// Load config from the given path, or return defaults. Environment overrides apply either way.
pub fn load_config(path: &Path) -> Result<PlatformConfig> {
    let mut config = if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read agentmint config file")?;
        toml::from_str(&contents).context("Failed to parse agentmint config (TOML)")?
    } else {
        PlatformConfig::default()
    };

    apply_env_overrides(&mut config, std::env::var(API_KEY_ENV).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut PlatformConfig, api_key: Option<String>) {
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        config.inference_api_key = key;
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &PlatformConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = load_config(&dir.path().join(CONFIG_FILE)).unwrap();
        // The test environment may carry the override
        config.inference_api_key.clear();

        assert_eq!(config, PlatformConfig::default());
        assert_eq!(config.inference_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "inference_timeout_secs = 5\nlog_level = \"debug\"\n").unwrap();

        let config = load_config(&path).unwrap();

        assert_eq!(config.inference_timeout_secs, 5);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.db_path, PlatformConfig::default().db_path);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = PlatformConfig {
            db_path: "/var/lib/agentmint/platform.db".into(),
            inference_api_url: "http://localhost:8080".into(),
            ..PlatformConfig::default()
        };

        save_config(&config, &path).unwrap();
        let mut loaded = load_config(&path).unwrap();
        loaded.inference_api_key.clear();

        assert_eq!(loaded, config);
    }

    #[test]
    fn env_key_wins_unless_blank() {
        let mut config = PlatformConfig {
            inference_api_key: "from-file".into(),
            ..PlatformConfig::default()
        };

        apply_env_overrides(&mut config, Some("   ".into()));
        assert_eq!(config.inference_api_key, "from-file");

        apply_env_overrides(&mut config, Some("from-env".into()));
        assert_eq!(config.inference_api_key, "from-env");
    }

    #[test]
    fn tilde_paths_are_expanded() {
        let config = PlatformConfig::default();
        if let Some(home) = std::env::var_os("HOME") {
            assert!(config
                .resolved_db_path()
                .starts_with(&*home.to_string_lossy()));
        }
        assert_eq!(
            config.resolve_path("/absolute/platform.db"),
            "/absolute/platform.db"
        );
    }

    #[test]
    fn zero_timeout_is_raised_to_one_second() {
        let config = PlatformConfig {
            inference_timeout_secs: 0,
            ..PlatformConfig::default()
        };
        assert_eq!(config.inference_timeout(), Duration::from_secs(1));
    }
}
