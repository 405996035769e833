//! Configuration management for the CRM client.
//!
//! Loads configuration from ${CRM_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding `api_url`.
pub const API_URL_ENV: &str = "CRM_API_URL";

/// Returns the default config template with comments.
///
/// This is embedded from `default_config.toml` at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// New comments/sections from the template are always present, while the
/// user's customized values are preserved.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;

    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Recursively merges items from source table into target table.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for CRM configuration and data directories.
    //!
    //! `CRM_HOME` resolution order:
    //! 1. `CRM_HOME` environment variable (if set)
    //! 2. ~/.config/crm (default)
    //! 3. ./.crm when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the CRM home directory.
    pub fn crm_home() -> PathBuf {
        if let Ok(home) = std::env::var("CRM_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".crm"),
            |h| h.join(".config").join("crm"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        crm_home().join("config.toml")
    }

    /// Returns the path to the persisted session file.
    pub fn session_path() -> PathBuf {
        crm_home().join("session.json")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `CRM_LOG` is unset.
    pub level: String,
    /// Log file name, relative to `CRM_HOME`.
    pub file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: "crm.log".to_string(),
        }
    }
}

impl LogConfig {
    /// Absolute path of the log file.
    pub fn file_path(&self) -> PathBuf {
        paths::crm_home().join(&self.file)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the CRM REST API
    pub api_url: String,
    /// Per-request timeout in seconds (0 disables)
    pub request_timeout_secs: u32,
    /// Share one in-flight refresh between concurrent 401s
    pub dedupe_refresh: bool,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    pub const DEFAULT_API_URL: &str = "http://localhost:4000/api";
    const DEFAULT_REQUEST_TIMEOUT_SECS: u32 = 30;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist. `CRM_API_URL` wins over the file.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        } else {
            Config::default()
        };

        if let Ok(url) = std::env::var(API_URL_ENV)
            && !url.trim().is_empty()
        {
            config.api_url = url.trim().to_string();
        }

        Ok(config)
    }

    /// Returns the API base URL without a trailing slash.
    pub fn effective_api_url(&self) -> &str {
        let trimmed = self.api_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            Self::DEFAULT_API_URL
        } else {
            trimmed
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.request_timeout_secs)))
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Saves only the `api_url` field to a specific config file path.
    ///
    /// Creates the file with default template if it doesn't exist.
    /// If file exists, merges user values into the latest template.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the file cannot be written.
    pub fn save_api_url_to(path: &Path, api_url: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let parsed = url::Url::parse(api_url.trim())
            .with_context(|| format!("Invalid API URL: {api_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("API URL must use http or https, got '{}'", parsed.scheme());
        }

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["api_url"] = value(parsed.as_str().trim_end_matches('/'));

        Self::write_config(path, &doc.to_string())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: Self::DEFAULT_API_URL.to_string(),
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            dedupe_refresh: true,
            log: LogConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.dedupe_refresh);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "dedupe_refresh = false\n[log]\nlevel = \"debug\"\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert!(!config.dedupe_refresh);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.file, "crm.log");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_default_template_matches_rust_defaults() {
        let from_template: Config = toml::from_str(default_config_template()).unwrap();
        let defaults = Config::default();

        assert_eq!(from_template.api_url, defaults.api_url);
        assert_eq!(
            from_template.request_timeout_secs,
            defaults.request_timeout_secs
        );
        assert_eq!(from_template.dedupe_refresh, defaults.dedupe_refresh);
        assert_eq!(from_template.log, defaults.log);
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("api_url = \"http://localhost:4000/api\""));
        assert!(contents.contains("[log]"));
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "").unwrap();

        assert!(Config::init(&config_path).is_err());
    }

    #[test]
    fn test_effective_api_url_strips_trailing_slash() {
        let config = Config {
            api_url: "https://crm.example.com/api/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.effective_api_url(), "https://crm.example.com/api");

        let blank = Config {
            api_url: "   ".to_string(),
            ..Default::default()
        };
        assert_eq!(blank.effective_api_url(), Config::DEFAULT_API_URL);
    }

    #[test]
    fn test_request_timeout_zero_disables() {
        let config = Config {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_save_api_url_preserves_user_values_and_comments() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "request_timeout_secs = 5\n").unwrap();

        Config::save_api_url_to(&config_path, "https://crm.example.com/api/").unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("# Base URL of the CRM REST API"));

        let config: Config = toml::from_str(&contents).unwrap();
        assert_eq!(config.api_url, "https://crm.example.com/api");
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_save_api_url_rejects_non_http() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        assert!(Config::save_api_url_to(&config_path, "ftp://crm.example.com").is_err());
        assert!(Config::save_api_url_to(&config_path, "not a url").is_err());
        assert!(!config_path.exists());
    }
}
