//! Configuration file parser for `appcast-sync.toml`.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::FeedMetadata;
use crate::util::{validate_http_url, UrlValidationError};

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "appcast-sync.toml";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid api_base_url: {0}")]
    ApiBaseUrl(#[from] UrlValidationError),

    #[error("Invalid repository '{0}': expected OWNER/NAME")]
    Repository(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the appcast file to maintain.
    pub feed_path: PathBuf,

    /// GitHub repository as `owner/name`.
    pub repository: String,

    /// Base URL of the GitHub REST API.
    pub api_base_url: String,

    /// User-Agent sent to the API (GitHub rejects requests without one).
    pub user_agent: String,

    /// Release fetch timeout in seconds. 0 = wait indefinitely.
    pub request_timeout_secs: u64,

    /// Channel title for newly created feeds.
    pub feed_title: String,

    /// Channel link for newly created feeds. Derived from `repository` when unset.
    pub feed_link: Option<String>,

    /// Channel description for newly created feeds.
    pub feed_description: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_path: PathBuf::from("appcast.xml"),
            repository: "cesar-carlos/backup_database".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            user_agent: concat!("appcast-sync/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
            feed_title: "Backup Database Updates".to_string(),
            feed_link: None,
            feed_description: "Backup Database updates".to_string(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "feed_path",
        "repository",
        "api_base_url",
        "user_agent",
        "request_timeout_secs",
        "feed_title",
        "feed_link",
        "feed_description",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {} // Size is within limits, proceed
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            repository = %config.repository,
            feed = %config.feed_path.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Checks values serde cannot: URL shape and repository form.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url(&self.api_base_url)?;
        validate_repository(&self.repository)
    }

    /// Channel metadata for a feed created from scratch.
    pub fn feed_metadata(&self) -> FeedMetadata {
        FeedMetadata {
            title: self.feed_title.clone(),
            link: self
                .feed_link
                .clone()
                .unwrap_or_else(|| format!("https://github.com/{}/releases", self.repository)),
            description: self.feed_description.clone(),
        }
    }
}

/// Accepts `owner/name` with two non-empty segments.
pub fn validate_repository(repository: &str) -> Result<(), ConfigError> {
    match repository.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(())
        }
        _ => Err(ConfigError::Repository(repository.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feed_path, PathBuf::from("appcast.xml"));
        assert_eq!(config.repository, "cesar-carlos/backup_database");
        assert_eq!(config.api_base_url, "https://api.github.com");
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.user_agent.starts_with("appcast-sync/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_and_whitespace_file_returns_default() {
        for content in ["", "   \n  \n  "] {
            let (_dir, path) = write_config(content);
            assert_eq!(Config::load(&path).unwrap(), Config::default());
        }
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("repository = \"acme/widget\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.repository, "acme/widget");
        assert_eq!(config.feed_path, PathBuf::from("appcast.xml")); // default
        assert_eq!(config.request_timeout_secs, 30); // default
    }

    #[test]
    fn test_full_config() {
        let content = r#"
feed_path = "site/appcast.xml"
repository = "acme/widget"
api_base_url = "https://github.example.com/api/v3"
user_agent = "widget-release"
request_timeout_secs = 0
feed_title = "Widget Updates"
feed_link = "https://widget.example.com"
feed_description = "New widgets"
"#;
        let (_dir, path) = write_config(content);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.feed_path, PathBuf::from("site/appcast.xml"));
        assert_eq!(config.api_base_url, "https://github.example.com/api/v3");
        assert_eq!(config.user_agent, "widget-release");
        assert_eq!(config.request_timeout_secs, 0);

        let meta = config.feed_metadata();
        assert_eq!(meta.title, "Widget Updates");
        assert_eq!(meta.link, "https://widget.example.com");
        assert_eq!(meta.description, "New widgets");
    }

    #[test]
    fn test_feed_link_derived_from_repository() {
        let config = Config {
            repository: "acme/widget".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.feed_metadata().link,
            "https://github.com/acme/widget/releases"
        );
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (_dir, path) = write_config("repository = \"a/b\"\ntotally_fake_key = 1\n");
        assert_eq!(Config::load(&path).unwrap().repository, "a/b");
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (_dir, path) = write_config("request_timeout_secs = \"soon\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_api_base_url_rejected() {
        let (_dir, path) = write_config("api_base_url = \"file:///tmp/releases.json\"\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ApiBaseUrl(_))
        ));
    }

    #[test]
    fn test_validate_repository() {
        assert!(validate_repository("owner/name").is_ok());
        for bad in ["", "owner", "/name", "owner/", "a/b/c"] {
            assert!(
                matches!(validate_repository(bad), Err(ConfigError::Repository(_))),
                "{bad} should be rejected"
            );
        }
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }
}
