//! Configuration file parser for ~/.config/gator/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use crate::api::DEFAULT_BASE_URL;
use crate::loader::{LoaderOptions, DEFAULT_PAGE_SIZE};
use crate::poller::{PollerConfig, DEFAULT_POLL_ITERATIONS};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api_base_url`.
pub const API_URL_ENV: &str = "GATOR_API_URL";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Client configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Gator API, including the `/api` prefix.
    pub api_base_url: String,

    /// Items requested per page.
    pub page_size: u32,

    /// Seconds between background refresh pulls.
    pub poll_interval_secs: u64,

    /// Pulls per background refresh run.
    pub poll_iterations: u32,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Pull fresh content once when a listing comes back empty.
    pub fallback_pull: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval_secs: 1,
            poll_iterations: DEFAULT_POLL_ITERATIONS,
            request_timeout_secs: 30,
            fallback_pull: true,
        }
    }
}

const KNOWN_KEYS: [&str; 6] = [
    "api_base_url",
    "page_size",
    "poll_interval_secs",
    "poll_iterations",
    "request_timeout_secs",
    "fallback_pull",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(api_base_url = %config.api_base_url, "Loaded configuration");
        Ok(config.sanitized())
    }

    /// Apply the environment and command-line overrides for the API URL.
    ///
    /// Precedence: `cli_url`, then `env_url`, then the file value.
    pub fn with_overrides(mut self, env_url: Option<String>, cli_url: Option<String>) -> Self {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        if let Some(url) = non_blank(cli_url).or_else(|| non_blank(env_url)) {
            self.api_base_url = url;
        }
        self
    }

    /// [`Config::with_overrides`] using the `GATOR_API_URL` variable.
    pub fn with_env_overrides(self, cli_url: Option<String>) -> Self {
        self.with_overrides(std::env::var(API_URL_ENV).ok(), cli_url)
    }

    /// Replace values that cannot work with their defaults.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.page_size == 0 {
            tracing::warn!("page_size must be at least 1, using default");
            self.page_size = defaults.page_size;
        }
        if self.poll_interval_secs == 0 {
            tracing::warn!("poll_interval_secs must be at least 1, using default");
            self.poll_interval_secs = defaults.poll_interval_secs;
        }
        if self.poll_iterations == 0 {
            tracing::warn!("poll_iterations must be at least 1, using default");
            self.poll_iterations = defaults.poll_iterations;
        }
        if self.request_timeout_secs == 0 {
            tracing::warn!("request_timeout_secs must be at least 1, using default");
            self.request_timeout_secs = defaults.request_timeout_secs;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            page_size: self.page_size,
            fallback_pull: self.fallback_pull,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            iterations: self.poll_iterations,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("gator_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:5005/api");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.poll_interval_secs, 1);
        assert_eq!(config.poll_iterations, 5);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.fallback_pull);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/gator_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "page_size = 25\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.poll_iterations, 5);
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
api_base_url = "https://gator.example.com/api"
page_size = 20
poll_interval_secs = 2
poll_iterations = 3
request_timeout_secs = 10
fallback_pull = false
"#;
        let path = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config,
            Config {
                api_base_url: "https://gator.example.com/api".into(),
                page_size: 20,
                poll_interval_secs: 2,
                poll_iterations: 3,
                request_timeout_secs: 10,
                fallback_pull: false,
            }
        );
        assert_eq!(config.poller_config().deadline(), Duration::from_secs(6));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(!config.loader_options().fallback_pull);
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::parse("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::parse("page_size = \"ten\"\n").is_err());
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::parse("page_size = 5\ntheme = \"dark\"\n").unwrap();
        assert_eq!(config.page_size, 5);
    }

    #[test]
    fn test_zero_values_replaced() {
        let config =
            Config::parse("page_size = 0\npoll_interval_secs = 0\npoll_iterations = 0\n").unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.poll_interval_secs, 1);
        assert_eq!(config.poll_iterations, 5);
    }

    #[test]
    fn test_override_precedence() {
        let file = Config::parse("api_base_url = \"http://file:1/api\"\n").unwrap();

        let env_only = file
            .clone()
            .with_overrides(Some("http://env:2/api".into()), None);
        assert_eq!(env_only.api_base_url, "http://env:2/api");

        let both = file.clone().with_overrides(
            Some("http://env:2/api".into()),
            Some("http://cli:3/api".into()),
        );
        assert_eq!(both.api_base_url, "http://cli:3/api");

        let blank = file.clone().with_overrides(Some("  ".into()), None);
        assert_eq!(blank.api_base_url, "http://file:1/api");
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }
}
