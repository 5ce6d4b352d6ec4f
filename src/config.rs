//! Configuration management for the ebook scraper.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Application name used for config directory.
const APP_NAME: &str = "ebook-scraper";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Browser user agents rotated across requests.
const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crawl behavior settings.
    pub crawl: CrawlConfig,

    /// Request transport settings.
    pub transport: TransportConfig,

    /// Output settings.
    pub output: OutputConfig,
}

/// Crawl behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Maximum requests in flight per matching host.
    pub parallelism: usize,

    /// Host glob the parallelism ceiling applies to.
    pub domain_glob: String,

    /// Per-request timeout in seconds.
    pub request_timeout_sec: u64,

    /// Serve repeated GET requests from the on-disk cache.
    pub use_cache: bool,

    /// Directory holding cached responses.
    pub cache_dir: PathBuf,

    /// User agents rotated across requests.
    pub user_agents: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            parallelism: 5,
            domain_glob: "*".to_string(),
            request_timeout_sec: 60,
            use_cache: true,
            cache_dir: PathBuf::from(".cache"),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Which transport backend performs requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process HTTP client.
    #[default]
    Default,

    /// External `curl` subprocess.
    Curl,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(TransportKind::Default),
            "curl" => Ok(TransportKind::Curl),
            other => Err(ConfigError::InvalidValue {
                key: "transport.backend".to_string(),
                message: format!("must be one of default or curl, got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Default => f.write_str("default"),
            TransportKind::Curl => f.write_str("curl"),
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Backend used for every request.
    pub backend: TransportKind,

    /// Explicit path to the curl binary.
    /// If not set, `curl` is looked up on `PATH`.
    pub curl_path: Option<PathBuf>,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the finished ebook is written to.
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawl.parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                key: "crawl.parallelism".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.crawl.domain_glob.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "crawl.domain_glob".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.crawl.request_timeout_sec == 0 {
            return Err(ConfigError::InvalidValue {
                key: "crawl.request_timeout_sec".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.crawl.parallelism, 5);
        assert_eq!(config.crawl.domain_glob, "*");
        assert_eq!(config.crawl.cache_dir, PathBuf::from(".cache"));
        assert_eq!(config.transport.backend, TransportKind::Default);
        assert!(!config.crawl.user_agents.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.transport.backend = TransportKind::Curl;
        config.crawl.parallelism = 2;
        let file = NamedTempFile::new().unwrap();

        config.save_to(file.path()).unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert_eq!(loaded.transport.backend, TransportKind::Curl);
        assert_eq!(loaded.crawl.parallelism, 2);
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.crawl.parallelism, 5);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[transport]\nbackend = \"curl\"\n").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.transport.backend, TransportKind::Curl);
        assert_eq!(config.crawl.request_timeout_sec, 60);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.crawl.parallelism = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.crawl.request_timeout_sec = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("curl".parse::<TransportKind>().unwrap(), TransportKind::Curl);
        assert_eq!(
            "Default".parse::<TransportKind>().unwrap(),
            TransportKind::Default
        );
        assert!("wget".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::Curl.to_string(), "curl");
    }
}
