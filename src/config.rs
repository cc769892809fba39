//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::live::LiveConfig;
use crate::query::DEFAULT_MAX_LINES;
use crate::transport::HttpTransportConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub datasource: DatasourceConfig,

    #[serde(default)]
    pub live: LiveConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Loki datasource configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatasourceConfig {
    #[serde(default = "default_url")]
    pub url: String,

    /// Upper bound on lines requested per query
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub basic_auth_user: Option<String>,

    #[serde(default)]
    pub basic_auth_password: Option<String>,
}

fn default_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_max_lines() -> usize {
    DEFAULT_MAX_LINES
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_lines: default_max_lines(),
            request_timeout_ms: default_request_timeout(),
            basic_auth_user: None,
            basic_auth_password: None,
        }
    }
}

impl DatasourceConfig {
    /// Configured line limit, with 0 meaning the default
    pub fn effective_max_lines(&self) -> usize {
        if self.max_lines == 0 {
            DEFAULT_MAX_LINES
        } else {
            self.max_lines
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            base_url: self.url.clone(),
            request_timeout_ms: self.request_timeout_ms,
            basic_auth_user: self.basic_auth_user.clone(),
            basic_auth_password: self.basic_auth_password.clone(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("loki-dispatch").join("config.toml")),
            Some(PathBuf::from("/etc/loki-dispatch/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Datasource overrides
        if let Some(url) = var("LOKI_DISPATCH_URL") {
            self.datasource.url = url;
        }
        if let Some(max_lines) = var("LOKI_DISPATCH_MAX_LINES") {
            if let Ok(n) = max_lines.parse() {
                self.datasource.max_lines = n;
            }
        }
        if let Some(timeout) = var("LOKI_DISPATCH_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.datasource.request_timeout_ms = ms;
            }
        }

        // Logging overrides
        if let Some(level) = var("LOKI_DISPATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOKI_DISPATCH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# loki-dispatch Configuration
#
# Environment variables override these settings:
# - LOKI_DISPATCH_URL
# - LOKI_DISPATCH_MAX_LINES
# - LOKI_DISPATCH_TIMEOUT_MS
# - LOKI_DISPATCH_LOG_LEVEL
# - LOKI_DISPATCH_LOG_FORMAT

[datasource]
# Loki base URL; live tailing uses the matching ws:// or wss:// URL
url = "http://localhost:3100"

# Maximum lines requested per query (0 = default of 1000)
max_lines = 1000

# HTTP request timeout (ms)
request_timeout_ms = 30000

# Optional basic auth
# basic_auth_user = "loki"
# basic_auth_password = ""

[live]
# Buffered batches per live connection before slow subscribers lag
channel_capacity = 256

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_template_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();

        assert_eq!(config.datasource.url, "http://localhost:3100");
        assert_eq!(config.datasource.max_lines, 1000);
        assert_eq!(config.datasource.request_timeout_ms, 30_000);
        assert_eq!(config.live.channel_capacity, 256);
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[datasource]\nurl = \"https://logs.example.com\"\nbasic_auth_user = \"admin\"\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.datasource.url, "https://logs.example.com");
        assert_eq!(config.datasource.basic_auth_user.as_deref(), Some("admin"));
        assert_eq!(config.datasource.max_lines, 1000);
        assert_eq!(config.live.channel_capacity, 256);
        assert!(config.logging.is_json());
    }

    #[test]
    fn test_load_errors() {
        let missing = Config::load(Path::new("/nonexistent/loki-dispatch.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[datasource\nurl = 3").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LOKI_DISPATCH_URL", "http://loki:3100"),
            ("LOKI_DISPATCH_MAX_LINES", "not-a-number"),
            ("LOKI_DISPATCH_TIMEOUT_MS", "5000"),
            ("LOKI_DISPATCH_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.datasource.url, "http://loki:3100");
        assert_eq!(config.datasource.max_lines, 1000);
        assert_eq!(config.datasource.request_timeout_ms, 5000);
        assert!(config.logging.is_json());
    }

    #[test]
    fn test_zero_max_lines_uses_default() {
        let config = Config::parse("[datasource]\nmax_lines = 0").unwrap();
        assert_eq!(config.datasource.effective_max_lines(), DEFAULT_MAX_LINES);
    }
}
