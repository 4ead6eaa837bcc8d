//! Configuration loading and management.
//!
//! Loads configuration from embedded config.toml with environment variable overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use url::Url;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub api: ApiConfig,
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub mailbox: MailboxConfig,
    pub console: ConsoleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL that relative request paths are joined to.
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

/// Where the credential pair is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Keychain,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keychain" => Ok(Self::Keychain),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("Unknown credential store backend: {}", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Zone that domain verification records point into.
    pub verification_zone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: String,
}

impl Config {
    /// Load configuration from embedded config.toml with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config: Config =
            toml::from_str(CONFIG_TOML).context("Failed to parse embedded config.toml")?;

        if let Ok(base_url) = env::var("MAILCONSOLE_API_URL") {
            config.api.base_url = base_url;
        }

        if let Ok(backend) = env::var("MAILCONSOLE_STORE") {
            config.store.backend = backend.parse()?;
        }

        if let Ok(timeout) = env::var("MAILCONSOLE_HTTP_TIMEOUT") {
            config.http.timeout_secs = timeout
                .parse()
                .context("MAILCONSOLE_HTTP_TIMEOUT must be a number of seconds")?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            config.logging.level = log_level;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate that required configuration is present.
    fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            anyhow::bail!(
                "API base URL not configured. Set MAILCONSOLE_API_URL environment variable \
                 or update config.toml"
            );
        }

        Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.api.base_url))?;

        if self.console.verification_zone.trim_matches('.').trim().is_empty() {
            anyhow::bail!("Domain verification zone must not be empty");
        }

        if self.http.timeout_secs == 0 {
            anyhow::bail!("HTTP timeout must be at least one second");
        }

        if self.store.backend == StoreBackend::Keychain && !cfg!(target_os = "macos") {
            anyhow::bail!("The keychain credential store is only available on macOS");
        }

        Ok(())
    }

    /// Total timeout applied to every HTTP request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Timeout for establishing the TCP/TLS connection.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http.connect_timeout_secs)
    }

    /// How long fetched mailbox listings stay fresh.
    pub fn mailbox_ttl(&self) -> Duration {
        Duration::from_secs(self.mailbox.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            app: AppConfig {
                name: "test".into(),
                version: "0.1.0".into(),
            },
            api: ApiConfig {
                base_url: "https://mail.example.com/api".into(),
            },
            http: HttpConfig {
                timeout_secs: 30,
                connect_timeout_secs: 10,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                file_name: "credentials.json".into(),
            },
            mailbox: MailboxConfig {
                cache_ttl_secs: 300,
            },
            console: ConsoleConfig {
                verification_zone: "code4code.dev".into(),
            },
            logging: LoggingConfig {
                level: "info".into(),
                log_dir: "mailconsole".into(),
            },
        }
    }

    #[test]
    fn test_config_parsing() {
        let result = toml::from_str::<Config>(CONFIG_TOML);
        assert!(result.is_ok(), "Config parsing failed: {:?}", result.err());

        let config = result.unwrap();
        assert_eq!(config.store.backend, StoreBackend::File);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = test_config();
        assert!(config.validate().is_ok());

        config.api.base_url = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.http.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.console.verification_zone = ".".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeouts() {
        let config = test_config();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.mailbox_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("file".parse::<StoreBackend>().unwrap(), StoreBackend::File);
        assert_eq!(" Memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }
}
