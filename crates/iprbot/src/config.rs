// Bot Configuration
//
// Environment-based configuration for the InterPro protein bot

use iprbot_wikibase::http::{
    ClientConfig, DEFAULT_API_URL, DEFAULT_SPARQL_URL, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_SOURCE_PATH: &str = "protein2ipr.csv.gz";
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
pub const DEFAULT_CLEANUP_DELAY_SECS: u64 = 600;

/// Connection, credential and file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// MediaWiki action API endpoint
    pub api_url: String,

    /// SPARQL endpoint of the query service
    pub sparql_url: String,

    /// Bot account name; needed only when writing
    pub username: Option<String>,

    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Source mapping file (semicolon separated, optionally gzipped)
    pub source_path: PathBuf,

    /// Directory holding the per-taxon cache files
    pub cache_dir: PathBuf,

    /// Rows per chunk when scanning the source file
    pub chunk_size: usize,

    /// Wait between the main pass and cleanup, for the query service to catch up
    pub cleanup_delay_secs: u64,

    pub http_timeout_secs: u64,

    pub user_agent: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            sparql_url: DEFAULT_SPARQL_URL.to_string(),
            username: None,
            password: None,
            source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
            cache_dir: PathBuf::from("."),
            chunk_size: DEFAULT_CHUNK_SIZE,
            cleanup_delay_secs: DEFAULT_CLEANUP_DELAY_SECS,
            http_timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl BotConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - WIKIBASE_API_URL
    /// - WIKIBASE_SPARQL_URL
    /// - WDUSER / WDPASS
    /// - IPRBOT_SOURCE_PATH
    /// - IPRBOT_CACHE_DIR
    /// - IPRBOT_CHUNK_SIZE
    /// - IPRBOT_CLEANUP_DELAY_SECS
    /// - IPRBOT_HTTP_TIMEOUT_SECS
    /// - IPRBOT_USER_AGENT
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: env::var("WIKIBASE_API_URL").unwrap_or(defaults.api_url),

            sparql_url: env::var("WIKIBASE_SPARQL_URL").unwrap_or(defaults.sparql_url),

            username: env::var("WDUSER").ok().filter(|s| !s.is_empty()),

            password: env::var("WDPASS").ok().filter(|s| !s.is_empty()),

            source_path: env::var("IPRBOT_SOURCE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.source_path),

            cache_dir: env::var("IPRBOT_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),

            chunk_size: env::var("IPRBOT_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.chunk_size),

            cleanup_delay_secs: env::var("IPRBOT_CLEANUP_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cleanup_delay_secs),

            http_timeout_secs: env::var("IPRBOT_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),

            user_agent: env::var("IPRBOT_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_url: self.api_url.clone(),
            sparql_url: self.sparql_url.clone(),
            user_agent: self.user_agent.clone(),
            timeout_secs: self.http_timeout_secs,
        }
    }

    /// Username and password, when both are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.api_url.is_empty() {
            return Err("API URL cannot be empty".to_string());
        }

        if self.sparql_url.is_empty() {
            return Err("SPARQL URL cannot be empty".to_string());
        }

        if self.chunk_size == 0 {
            return Err("Chunk size must be greater than 0".to_string());
        }

        if self.http_timeout_secs == 0 {
            return Err("HTTP timeout must be greater than 0".to_string());
        }

        if self.username.is_some() != self.password.is_some() {
            return Err("WDUSER and WDPASS must be set together".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 10] = [
        "WIKIBASE_API_URL",
        "WIKIBASE_SPARQL_URL",
        "WDUSER",
        "WDPASS",
        "IPRBOT_SOURCE_PATH",
        "IPRBOT_CACHE_DIR",
        "IPRBOT_CHUNK_SIZE",
        "IPRBOT_CLEANUP_DELAY_SECS",
        "IPRBOT_HTTP_TIMEOUT_SECS",
        "IPRBOT_USER_AGENT",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();

        assert_eq!(config.api_url, "https://www.wikidata.org/w/api.php");
        assert_eq!(config.source_path, PathBuf::from("protein2ipr.csv.gz"));
        assert_eq!(config.chunk_size, 100_000);
        assert_eq!(config.cleanup_delay_secs, 600);
        assert!(config.credentials().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("WIKIBASE_API_URL", "http://localhost:8181/w/api.php");
        env::set_var("WDUSER", "InterproBot");
        env::set_var("WDPASS", "secret");
        env::set_var("IPRBOT_CHUNK_SIZE", "5000");
        env::set_var("IPRBOT_CLEANUP_DELAY_SECS", "0");
        env::set_var("IPRBOT_CACHE_DIR", "/var/cache/iprbot");

        let config = BotConfig::from_env();
        clear_env();

        assert_eq!(config.api_url, "http://localhost:8181/w/api.php");
        assert_eq!(config.sparql_url, "https://query.wikidata.org/sparql");
        assert_eq!(config.credentials(), Some(("InterproBot", "secret")));
        assert_eq!(config.chunk_size, 5000);
        assert_eq!(config.cleanup_delay_secs, 0);
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/iprbot"));
        assert_eq!(config.client_config().api_url, config.api_url);
    }

    #[test]
    #[serial]
    fn test_unparseable_numbers_fall_back() {
        clear_env();
        env::set_var("IPRBOT_CHUNK_SIZE", "lots");

        let config = BotConfig::from_env();
        clear_env();

        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_validate() {
        let config = BotConfig {
            chunk_size: 0,
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BotConfig {
            username: Some("InterproBot".to_string()),
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BotConfig {
            http_timeout_secs: 0,
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
