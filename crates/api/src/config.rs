//! Application configuration loaded from environment variables.

use domain::DEFAULT_PAGE_SIZE;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `PRODUCT_PAGE_SIZE`: products per listing (default: `20`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub product_page_size: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.database_max_connections),
            product_page_size: lookup("PRODUCT_PAGE_SIZE")
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.product_page_size),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 5,
            product_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.product_page_size, 20);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_every_variable() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8081"),
            ("RUST_LOG", "debug"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("PRODUCT_PAGE_SIZE", "50"),
        ]);

        assert_eq!(config.addr(), "127.0.0.1:8081");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/shop")
        );
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.product_page_size, 50);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("LOG_FORMAT", "xml"),
            ("DATABASE_URL", ""),
            ("PRODUCT_PAGE_SIZE", "0"),
        ]);

        assert_eq!(config.port, 3000);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.product_page_size, 20);
    }
}
