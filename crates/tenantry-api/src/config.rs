//! Server configuration read from the environment.

use std::net::SocketAddr;

use tenantry_core::snapshot::SnapshotPolicy;

use crate::error::AppError;

/// Runtime settings for the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Upper bound of the connection pool.
    pub db_max_connections: u32,
    /// Snapshot an aggregate once this many events accumulated; 0 disables.
    pub snapshot_every_n_events: u64,
}

impl Config {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or a numeric
    /// setting does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("DATABASE_URL environment variable must be set".into())
            })?;

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            snapshot_every_n_events: parse_or(&lookup, "SNAPSHOT_EVERY_N_EVENTS", 1)?,
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a valid address.
    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// The snapshot policy applied to command handlers.
    #[must_use]
    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        SnapshotPolicy::every(self.snapshot_every_n_events)
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/tenantry")]).unwrap();

        assert_eq!(config.database_url, "postgres://localhost/tenantry");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.snapshot_policy(), SnapshotPolicy::Always);
    }

    #[test]
    fn test_missing_database_url_is_config_error() {
        let result = config_from(&[("PORT", "8080")]);

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn test_overrides_are_parsed() {
        // Arrange
        let vars = [
            ("DATABASE_URL", "postgres://db/tenantry"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_LEVEL", "debug"),
            ("DB_MAX_CONNECTIONS", "25"),
            ("SNAPSHOT_EVERY_N_EVENTS", "0"),
        ];

        // Act
        let config = config_from(&vars).unwrap();

        // Assert
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.db_max_connections, 25);
        assert_eq!(config.snapshot_policy(), SnapshotPolicy::Never);
        assert_eq!(
            config.listen_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let result = config_from(&[("DATABASE_URL", "postgres://db"), ("PORT", "eighty")]);

        match result {
            Err(AppError::Config(msg)) => assert!(msg.starts_with("PORT is invalid")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_every_n_above_one_is_threshold_policy() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db"),
            ("SNAPSHOT_EVERY_N_EVENTS", "50"),
        ])
        .unwrap();

        assert_eq!(config.snapshot_policy(), SnapshotPolicy::EveryNEvents(50));
    }
}
