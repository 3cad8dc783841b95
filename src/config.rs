use std::collections::HashMap;
use thiserror::Error;

/// Cooldown between bulk refreshes of one owner's positions.
pub const DEFAULT_REFRESH_COOLDOWN_MS: i64 = 60_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Base URL of the chain indexer the sources query.
    pub chain_query_url: String,
    /// Close-order poll loop interval.
    pub poll_interval_ms: u64,
    /// Timeout applied to each execution attempt (signer + broadcast).
    pub attempt_timeout_ms: u64,
    /// Fixed delay between execution attempts.
    pub retry_backoff_ms: i64,
    /// Attempts after which an order fails terminally.
    pub retry_ceiling: u32,
    /// Cooldown window for bulk refresh.
    pub refresh_cooldown_ms: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn parse_var<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    name: &str,
    default: &str,
    requirement: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(name)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(name.to_string(), requirement.to_string()))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_var(&env_map, "PORT", "8080", "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let chain_query_url = env_map
            .get("CHAIN_QUERY_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("CHAIN_QUERY_URL".to_string()))?;

        let poll_interval_ms =
            parse_var(&env_map, "POLL_INTERVAL_MS", "5000", "must be a valid u64")?;
        let attempt_timeout_ms =
            parse_var(&env_map, "ATTEMPT_TIMEOUT_MS", "15000", "must be a valid u64")?;
        let retry_backoff_ms =
            parse_var(&env_map, "RETRY_BACKOFF_MS", "30000", "must be a valid i64")?;
        let retry_ceiling = parse_var(&env_map, "RETRY_CEILING", "5", "must be a valid u32")?;
        if retry_ceiling == 0 {
            return Err(ConfigError::InvalidValue(
                "RETRY_CEILING".to_string(),
                "must be at least 1; unbounded retry is not supported".to_string(),
            ));
        }
        let refresh_cooldown_ms = parse_var(
            &env_map,
            "REFRESH_COOLDOWN_MS",
            &DEFAULT_REFRESH_COOLDOWN_MS.to_string(),
            "must be a valid i64",
        )?;

        Ok(Config {
            port,
            database_path,
            chain_query_url,
            poll_interval_ms,
            attempt_timeout_ms,
            retry_backoff_ms,
            retry_ceiling,
            refresh_cooldown_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/rangebook.db".to_string());
        map.insert(
            "CHAIN_QUERY_URL".to_string(),
            "http://localhost:8545".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.retry_ceiling, 5);
        assert_eq!(config.refresh_cooldown_ms, 60_000);
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            other => panic!("Expected MissingEnv error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_chain_query_url() {
        let mut env_map = setup_required_env();
        env_map.remove("CHAIN_QUERY_URL");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "CHAIN_QUERY_URL"),
            other => panic!("Expected MissingEnv error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            other => panic!("Expected InvalidValue error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_retry_ceiling_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("RETRY_CEILING".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "RETRY_CEILING"),
            other => panic!("Expected InvalidValue error, got {:?}", other),
        }
    }
}
