use std::env;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Process-wide settings shared by the binaries.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub environment: Environment,
    pub node_name: String,
    pub log_level: String,
    pub database_url: Option<String>,
}

impl CoreConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::from_env_with_prefix("TRAFFICLIGHT_")?;
        if config.database_url.is_none() {
            config.database_url = read_optional("DATABASE_URL")?;
        }
        Ok(config)
    }

    /// Loads configuration from env vars prefixed with the provided value (e.g. `TRAFFICLIGHT_`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let environment = read_optional(&key("ENV"))?
            .map(|raw| Environment::parse(&raw))
            .unwrap_or_default();
        let node_name =
            read_optional(&key("NODE_NAME"))?.unwrap_or_else(|| "trafficlight".to_string());
        let log_level = read_optional(&key("LOG"))?.unwrap_or_else(|| "info".to_string());
        let database_url = read_optional(&key("DATABASE_URL"))?;

        Ok(Self {
            environment,
            node_name,
            log_level,
            database_url,
        })
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }

    /// Returns the Postgres URL if configured.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }
}

/// Reads an env var, treating blank values as absent.
pub fn read_optional(key: &str) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(ConfigError::InvalidEnvVar {
            key: key.to_string(),
            source: err,
        }),
    }
}

/// Parses an env var into `T`, falling back to `default` when unset or blank.
pub fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match read_optional(key)? {
        Some(value) => T::from_str(&value)
            .map_err(|err| ConfigError::Internal(format!("invalid value for {key}: {err}"))),
        None => Ok(default),
    }
}

/// Parses a boolean flag. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn parse_flag(key: &str, default: bool) -> Result<bool, ConfigError> {
    match read_optional(key)? {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::Internal(format!(
                "invalid boolean for {key}: {other}"
            ))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_environment() {
        let cfg = CoreConfig::from_env_with_prefix("TLCORE_TEST_UNSET_").expect("config should load");
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.node_name, "trafficlight");
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.database_url().is_none());
    }

    #[test]
    fn reads_prefixed_values() {
        env::set_var("TLCORE_TEST_A_ENV", "prod");
        env::set_var("TLCORE_TEST_A_DATABASE_URL", "postgres://example");
        let cfg = CoreConfig::from_env_with_prefix("TLCORE_TEST_A_").expect("config should load");
        assert!(cfg.is_production());
        assert_eq!(cfg.database_url(), Some("postgres://example"));
    }

    #[test]
    fn flags_accept_common_spellings() {
        env::set_var("TLCORE_TEST_FLAG_ON", "yes");
        env::set_var("TLCORE_TEST_FLAG_BAD", "maybe");
        assert!(parse_flag("TLCORE_TEST_FLAG_ON", false).unwrap());
        assert!(!parse_flag("TLCORE_TEST_FLAG_MISSING", false).unwrap());
        assert!(parse_flag("TLCORE_TEST_FLAG_BAD", false).is_err());
    }

    #[test]
    fn parse_env_rejects_garbage() {
        env::set_var("TLCORE_TEST_NUM", "12x");
        assert!(parse_env::<u64>("TLCORE_TEST_NUM", 1).is_err());
        assert_eq!(parse_env::<u64>("TLCORE_TEST_NUM_MISSING", 7).unwrap(), 7);
    }
}
