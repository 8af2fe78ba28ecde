use thiserror::Error;

/// Result type used across the TrafficLight core crate.
pub type Result<T> = std::result::Result<T, TrafficLightError>;

/// Canonical error representation shared by all crates.
#[derive(Debug, Error)]
pub enum TrafficLightError {
    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("general error: {0}")]
    GeneralError(String),
}

impl From<sqlx::Error> for TrafficLightError {
    fn from(err: sqlx::Error) -> Self {
        TrafficLightError::DatabaseError(err.to_string())
    }
}

/// Dedicated configuration error used by the configuration modules.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable missing: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {key}: {source}")]
    InvalidEnvVar {
        key: String,
        #[source]
        source: std::env::VarError,
    },

    #[error("invalid configuration: {0}")]
    Internal(String),
}
