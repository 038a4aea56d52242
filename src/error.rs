use miette::Diagnostic;
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Validation error: {0}")]
    #[diagnostic(code(shifttrack::validation))]
    Validation(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(shifttrack::not_found))]
    NotFound(String),

    #[error("Could not acquire the shift store write lock within {0} seconds")]
    #[diagnostic(code(shifttrack::lock_timeout))]
    LockTimeout(u64),

    #[error("Repository error: {0}")]
    #[diagnostic(code(shifttrack::repository))]
    Repository(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(shifttrack::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(shifttrack::config))]
    Config(String),

    #[error(transparent)]
    #[diagnostic(code(shifttrack::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(shifttrack::serialization))]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Repository(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type AppResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create validation errors
pub fn validation_error(message: &str) -> Error {
    Error::Validation(message.to_string())
}

/// Helper to create not-found errors
pub fn not_found_error(message: &str) -> Error {
    Error::NotFound(message.to_string())
}

/// Helper to create repository errors
pub fn repository_error(message: &str) -> Error {
    Error::Repository(message.to_string())
}
