//! Layered settings for agentcore, loaded with the `config` crate and
//! validated once at boot (§1.3).

pub mod settings;

pub use settings::{
    load_settings, AgentRuntimeConfig, AuthConfig, CacheConfig, MemoryServiceConfig,
    ObservabilityConfig, PersistenceConfig, RateLimitConfig, RuntimeEnvironment, ServerConfig,
    Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
