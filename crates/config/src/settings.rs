//! Main settings module

use agentcore_core::DeploymentMode;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Top-level application settings, loaded once at boot via [`load_settings`]
/// and optionally hot-reloaded by `agentcore-server`'s admin endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Single-instance vs distributed cache policy (§4.2.3). Fixed at boot;
    /// changing it requires a restart, never a hot reload.
    #[serde(default)]
    pub deployment_mode: DeploymentMode,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub memory_service: MemoryServiceConfig,

    #[serde(default)]
    pub agent_runtime: AgentRuntimeConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings, called once at load time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_persistence()?;
        self.validate_memory_service()?;
        self.validate_agent_runtime()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_connections".to_string(),
                message: "Max connections must be at least 1".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        let rate_limit = &server.rate_limit;
        if rate_limit.enabled {
            if rate_limit.requests_per_second == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "server.rate_limit.requests_per_second".to_string(),
                    message: "Must be at least 1 when rate limiting is enabled".to_string(),
                });
            }

            if rate_limit.burst_multiplier < 1.0 {
                return Err(ConfigError::InvalidValue {
                    field: "server.rate_limit.burst_multiplier".to_string(),
                    message: format!("Must be at least 1.0, got {}", rate_limit.burst_multiplier),
                });
            }
        }

        if self.environment.is_production() && server.auth.enabled && server.auth.api_keys.is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "server.auth.api_keys".to_string(),
                message: "At least one API key must be set when auth is enabled in production"
                    .to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured; \
                 this may block legitimate requests"
            );
        }

        Ok(())
    }

    fn validate_persistence(&self) -> Result<(), ConfigError> {
        if self.persistence.scylla_hosts.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "persistence.scylla_hosts".to_string(),
                message: "At least one host is required".to_string(),
            });
        }

        if self.persistence.keyspace.is_empty() {
            return Err(ConfigError::MissingField("persistence.keyspace".to_string()));
        }

        Ok(())
    }

    fn validate_memory_service(&self) -> Result<(), ConfigError> {
        if self.memory_service.enabled && self.memory_service.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "memory_service.base_url".to_string(),
                message: "Base URL is required when the memory service is enabled".to_string(),
            });
        }

        if self.memory_service.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "memory_service.timeout_ms".to_string(),
                message: "Timeout must be at least 1ms".to_string(),
            });
        }

        Ok(())
    }

    /// An empty `base_url` is legal (it is how the runtime binding is
    /// disabled, per §7's "runtime missing" scenario); only the timeout
    /// needs a sanity check.
    fn validate_agent_runtime(&self) -> Result<(), ConfigError> {
        if self.agent_runtime.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent_runtime.timeout_ms".to_string(),
                message: "Timeout must be at least 1ms".to_string(),
            });
        }

        if self.environment.is_production() && self.agent_runtime.base_url.is_empty() {
            tracing::warn!(
                "no agent_runtime.base_url configured in production; every query will fail \
                 with RUNTIME_UNAVAILABLE"
            );
        }

        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// `X-API-Key` authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Accepted API keys. Compared via `agentcore-hashing::equal`, never `==`.
    #[serde(default)]
    pub api_keys: Vec<String>,

    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/ready".to_string(),
        "/metrics".to_string(),
    ]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_keys: Vec::new(),
            public_paths: default_public_paths(),
        }
    }
}

/// Per-tenant request rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: f32,
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_burst_multiplier() -> f32 {
    2.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: default_requests_per_second(),
            burst_multiplier: default_burst_multiplier(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_connections() -> usize {
    1000
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// ScyllaDB durable store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}

fn default_scylla_keyspace() -> String {
    "agentcore".to_string()
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Redis cache store / distributed lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_session_cache_ttl")]
    pub session_cache_ttl_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_session_cache_ttl() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            session_cache_ttl_secs: default_session_cache_ttl(),
        }
    }
}

/// External memory service client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryServiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_memory_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_memory_timeout_ms() -> u64 {
    5_000
}

impl Default for MemoryServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            timeout_ms: default_memory_timeout_ms(),
        }
    }
}

/// External agent runtime binding configuration. An empty `base_url`
/// disables the binding: every query then fails with `RUNTIME_UNAVAILABLE`
/// rather than being degraded to a mock response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRuntimeConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_agent_runtime_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_agent_runtime_timeout_ms() -> u64 {
    120_000
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: default_agent_runtime_timeout_ms(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
            metrics_port: default_metrics_port(),
        }
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`AGENTCORE__` prefix, `__` separated)
/// 2. `config/{env}.yaml` (if env specified)
/// 3. `config/default.yaml`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("AGENTCORE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
    }

    #[test]
    fn production_auth_requires_api_key() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.server.auth.enabled = true;
        settings.server.auth.api_keys = Vec::new();
        assert!(settings.validate_server().is_err());

        settings.server.auth.api_keys = vec!["secret-key".to_string()];
        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn rate_limit_validation() {
        let mut settings = Settings::default();
        settings.server.rate_limit.enabled = true;

        settings.server.rate_limit.requests_per_second = 0;
        assert!(settings.validate_server().is_err());
        settings.server.rate_limit.requests_per_second = 10;

        settings.server.rate_limit.burst_multiplier = 0.5;
        assert!(settings.validate_server().is_err());
        settings.server.rate_limit.burst_multiplier = 2.0;

        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn empty_scylla_hosts_rejected() {
        let mut settings = Settings::default();
        settings.persistence.scylla_hosts = Vec::new();
        assert!(settings.validate_persistence().is_err());
    }

    #[test]
    fn memory_service_requires_base_url_when_enabled() {
        let mut settings = Settings::default();
        settings.memory_service.enabled = true;
        settings.memory_service.base_url = String::new();
        assert!(settings.validate_memory_service().is_err());

        settings.memory_service.base_url = "http://localhost:7000".to_string();
        assert!(settings.validate_memory_service().is_ok());
    }

    #[test]
    fn agent_runtime_allows_empty_base_url_but_not_zero_timeout() {
        let mut settings = Settings::default();
        assert!(settings.validate_agent_runtime().is_ok());

        settings.agent_runtime.timeout_ms = 0;
        assert!(settings.validate_agent_runtime().is_err());
    }
}
