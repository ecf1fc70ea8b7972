use std::env;

use crate::errors::{CascadeError, ConfigError};

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

/// Global configuration shared across the engine services.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub environment: Environment,
    pub node_name: String,
    pub rules_http_bind: Option<String>,
    pub engine_http_bind: Option<String>,
    pub worker_count: usize,
    pub action_timeout_secs: u64,
}

fn default_worker_count() -> usize {
    2
}

fn default_action_timeout_secs() -> u64 {
    10
}

impl CoreConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("CASCADE_")
    }

    /// Loads configuration from env vars prefixed with the provided value (e.g. `CASCADE_`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let environment = env::var(key("ENV"))
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        let node_name = env::var(key("NODE_NAME")).unwrap_or_else(|_| "cascade-node".to_string());
        let rules_http_bind = env::var(key("RULES_HTTP_BIND")).ok();
        let engine_http_bind = env::var(key("ENGINE_HTTP_BIND")).ok();

        let worker_count = match env::var(key("WORKERS")) {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidEnvVar {
                key: key("WORKERS"),
                message: format!("expected an integer, got {raw:?}"),
            })?,
            Err(_) => default_worker_count(),
        };

        let action_timeout_secs = match env::var(key("ACTION_TIMEOUT_SECS")) {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidEnvVar {
                key: key("ACTION_TIMEOUT_SECS"),
                message: format!("expected an integer, got {raw:?}"),
            })?,
            Err(_) => default_action_timeout_secs(),
        };

        Ok(Self {
            environment,
            node_name,
            rules_http_bind,
            engine_http_bind,
            worker_count,
            action_timeout_secs,
        })
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

/// Helper that loads config and converts to the canonical Cascade error type.
pub fn load_core_config() -> Result<CoreConfig, CascadeError> {
    Ok(CoreConfig::from_env()?)
}
