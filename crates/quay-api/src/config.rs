//! Server configuration.
//!
//! Everything is read from `QUAY_*` environment variables on startup.
//! Absent variables fall back to the defaults below; present-but-invalid
//! variables fail startup with a per-variable error.

use std::time::Duration;

use quay_core::observability::LogFormat;
use quay_runtime::CallbackConfig;
use quay_runtime::registration::RouterRegistration;

/// A configuration variable that is missing or unparseable.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Process configuration.
#[derive(Clone)]
pub struct Config {
    /// Listen address for the public API, `host:port`.
    pub address: String,
    /// Loopback listen address for the task-completion listener.
    pub task_handler_address: String,
    /// Timeout applied to outbound HTTP (completion callbacks).
    pub communication_timeout: Duration,
    /// Basic-auth username; auth is enforced when non-empty.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Whether CORS headers and preflight handling are enabled.
    pub cors_enabled: bool,
    /// Whether to advertise to the routing tier over NATS.
    pub register_with_router: bool,
    /// Host names routed to this process; required with router registration.
    pub domain_names: Vec<String>,
    /// NATS server addresses; required with router registration.
    pub nats_addresses: Vec<String>,
    /// NATS credentials.
    pub nats_username: Option<String>,
    /// NATS credentials.
    pub nats_password: Option<String>,
    /// TTL on the presence record.
    pub presence_ttl: Duration,
    /// Interval between presence refreshes and router advertisements.
    pub heartbeat_retry_interval: Duration,
    /// Per-subscription event buffer capacity.
    pub event_buffer_size: usize,
    /// Number of callback workers.
    pub callback_workers: usize,
    /// Callback queue capacity.
    pub callback_queue_size: usize,
    /// Callback delivery attempt budget.
    pub callback_max_attempts: u32,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8888".to_string(),
            task_handler_address: "127.0.0.1:1169".to_string(),
            communication_timeout: Duration::from_secs(10),
            username: None,
            password: None,
            cors_enabled: false,
            register_with_router: false,
            domain_names: Vec::new(),
            nats_addresses: Vec::new(),
            nats_username: None,
            nats_password: None,
            presence_ttl: Duration::from_secs(30),
            heartbeat_retry_interval: Duration::from_secs(5),
            event_buffer_size: quay_runtime::hub::DEFAULT_PENDING_EVENT_BUFFER,
            callback_workers: quay_runtime::worker::DEFAULT_POOL_SIZE,
            callback_queue_size: quay_runtime::worker::DEFAULT_QUEUE_CAPACITY,
            callback_max_attempts: quay_runtime::worker::DEFAULT_MAX_ATTEMPTS,
            log_format: LogFormat::Json,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("address", &self.address)
            .field("task_handler_address", &self.task_handler_address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("cors_enabled", &self.cors_enabled)
            .field("register_with_router", &self.register_with_router)
            .field("domain_names", &self.domain_names)
            .field("nats_addresses", &self.nats_addresses)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads configuration from `QUAY_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparseable, or if
    /// `QUAY_REGISTER_WITH_ROUTER` is set without the domain names and
    /// NATS addresses it requires.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(address) = env_string("QUAY_ADDRESS") {
            config.address = address;
        }
        if let Some(address) = env_string("QUAY_TASK_HANDLER_ADDRESS") {
            config.task_handler_address = address;
        }
        if let Some(secs) = env_u64("QUAY_COMMUNICATION_TIMEOUT_SECS")? {
            config.communication_timeout = Duration::from_secs(secs);
        }
        config.username = env_string("QUAY_USERNAME");
        config.password = env_string("QUAY_PASSWORD");
        if let Some(enabled) = env_bool("QUAY_CORS_ENABLED")? {
            config.cors_enabled = enabled;
        }
        if let Some(enabled) = env_bool("QUAY_REGISTER_WITH_ROUTER")? {
            config.register_with_router = enabled;
        }
        if let Some(names) = env_string("QUAY_DOMAIN_NAMES") {
            config.domain_names = parse_list(&names);
        }
        if let Some(addresses) = env_string("QUAY_NATS_ADDRESSES") {
            config.nats_addresses = parse_list(&addresses);
        }
        config.nats_username = env_string("QUAY_NATS_USERNAME");
        config.nats_password = env_string("QUAY_NATS_PASSWORD");
        if let Some(secs) = env_u64("QUAY_PRESENCE_TTL_SECS")? {
            config.presence_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("QUAY_HEARTBEAT_RETRY_INTERVAL_SECS")? {
            config.heartbeat_retry_interval = Duration::from_secs(secs);
        }
        if let Some(size) = env_usize("QUAY_EVENT_BUFFER_SIZE")? {
            config.event_buffer_size = size;
        }
        if let Some(workers) = env_usize("QUAY_CALLBACK_WORKERS")? {
            config.callback_workers = workers;
        }
        if let Some(size) = env_usize("QUAY_CALLBACK_QUEUE_SIZE")? {
            config.callback_queue_size = size;
        }
        if let Some(attempts) = env_u32("QUAY_CALLBACK_MAX_ATTEMPTS")? {
            config.callback_max_attempts = attempts;
        }
        if let Some(format) = env_string("QUAY_LOG_FORMAT") {
            config.log_format = match format.as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(ConfigError::new(format!(
                        "QUAY_LOG_FORMAT must be json or pretty (got {other})"
                    )));
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.register_with_router {
            if self.domain_names.is_empty() {
                return Err(ConfigError::new(
                    "QUAY_DOMAIN_NAMES is required when QUAY_REGISTER_WITH_ROUTER=true",
                ));
            }
            if self.nats_addresses.is_empty() {
                return Err(ConfigError::new(
                    "QUAY_NATS_ADDRESSES is required when QUAY_REGISTER_WITH_ROUTER=true",
                ));
            }
        }
        Ok(())
    }

    /// Whether requests must carry basic-auth credentials.
    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        self.username.as_deref().is_some_and(|name| !name.is_empty())
    }

    /// Worker-pool tuning derived from this configuration.
    #[must_use]
    pub fn callback_config(&self) -> CallbackConfig {
        CallbackConfig {
            workers: self.callback_workers,
            queue_capacity: self.callback_queue_size,
            max_attempts: self.callback_max_attempts,
            request_timeout: self.communication_timeout,
            ..CallbackConfig::default()
        }
    }

    /// Router advertisement derived from this configuration, when enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address has no parseable port.
    pub fn router_registration(&self) -> Result<Option<RouterRegistration>, ConfigError> {
        if !self.register_with_router {
            return Ok(None);
        }
        let port = self
            .address
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse::<u16>().ok())
            .ok_or_else(|| {
                ConfigError::new(format!("QUAY_ADDRESS has no port: {}", self.address))
            })?;
        let host = self
            .address
            .rsplit_once(':')
            .map_or("", |(host, _)| host)
            .to_string();
        Ok(Some(RouterRegistration {
            nats_addresses: self.nats_addresses.clone(),
            nats_username: self.nats_username.clone(),
            nats_password: self.nats_password.clone(),
            uris: self.domain_names.clone(),
            host,
            port,
            interval: self.heartbeat_retry_interval,
        }))
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    let Some(value) = env_string(name) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::new(format!("{name} must be a u64: {err}")))
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
    let Some(value) = env_string(name) else {
        return Ok(None);
    };
    value
        .parse::<u32>()
        .map(Some)
        .map_err(|err| ConfigError::new(format!("{name} must be a u32: {err}")))
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    let Some(value) = env_string(name) else {
        return Ok(None);
    };
    value
        .parse::<usize>()
        .map(Some)
        .map_err(|err| ConfigError::new(format!("{name} must be a usize: {err}")))
}

fn env_bool(name: &str) -> Result<Option<bool>, ConfigError> {
    let Some(value) = env_string(name) else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        other => Err(ConfigError::new(format!(
            "{name} must be a boolean (got {other})"
        ))),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.address, "0.0.0.0:8888");
        assert_eq!(config.task_handler_address, "127.0.0.1:1169");
        assert!(!config.auth_enabled());
        assert_eq!(config.event_buffer_size, 1024);
        assert_eq!(config.callback_workers, 20);
    }

    #[test]
    fn test_router_registration_requires_domains_and_bus() {
        let config = Config {
            register_with_router: true,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            register_with_router: true,
            domain_names: vec!["api.example.com".to_string()],
            nats_addresses: vec!["nats://127.0.0.1:4222".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        let registration = config.router_registration().unwrap().unwrap();
        assert_eq!(registration.port, 8888);
        assert_eq!(registration.uris, vec!["api.example.com"]);
    }

    #[test]
    fn test_auth_enabled_tracks_username() {
        let config = Config {
            username: Some("receptor".to_string()),
            ..Config::default()
        };
        assert!(config.auth_enabled());
    }

    #[test]
    fn test_list_parsing_trims_and_skips_empties() {
        assert_eq!(
            parse_list("a.example.com, b.example.com,,"),
            vec!["a.example.com", "b.example.com"]
        );
    }
}
