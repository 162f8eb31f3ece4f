use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::dispatch::TimeoutPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub dispatch_timeout: Duration,
    pub timeout_policy: TimeoutPolicy,
    pub host_tick: Duration,
    pub sse_keepalive: Duration,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("{0} must be a positive integer")]
    InvalidDuration(&'static str),
    #[error("DISPATCH_TIMEOUT_POLICY must be one of: abandon, cancel")]
    InvalidTimeoutPolicy,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = non_empty("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = non_empty("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let duration = |key: &'static str, default: u64, unit: fn(u64) -> Duration| {
            non_empty(key)
                .map(|value| {
                    value
                        .parse::<u64>()
                        .ok()
                        .filter(|parsed| *parsed > 0)
                        .ok_or(ConfigError::InvalidDuration(key))
                })
                .transpose()
                .map(|parsed| unit(parsed.unwrap_or(default)))
        };

        let timeout_policy = non_empty("DISPATCH_TIMEOUT_POLICY")
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "abandon" => Ok(TimeoutPolicy::Abandon),
                "cancel" => Ok(TimeoutPolicy::Cancel),
                _ => Err(ConfigError::InvalidTimeoutPolicy),
            })
            .transpose()?
            .unwrap_or_default();

        let config = Self {
            bind_addr,
            bind_port,
            dispatch_timeout: duration("DISPATCH_TIMEOUT_SECS", 30, Duration::from_secs)?,
            timeout_policy,
            host_tick: duration("HOST_TICK_MS", 16, Duration::from_millis)?,
            sse_keepalive: duration("SSE_KEEPALIVE_SECS", 15, Duration::from_secs)?,
            shutdown_timeout: duration("SHUTDOWN_TIMEOUT_SECS", 5, Duration::from_secs)?,
        };

        config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}
