// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants;
use crate::errors::ConfigError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Construction-time configuration for a [`crate::Tracker`].
///
/// Values marked runtime-tunable can also be changed later through the
/// tracker's setters.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Atom collection endpoint, runtime-tunable
    pub endpoint: String,
    /// Default credential for streams tracked without one, runtime-tunable
    pub auth_key: String,
    /// Number of dispatch workers
    pub batch_worker_count: usize,
    /// Capacity of the dispatch queue
    pub batch_pool_size: usize,
    /// Maximum number of records held in the backlog
    pub backlog_size: usize,
    /// How long `track_with_wait` waits for backlog space
    pub backlog_wait_timeout: Duration,
    /// Periodic flush interval, runtime-tunable
    pub flush_interval: Duration,
    /// Ceiling for a single backoff sleep, runtime-tunable
    pub retry_max_time: Duration,
    /// Attempts per delivery pass, runtime-tunable
    pub retry_max_count: u32,
    /// Backoff base
    pub retry_backoff_base: Duration,
    /// Records per batch, runtime-tunable
    pub batch_size: usize,
    /// Payload bytes per batch, runtime-tunable
    pub batch_bytes_size: usize,
    /// Timeout for every transport call
    pub request_timeout: Duration,
    /// Upper bound on the drain phase of `stop`
    pub shutdown_timeout: Duration,
    /// How often `stop` checks whether the pipeline drained
    pub drain_poll_interval: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Emit per-attempt detail logs
    pub is_debug: bool,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: constants::DEFAULT_ENDPOINT.to_string(),
            auth_key: String::new(),
            batch_worker_count: constants::DEFAULT_BATCH_WORKER_COUNT,
            batch_pool_size: constants::DEFAULT_BATCH_POOL_SIZE,
            backlog_size: constants::DEFAULT_BACKLOG_SIZE,
            backlog_wait_timeout: constants::DEFAULT_BACKLOG_WAIT_TIMEOUT,
            flush_interval: constants::DEFAULT_FLUSH_INTERVAL,
            retry_max_time: constants::DEFAULT_RETRY_MAX_TIME,
            retry_max_count: constants::DEFAULT_RETRY_MAX_COUNT,
            retry_backoff_base: constants::DEFAULT_RETRY_BACKOFF_BASE,
            batch_size: constants::DEFAULT_BATCH_SIZE,
            batch_bytes_size: constants::DEFAULT_BATCH_BYTES_SIZE,
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            shutdown_timeout: constants::DEFAULT_SHUTDOWN_TIMEOUT,
            drain_poll_interval: constants::DEFAULT_DRAIN_POLL_INTERVAL,
            https_proxy: None,
            is_debug: false,
            log_level: "info".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|val| val.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn millis_env(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|val| val.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl TrackerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let endpoint = env::var("ATOM_ENDPOINT").unwrap_or(defaults.endpoint);
        let auth_key = env::var("ATOM_AUTH_KEY").unwrap_or_default();
        let request_timeout = env::var("ATOM_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let https_proxy = env::var("ATOM_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        let is_debug = env::var("ATOM_DEBUG")
            .map(|val| matches!(val.to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);
        let log_level = env::var("ATOM_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            endpoint,
            auth_key,
            batch_worker_count: parse_env("ATOM_BATCH_WORKER_COUNT", defaults.batch_worker_count),
            batch_pool_size: parse_env("ATOM_BATCH_POOL_SIZE", defaults.batch_pool_size),
            backlog_size: parse_env("ATOM_BACKLOG_SIZE", defaults.backlog_size),
            backlog_wait_timeout: millis_env(
                "ATOM_BACKLOG_WAIT_TIMEOUT_MS",
                defaults.backlog_wait_timeout,
            ),
            flush_interval: millis_env("ATOM_FLUSH_INTERVAL_MS", defaults.flush_interval),
            retry_max_time: millis_env("ATOM_RETRY_MAX_TIME_MS", defaults.retry_max_time),
            retry_max_count: parse_env("ATOM_RETRY_MAX_COUNT", defaults.retry_max_count),
            retry_backoff_base: millis_env(
                "ATOM_RETRY_BACKOFF_BASE_MS",
                defaults.retry_backoff_base,
            ),
            batch_size: parse_env("ATOM_BATCH_SIZE", defaults.batch_size),
            batch_bytes_size: parse_env("ATOM_BATCH_BYTES_SIZE", defaults.batch_bytes_size),
            request_timeout,
            shutdown_timeout: millis_env("ATOM_SHUTDOWN_TIMEOUT_MS", defaults.shutdown_timeout),
            drain_poll_interval: defaults.drain_poll_interval,
            https_proxy,
            is_debug,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("batch_worker_count", self.batch_worker_count),
            ("batch_pool_size", self.batch_pool_size),
            ("backlog_size", self.backlog_size),
            ("batch_size", self.batch_size),
            ("batch_bytes_size", self.batch_bytes_size),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        if self.retry_max_count == 0 {
            return Err(ConfigError::Zero("retry_max_count"));
        }

        let durations = [
            ("flush_interval", self.flush_interval),
            ("request_timeout", self.request_timeout),
            ("drain_poll_interval", self.drain_poll_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::LogLevel(self.log_level.clone()));
        }

        Ok(())
    }
}
