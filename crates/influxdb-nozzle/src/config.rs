// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::backoff::{Backoff, BackoffPolicy};
use crate::envelope::EventType;
use crate::errors::ConfigError;
use crate::topology::DEFAULT_REFRESH_INTERVAL;
use crate::util::parse_list;

const ENV_PREFIX: &str = "INFLUXDB_NOZZLE_";

/// Configuration for the nozzle
#[derive(Debug, Clone, PartialEq)]
pub struct NozzleConfig {
    /// Cloud Controller API, as a URL or a bare host. Topology enrichment is off when unset.
    pub api_host: Option<String>,
    /// Bearer token for the Cloud Controller
    pub access_token: Option<String>,
    pub skip_ssl_validation: bool,
    /// Label identifying the platform deployment, added to every point
    pub foundation: String,
    pub db_host: String,
    pub db_name: String,
    pub batch_size: usize,
    pub backoff_policy: BackoffPolicy,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
    /// Envelope fields copied onto points as tags
    pub tag_fields: HashSet<String>,
    pub captured_events: HashSet<EventType>,
    pub topology_refresh_interval: Duration,
    pub http_timeout: Duration,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    pub https_proxy: Option<String>,
}

impl Default for NozzleConfig {
    fn default() -> Self {
        Self {
            api_host: None,
            access_token: None,
            skip_ssl_validation: false,
            foundation: String::new(),
            db_host: "http://localhost:8086".to_string(),
            db_name: "metrics".to_string(),
            batch_size: 100,
            backoff_policy: BackoffPolicy::Exponential,
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(30_000),
            max_retries: 10,
            tag_fields: HashSet::new(),
            captured_events: EventType::ALL.into_iter().collect(),
            topology_refresh_interval: DEFAULT_REFRESH_INTERVAL,
            http_timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
            https_proxy: None,
        }
    }
}

impl NozzleConfig {
    /// Create configuration from `INFLUXDB_NOZZLE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Keys are full variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            api_host: var("API_HOST"),
            access_token: var("ACCESS_TOKEN"),
            skip_ssl_validation: var("SKIP_SSL_VALIDATION")
                .map(|val| val.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.skip_ssl_validation),
            foundation: var("FOUNDATION").unwrap_or(defaults.foundation),
            db_host: var("DB_HOST").unwrap_or(defaults.db_host),
            db_name: var("DB_NAME").unwrap_or(defaults.db_name),
            batch_size: parse_or(
                "INFLUXDB_NOZZLE_BATCH_SIZE",
                var("BATCH_SIZE"),
                defaults.batch_size,
            )?,
            backoff_policy: parse_or(
                "INFLUXDB_NOZZLE_BACKOFF_POLICY",
                var("BACKOFF_POLICY"),
                defaults.backoff_policy,
            )?,
            min_backoff: parse_or("INFLUXDB_NOZZLE_MIN_BACKOFF", var("MIN_BACKOFF"), 100)
                .map(Duration::from_millis)?,
            max_backoff: parse_or("INFLUXDB_NOZZLE_MAX_BACKOFF", var("MAX_BACKOFF"), 30_000)
                .map(Duration::from_millis)?,
            max_retries: parse_or(
                "INFLUXDB_NOZZLE_MAX_RETRIES",
                var("MAX_RETRIES"),
                defaults.max_retries,
            )?,
            tag_fields: var("TAG_FIELDS")
                .map(|raw| parse_list(&raw).into_iter().collect())
                .unwrap_or(defaults.tag_fields),
            captured_events: var("CAPTURED_EVENTS")
                .map(|raw| parse_captured_events(&raw))
                .unwrap_or(defaults.captured_events),
            topology_refresh_interval: parse_or(
                "INFLUXDB_NOZZLE_TOPOLOGY_REFRESH_SECS",
                var("TOPOLOGY_REFRESH_SECS"),
                DEFAULT_REFRESH_INTERVAL.as_secs(),
            )
            .map(Duration::from_secs)?,
            http_timeout: parse_or(
                "INFLUXDB_NOZZLE_HTTP_TIMEOUT_SECS",
                var("HTTP_TIMEOUT_SECS"),
                30,
            )
            .map(Duration::from_secs)?,
            log_level: var("LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
            https_proxy: var("HTTPS_PROXY").or_else(|| {
                lookup("HTTPS_PROXY").filter(|value| !value.trim().is_empty())
            }),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch size must be greater than 0".to_string(),
            ));
        }

        if self.min_backoff > self.max_backoff {
            return Err(ConfigError::Invalid(format!(
                "minimum backoff ({}ms) is greater than maximum backoff ({}ms)",
                self.min_backoff.as_millis(),
                self.max_backoff.as_millis()
            )));
        }

        if self.db_host.trim().is_empty() {
            return Err(ConfigError::Invalid("database host cannot be empty".to_string()));
        }
        if self.db_name.trim().is_empty() {
            return Err(ConfigError::Invalid("database name cannot be empty".to_string()));
        }

        if self.api_host.is_some() && self.access_token.is_none() {
            return Err(ConfigError::Invalid(
                "an access token is required when a Cloud Controller API host is set".to_string(),
            ));
        }

        if self.topology_refresh_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "topology refresh interval must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_policy, self.min_backoff, self.max_backoff)
    }
}

fn parse_or<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

/// Parses the captured event list. Unknown names are logged and skipped.
pub fn parse_captured_events(raw: &str) -> HashSet<EventType> {
    parse_list(raw)
        .into_iter()
        .filter_map(|name| match name.parse::<EventType>() {
            Ok(event_type) => Some(event_type),
            Err(e) => {
                warn!("Ignoring captured event: {}", e);
                None
            }
        })
        .collect()
}
