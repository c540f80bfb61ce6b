// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while loading or validating the nozzle configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Errors raised by a topology listing call. These never leave the topology cache.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("Topology request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Topology request returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Invalid topology endpoint: {0}")]
    Endpoint(String),
}

/// Errors raised by a single write attempt against the metrics store.
#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Destination returned {0}: {1}")]
    Destination(StatusCode, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("batch size must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: batch size must be greater than 0"
        );

        let error = ConfigError::InvalidValue {
            key: "INFLUXDB_NOZZLE_BATCH_SIZE",
            value: "lots".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value 'lots' for INFLUXDB_NOZZLE_BATCH_SIZE"
        );
    }

    #[test]
    fn test_shipping_error_display() {
        let error = ShippingError::Destination(StatusCode::BAD_GATEWAY, "upstream".to_string());
        assert_eq!(error.to_string(), "Destination returned 502 Bad Gateway: upstream");
    }
}
