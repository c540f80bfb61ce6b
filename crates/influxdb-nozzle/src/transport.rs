// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of batch bodies to the metrics store.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tracing::debug;

use crate::errors::{ConfigError, ShippingError};

/// A single write of a batch body. Retrying is the caller's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn write(&self, body: &str) -> Result<(), ShippingError>;
}

/// Writes line protocol to the InfluxDB 1.x `/write` endpoint.
#[derive(Debug, Clone)]
pub struct InfluxDbTransport {
    client: reqwest::Client,
    write_url: Url,
}

impl InfluxDbTransport {
    pub fn new(db_host: &str, db_name: &str, client: reqwest::Client) -> Result<Self, ConfigError> {
        let write_url = write_url(db_host, db_name)?;
        Ok(InfluxDbTransport { client, write_url })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

fn write_url(db_host: &str, db_name: &str) -> Result<Url, ConfigError> {
    let base = format!("{}/write", db_host.trim().trim_end_matches('/'));
    let mut url = Url::parse(&base).map_err(|_| ConfigError::InvalidValue {
        key: "INFLUXDB_NOZZLE_DB_HOST",
        value: db_host.to_string(),
    })?;
    url.query_pairs_mut().append_pair("db", db_name);
    Ok(url)
}

#[async_trait]
impl Transport for InfluxDbTransport {
    async fn write(&self, body: &str) -> Result<(), ShippingError> {
        let response = self
            .client
            .post(self.write_url.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ShippingError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Write accepted with status {}", status);
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ShippingError::Destination(status, body))
    }
}
