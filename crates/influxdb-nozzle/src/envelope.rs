// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Firehose envelope model.
//!
//! An [`Envelope`] carries the fields common to every firehose event plus at most one typed
//! payload. The payload matching `event_type` may be missing, in which case the envelope produces
//! no measurement.

use std::collections::HashMap;
use std::str::FromStr;

use derive_more::Display;
use serde::Deserialize;

/// Firehose event types. Only the first four are encoded; every other type the platform emits
/// (log messages, errors, ...) decodes as `Other` and is never captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Deserialize)]
pub enum EventType {
    ValueMetric,
    CounterEvent,
    ContainerMetric,
    HttpStartStop,
    #[serde(other)]
    Other,
}

impl EventType {
    /// Every encodable type
    pub const ALL: [EventType; 4] = [
        EventType::ContainerMetric,
        EventType::CounterEvent,
        EventType::HttpStartStop,
        EventType::ValueMetric,
    ];
}

impl FromStr for EventType {
    type Err = String;

    /// Accepts both the type name (`ContainerMetric`) and the upper snake case form used by
    /// the platform's own tooling (`CONTAINER_METRIC`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.trim().chars().filter(|c| *c != '_').collect();
        match normalized.to_ascii_lowercase().as_str() {
            "valuemetric" => Ok(EventType::ValueMetric),
            "counterevent" => Ok(EventType::CounterEvent),
            "containermetric" => Ok(EventType::ContainerMetric),
            "httpstartstop" => Ok(EventType::HttpStartStop),
            _ => Err(format!("unknown event type '{}'", s.trim())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub origin: String,
    pub event_type: EventType,
    /// Nanoseconds since the epoch
    pub timestamp: i64,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub value_metric: Option<ValueMetric>,
    #[serde(default)]
    pub counter_event: Option<CounterEvent>,
    #[serde(default)]
    pub container_metric: Option<ContainerMetric>,
    #[serde(default)]
    pub http_start_stop: Option<HttpStartStop>,
}

impl Envelope {
    /// Creates an envelope without common metadata or payload. Mostly useful for building test
    /// fixtures with struct update syntax.
    pub fn new(origin: impl Into<String>, event_type: EventType, timestamp: i64) -> Self {
        Envelope {
            origin: origin.into(),
            event_type,
            timestamp,
            deployment: None,
            job: None,
            index: None,
            ip: None,
            tags: HashMap::new(),
            value_metric: None,
            counter_event: None,
            container_metric: None,
            http_start_stop: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueMetric {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterEvent {
    pub name: String,
    pub delta: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerMetric {
    pub application_id: Option<String>,
    pub instance_index: Option<i32>,
    pub cpu_percentage: Option<f64>,
    pub disk_bytes: Option<u64>,
    pub disk_bytes_quota: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub memory_bytes_quota: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize)]
pub enum PeerType {
    Client,
    Server,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpStartStop {
    pub start_timestamp: Option<i64>,
    pub stop_timestamp: Option<i64>,
    pub peer_type: Option<PeerType>,
    pub method: Option<String>,
    pub uri: Option<String>,
    pub remote_address: Option<String>,
    pub user_agent: Option<String>,
    pub status_code: Option<i32>,
    pub content_length: Option<i64>,
    pub application_id: Option<String>,
    pub instance_index: Option<i32>,
    pub instance_id: Option<String>,
    pub forwarded: Vec<String>,
}
