// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Envelope to InfluxDB line protocol encoding.
//!
//! Every captured envelope becomes at most one line of the form
//!
//! ```text
//! <origin>.<name>[,<tag>=<value>]* <field>=<value>[,<field>=<value>]* <timestamp>
//! ```
//!
//! Tags are never quoted, string fields are double-quoted and numeric fields are written as bare
//! decimals. Envelope metadata only becomes a tag when the operator allow-listed it, since every
//! distinct tag value creates a new series in the store.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::envelope::{
    ContainerMetric, CounterEvent, Envelope, EventType, HttpStartStop, ValueMetric,
};
use crate::topology::TopologyCache;
use crate::util::{escape_measurement, escape_string_field, escape_tag};

/// One encoded line, ready to be batched.
pub type LineMessage = String;

/// Allow-list entry enabling the envelope's free-form tag map
pub const TAGS_FIELD: &str = "tags";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Unsigned(u64),
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Unsigned(value) => write!(f, "{value}"),
            FieldValue::Str(value) => write!(f, "\"{}\"", escape_string_field(value)),
        }
    }
}

/// A measurement point before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: Vec<(&'static str, FieldValue)>,
    pub timestamp: i64,
}

impl Point {
    pub fn to_line(&self) -> LineMessage {
        self.to_string()
    }
}

impl fmt::Display for Point {
    /// Tags with an empty key or value have no line protocol representation and are left out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape_measurement(&self.measurement))?;
        for (key, value) in &self.tags {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            write!(f, ",{}={}", escape_tag(key), escape_tag(value))?;
        }

        for (i, (key, value)) in self.fields.iter().enumerate() {
            let separator = if i == 0 { ' ' } else { ',' };
            write!(f, "{separator}{key}={value}")?;
        }

        write!(f, " {}", self.timestamp)
    }
}

/// Collects fields in declaration order, skipping absent values.
#[derive(Default)]
struct Fields(Vec<(&'static str, FieldValue)>);

impl Fields {
    fn float(&mut self, key: &'static str, value: Option<f64>) -> &mut Self {
        // NaN and infinities have no line protocol representation
        if let Some(value) = value.filter(|v| v.is_finite()) {
            self.0.push((key, FieldValue::Float(value)));
        }
        self
    }

    fn integer(&mut self, key: &'static str, value: Option<impl Into<i64>>) -> &mut Self {
        if let Some(value) = value {
            self.0.push((key, FieldValue::Integer(value.into())));
        }
        self
    }

    fn unsigned(&mut self, key: &'static str, value: Option<u64>) -> &mut Self {
        if let Some(value) = value {
            self.0.push((key, FieldValue::Unsigned(value)));
        }
        self
    }

    fn string(&mut self, key: &'static str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.0.push((key, FieldValue::Str(value.to_string())));
        }
        self
    }

    fn finish(self) -> Vec<(&'static str, FieldValue)> {
        self.0
    }
}

pub struct LineProtocolEncoder {
    foundation: Option<String>,
    tag_fields: HashSet<String>,
    topology: Arc<TopologyCache>,
}

impl LineProtocolEncoder {
    pub fn new(
        foundation: Option<String>,
        tag_fields: impl IntoIterator<Item = String>,
        topology: Arc<TopologyCache>,
    ) -> Self {
        LineProtocolEncoder {
            foundation: foundation.filter(|f| !f.trim().is_empty()),
            tag_fields: tag_fields.into_iter().collect(),
            topology,
        }
    }

    /// Encodes one envelope. Returns `None` when the payload for the envelope's event type is
    /// missing or when nothing in it can be written as a field.
    pub fn encode(&self, envelope: &Envelope) -> Option<LineMessage> {
        self.encode_point(envelope).map(|point| point.to_line())
    }

    pub fn encode_point(&self, envelope: &Envelope) -> Option<Point> {
        let mut tags = self.envelope_tags(envelope);
        let (name, fields, application_id) = match envelope.event_type {
            EventType::ValueMetric => {
                let metric = envelope.value_metric.as_ref()?;
                if self.is_taggable("unit") && !metric.unit.is_empty() {
                    tags.insert("unit".to_string(), metric.unit.clone());
                }
                (metric.name.as_str(), value_metric_fields(metric), None)
            }
            EventType::CounterEvent => {
                let event = envelope.counter_event.as_ref()?;
                (event.name.as_str(), counter_event_fields(event), None)
            }
            EventType::ContainerMetric => {
                let metric = envelope.container_metric.as_ref()?;
                (
                    "ContainerMetric",
                    container_metric_fields(metric),
                    metric.application_id.as_deref(),
                )
            }
            EventType::HttpStartStop => {
                let event = envelope.http_start_stop.as_ref()?;
                (
                    "HttpStartStop",
                    http_start_stop_fields(event),
                    event.application_id.as_deref(),
                )
            }
            EventType::Other => return None,
        };

        tags.insert("eventType".to_string(), envelope.event_type.to_string());

        if let Some(application_id) = application_id.filter(|id| !id.is_empty()) {
            let identity = self.topology.lookup(application_id);
            if identity.is_known() {
                for (tag, value) in identity.tags() {
                    tags.insert(tag.to_string(), value.to_string());
                }
            }
        }

        if fields.is_empty() {
            debug!(
                "Dropping {} envelope from {} without any field values",
                envelope.event_type, envelope.origin
            );
            return None;
        }

        Some(Point {
            measurement: format!("{}.{}", envelope.origin, name),
            tags,
            fields,
            timestamp: envelope.timestamp,
        })
    }

    fn is_taggable(&self, field: &str) -> bool {
        self.tag_fields.contains(field)
    }

    fn envelope_tags(&self, envelope: &Envelope) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();

        if let Some(foundation) = &self.foundation {
            tags.insert("foundation".to_string(), foundation.clone());
        }

        if self.is_taggable(TAGS_FIELD) {
            for (key, value) in &envelope.tags {
                if !value.is_empty() {
                    tags.insert(key.clone(), value.clone());
                }
            }
        }

        let metadata = [
            ("ip", &envelope.ip),
            ("deployment", &envelope.deployment),
            ("job", &envelope.job),
            ("index", &envelope.index),
        ];
        for (field, value) in metadata {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                if self.is_taggable(field) {
                    tags.insert(field.to_string(), value.to_string());
                }
            }
        }

        tags
    }
}

fn value_metric_fields(metric: &ValueMetric) -> Vec<(&'static str, FieldValue)> {
    let mut fields = Fields::default();
    fields
        .float("value", Some(metric.value))
        .string("unit", Some(&metric.unit));
    fields.finish()
}

fn counter_event_fields(event: &CounterEvent) -> Vec<(&'static str, FieldValue)> {
    let mut fields = Fields::default();
    fields
        .unsigned("total", Some(event.total))
        .unsigned("delta", Some(event.delta));
    fields.finish()
}

fn container_metric_fields(metric: &ContainerMetric) -> Vec<(&'static str, FieldValue)> {
    let mut fields = Fields::default();
    fields
        .integer("instanceIndex", metric.instance_index)
        .float("cpuPercentage", metric.cpu_percentage)
        .unsigned("diskBytes", metric.disk_bytes)
        .unsigned("diskBytesQuota", metric.disk_bytes_quota)
        .unsigned("memoryBytes", metric.memory_bytes)
        .unsigned("memoryBytesQuota", metric.memory_bytes_quota);
    fields.finish()
}

fn http_start_stop_fields(event: &HttpStartStop) -> Vec<(&'static str, FieldValue)> {
    let peer_type = event.peer_type.map(|peer| peer.to_string());
    let forwarded = (!event.forwarded.is_empty()).then(|| event.forwarded.join(","));

    let mut fields = Fields::default();
    fields
        .integer("contentLength", event.content_length)
        .integer("instanceIndex", event.instance_index)
        .integer("startTimestamp", event.start_timestamp)
        .integer("stopTimestamp", event.stop_timestamp)
        .integer("statusCode", event.status_code)
        .string("instanceId", event.instance_id.as_deref())
        .string("method", event.method.as_deref())
        .string("peerType", peer_type.as_deref())
        .string("uri", event.uri.as_deref())
        .string("userAgent", event.user_agent.as_deref())
        .string("remoteAddress", event.remote_address.as_deref())
        .string("forwarded", forwarded.as_deref());
    fields.finish()
}
