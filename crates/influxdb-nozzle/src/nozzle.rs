// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::batch_buffer::{Batch, BatchBuffer};
use crate::config::NozzleConfig;
use crate::envelope::{Envelope, EventType};
use crate::line_protocol::LineProtocolEncoder;
use crate::topology::TopologyCache;

/// Entry point for envelopes: filters by event type, encodes and buffers.
pub struct Nozzle {
    captured_events: HashSet<EventType>,
    encoder: LineProtocolEncoder,
    buffer: BatchBuffer,
}

impl Nozzle {
    pub fn new(
        captured_events: HashSet<EventType>,
        encoder: LineProtocolEncoder,
        buffer: BatchBuffer,
    ) -> Self {
        Nozzle {
            captured_events,
            encoder,
            buffer,
        }
    }

    /// Wires the encoder and buffer from configuration. Full batches are delivered on the
    /// returned receiver, which is meant for [`crate::batch_sender::BatchSender::start`].
    pub fn from_config(
        config: &NozzleConfig,
        topology: Arc<TopologyCache>,
    ) -> (Self, mpsc::UnboundedReceiver<Batch>) {
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let encoder = LineProtocolEncoder::new(
            Some(config.foundation.clone()),
            config.tag_fields.iter().cloned(),
            topology,
        );
        let buffer = BatchBuffer::new(config.batch_size, batch_tx);
        (
            Nozzle::new(config.captured_events.clone(), encoder, buffer),
            batch_rx,
        )
    }

    /// Returns true if the envelope produced a line.
    pub fn write_envelope(&self, envelope: &Envelope) -> bool {
        if !self.captured_events.contains(&envelope.event_type) {
            trace!("Ignoring {} envelope from {}", envelope.event_type, envelope.origin);
            return false;
        }

        match self.encoder.encode(envelope) {
            Some(line) => {
                self.buffer.append(line);
                true
            }
            None => false,
        }
    }

    /// Hands off the partially filled batch, if any.
    pub fn flush_pending(&self) -> usize {
        self.buffer.flush_pending()
    }
}
