// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::line_protocol::LineMessage;

/// An ordered group of lines delivered in a single write.
pub type Batch = Vec<LineMessage>;

struct Pending {
    messages: Vec<LineMessage>,
    /// Appends left before the pending messages form a full batch
    remaining: usize,
}

/// Accumulates lines from any number of producers and hands off a batch every `batch_size`
/// appends.
///
/// The append that completes a batch swaps the pending messages for an empty collection and
/// resets the countdown while holding the lock, so every line ends up in exactly one batch. The
/// batch is then pushed onto the sender channel without waiting for its delivery.
pub struct BatchBuffer {
    batch_size: usize,
    pending: Mutex<Pending>,
    batch_tx: mpsc::UnboundedSender<Batch>,
}

impl BatchBuffer {
    pub fn new(batch_size: usize, batch_tx: mpsc::UnboundedSender<Batch>) -> Self {
        let batch_size = batch_size.max(1);
        BatchBuffer {
            batch_size,
            pending: Mutex::new(Pending {
                messages: Vec::with_capacity(batch_size),
                remaining: batch_size,
            }),
            batch_tx,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Adds a line. Returns true if this append completed and dispatched a batch.
    pub fn append(&self, message: LineMessage) -> bool {
        let full_batch = {
            #[allow(clippy::expect_used)]
            let mut pending = self.pending.lock().expect("lock poisoned");
            pending.messages.push(message);
            pending.remaining -= 1;

            if pending.remaining == 0 {
                pending.remaining = self.batch_size;
                Some(std::mem::replace(
                    &mut pending.messages,
                    Vec::with_capacity(self.batch_size),
                ))
            } else {
                None
            }
        };

        match full_batch {
            Some(batch) => {
                self.dispatch(batch);
                true
            }
            None => false,
        }
    }

    /// Dispatches whatever is pending as a short batch. Used when the stream ends so the tail of
    /// the input is not left behind. Returns the number of lines dispatched.
    pub fn flush_pending(&self) -> usize {
        let batch = {
            #[allow(clippy::expect_used)]
            let mut pending = self.pending.lock().expect("lock poisoned");
            pending.remaining = self.batch_size;
            std::mem::take(&mut pending.messages)
        };

        let len = batch.len();
        if len > 0 {
            self.dispatch(batch);
        }
        len
    }

    pub fn pending_len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let pending = self.pending.lock().expect("lock poisoned");
        pending.messages.len()
    }

    fn dispatch(&self, batch: Batch) {
        debug!("Dispatching batch of {} lines", batch.len());
        if let Err(e) = self.batch_tx.send(batch) {
            error!(
                "Batch sender stopped, dropping batch of {} lines",
                e.0.len()
            );
        }
    }
}
