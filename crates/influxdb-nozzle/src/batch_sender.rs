// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::backoff::Backoff;
use crate::batch_buffer::Batch;
use crate::transport::Transport;

/// Reported once for a batch whose every attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExhausted {
    /// Total attempts made, including the first one
    pub attempts: u32,
    pub batch_size: usize,
}

/// Invoked when a batch is given up on. The batch itself is dropped afterwards.
pub type RecoveryCallback = Arc<dyn Fn(RetryExhausted) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { attempts: u32 },
    Exhausted { attempts: u32 },
}

pub struct BatchSenderConfig {
    pub transport: Arc<dyn Transport>,
    pub backoff: Backoff,
    pub max_retries: u32,
    pub recovery: Option<RecoveryCallback>,
}

/// Delivers batches through a [`Transport`], retrying failed writes with backoff.
#[derive(Clone)]
pub struct BatchSender {
    transport: Arc<dyn Transport>,
    backoff: Backoff,
    max_retries: u32,
    recovery: RecoveryCallback,
}

fn log_exhausted(exhausted: RetryExhausted) {
    error!(
        "Dropping batch of {} lines after {} failed attempts",
        exhausted.batch_size, exhausted.attempts
    );
}

impl BatchSender {
    pub fn new(config: BatchSenderConfig) -> Self {
        BatchSender {
            transport: config.transport,
            backoff: config.backoff,
            max_retries: config.max_retries,
            recovery: config.recovery.unwrap_or_else(|| Arc::new(log_exhausted)),
        }
    }

    /// Sends one batch as a single newline-joined body.
    ///
    /// A failed write is retried after the backoff delay for that attempt, up to `max_retries`
    /// retries. When the last attempt fails the recovery callback is called exactly once.
    pub async fn send(&self, batch: Batch) -> SendOutcome {
        let body = batch.join("\n");
        let mut attempt: u32 = 0;

        loop {
            let time = Instant::now();
            let result = self.transport.write(&body).await;
            let elapsed = time.elapsed();

            match result {
                Ok(()) => {
                    debug!(
                        "Delivered batch of {} lines in {}ms after {} attempt(s)",
                        batch.len(),
                        elapsed.as_millis(),
                        attempt + 1
                    );
                    return SendOutcome::Delivered {
                        attempts: attempt + 1,
                    };
                }
                Err(e) if attempt < self.max_retries => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        "Write attempt {} failed: {}, retrying in {}ms",
                        attempt + 1,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let attempts = attempt + 1;
                    warn!("Write attempt {} failed: {}, giving up", attempts, e);
                    (self.recovery)(RetryExhausted {
                        attempts,
                        batch_size: batch.len(),
                    });
                    return SendOutcome::Exhausted { attempts };
                }
            }
        }
    }

    /// Receives batches until the channel closes, sending each one on its own task so a slow
    /// retry never holds up the next batch. Returns once every spawned send has finished.
    pub async fn start(self, mut rx: mpsc::UnboundedReceiver<Batch>) {
        let tracker = TaskTracker::new();
        while let Some(batch) = rx.recv().await {
            let sender = self.clone();
            tracker.spawn(async move {
                sender.send(batch).await;
            });
        }
        tracker.close();
        debug!("Batch channel closed, waiting for {} sends", tracker.len());
        tracker.wait().await;
    }
}
