// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reads newline-delimited JSON envelopes and feeds them to the [`Nozzle`].

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::envelope::Envelope;
use crate::nozzle::Nozzle;

/// Counters for one run of the reader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    pub envelopes: u64,
    pub encoded: u64,
    pub skipped: u64,
}

pub struct FirehoseReader<R> {
    reader: R,
    nozzle: Arc<Nozzle>,
    cancel_token: CancellationToken,
}

impl<R> FirehoseReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, nozzle: Arc<Nozzle>, cancel_token: CancellationToken) -> Self {
        FirehoseReader {
            reader,
            nozzle,
            cancel_token,
        }
    }

    /// Main loop. Runs until the input ends, a read fails or the token is cancelled, then hands
    /// off the partially filled batch.
    pub async fn spin(mut self) -> ReaderStats {
        let mut stats = ReaderStats::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    debug!("Firehose reader cancelled");
                    break;
                }
                read = self.reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!("Firehose stream ended");
                    break;
                }
                Ok(_) => self.consume_line(&buf, &mut stats),
                Err(e) => {
                    error!("Failed to read from firehose stream: {}", e);
                    break;
                }
            }
        }

        let flushed = self.nozzle.flush_pending();
        info!(
            "Firehose reader stopped: {} envelopes, {} encoded, {} skipped, {} lines flushed",
            stats.envelopes, stats.encoded, stats.skipped, flushed
        );
        stats
    }

    fn consume_line(&self, raw: &[u8], stats: &mut ReaderStats) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!("Skipping envelope that is not valid UTF-8: {}", e);
                stats.skipped += 1;
                return;
            }
        };
        if line.is_empty() {
            return;
        }
        trace!("Received envelope: {}", line);

        match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => {
                stats.envelopes += 1;
                if self.nozzle.write_envelope(&envelope) {
                    stats.encoded += 1;
                }
            }
            Err(e) => {
                warn!("Skipping undecodable envelope: {}", e);
                stats.skipped += 1;
            }
        }
    }
}
