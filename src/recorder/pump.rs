//! Chunk delivery
//!
//! Moves encoder output into storage strictly in emission order. Each chunk
//! is awaited before the next one is taken, so at most one write is ever in
//! flight.

use super::config::ChunkFailurePolicy;
use super::sink::SessionStorage;
use super::state::RecordingEvent;
use crate::encoder::EncoderEvent;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Outcome of a finished pump
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub chunks_written: u64,
    pub bytes_written: u64,
    pub chunks_failed: u64,
    /// Writing stopped after too many consecutive failures
    pub abandoned: bool,
    /// Encoder reported Stopped (as opposed to its channel just closing)
    pub encoder_stopped: bool,
    pub encoder_errors: Vec<String>,
}

async fn write_with_retries(
    storage: &SessionStorage,
    mut bytes: Vec<u8>,
    max_retries: u32,
    index: u64,
) -> bool {
    for attempt in 0..=max_retries {
        let payload = if attempt < max_retries {
            bytes.clone()
        } else {
            std::mem::take(&mut bytes)
        };
        match storage.add_chunk(payload).await {
            Ok(()) => return true,
            Err(e) => tracing::warn!(
                "Chunk {} write failed (attempt {}/{}): {}",
                index,
                attempt + 1,
                max_retries + 1,
                e
            ),
        }
    }
    false
}

/// Drain encoder events into storage until the encoder stops
pub async fn run_chunk_pump(
    mut events: mpsc::Receiver<EncoderEvent>,
    storage: Arc<SessionStorage>,
    policy: ChunkFailurePolicy,
    notify: broadcast::Sender<RecordingEvent>,
) -> PumpReport {
    let mut report = PumpReport::default();
    let mut index: u64 = 0;
    let mut consecutive_failures: u32 = 0;

    while let Some(event) = events.recv().await {
        match event {
            EncoderEvent::Chunk(bytes) => {
                index += 1;
                if bytes.is_empty() {
                    continue;
                }
                if report.abandoned {
                    report.chunks_failed += 1;
                    continue;
                }

                let len = bytes.len();
                if write_with_retries(&storage, bytes, policy.max_retries, index).await {
                    consecutive_failures = 0;
                    report.chunks_written += 1;
                    report.bytes_written += len as u64;
                    tracing::debug!("Chunk {} stored ({} bytes)", index, len);
                    let _ = notify.send(RecordingEvent::ChunkWritten { index, bytes: len });
                } else {
                    consecutive_failures += 1;
                    report.chunks_failed += 1;
                    if policy.abandon_after.is_some_and(|limit| consecutive_failures >= limit) {
                        tracing::error!(
                            "Giving up on storage after {} consecutive chunk failures",
                            consecutive_failures
                        );
                        report.abandoned = true;
                    }
                }
            }
            EncoderEvent::Error(message) => {
                tracing::error!("Encoder error: {}", message);
                report.encoder_errors.push(message);
            }
            EncoderEvent::Stopped => {
                report.encoder_stopped = true;
                break;
            }
        }
    }

    tracing::info!(
        "Chunk pump finished: {} written ({} bytes), {} failed",
        report.chunks_written,
        report.bytes_written,
        report.chunks_failed
    );
    report
}
