//! Persister
//!
//! The single consumer on the match channel. Every record received gets one
//! logical write to the store, retried a bounded number of times on transient
//! failure; a record that still cannot be written is dropped with an error
//! log. The loop ends only when the channel is closed and drained.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::RetryPolicy;
use crate::filter::MatchRecord;
use crate::store::{InsertOutcome, MatchStore};

/// Per-run persistence counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    /// Rows written
    pub written: u64,
    /// Records skipped because their hash was already persisted
    pub duplicates: u64,
    /// Records dropped after exhausting insert retries
    pub failed: u64,
}

/// Drains the match channel into the store.
pub struct Persister {
    store: Arc<MatchStore>,
    retry: RetryPolicy,
}

impl Persister {
    /// Create a new persister over the given store.
    pub fn new(store: Arc<MatchStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Consume records until the channel closes, then report the counters.
    pub async fn run(self, mut records: mpsc::Receiver<MatchRecord>) -> PersistSummary {
        let mut summary = PersistSummary::default();

        while let Some(record) = records.recv().await {
            debug!(tx_hash = %record.tx_hash_hex(), "received match record");
            match self.insert_with_retry(&record).await {
                Ok(InsertOutcome::Inserted) => {
                    summary.written += 1;
                    info!(
                        tx_hash = %record.tx_hash_hex(),
                        height = record.block_height,
                        sender = %record.sender_hex(),
                        "persisted mint call"
                    );
                }
                Ok(InsertOutcome::Duplicate) => {
                    summary.duplicates += 1;
                    debug!(tx_hash = %record.tx_hash_hex(), "already persisted, skipping");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        tx_hash = %record.tx_hash_hex(),
                        height = record.block_height,
                        error = %e,
                        "dropping match record after failed insert"
                    );
                }
            }
        }

        summary
    }

    async fn insert_with_retry(&self, record: &MatchRecord) -> Result<InsertOutcome, sqlx::Error> {
        let mut attempt = 0u32;
        loop {
            match self.store.insert(record).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(e);
                    }
                    let delay = self.retry.backoff_delay(attempt - 1);
                    debug!(
                        tx_hash = %record.tx_hash_hex(),
                        attempt,
                        error = %e,
                        "insert failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
