//! Range Scheduler
//!
//! Computes the inclusive scan window from the chain head and dispatches one
//! scan task per height, pacing dispatch to stay under upstream rate limits.
//! Each task fetches its block, filters the transactions, recovers senders,
//! and hands match records to the channel; task failures are scoped to their
//! height and never abort the run.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::Address;
use alloy::rpc::types::Block;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{PacingConfig, RetryPolicy};
use crate::fetch::{BlockSource, FetchError};
use crate::filter::{match_transaction, MatchRecord};
use crate::sender::resolve_sender;

/// Errors that can occur while planning a scan
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("block lag {lag} exceeds chain head {head}")]
    LagExceedsHead { head: u64, lag: u64 },
}

/// Inclusive block-height range to scan, `[head - lag, head]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    /// First height to scan
    pub start: u64,
    /// Last height to scan
    pub end: u64,
}

impl ScanWindow {
    /// Compute the window from the resolved head and the configured lag.
    ///
    /// Fails fast when `lag > head` instead of wrapping the start height.
    pub fn from_head(head: u64, lag: u64) -> Result<Self, ScanError> {
        let start = head.checked_sub(lag).ok_or(ScanError::LagExceedsHead { head, lag })?;
        Ok(Self { start, end: head })
    }

    /// Number of heights in the window
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// True only for a window that cannot occur via `from_head`
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Heights in ascending dispatch order
    pub fn heights(&self) -> RangeInclusive<u64> {
        self.start..=self.end
    }
}

/// Dispatches paced, parallel scan tasks over a window.
pub struct Scanner<S> {
    source: Arc<S>,
    target: Address,
    selector: [u8; 4],
    pacing: PacingConfig,
    retry: RetryPolicy,
    shutdown: Arc<AtomicBool>,
}

impl<S: BlockSource + 'static> Scanner<S> {
    /// Create a new scanner.
    ///
    /// # Arguments
    /// * `source` - Block source shared by all scan tasks
    /// * `target` - Contract address matches must be sent to
    /// * `selector` - 4-byte selector matches must start with
    /// * `pacing` - Sleep window between task dispatches
    /// * `retry` - Bounded backoff for failing block fetches
    /// * `shutdown` - Flag checked between dispatches for a clean stop
    pub fn new(
        source: Arc<S>,
        target: Address,
        selector: [u8; 4],
        pacing: PacingConfig,
        retry: RetryPolicy,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self { source, target, selector, pacing, retry, shutdown }
    }

    /// Scan every height in the window, emitting matches onto `matches`.
    ///
    /// Dispatch follows ascending height; completion order is unordered, so
    /// records reach the channel in no particular height order. Returns once
    /// every dispatched task has finished, with the number of dispatched
    /// heights. The sender is dropped on return so the channel closes as soon
    /// as the caller's remaining handles are gone.
    pub async fn run(&self, window: ScanWindow, matches: mpsc::Sender<MatchRecord>) -> u64 {
        let mut tasks = JoinSet::new();
        let mut dispatched = 0u64;

        for height in window.heights() {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!(height, "shutdown requested, stopping dispatch");
                break;
            }

            let source = Arc::clone(&self.source);
            let target = self.target;
            let selector = self.selector;
            let retry = self.retry.clone();
            let matches = matches.clone();
            tasks.spawn(async move {
                scan_height(source, height, target, selector, retry, matches).await;
            });
            dispatched += 1;

            sleep(self.pacing.delay()).await;
        }
        drop(matches);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "scan task aborted");
            }
        }

        dispatched
    }
}

/// Scan one block: fetch, filter, resolve senders, emit matches.
async fn scan_height<S: BlockSource>(
    source: Arc<S>,
    height: u64,
    target: Address,
    selector: [u8; 4],
    retry: RetryPolicy,
    matches: mpsc::Sender<MatchRecord>,
) {
    debug!(height, "scanning block");

    let block = match fetch_with_retry(source.as_ref(), height, &retry).await {
        Ok(block) => block,
        Err(e) => {
            warn!(height, error = %e, "skipping block after failed fetch");
            return;
        }
    };

    let block_height = block.header.number;
    let block_hash = block.header.hash;

    for tx in block.transactions.txns() {
        let Some(tx_hash) = match_transaction(tx, target, selector) else {
            continue;
        };

        let sender = match resolve_sender(tx) {
            Ok(sender) => sender,
            Err(e) => {
                warn!(
                    height,
                    tx_hash = %format!("{tx_hash:#x}"),
                    error = %e,
                    "skipping transaction with unrecoverable sender"
                );
                continue;
            }
        };

        let record = MatchRecord { tx_hash, block_height, block_hash, sender };
        // Blocks until the persister takes the record: backpressure by
        // construction of the rendezvous channel.
        if matches.send(record).await.is_err() {
            warn!(height, "match channel closed, dropping remaining matches");
            return;
        }
    }
}

/// Fetch one block with bounded exponential backoff.
async fn fetch_with_retry<S: BlockSource>(
    source: &S,
    height: u64,
    retry: &RetryPolicy,
) -> Result<Block, FetchError> {
    let mut attempt = 0u32;
    loop {
        match source.fetch_block(Some(height)).await {
            Ok(block) => return Ok(block),
            Err(e) => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    return Err(e);
                }
                let delay = retry.backoff_delay(attempt - 1);
                warn!(height, attempt, error = %e, "block fetch failed, retrying");
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Bytes, B256, U256};
    use alloy::rpc::types::{BlockTransactions, Header, Transaction};
    use mockall::predicate::eq;
    use mockall::Sequence;

    use super::*;
    use crate::fetch::MockBlockSource;

    const MINT_SELECTOR: [u8; 4] = [0x40, 0xc1, 0x0f, 0x19];

    fn target() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn block_at(height: u64, transactions: Vec<Transaction>) -> Block {
        Block {
            header: Header {
                number: height,
                hash: B256::repeat_byte(height as u8),
                ..Default::default()
            },
            transactions: BlockTransactions::Full(transactions),
            ..Default::default()
        }
    }

    fn unsigned_mint_call() -> Transaction {
        // Passes the filter, but sender recovery must fail: no signature.
        let mut calldata = MINT_SELECTOR.to_vec();
        calldata.extend_from_slice(&[0u8; 64]);
        Transaction {
            hash: B256::repeat_byte(0x33),
            to: Some(target()),
            input: Bytes::from(calldata),
            value: U256::ZERO,
            ..Default::default()
        }
    }

    fn fast_pacing() -> PacingConfig {
        PacingConfig { min_ms: 1, jitter_ms: 0 }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy { max_attempts: 2, initial_backoff_ms: 1, max_backoff_ms: 2 }
    }

    fn scanner(source: MockBlockSource) -> Scanner<MockBlockSource> {
        Scanner::new(
            Arc::new(source),
            target(),
            MINT_SELECTOR,
            fast_pacing(),
            fast_retry(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    // ==================== ScanWindow tests ====================

    #[test]
    fn test_window_from_head_with_lag() {
        let window = ScanWindow::from_head(100, 10).unwrap();
        assert_eq!(window, ScanWindow { start: 90, end: 100 });
        assert_eq!(window.len(), 11);
    }

    #[test]
    fn test_window_with_zero_lag_is_single_height() {
        let window = ScanWindow::from_head(100, 0).unwrap();
        assert_eq!(window, ScanWindow { start: 100, end: 100 });
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_window_lag_equal_to_head_starts_at_genesis() {
        let window = ScanWindow::from_head(50, 50).unwrap();
        assert_eq!(window.start, 0);
    }

    #[test]
    fn test_window_lag_exceeding_head_fails_fast() {
        let result = ScanWindow::from_head(10, 11);
        assert!(matches!(result, Err(ScanError::LagExceedsHead { head: 10, lag: 11 })));
    }

    #[test]
    fn test_window_heights_ascending() {
        let window = ScanWindow::from_head(5, 2).unwrap();
        let heights: Vec<u64> = window.heights().collect();
        assert_eq!(heights, vec![3, 4, 5]);
    }

    // ==================== dispatch tests ====================

    #[tokio::test]
    async fn test_run_dispatches_one_task_per_height() {
        let mut source = MockBlockSource::new();
        for height in 90..=92u64 {
            source
                .expect_fetch_block()
                .with(eq(Some(height)))
                .times(1)
                .returning(move |_| Ok(block_at(height, vec![])));
        }

        let (tx, mut rx) = mpsc::channel(1);
        let dispatched = scanner(source).run(ScanWindow { start: 90, end: 92 }, tx).await;

        assert_eq!(dispatched, 3);
        assert!(rx.recv().await.is_none()); // no matches, channel closed
    }

    #[tokio::test]
    async fn test_run_completes_on_single_empty_block() {
        // start == end == head with no matching transactions: zero records,
        // no hang.
        let mut source = MockBlockSource::new();
        source.expect_fetch_block().times(1).returning(|_| Ok(block_at(100, vec![])));

        let (tx, mut rx) = mpsc::channel(1);
        let scanner = scanner(source);
        let run = scanner.run(ScanWindow { start: 100, end: 100 }, tx);
        let dispatched =
            tokio::time::timeout(std::time::Duration::from_secs(5), run).await.unwrap();

        assert_eq!(dispatched, 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_height_is_skipped_and_run_completes() {
        let mut source = MockBlockSource::new();
        source.expect_fetch_block().returning(|height| {
            Err(FetchError::Rpc { height, message: "connection refused".to_string() })
        });

        let (tx, mut rx) = mpsc::channel(1);
        let dispatched = scanner(source).run(ScanWindow { start: 100, end: 101 }, tx).await;

        assert_eq!(dispatched, 2);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unrecoverable_sender_is_skipped() {
        let mut source = MockBlockSource::new();
        source
            .expect_fetch_block()
            .times(1)
            .returning(|_| Ok(block_at(100, vec![unsigned_mint_call()])));

        let (tx, mut rx) = mpsc::channel(1);
        let dispatched = scanner(source).run(ScanWindow { start: 100, end: 100 }, tx).await;

        // The call matched the filter but its sender cannot be recovered;
        // the transaction is skipped, not fatal.
        assert_eq!(dispatched, 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_flag_stops_dispatch() {
        let source = MockBlockSource::new(); // must never be called
        let shutdown = Arc::new(AtomicBool::new(true));
        let scanner = Scanner::new(
            Arc::new(source),
            target(),
            MINT_SELECTOR,
            fast_pacing(),
            fast_retry(),
            shutdown,
        );

        let (tx, _rx) = mpsc::channel(1);
        let dispatched = scanner.run(ScanWindow { start: 0, end: 100 }, tx).await;
        assert_eq!(dispatched, 0);
    }

    // ==================== fetch_with_retry tests ====================

    #[tokio::test]
    async fn test_fetch_retries_then_succeeds() {
        let mut source = MockBlockSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_block()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|height| Err(FetchError::Rpc { height, message: "flaky".to_string() }));
        source
            .expect_fetch_block()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(block_at(100, vec![])));

        let retry = RetryPolicy { max_attempts: 3, initial_backoff_ms: 1, max_backoff_ms: 2 };
        let block = fetch_with_retry(&source, 100, &retry).await.unwrap();
        assert_eq!(block.header.number, 100);
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_max_attempts() {
        let mut source = MockBlockSource::new();
        source.expect_fetch_block().times(2).returning(|height| {
            Err(FetchError::Rpc { height, message: "down".to_string() })
        });

        let retry = RetryPolicy { max_attempts: 2, initial_backoff_ms: 1, max_backoff_ms: 2 };
        let result = fetch_with_retry(&source, 100, &retry).await;
        assert!(matches!(result, Err(FetchError::Rpc { .. })));
    }
}
