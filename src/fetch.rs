//! Block Fetcher
//!
//! Retrieves block headers and bodies through the endpoint pool. Every fetch
//! is two round trips: a header request that resolves "head" to a concrete
//! height, then the full block for that height. Retry policy belongs to the
//! caller; this module reports one descriptive error per failed fetch.

use std::sync::Arc;
use std::time::Duration;

use alloy::{eips::BlockNumberOrTag, providers::Provider, rpc::types::Block};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::time::timeout;

use crate::pool::EndpointPool;

/// Errors that can occur while fetching a block
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("rpc request for block {height:?} failed: {message}")]
    Rpc { height: Option<u64>, message: String },

    #[error("block {0} not found")]
    NotFound(u64),

    #[error("head block not available from endpoint")]
    HeadNotFound,

    #[error("block fetch timed out after {0}ms")]
    Timeout(u64),
}

/// Read-only source of blocks, keyed by height.
///
/// `None` means "the current chain head". The trait exists so the scheduler
/// and the end-to-end tests can run against a synthetic source.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch_block(&self, height: Option<u64>) -> Result<Block, FetchError>;
}

/// Fetches blocks through the round-robin endpoint pool.
pub struct BlockFetcher {
    pool: Arc<EndpointPool>,
    timeout_ms: u64,
}

impl BlockFetcher {
    /// Create a new fetcher over the given pool with a per-call deadline.
    pub fn new(pool: Arc<EndpointPool>, timeout_ms: u64) -> Self {
        Self { pool, timeout_ms }
    }

    async fn request<F, T>(&self, height: Option<u64>, fut: F) -> Result<T, FetchError>
    where
        F: std::future::Future<Output = Result<T, alloy::transports::TransportError>>,
    {
        timeout(Duration::from_millis(self.timeout_ms), fut)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout_ms))?
            .map_err(|e| FetchError::Rpc { height, message: e.to_string() })
    }
}

#[async_trait]
impl BlockSource for BlockFetcher {
    async fn fetch_block(&self, height: Option<u64>) -> Result<Block, FetchError> {
        let endpoint = self.pool.dispense();

        // Header round trip: resolves the head sentinel to a concrete height.
        let tag = match height {
            Some(h) => BlockNumberOrTag::Number(h),
            None => BlockNumberOrTag::Latest,
        };
        let header_block = self
            .request(height, endpoint.get_block_by_number(tag, false))
            .await?
            .ok_or(match height {
                Some(h) => FetchError::NotFound(h),
                None => FetchError::HeadNotFound,
            })?;
        let resolved = header_block.header.number;

        // Body round trip: full block with hydrated transactions.
        let block = self
            .request(Some(resolved), endpoint.get_block_by_number(resolved.into(), true))
            .await?
            .ok_or(FetchError::NotFound(resolved))?;

        Ok(block)
    }
}
