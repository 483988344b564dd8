//! Mintscan Library
//!
//! This crate provides components for scanning a bounded range of finalized
//! blocks, filtering transactions aimed at one contract's mint-like function,
//! and persisting the matches to a relational store.

pub mod config;
pub mod fetch;
pub mod filter;
pub mod persist;
pub mod pool;
pub mod scanner;
pub mod sender;
pub mod store;

// Re-export commonly used types
pub use config::{PacingConfig, RetryPolicy, ScanConfig};
pub use fetch::{BlockFetcher, BlockSource, FetchError};
pub use filter::{extract_selector, match_transaction, MatchRecord};
pub use persist::{Persister, PersistSummary};
pub use pool::EndpointPool;
pub use scanner::{ScanWindow, Scanner};
pub use store::{InsertOutcome, MatchStore};
