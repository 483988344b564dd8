//! Endpoint Pool
//!
//! Owns the upstream RPC handles and dispenses them round-robin so concurrent
//! block fetches spread across every configured endpoint. The cursor is the
//! only shared mutable state in the scanner; the lock around it is held for
//! the index update only, never across a network call.

use std::sync::Mutex;

use alloy::{
    providers::RootProvider,
    transports::http::{reqwest::Url, Client, Http},
};
use thiserror::Error;

/// Concrete provider type backing one pool slot
pub type HttpEndpoint = RootProvider<Http<Client>>;

/// Errors that can occur while building the pool
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("endpoint url list is empty")]
    Empty,

    #[error("invalid endpoint url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

/// Round-robin pool of upstream endpoints.
///
/// Construction is fail-fast: an empty list or a single malformed URL aborts
/// startup rather than producing a partial pool. Endpoints are immutable once
/// stored and are released together when the pool is dropped.
pub struct EndpointPool {
    endpoints: Vec<HttpEndpoint>,
    cursor: Mutex<usize>,
}

impl EndpointPool {
    /// Build a pool from a list of endpoint URLs.
    pub fn from_urls(urls: &[String]) -> Result<Self, PoolError> {
        if urls.is_empty() {
            return Err(PoolError::Empty);
        }

        let mut endpoints = Vec::with_capacity(urls.len());
        for url in urls {
            let parsed = Url::parse(url).map_err(|e| PoolError::InvalidUrl {
                url: url.clone(),
                message: e.to_string(),
            })?;
            endpoints.push(RootProvider::new_http(parsed));
        }

        tracing::info!(size = endpoints.len(), "endpoint pool initialized");
        Ok(Self { endpoints, cursor: Mutex::new(0) })
    }

    /// Hand out the next endpoint in round-robin order.
    ///
    /// Safe to call from any number of concurrent tasks; blocks only on the
    /// internal cursor lock, never on I/O.
    pub fn dispense(&self) -> HttpEndpoint {
        let mut cursor = self.cursor.lock().expect("endpoint pool cursor poisoned");
        let endpoint = self.endpoints[*cursor].clone();
        *cursor = (*cursor + 1) % self.endpoints.len();
        endpoint
    }

    /// Number of endpoints in the pool
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True if the pool holds no endpoints (never true after construction)
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    #[cfg(test)]
    fn cursor_position(&self) -> usize {
        *self.cursor.lock().unwrap()
    }
}
