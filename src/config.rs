//! Scanner Configuration
//!
//! Reads the process configuration surface from environment variables
//! (optionally seeded from a `.env` file by the binary) and parses it into
//! typed values. All parsing failures here are fatal at startup.

use std::time::Duration;

use alloy::primitives::Address;
use rand::Rng;
use thiserror::Error;

/// Default lower bound of the dispatch pacing interval
pub const DEFAULT_PACING_MIN_MS: u64 = 100;

/// Default jitter added on top of the pacing lower bound
pub const DEFAULT_PACING_JITTER_MS: u64 = 50;

/// Default per-call deadline for a block fetch
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Default number of attempts for a failing block fetch or store write
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default initial backoff delay between retry attempts
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 250;

/// Default maximum backoff delay between retry attempts
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// Errors that can occur while reading the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },

    #[error("endpoint list is empty")]
    NoEndpoints,
}

/// Pacing policy between scan-task dispatches.
///
/// Dispatch sleeps a uniformly-random interval in
/// `[min_ms, min_ms + jitter_ms)` to stay under upstream rate limits. This
/// throttles dispatch cadence only, not the number of in-flight fetches.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Lower bound of the sleep interval in milliseconds
    pub min_ms: u64,
    /// Width of the random jitter window in milliseconds
    pub jitter_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self { min_ms: DEFAULT_PACING_MIN_MS, jitter_ms: DEFAULT_PACING_JITTER_MS }
    }
}

impl PacingConfig {
    /// Draw the next dispatch delay.
    pub fn delay(&self) -> Duration {
        // Saturate so extreme knob values cannot wrap the range bound.
        let upper = self.min_ms.saturating_add(self.jitter_ms);
        if upper == self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..upper);
        Duration::from_millis(ms)
    }
}

/// Bounded retry policy with exponential backoff.
///
/// Shared by the per-block fetch path and the persister's insert path.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff delay for a given attempt number
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_backoff_ms * 2u64.pow(attempt.min(10));
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// Fully parsed scanner configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Upstream endpoint URLs, dispensed round-robin by the pool
    pub rpc_urls: Vec<String>,
    /// Store connection URL
    pub database_url: String,
    /// Contract address whose incoming calls are scanned
    pub target_contract: Address,
    /// 4-byte selector the calldata must start with
    pub function_selector: [u8; 4],
    /// Number of blocks behind the head at which scanning starts
    pub block_lag: u64,
    /// Dispatch pacing toward the upstream endpoints
    pub pacing: PacingConfig,
    /// Retry policy for transient fetch/write failures
    pub retry: RetryPolicy,
    /// Per-call deadline for block fetches in milliseconds
    pub fetch_timeout_ms: u64,
}

impl ScanConfig {
    /// Load the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    ///
    /// # Arguments
    /// * `lookup` - Returns the raw value for a variable name, if set
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_urls = parse_endpoint_list(&require(&lookup, "ETH_RPC")?)?;
        let database_url = require(&lookup, "DATABASE_URL")?;
        let target_contract = parse_address(&require(&lookup, "TARGET_CONTRACT")?)?;
        let function_selector =
            parse_selector(&require(&lookup, "FILTERED_FUNCTION_SELECTOR")?)?;
        let block_lag = parse_u64("BLOCK_START_FROM_LATEST", &require(&lookup, "BLOCK_START_FROM_LATEST")?)?;

        let pacing = PacingConfig {
            min_ms: optional_u64(&lookup, "SCAN_PACING_MIN_MS", DEFAULT_PACING_MIN_MS)?,
            jitter_ms: optional_u64(&lookup, "SCAN_PACING_JITTER_MS", DEFAULT_PACING_JITTER_MS)?,
        };
        let retry = RetryPolicy {
            max_attempts: optional_u64(&lookup, "SCAN_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS as u64)?
                as u32,
            initial_backoff_ms: optional_u64(
                &lookup,
                "SCAN_INITIAL_BACKOFF_MS",
                DEFAULT_INITIAL_BACKOFF_MS,
            )?,
            max_backoff_ms: optional_u64(&lookup, "SCAN_MAX_BACKOFF_MS", DEFAULT_MAX_BACKOFF_MS)?,
        };
        let fetch_timeout_ms =
            optional_u64(&lookup, "FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS)?;

        Ok(Self {
            rpc_urls,
            database_url,
            target_contract,
            function_selector,
            block_lag,
            pacing,
            retry,
            fetch_timeout_ms,
        })
    }

    /// Hex-encoded selector with 0x prefix, for log output
    pub fn selector_hex(&self) -> String {
        format!("0x{}", hex::encode(self.function_selector))
    }
}

fn require<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::MissingVar(name))
}

fn optional_u64<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => parse_u64(name, &raw),
        None => Ok(default),
    }
}

fn parse_u64(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue { name, message: e.to_string() })
}

/// Split a comma-joined endpoint list into individual URLs
pub fn parse_endpoint_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    let urls: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if urls.is_empty() {
        return Err(ConfigError::NoEndpoints);
    }
    Ok(urls)
}

/// Parse a hex contract address (0x prefix optional, case-insensitive)
pub fn parse_address(raw: &str) -> Result<Address, ConfigError> {
    raw.trim().parse::<Address>().map_err(|e| ConfigError::InvalidValue {
        name: "TARGET_CONTRACT",
        message: e.to_string(),
    })
}

/// Parse a 4-byte function selector from a hex string (0x prefix optional)
pub fn parse_selector(raw: &str) -> Result<[u8; 4], ConfigError> {
    let stripped = raw.trim().strip_prefix("0x").unwrap_or_else(|| raw.trim());
    let bytes = hex::decode(stripped).map_err(|e| ConfigError::InvalidValue {
        name: "FILTERED_FUNCTION_SELECTOR",
        message: e.to_string(),
    })?;
    if bytes.len() != 4 {
        return Err(ConfigError::InvalidValue {
            name: "FILTERED_FUNCTION_SELECTOR",
            message: format!("expected 4 bytes, got {}", bytes.len()),
        });
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&bytes);
    Ok(selector)
}
