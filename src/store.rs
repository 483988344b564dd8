//! Match Store
//!
//! Relational store for matched mint calls, backed by sqlx/SQLite. The
//! table is keyed by transaction hash so the same window can be scanned any
//! number of times without producing duplicate rows; inserts are idempotent
//! upserts that report whether a row was actually written.

use std::str::FromStr;

use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};

use crate::filter::MatchRecord;

/// SQL statements for the mint-call table
mod sql {
    /// Schema, applied at startup. The PRIMARY KEY on tx_hash carries the
    /// at-most-once-per-transaction invariant across runs.
    pub const CREATE_MINT_CALLS: &str = "CREATE TABLE IF NOT EXISTS mint_calls ( \
         tx_hash TEXT PRIMARY KEY, \
         block_height INTEGER NOT NULL, \
         block_hash TEXT NOT NULL, \
         sender TEXT NOT NULL )";

    /// Idempotent insert of one match record
    pub const INSERT_MINT_CALL: &str = "INSERT INTO mint_calls \
         (tx_hash, block_height, block_hash, sender) VALUES (?, ?, ?, ?) \
         ON CONFLICT(tx_hash) DO NOTHING";

    /// Total number of persisted rows
    pub const COUNT_MINT_CALLS: &str = "SELECT COUNT(*) FROM mint_calls";
}

/// Outcome of a single insert attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,
    /// The transaction hash was already present; nothing was written
    Duplicate,
}

/// SQLite-backed store for matched mint calls.
pub struct MatchStore {
    pool: SqlitePool,
}

impl MatchStore {
    /// Connect to the store, creating the database file if necessary.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        tracing::info!(database_url, "store connection pool initialized");
        Ok(Self { pool })
    }

    /// Apply the schema. Safe to call on every startup.
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(sql::CREATE_MINT_CALLS).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert one match record, ignoring transaction hashes already present.
    pub async fn insert(&self, record: &MatchRecord) -> Result<InsertOutcome, sqlx::Error> {
        let result = sqlx::query(sql::INSERT_MINT_CALL)
            .bind(record.tx_hash_hex())
            .bind(record.block_height as i64)
            .bind(record.block_hash_hex())
            .bind(record.sender_hex())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Duplicate)
        }
    }

    /// Number of persisted match records
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(sql::COUNT_MINT_CALLS).fetch_one(&self.pool).await
    }

    /// The underlying connection pool, for ad-hoc queries in tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("store connection pool closed");
    }
}
