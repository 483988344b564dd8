use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mintscan::{
    config::ScanConfig,
    fetch::{BlockFetcher, BlockSource},
    persist::Persister,
    pool::EndpointPool,
    scanner::{ScanWindow, Scanner},
    store::MatchStore,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("===== mint-call scanner start =====");

    let config = ScanConfig::from_env()?;
    info!(
        target = %config.target_contract,
        selector = %config.selector_hex(),
        lag = config.block_lag,
        "configuration loaded"
    );

    // Fatal/startup failures: store, pool, head resolution, window underflow.
    let store = Arc::new(MatchStore::connect(&config.database_url).await?);
    store.init_schema().await?;

    let pool = Arc::new(EndpointPool::from_urls(&config.rpc_urls)?);
    let fetcher = Arc::new(BlockFetcher::new(Arc::clone(&pool), config.fetch_timeout_ms));

    let head = fetcher.fetch_block(None).await?.header.number;
    let window = ScanWindow::from_head(head, config.block_lag)?;
    info!(head, start = window.start, end = window.end, "scan window computed");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight work");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    // Rendezvous hand-off between scan tasks and the single persister.
    let (matches_tx, matches_rx) = mpsc::channel(1);
    let persister = Persister::new(Arc::clone(&store), config.retry.clone());
    let persister_handle = tokio::spawn(persister.run(matches_rx));

    let scanner = Scanner::new(
        fetcher,
        config.target_contract,
        config.function_selector,
        config.pacing.clone(),
        config.retry.clone(),
        shutdown,
    );

    let started = Instant::now();
    let dispatched = scanner.run(window, matches_tx).await;
    // All scan tasks joined and every sender dropped: the channel is closed,
    // so the persister drains and returns.
    let summary = persister_handle.await?;
    store.close().await;

    info!(
        dispatched,
        written = summary.written,
        duplicates = summary.duplicates,
        failed = summary.failed,
        elapsed = ?started.elapsed(),
        "scan finished"
    );
    info!("===== finish =====");
    Ok(())
}
