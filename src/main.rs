//! TokenWatch - token price alert monitor
//!
//! Subscribers track token addresses with a percentage threshold; a
//! periodic sweep resolves quotes through a TTL-bounded durable cache and
//! pushes a Telegram alert when the price moves past the threshold
//! relative to the last-alerted baseline.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use tokenwatch::config::Config;
use tokenwatch::modules::{MonitorLoop, PriceCache, PriceSource};
use tokenwatch::utils::{init_logger, DatabaseService, Notifier, TelegramNotifier};

const BANNER: &str = r#"
    ==================================================
       TokenWatch - token price alert monitor
       Quotes: Dexscreener  |  Delivery: Telegram
    ==================================================
"#;

/// TokenWatch application
pub struct TokenWatch {
    database: Arc<DatabaseService>,
    monitor: MonitorLoop,
}

impl TokenWatch {
    /// Create a new TokenWatch instance
    pub fn new() -> Result<Self> {
        let config = Config::from_env();

        let database = Arc::new(DatabaseService::new(
            &config.database_path,
            config.max_tracked_tokens,
        )?);
        let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(&config));
        let source = Arc::new(PriceSource::new(&config)?);
        let cache = Arc::new(PriceCache::new(
            source,
            Arc::clone(&database),
            config.cache_ttl_secs,
        ));

        let monitor = MonitorLoop::new(config, cache, Arc::clone(&database), notifier);

        Ok(Self { database, monitor })
    }

    /// Start the monitor loop
    pub fn start(&self) {
        println!("{}", BANNER);
        info!(target: "TOKENWATCH", "Initializing TokenWatch...");
        self.monitor.start();
        info!(target: "TOKENWATCH", "Monitor started");
    }

    /// Graceful shutdown: stop the sweep and flush the store one final time
    /// so the last sweep's alert-state updates are never lost.
    pub fn shutdown(&self) {
        info!(target: "TOKENWATCH", "Shutting down...");
        self.monitor.stop();
        if let Err(e) = self.database.flush() {
            error!(target: "TOKENWATCH", "Final flush failed: {}", e);
        }
        info!(target: "TOKENWATCH", "Shutdown complete");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let app = match TokenWatch::new() {
        Ok(app) => app,
        Err(e) => {
            error!(target: "TOKENWATCH", "Failed to initialize: {}", e);
            return Err(e);
        }
    };

    app.start();
    shutdown_signal().await;
    app.shutdown();

    Ok(())
}
