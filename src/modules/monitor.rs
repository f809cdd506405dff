//! Monitor loop - periodic sweep over every subscription

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::WatchError;
use crate::modules::evaluator;
use crate::modules::price_cache::PriceCache;
use crate::modules::price_source::Quote;
use crate::utils::alerts::{self, Notifier};
use crate::utils::database::{DatabaseService, Subscription};

/// Monitor loop statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub sweeps_completed: u64,
    pub alerts_sent: u64,
    pub failures_reported: u64,
    pub is_running: bool,
}

/// Periodic driver: resolves a quote for every subscription, evaluates the
/// threshold, and on a fire delivers the alert and moves the baseline.
///
/// Alternates between idle (waiting for the next tick) and sweeping. A
/// single subscription's failure never aborts the sweep.
pub struct MonitorLoop {
    config: Config,
    cache: Arc<PriceCache>,
    database: Arc<DatabaseService>,
    notifier: Arc<dyn Notifier>,

    is_running: Arc<AtomicBool>,
    sweeps_completed: Arc<AtomicU64>,
    alerts_sent: Arc<AtomicU64>,
    failures_reported: Arc<AtomicU64>,
}

impl MonitorLoop {
    pub fn new(
        config: Config,
        cache: Arc<PriceCache>,
        database: Arc<DatabaseService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            cache,
            database,
            notifier,
            is_running: Arc::new(AtomicBool::new(false)),
            sweeps_completed: Arc::new(AtomicU64::new(0)),
            alerts_sent: Arc::new(AtomicU64::new(0)),
            failures_reported: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the sweep task: first sweep after the initial delay, then one
    /// per interval tick.
    pub fn start(&self) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(target: "MONITOR", "Already running");
            return;
        }

        info!(
            target: "MONITOR",
            "Starting monitor loop (interval {}s, initial delay {}s)",
            self.config.sweep_interval_secs,
            self.config.sweep_initial_delay_secs
        );

        let worker = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(worker.config.sweep_initial_delay_secs)).await;
            let mut ticker = interval(Duration::from_secs(worker.config.sweep_interval_secs));

            loop {
                ticker.tick().await;
                // stop() may land while idle; no sweep starts after it
                if !worker.is_running.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = worker.sweep().await {
                    error!(target: "MONITOR", "Sweep failed: {}", e);
                }
            }

            info!(target: "MONITOR", "Monitor loop stopped");
        });
    }

    /// Signal the loop to stop. An in-flight sweep finishes on its own.
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        info!(target: "MONITOR", "Monitor loop stopping...");
    }

    /// One full pass over all current subscriptions.
    ///
    /// Quote resolution fans out concurrently per subscription; all results
    /// are gathered before any subscription state is touched, then processed
    /// in stable (subscriber, token) order.
    pub async fn sweep(&self) -> Result<(), WatchError> {
        let subscriptions = self.database.all_subscriptions()?;

        let quotes = join_all(
            subscriptions
                .iter()
                .map(|sub| self.cache.get(&sub.token_address)),
        )
        .await;

        for (subscription, quote) in subscriptions.iter().zip(quotes) {
            match quote {
                Ok(quote) => self.process_quote(subscription, &quote).await,
                Err(err) => self.report_failure(subscription, &err).await,
            }
        }

        self.sweeps_completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn process_quote(&self, subscription: &Subscription, quote: &Quote) {
        match evaluator::evaluate(
            subscription.last_alerted_price,
            quote.price,
            subscription.alert_percent,
        ) {
            Ok(evaluation) if evaluation.fired => {
                info!(
                    target: "MONITOR",
                    "Alert for subscriber {}: {} {} by {:.2}%",
                    subscription.subscriber_id,
                    subscription.name,
                    evaluation.direction.as_str(),
                    evaluation.change_percent
                );

                // Deliver first, persist after: at-least-once is the contract.
                self.notifier
                    .notify(
                        subscription.subscriber_id,
                        &alerts::format_alert(subscription, &evaluation, quote),
                    )
                    .await;
                self.alerts_sent.fetch_add(1, Ordering::SeqCst);

                if let Err(e) = self.database.record_alert(
                    subscription.subscriber_id,
                    &subscription.token_address,
                    quote.price,
                    quote.market_cap,
                ) {
                    error!(
                        target: "MONITOR",
                        "Failed to persist alert baseline for {}: {}",
                        subscription.token_address, e
                    );
                }
            }
            Ok(_) => {}
            Err(err) => self.report_failure(subscription, &err).await,
        }
    }

    async fn report_failure(&self, subscription: &Subscription, err: &WatchError) {
        self.failures_reported.fetch_add(1, Ordering::SeqCst);

        if matches!(err, WatchError::Timeout) {
            self.notifier
                .notify_admin(&format!(
                    "\u{23F1} Quote timeout for {} ({}) while sweeping subscriber {}",
                    subscription.name, subscription.token_address, subscription.subscriber_id
                ))
                .await;
        }

        self.notifier
            .notify(
                subscription.subscriber_id,
                &alerts::format_failure(&subscription.name, &subscription.token_address, err),
            )
            .await;
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            sweeps_completed: self.sweeps_completed.load(Ordering::SeqCst),
            alerts_sent: self.alerts_sent.load(Ordering::SeqCst),
            failures_reported: self.failures_reported.load(Ordering::SeqCst),
            is_running: self.is_running.load(Ordering::SeqCst),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

impl Clone for MonitorLoop {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            cache: Arc::clone(&self.cache),
            database: Arc::clone(&self.database),
            notifier: Arc::clone(&self.notifier),
            is_running: Arc::clone(&self.is_running),
            sweeps_completed: Arc::clone(&self.sweeps_completed),
            alerts_sent: Arc::clone(&self.alerts_sent),
            failures_reported: Arc::clone(&self.failures_reported),
        }
    }
}
