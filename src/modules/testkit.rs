//! Shared fakes for module tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Config;
use crate::error::WatchError;
use crate::modules::price_source::{Quote, QuoteFetcher};
use crate::utils::alerts::Notifier;

/// Scripted per-token outcome for a fake upstream.
pub enum FakeOutcome {
    Price(f64, f64, Option<f64>),
    Timeout,
    Api(u16),
}

/// Fake upstream counting calls and replaying scripted outcomes.
/// Unscripted tokens resolve to `NotFound`.
pub struct FakeFetcher {
    outcomes: Mutex<HashMap<String, FakeOutcome>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, token_address: &str, outcome: FakeOutcome) {
        self.outcomes
            .lock()
            .insert(token_address.to_string(), outcome);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteFetcher for FakeFetcher {
    async fn fetch(&self, token_address: &str) -> Result<Quote, WatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().get(token_address) {
            Some(FakeOutcome::Price(price, market_cap, price_change_24h)) => Ok(Quote {
                price: *price,
                market_cap: *market_cap,
                price_change_24h: *price_change_24h,
            }),
            Some(FakeOutcome::Timeout) => Err(WatchError::Timeout),
            Some(FakeOutcome::Api(code)) => Err(WatchError::UpstreamApi(*code)),
            None => Err(WatchError::NotFound),
        }
    }
}

/// Notifier that records every message instead of delivering it.
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(i64, String)>>,
    pub admin_messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            admin_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn messages_for(&self, subscriber_id: i64) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(id, _)| *id == subscriber_id)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subscriber_id: i64, message: &str) {
        self.messages.lock().push((subscriber_id, message.to_string()));
    }

    async fn notify_admin(&self, message: &str) {
        self.admin_messages.lock().push(message.to_string());
    }
}

/// Config literal for tests; no env access.
pub fn test_config() -> Config {
    Config {
        api_base_url: "http://localhost".to_string(),
        fetch_timeout_secs: 1,
        fetch_max_attempts: 1,
        database_path: ":memory:".to_string(),
        cache_ttl_secs: 0,
        max_tracked_tokens: 50,
        sweep_interval_secs: 60,
        sweep_initial_delay_secs: 0,
        telegram_bot_token: None,
        admin_chat_id: None,
    }
}
