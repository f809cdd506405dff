//! Core monitoring modules

pub mod commands;
pub mod evaluator;
pub mod monitor;
pub mod price_cache;
pub mod price_source;

#[cfg(test)]
pub mod testkit;

pub use commands::{CommandService, PendingDraft, RemoveOutcome, SubscriberStats};
pub use monitor::MonitorLoop;
pub use price_cache::PriceCache;
pub use price_source::{PriceSource, Quote, QuoteFetcher};
