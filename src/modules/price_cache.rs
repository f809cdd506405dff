//! Time-bounded quote cache over the durable store

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::error::WatchError;
use crate::modules::price_source::{Quote, QuoteFetcher};
use crate::utils::database::DatabaseService;

/// Memoizes upstream quotes per token address.
///
/// The cache is keyed by token, not by subscriber, so upstream call volume
/// is bounded by the number of distinct tokens regardless of how many
/// subscribers track them. Staleness is judged at read time; there is no
/// background eviction.
pub struct PriceCache {
    source: Arc<dyn QuoteFetcher>,
    database: Arc<DatabaseService>,
    ttl_secs: i64,
}

impl PriceCache {
    pub fn new(source: Arc<dyn QuoteFetcher>, database: Arc<DatabaseService>, ttl_secs: i64) -> Self {
        Self {
            source,
            database,
            ttl_secs,
        }
    }

    /// Resolve a quote, serving from the cache while the entry is fresh.
    ///
    /// On a miss or a stale entry the upstream is fetched; a successful
    /// fetch overwrites and persists the entry before returning. A failed
    /// fetch leaves any existing entry untouched, so failures never extend
    /// or shorten the TTL.
    pub async fn get(&self, token_address: &str) -> Result<Quote, WatchError> {
        if let Some(entry) = self.database.cache_entry(token_address)? {
            let age = Utc::now().timestamp() - entry.fetched_at;
            if age < self.ttl_secs {
                debug!(target: "PRICE_CACHE", "hit for {} (age {}s)", token_address, age);
                return Ok(entry.quote());
            }
        }

        let quote = self.source.fetch(token_address).await?;
        self.database
            .save_cache_entry(token_address, &quote, Utc::now().timestamp())?;
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testkit::{FakeFetcher, FakeOutcome};
    use std::sync::Arc;

    fn setup(ttl_secs: i64) -> (Arc<FakeFetcher>, Arc<DatabaseService>, PriceCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let database = Arc::new(DatabaseService::new(dir.path().join("cache.db"), 50).unwrap());
        let fetcher = Arc::new(FakeFetcher::new());
        let cache = PriceCache::new(fetcher.clone(), Arc::clone(&database), ttl_secs);
        (fetcher, database, cache, dir)
    }

    #[tokio::test]
    async fn fresh_entry_served_without_upstream_call() {
        let (fetcher, database, cache, _dir) = setup(300);

        let cached = Quote {
            price: 1.5,
            market_cap: 100.0,
            price_change_24h: Some(2.0),
        };
        database
            .save_cache_entry("T1", &cached, Utc::now().timestamp())
            .unwrap();

        let quote = cache.get("T1").await.unwrap();
        assert_eq!(quote, cached);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn stale_entry_triggers_exactly_one_refetch() {
        let (fetcher, database, cache, _dir) = setup(300);

        let stale = Quote {
            price: 1.0,
            market_cap: 100.0,
            price_change_24h: None,
        };
        database
            .save_cache_entry("T1", &stale, Utc::now().timestamp() - 301)
            .unwrap();
        fetcher.set("T1", FakeOutcome::Price(2.0, 200.0, Some(5.0)));

        let quote = cache.get("T1").await.unwrap();
        assert_eq!(quote.price, 2.0);
        assert_eq!(fetcher.call_count(), 1);

        // overwritten entry is fresh and serves the next read
        let quote = cache.get("T1").await.unwrap();
        assert_eq!(quote.price, 2.0);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn miss_fetches_and_persists() {
        let (fetcher, database, cache, _dir) = setup(300);
        fetcher.set("T1", FakeOutcome::Price(3.0, 300.0, None));

        let quote = cache.get("T1").await.unwrap();
        assert_eq!(quote.price, 3.0);
        assert_eq!(fetcher.call_count(), 1);

        let entry = database.cache_entry("T1").unwrap().unwrap();
        assert_eq!(entry.price, 3.0);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_stale_entry_untouched() {
        let (fetcher, database, cache, _dir) = setup(300);

        let stale = Quote {
            price: 1.0,
            market_cap: 100.0,
            price_change_24h: Some(1.0),
        };
        let stale_at = Utc::now().timestamp() - 400;
        database.save_cache_entry("T1", &stale, stale_at).unwrap();
        fetcher.set("T1", FakeOutcome::Api(500));

        let err = cache.get("T1").await.unwrap_err();
        assert!(matches!(err, WatchError::UpstreamApi(500)));

        let entry = database.cache_entry("T1").unwrap().unwrap();
        assert_eq!(entry.quote(), stale);
        assert_eq!(entry.fetched_at, stale_at);
    }
}
