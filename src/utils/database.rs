//! SQLite store for subscriptions and the quote cache

use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::WatchError;
use crate::modules::price_source::Quote;

/// One tracked (subscriber, token) pair with its alert state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscriber_id: i64,
    pub token_address: String,
    pub name: String,
    pub alert_percent: f64,
    pub last_alerted_price: f64,
    pub last_alerted_market_cap: f64,
}

/// Cached quote for one token, shared across all subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub token_address: String,
    pub price: f64,
    pub market_cap: f64,
    pub price_change_24h: Option<f64>,
    pub fetched_at: i64,
}

impl CacheEntry {
    pub fn quote(&self) -> Quote {
        Quote {
            price: self.price,
            market_cap: self.market_cap,
            price_change_24h: self.price_change_24h,
        }
    }
}

/// SQLite-backed store.
///
/// Every mutating operation commits before returning; the connection mutex
/// serializes mutations (whole-store exclusive lock). A mutation that fails
/// to commit surfaces as `Storage` and must not be reported as successful.
pub struct DatabaseService {
    conn: Arc<Mutex<Connection>>,
    max_tracked_tokens: usize,
}

impl DatabaseService {
    /// Open (or create) the store and run schema setup.
    pub fn new<P: AsRef<Path>>(db_path: P, max_tracked_tokens: usize) -> Result<Self, WatchError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        let service = Self {
            conn: Arc::new(Mutex::new(conn)),
            max_tracked_tokens,
        };
        service.initialize()?;
        Ok(service)
    }

    fn initialize(&self) -> Result<(), WatchError> {
        let conn = self.conn.lock();

        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!(target: "DATABASE", "journal mode: {}", mode);

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_tokens (
                subscriber_id INTEGER NOT NULL,
                token_address TEXT NOT NULL,
                name TEXT NOT NULL,
                percent REAL NOT NULL,
                last_price REAL NOT NULL,
                last_market_cap REAL NOT NULL,
                PRIMARY KEY (subscriber_id, token_address)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS token_cache (
                token_address TEXT PRIMARY KEY,
                price REAL NOT NULL,
                market_cap REAL NOT NULL,
                price_change_24h REAL,
                fetched_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        info!(target: "DATABASE", "Initialized successfully");
        Ok(())
    }

    // ============================================
    // SUBSCRIPTION METHODS
    // ============================================

    /// Insert or overwrite a subscription.
    ///
    /// The per-subscriber cap applies to new rows only; updating an existing
    /// row never trips it. Cap violations perform no mutation.
    pub fn upsert_subscription(&self, sub: &Subscription) -> Result<(), WatchError> {
        if !sub.alert_percent.is_finite() || !(1.0..=1000.0).contains(&sub.alert_percent) {
            return Err(WatchError::InvalidInput(
                "alert percent must be between 1 and 1000".to_string(),
            ));
        }
        if !sub.last_alerted_price.is_finite() || sub.last_alerted_price <= 0.0 {
            return Err(WatchError::InvalidInput(
                "baseline price must be positive".to_string(),
            ));
        }

        let conn = self.conn.lock();

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracked_tokens WHERE subscriber_id = ?1 AND token_address = ?2",
            params![sub.subscriber_id, sub.token_address],
            |row| row.get(0),
        )?;

        if exists == 0 {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tracked_tokens WHERE subscriber_id = ?1",
                params![sub.subscriber_id],
                |row| row.get(0),
            )?;
            if count as usize >= self.max_tracked_tokens {
                return Err(WatchError::LimitExceeded(self.max_tracked_tokens));
            }
        }

        conn.execute(
            r#"
            INSERT OR REPLACE INTO tracked_tokens
            (subscriber_id, token_address, name, percent, last_price, last_market_cap)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                sub.subscriber_id,
                sub.token_address,
                sub.name,
                sub.alert_percent,
                sub.last_alerted_price,
                sub.last_alerted_market_cap,
            ],
        )?;
        Ok(())
    }

    /// Remove one subscription, returning the removed record for messaging.
    pub fn remove_subscription(
        &self,
        subscriber_id: i64,
        token_address: &str,
    ) -> Result<Subscription, WatchError> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT subscriber_id, token_address, name, percent, last_price, last_market_cap
             FROM tracked_tokens WHERE subscriber_id = ?1 AND token_address = ?2",
        )?;
        let mut rows = stmt.query(params![subscriber_id, token_address])?;
        let removed = match rows.next()? {
            Some(row) => map_subscription(row)?,
            None => return Err(WatchError::NotFound),
        };
        drop(rows);
        drop(stmt);

        conn.execute(
            "DELETE FROM tracked_tokens WHERE subscriber_id = ?1 AND token_address = ?2",
            params![subscriber_id, token_address],
        )?;
        Ok(removed)
    }

    /// Remove every subscription a subscriber owns. A no-op on an empty set.
    pub fn clear_subscriptions(&self, subscriber_id: i64) -> Result<usize, WatchError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM tracked_tokens WHERE subscriber_id = ?1",
            params![subscriber_id],
        )?;
        Ok(removed)
    }

    /// Subscriptions for one subscriber, in stable token-address order.
    pub fn subscriptions_for(&self, subscriber_id: i64) -> Result<Vec<Subscription>, WatchError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT subscriber_id, token_address, name, percent, last_price, last_market_cap
             FROM tracked_tokens WHERE subscriber_id = ?1 ORDER BY token_address",
        )?;
        let rows = stmt.query_map(params![subscriber_id], |row| {
            map_subscription_rusqlite(row)
        })?;

        let mut subscriptions = Vec::new();
        for row in rows {
            subscriptions.push(row?);
        }
        Ok(subscriptions)
    }

    /// Every subscription across all subscribers, in stable sweep order.
    pub fn all_subscriptions(&self) -> Result<Vec<Subscription>, WatchError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT subscriber_id, token_address, name, percent, last_price, last_market_cap
             FROM tracked_tokens ORDER BY subscriber_id, token_address",
        )?;
        let rows = stmt.query_map([], |row| map_subscription_rusqlite(row))?;

        let mut subscriptions = Vec::new();
        for row in rows {
            subscriptions.push(row?);
        }
        Ok(subscriptions)
    }

    /// Change the alert threshold of an existing subscription.
    pub fn update_percent(
        &self,
        subscriber_id: i64,
        token_address: &str,
        percent: f64,
    ) -> Result<Subscription, WatchError> {
        if !percent.is_finite() || !(1.0..=1000.0).contains(&percent) {
            return Err(WatchError::InvalidInput(
                "alert percent must be between 1 and 1000".to_string(),
            ));
        }

        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE tracked_tokens SET percent = ?3
             WHERE subscriber_id = ?1 AND token_address = ?2",
            params![subscriber_id, token_address, percent],
        )?;
        if updated == 0 {
            return Err(WatchError::NotFound);
        }

        let mut stmt = conn.prepare(
            "SELECT subscriber_id, token_address, name, percent, last_price, last_market_cap
             FROM tracked_tokens WHERE subscriber_id = ?1 AND token_address = ?2",
        )?;
        let mut rows = stmt.query(params![subscriber_id, token_address])?;
        match rows.next()? {
            Some(row) => map_subscription(row),
            None => Err(WatchError::NotFound),
        }
    }

    /// Move the alert baseline to the just-alerted price and market cap.
    pub fn record_alert(
        &self,
        subscriber_id: i64,
        token_address: &str,
        price: f64,
        market_cap: f64,
    ) -> Result<(), WatchError> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE tracked_tokens SET last_price = ?3, last_market_cap = ?4
             WHERE subscriber_id = ?1 AND token_address = ?2",
            params![subscriber_id, token_address, price, market_cap],
        )?;
        if updated == 0 {
            return Err(WatchError::NotFound);
        }
        Ok(())
    }

    // ============================================
    // CACHE METHODS
    // ============================================

    pub fn cache_entry(&self, token_address: &str) -> Result<Option<CacheEntry>, WatchError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT token_address, price, market_cap, price_change_24h, fetched_at
             FROM token_cache WHERE token_address = ?1",
        )?;
        let mut rows = stmt.query(params![token_address])?;

        if let Some(row) = rows.next()? {
            Ok(Some(CacheEntry {
                token_address: row.get(0)?,
                price: row.get(1)?,
                market_cap: row.get(2)?,
                price_change_24h: row.get(3)?,
                fetched_at: row.get(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Overwrite the cache entry for a token. Entries are written whole;
    /// a reader never observes a partial entry.
    pub fn save_cache_entry(
        &self,
        token_address: &str,
        quote: &Quote,
        fetched_at: i64,
    ) -> Result<(), WatchError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO token_cache
            (token_address, price, market_cap, price_change_24h, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                token_address,
                quote.price,
                quote.market_cap,
                quote.price_change_24h,
                fetched_at,
            ],
        )?;
        Ok(())
    }

    /// Checkpoint the WAL into the main database file. Called once on shutdown.
    pub fn flush(&self) -> Result<(), WatchError> {
        let conn = self.conn.lock();
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        info!(target: "DATABASE", "Flushed");
        Ok(())
    }
}

fn map_subscription(row: &Row<'_>) -> Result<Subscription, WatchError> {
    map_subscription_rusqlite(row).map_err(WatchError::from)
}

fn map_subscription_rusqlite(row: &Row<'_>) -> Result<Subscription, rusqlite::Error> {
    Ok(Subscription {
        subscriber_id: row.get(0)?,
        token_address: row.get(1)?,
        name: row.get(2)?,
        alert_percent: row.get(3)?,
        last_alerted_price: row.get(4)?,
        last_alerted_market_cap: row.get(5)?,
    })
}

impl Clone for DatabaseService {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            max_tracked_tokens: self.max_tracked_tokens,
        }
    }
}
