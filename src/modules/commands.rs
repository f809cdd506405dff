//! Command surface consumed by the conversational front end

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::info;

use crate::error::WatchError;
use crate::modules::price_cache::PriceCache;
use crate::modules::price_source::Quote;
use crate::utils::database::{DatabaseService, Subscription};

/// In-progress add flow for one subscriber: the address is validated, the
/// name and percent are still being collected.
///
/// The quote observed at validation time becomes the subscription's initial
/// alert baseline.
#[derive(Debug, Clone)]
pub struct PendingDraft {
    pub subscriber_id: i64,
    pub token_address: String,
    pub price: f64,
    pub market_cap: f64,
    pub started_at: i64,
}

/// What a removal did, for user messaging.
#[derive(Debug)]
pub enum RemoveOutcome {
    Removed(Subscription),
    Cleared(usize),
}

/// Aggregate view over one subscriber's tracked tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberStats {
    pub tracked: usize,
    /// Average 24h change over tokens whose change is known.
    pub average_change_24h: Option<f64>,
}

/// Validate an alert threshold against the accepted domain.
pub fn validate_percent(percent: f64) -> Result<f64, WatchError> {
    if !percent.is_finite() || !(1.0..=1000.0).contains(&percent) {
        return Err(WatchError::InvalidInput(
            "alert percent must be between 1 and 1000".to_string(),
        ));
    }
    Ok(percent)
}

/// Operations the conversational collaborator drives.
///
/// Drafts are keyed by subscriber, so concurrent onboarding by different
/// subscribers never collides.
pub struct CommandService {
    cache: Arc<PriceCache>,
    database: Arc<DatabaseService>,
    drafts: DashMap<i64, PendingDraft>,
}

impl CommandService {
    pub fn new(cache: Arc<PriceCache>, database: Arc<DatabaseService>) -> Self {
        Self {
            cache,
            database,
            drafts: DashMap::new(),
        }
    }

    /// Begin adding a token: validate the address by resolving a quote and
    /// open a draft for this subscriber, replacing any earlier one.
    pub async fn start_subscription(
        &self,
        subscriber_id: i64,
        token_address: &str,
    ) -> Result<PendingDraft, WatchError> {
        let quote = self.cache.get(token_address).await?;

        let draft = PendingDraft {
            subscriber_id,
            token_address: token_address.to_string(),
            price: quote.price,
            market_cap: quote.market_cap,
            started_at: Utc::now().timestamp(),
        };
        self.drafts.insert(subscriber_id, draft.clone());
        Ok(draft)
    }

    /// Finish the add flow with the collected name and percent.
    ///
    /// An out-of-range percent (or a store cap violation) leaves the draft
    /// in place so the collaborator can re-prompt; the draft is consumed
    /// only on success.
    pub fn complete_subscription(
        &self,
        subscriber_id: i64,
        name: &str,
        percent: f64,
    ) -> Result<Subscription, WatchError> {
        let percent = validate_percent(percent)?;

        let draft = self
            .drafts
            .get(&subscriber_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                WatchError::InvalidInput("no subscription draft in progress".to_string())
            })?;

        let subscription = Subscription {
            subscriber_id,
            token_address: draft.token_address.clone(),
            name: name.trim().to_string(),
            alert_percent: percent,
            last_alerted_price: draft.price,
            last_alerted_market_cap: draft.market_cap,
        };
        self.database.upsert_subscription(&subscription)?;
        self.drafts.remove(&subscriber_id);

        info!(
            target: "COMMANDS",
            "Subscriber {} now tracks {} ({}) at {}%",
            subscriber_id, subscription.name, subscription.token_address, percent
        );
        Ok(subscription)
    }

    /// Abandon an in-progress add flow. Returns whether a draft existed.
    pub fn cancel_draft(&self, subscriber_id: i64) -> bool {
        self.drafts.remove(&subscriber_id).is_some()
    }

    /// Change the threshold of an existing subscription.
    pub fn edit_percent(
        &self,
        subscriber_id: i64,
        token_address: &str,
        percent: f64,
    ) -> Result<Subscription, WatchError> {
        let percent = validate_percent(percent)?;
        self.database
            .update_percent(subscriber_id, token_address, percent)
    }

    /// Remove one subscription by address, or all of them for `"all"`.
    ///
    /// Clearing an empty set is a no-op; removing a missing address is
    /// `NotFound`. Callers distinguish these for user messaging.
    pub fn remove_subscription(
        &self,
        subscriber_id: i64,
        target: &str,
    ) -> Result<RemoveOutcome, WatchError> {
        if target.eq_ignore_ascii_case("all") {
            let cleared = self.database.clear_subscriptions(subscriber_id)?;
            return Ok(RemoveOutcome::Cleared(cleared));
        }

        self.database
            .remove_subscription(subscriber_id, target)
            .map(RemoveOutcome::Removed)
    }

    /// All of a subscriber's subscriptions paired with the latest quote or
    /// its failure. Quote resolution fans out concurrently.
    pub async fn list_subscriptions(
        &self,
        subscriber_id: i64,
    ) -> Result<Vec<(Subscription, Result<Quote, WatchError>)>, WatchError> {
        let subscriptions = self.database.subscriptions_for(subscriber_id)?;

        let quotes = join_all(
            subscriptions
                .iter()
                .map(|sub| self.cache.get(&sub.token_address)),
        )
        .await;

        Ok(subscriptions.into_iter().zip(quotes).collect())
    }

    /// Count plus average 24h change over tokens with a known change.
    pub async fn subscriber_stats(
        &self,
        subscriber_id: i64,
    ) -> Result<SubscriberStats, WatchError> {
        let listed = self.list_subscriptions(subscriber_id).await?;
        let tracked = listed.len();

        let changes: Vec<f64> = listed
            .iter()
            .filter_map(|(_, quote)| quote.as_ref().ok().and_then(|q| q.price_change_24h))
            .collect();

        let average_change_24h = if changes.is_empty() {
            None
        } else {
            Some(changes.iter().sum::<f64>() / changes.len() as f64)
        };

        Ok(SubscriberStats {
            tracked,
            average_change_24h,
        })
    }
}
