//! Notification delivery (Telegram) and user-facing message formatting

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::WatchError;
use crate::modules::evaluator::Evaluation;
use crate::modules::price_source::Quote;
use crate::utils::database::Subscription;

/// Sink accepting (recipient, message) pairs.
///
/// Delivery is at-least-once: implementations log failures instead of
/// propagating them, and callers never block the sweep on delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message to one subscriber.
    async fn notify(&self, subscriber_id: i64, message: &str);

    /// Diagnostic channel for operators, separate from subscriber-facing text.
    async fn notify_admin(&self, message: &str);
}

/// Notifier posting to the Telegram Bot API.
///
/// Without a bot token it degrades to structured log output, so the engine
/// runs unchanged in development.
pub struct TelegramNotifier {
    client: Option<reqwest::Client>,
    bot_token: Option<String>,
    admin_chat_id: Option<i64>,
}

impl TelegramNotifier {
    pub fn new(config: &Config) -> Self {
        let client = config
            .telegram_bot_token
            .is_some()
            .then(reqwest::Client::new);

        if client.is_some() {
            info!(target: "ALERTS", "Telegram delivery initialized");
        } else {
            warn!(target: "ALERTS", "TELEGRAM_BOT_TOKEN not set, alerts will only be logged");
        }

        Self {
            client,
            bot_token: config.telegram_bot_token.clone(),
            admin_chat_id: config.admin_chat_id,
        }
    }

    async fn send(&self, chat_id: i64, text: &str) {
        let (Some(client), Some(token)) = (&self.client, &self.bot_token) else {
            info!(target: "ALERTS", "[chat {}] {}", chat_id, text);
            return;
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
        let params = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        if let Err(e) = client.post(&url).json(&params).send().await {
            error!(target: "ALERTS", "Telegram send failed for chat {}: {}", chat_id, e);
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, subscriber_id: i64, message: &str) {
        self.send(subscriber_id, message).await;
    }

    async fn notify_admin(&self, message: &str) {
        match self.admin_chat_id {
            Some(chat_id) => self.send(chat_id, message).await,
            None => warn!(target: "ALERTS", "admin notice (no ADMIN_CHAT_ID): {}", message),
        }
    }
}

// ============================================
// MESSAGE FORMATTING
// ============================================

pub fn chart_url(token_address: &str) -> String {
    format!("https://dexscreener.com/solana/{}", token_address)
}

/// Alert text for a fired threshold: direction, magnitude, new price and
/// market cap, plus a chart link.
pub fn format_alert(subscription: &Subscription, evaluation: &Evaluation, quote: &Quote) -> String {
    format!(
        "{} Price of <b>{}</b> {} by <b>{:.2}%</b>!\n\
         Price: <b>${:.6}</b>\n\
         Market Cap: <b>${}</b>\n\n\
         <a href='{}'><i>Chart on Dexscreener</i></a>",
        evaluation.direction.emoji(),
        subscription.name,
        evaluation.direction.as_str(),
        evaluation.change_percent,
        quote.price,
        format_usd(quote.market_cap),
        chart_url(&subscription.token_address),
    )
}

/// Subscriber-facing text for a failed quote resolution.
pub fn format_failure(name: &str, token_address: &str, error: &WatchError) -> String {
    format!(
        "\u{274C} Error for <b>{}</b> (<code>{}</code>): <i>{}</i>",
        name, token_address, error
    )
}

/// Group a dollar amount with thousands separators, two decimal places.
pub fn format_usd(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}.{:02}", grouped, frac)
}
