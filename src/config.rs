//! Configuration module for TokenWatch

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Upstream market data
    pub api_base_url: String,
    pub fetch_timeout_secs: u64,
    pub fetch_max_attempts: u32,

    // Durable store
    pub database_path: String,

    // Quote cache
    pub cache_ttl_secs: i64,

    // Subscriptions
    pub max_tracked_tokens: usize,

    // Monitor loop
    pub sweep_interval_secs: u64,
    pub sweep_initial_delay_secs: u64,

    // Telegram delivery
    pub telegram_bot_token: Option<String>,
    pub admin_chat_id: Option<i64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            api_base_url: env::var("DEXSCREENER_API_URL")
                .unwrap_or_else(|_| "https://api.dexscreener.com/latest/dex/tokens".to_string()),
            fetch_timeout_secs: env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            fetch_max_attempts: env::var("FETCH_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/tokenwatch.db".to_string()),

            // a negative TTL would make every cache read stale
            cache_ttl_secs: env::var("CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .map(|ttl| ttl.max(0))
                .unwrap_or(300),

            max_tracked_tokens: env::var("MAX_TRACKED_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),

            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            sweep_initial_delay_secs: env::var("SWEEP_INITIAL_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),

            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            admin_chat_id: env::var("ADMIN_CHAT_ID").ok().and_then(|v| v.parse().ok()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
