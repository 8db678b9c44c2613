use std::collections::HashMap;

use crate::types::price_to_ticks;

/// Configuration loaded from environment variables. All strategy constants have
/// production defaults baked in so the bot runs unconfigured in dry-run mode.
#[derive(Clone)]
pub struct Config {
    // Gamma API / event discovery
    pub gamma_api_url: String,
    pub series_id: String,
    pub scanner_interval_secs: u64,
    pub max_concurrent_events: usize,

    // Credentials
    pub private_key: Option<String>,
    pub funder_address: Option<String>,
    pub clob_api_key: Option<String>,
    pub clob_api_secret: Option<String>,
    pub clob_api_passphrase: Option<String>,

    // Telegram
    pub tg_bot_token: Option<String>,
    pub tg_chat_id: Option<String>,

    // Ladder / exit table
    pub ladder_levels: Vec<f64>,
    pub exit_prices: HashMap<i64, f64>,
    pub fallback_exit_price: f64,
    pub order_size: f64,

    // Stop-loss
    pub stop_loss_price: f64,
    pub stop_loss_entries: Vec<f64>,

    // Exchange constants
    pub min_notional: f64,
    pub min_shares: f64,
    pub spam_bid_floor: f64,
    pub stop_loss_tick: f64,

    // Fill detection
    pub high_priority_price_threshold: f64,
    pub api_fail_alert_threshold: u32,

    // Pending-sell queue
    pub pending_sell_settlement_cap: u32,
    pub pending_sell_balance_cap: u32,

    // Reload cap (design note §9 — unbounded order flow guard)
    pub max_reloads_per_rung: u32,

    // Sell retry
    pub sell_retry_attempts: u32,
    pub sell_retry_delay_ms: u64,

    // Loop cadence
    pub poll_interval_ms: u64,
    pub heartbeat_interval_secs: u64,

    // Health endpoint
    pub port: u16,

    // Mode
    pub dry_run: bool,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        let order_size = env_parse("ORDER_SIZE", 30.0);
        let ladder_levels = env_ladder_levels();
        let fallback_exit_price = env_parse("FALLBACK_EXIT_PRICE", 0.49);
        let exit_prices = env_exit_prices(&ladder_levels, fallback_exit_price);
        let stop_loss_entries = env_csv_f64("STOP_LOSS_ENTRIES", vec![0.48]);

        Self {
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| "https://gamma-api.polymarket.com".into()),
            series_id: std::env::var("SERIES_ID").unwrap_or_else(|_| "10114".into()),
            scanner_interval_secs: env_parse("SCANNER_INTERVAL_SECONDS", 60),
            max_concurrent_events: env_parse("MAX_CONCURRENT_EVENTS", 4),

            private_key: std::env::var("PRIVATE_KEY").ok(),
            funder_address: std::env::var("FUNDER_ADDRESS").ok(),
            clob_api_key: std::env::var("CLOB_API_KEY").ok(),
            clob_api_secret: std::env::var("CLOB_API_SECRET").ok(),
            clob_api_passphrase: std::env::var("CLOB_API_PASSPHRASE").ok(),

            tg_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            tg_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),

            ladder_levels,
            exit_prices,
            fallback_exit_price,
            order_size,

            stop_loss_price: env_parse("STOP_LOSS_PRICE", 0.18),
            stop_loss_entries,

            min_notional: env_parse("MIN_NOTIONAL", 1.00),
            min_shares: env_parse("MIN_SHARES", 6.0),
            spam_bid_floor: env_parse("SPAM_BID_FLOOR", 0.10),
            stop_loss_tick: env_parse("STOP_LOSS_TICK", 0.01),

            high_priority_price_threshold: env_parse("HIGH_PRIORITY_PRICE_THRESHOLD", 0.46),
            api_fail_alert_threshold: env_parse("API_FAIL_ALERT_THRESHOLD", 20),

            pending_sell_settlement_cap: env_parse("PENDING_SELL_SETTLEMENT_CAP", 60),
            pending_sell_balance_cap: env_parse("PENDING_SELL_BALANCE_CAP", 10),

            max_reloads_per_rung: env_parse("MAX_RELOADS_PER_RUNG", 20),

            sell_retry_attempts: env_parse("SELL_RETRY_ATTEMPTS", 3),
            sell_retry_delay_ms: env_parse("SELL_RETRY_DELAY_MS", 100),

            poll_interval_ms: env_parse("POLL_INTERVAL_MS", 500),
            heartbeat_interval_secs: env_parse("HEARTBEAT_INTERVAL_SECONDS", 60),

            port: env_parse("PORT", 8080),

            dry_run: std::env::var("DRY_RUN")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(true),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }

    /// Slug prefix is unused for the 1h BTC market — see `market::discovery::generate_slug`,
    /// which builds the human-readable ET slug directly rather than a unix-ts suffix.
    pub fn asset_label(&self) -> &'static str {
        "BTC"
    }

    pub fn min_lot_size(&self, exit_price: f64) -> f64 {
        let notional_floor = (self.min_notional / exit_price).ceil() * 1.01;
        self.min_shares.max(notional_floor)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_csv_f64(key: &str, default: Vec<f64>) -> Vec<f64> {
    match std::env::var(key) {
        Ok(s) => s.split(',').filter_map(|p| p.trim().parse().ok()).collect(),
        Err(_) => default,
    }
}

/// Default ladder: 0.40..=0.48 in 1c steps, unless overridden via LADDER_LEVELS csv.
fn env_ladder_levels() -> Vec<f64> {
    match std::env::var("LADDER_LEVELS") {
        Ok(s) => s.split(',').filter_map(|p| p.trim().parse().ok()).collect(),
        Err(_) => (40..=48).map(|c| c as f64 / 100.0).collect(),
    }
}

/// Default exit table: entries below 0.46 exit at 0.47; 0.46/0.47 exit at 0.48; 0.48
/// exits at 0.49 (the fragile top rung, also the only stop-loss-protected entry).
fn env_exit_prices(ladder_levels: &[f64], fallback: f64) -> HashMap<i64, f64> {
    if let Ok(s) = std::env::var("EXIT_PRICES") {
        // "0.40:0.47,0.44:0.47,0.46:0.48,0.48:0.49"
        let mut table = HashMap::new();
        for pair in s.split(',') {
            if let Some((k, v)) = pair.split_once(':') {
                if let (Ok(k), Ok(v)) = (k.trim().parse::<f64>(), v.trim().parse::<f64>()) {
                    table.insert(price_to_ticks(k), v);
                }
            }
        }
        return table;
    }

    let mut table = HashMap::new();
    for &level in ladder_levels {
        let exit = if level < 0.46 {
            0.47
        } else if level < 0.48 {
            0.48
        } else {
            fallback
        };
        table.insert(price_to_ticks(level), exit);
    }
    table
}
