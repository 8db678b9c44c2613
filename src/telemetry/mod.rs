pub mod telegram;
pub mod writer;

use crate::config::Config;
use crate::types::{CycleResult, MarketPhase, OrderSide, Side};
use telegram::TelegramClient;

/// One durable record of something the engine did, sent to the telemetry writer task.
/// Kept separate from the Notifier facade: every event is logged to CSV regardless of
/// whether Telegram is configured, but only a subset also raises an alert.
#[derive(Clone, Debug)]
pub enum TelemetryEvent {
    OrderPlaced { event_slug: String, token_id: String, side: Side, order_side: OrderSide, price: f64, size: f64 },
    Fill { event_slug: String, side: Side, order_side: OrderSide, price: f64, size: f64 },
    DustDropped { event_slug: String, side: Side, size: f64, exit_price: f64 },
    PhaseTransition { event_slug: String, phase: MarketPhase },
    CycleReport { event_slug: String, cycle: CycleResult },
    ErrorAlert { context: String, message: String },
}

/// Best-effort alerting facade. Disabled (no-op) when Telegram credentials aren't
/// configured — every call site can fire-and-forget without checking first.
#[derive(Clone)]
pub struct Notifier {
    client: Option<TelegramClient>,
}

impl Notifier {
    pub fn from_config(config: &Config) -> Self {
        let client = match (&config.tg_bot_token, &config.tg_chat_id) {
            (Some(token), Some(chat_id)) => Some(TelegramClient::new(token, chat_id, config.asset_label())),
            _ => None,
        };
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn send(&self, text: &str) {
        if let Some(c) = &self.client {
            c.send_plain(text).await;
        } else {
            eprintln!("[NOTIFY] (disabled) {text}");
        }
    }

    pub async fn ladder_placed(&self, event_slug: &str, count: usize) {
        if let Some(c) = &self.client {
            c.send_ladder_placed(event_slug, count).await;
        }
    }

    pub async fn fill(&self, event_slug: &str, side: Side, order_side: OrderSide, price: f64, size: f64) {
        if let Some(c) = &self.client {
            c.send_fill(event_slug, side, order_side, price, size).await;
        }
    }

    pub async fn dust_dropped(&self, event_slug: &str, side: Side, size: f64, exit_price: f64) {
        if let Some(c) = &self.client {
            c.send_dust_dropped(event_slug, side, size, exit_price).await;
        }
    }

    pub async fn phase_transition(&self, event_slug: &str, phase: MarketPhase) {
        if let Some(c) = &self.client {
            c.send_phase_transition(event_slug, phase).await;
        }
    }

    pub async fn cycle_report(&self, event_slug: &str, cycle: &CycleResult) {
        if let Some(c) = &self.client {
            c.send_cycle_report(event_slug, cycle).await;
        }
    }

    pub async fn error_alert(&self, context: &str, message: &str) {
        eprintln!("[ERROR] [{context}] {message}");
        if let Some(c) = &self.client {
            c.send_error_alert(context, message).await;
        }
    }
}
