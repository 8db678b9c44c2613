use crate::types::{CycleResult, MarketPhase, OrderSide, Side};

/// Telegram Bot API client. Persistent connection pool via reqwest.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    url: String,
    chat_id: String,
    asset_label: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str, chat_id: &str, asset_label: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("https://api.telegram.org/bot{}/sendMessage", bot_token),
            chat_id: chat_id.to_string(),
            asset_label: asset_label.to_string(),
        }
    }

    /// Send with HTML parse mode (for formatted messages).
    async fn send_html(&self, text: &str) {
        match self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "chat_id": &self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
        {
            Ok(resp) => {
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    eprintln!("[TG] send failed: {status} — {body}");
                }
            }
            Err(e) => eprintln!("[TG] request error: {e}"),
        }
    }

    /// Send plain text (no parse mode — safe for arbitrary strings, e.g. error text).
    pub async fn send_plain(&self, text: &str) {
        match self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "chat_id": &self.chat_id, "text": text }))
            .send()
            .await
        {
            Ok(resp) => {
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    eprintln!("[TG] send failed: {status} — {body}");
                }
            }
            Err(e) => eprintln!("[TG] request error: {e}"),
        }
    }

    pub async fn send_ladder_placed(&self, event_slug: &str, count: usize) {
        let text = format!("🪜 {}: ladder placed, {} rungs live", event_slug, count);
        self.send_plain(&text).await;
    }

    pub async fn send_fill(&self, event_slug: &str, side: Side, order_side: OrderSide, price: f64, size: f64) {
        let emoji = match order_side {
            OrderSide::Buy => "🟢",
            OrderSide::Sell => "💰",
        };
        let text = format!(
            "{} {} {} {} {:.4} @ ${:.2} ({})",
            emoji, self.asset_label, event_slug, side, size, price, order_side
        );
        self.send_plain(&text).await;
    }

    pub async fn send_dust_dropped(&self, event_slug: &str, side: Side, size: f64, exit_price: f64) {
        let text = format!("🧹 {event_slug}: {side} dust dropped, {size:.4} shares @ exit ${exit_price:.2}");
        self.send_plain(&text).await;
    }

    pub async fn send_phase_transition(&self, event_slug: &str, phase: MarketPhase) {
        let label = match phase {
            MarketPhase::PreMarket => "PRE_MARKET",
            MarketPhase::Live => "LIVE",
            MarketPhase::Ended => "ENDED",
        };
        let text = format!("🚦 {event_slug}: phase → {label}");
        self.send_html(&text).await;
    }

    pub async fn send_cycle_report(&self, event_slug: &str, cycle: &CycleResult) {
        let text = format!(
            "🏁 Event complete: <code>{}</code>\n\
             Fills YES: {} | Fills NO: {}\n\
             Total PnL: ${:.2}\n\
             Duration: {}s",
            event_slug,
            cycle.fills_yes.len(),
            cycle.fills_no.len(),
            cycle.total_pnl,
            (cycle.end_time_ms - cycle.start_time_ms).max(0) / 1000,
        );
        self.send_html(&text).await;
    }

    pub async fn send_error_alert(&self, context: &str, message: &str) {
        let text = format!("🚨 {} ERROR [{}]: {}", self.asset_label, context, message);
        self.send_plain(&text).await;
    }
}
