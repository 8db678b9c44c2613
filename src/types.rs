use std::collections::HashMap;

/// Outcome token side. The exchange calls these YES/NO; this system's market is always
/// framed as "price goes up" (YES) vs "price goes down" (NO) for the hourly BTC event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Yes,
    No,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Exchange-reported order status, mapped from whatever strings the CLOB actually returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Live,
    Matched,
    Cancelled,
    Invalid,
    Expired,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal_without_fill(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Invalid | OrderStatus::Expired | OrderStatus::Rejected
        )
    }
}

/// A single order the engine has placed and is tracking against the exchange's
/// last-observed state. `processed_size` only ever grows — see `apply_size_matched`.
#[derive(Clone, Debug)]
pub struct TrackedOrder {
    pub order_id: String,
    pub token_id: String,
    pub side: Side,
    pub order_side: OrderSide,
    pub price: f64,
    pub original_size: f64,
    pub processed_size: f64,
    pub event_slug: String,
    pub placed_at_ms: i64,
    pub entry_price: Option<f64>,
    pub terminal: bool,
    pub api_fail_count: u32,
}

impl TrackedOrder {
    pub fn new(
        order_id: String,
        token_id: String,
        side: Side,
        order_side: OrderSide,
        price: f64,
        size: f64,
        event_slug: String,
        placed_at_ms: i64,
    ) -> Self {
        Self {
            order_id,
            token_id,
            side,
            order_side,
            price,
            original_size: size,
            processed_size: 0.0,
            event_slug,
            placed_at_ms,
            entry_price: None,
            terminal: false,
            api_fail_count: 0,
        }
    }

    /// Applies an exchange-observed `size_matched`, returning the fill delta if any.
    /// Never decreases `processed_size` — a stale read reporting less than what we've
    /// already recorded is ignored, not subtracted.
    pub fn apply_size_matched(&mut self, size_matched: f64) -> f64 {
        const EPS: f64 = 1e-6;
        let delta = size_matched - self.processed_size;
        if delta > EPS {
            self.processed_size = size_matched;
            delta
        } else {
            0.0
        }
    }

    pub fn is_fully_filled(&self) -> bool {
        self.processed_size >= self.original_size - 1e-6
    }
}

/// An open exposure created on buy fill, removed when the matching sell fills.
#[derive(Clone, Debug)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub token_id: String,
    pub event_slug: String,
    pub entry_time_ms: i64,
}

#[derive(Clone, Debug)]
pub struct Fill {
    pub price: f64,
    pub size: f64,
    pub ts_ms: i64,
}

/// Per-event aggregate result, stamped at completion.
#[derive(Clone, Debug, Default)]
pub struct CycleResult {
    pub fills_yes: Vec<Fill>,
    pub fills_no: Vec<Fill>,
    pub total_pnl: f64,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
}

/// Key for the Fill Accumulator. Must include `exit_price` — two ladder rungs on the
/// same outcome can map to different exit targets and must never be merged.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccumulatorKey {
    pub event_slug: String,
    pub side: Side,
    pub token_id: String,
    pub exit_price_ticks: i64,
}

impl AccumulatorKey {
    pub fn new(event_slug: &str, side: Side, token_id: &str, exit_price: f64) -> Self {
        Self {
            event_slug: event_slug.to_string(),
            side,
            token_id: token_id.to_string(),
            exit_price_ticks: price_to_ticks(exit_price),
        }
    }

    pub fn exit_price(&self) -> f64 {
        ticks_to_price(self.exit_price_ticks)
    }
}

#[derive(Clone, Debug, Default)]
pub struct AccumulatorEntry {
    pub size: f64,
    pub total_entry_value: f64,
}

impl AccumulatorEntry {
    pub fn add(&mut self, delta_size: f64, delta_entry_price: f64) {
        self.size += delta_size;
        self.total_entry_value += delta_size * delta_entry_price;
    }

    pub fn avg_entry(&self) -> f64 {
        if self.size <= 0.0 {
            0.0
        } else {
            self.total_entry_value / self.size
        }
    }

    pub fn reset(&mut self) {
        self.size = 0.0;
        self.total_entry_value = 0.0;
    }
}

/// A sell placement that failed and is retried once per orchestrator tick.
#[derive(Clone, Debug)]
pub struct PendingSell {
    pub token_id: String,
    pub side: Side,
    pub exit_price: f64,
    pub size: f64,
    pub event_slug: String,
    pub entry_price: f64,
    pub attempts: u32,
    /// Set once we've observed balance == 0 (settlement-delay branch), which is counted
    /// against a longer cap than balance-sufficient-but-still-failing retries.
    pub settlement_wait: bool,
}

/// Per-event strategy state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyState {
    Accumulating,
    Exiting,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketPhase {
    PreMarket,
    Live,
    Ended,
}

/// Metadata + live bookkeeping for one discovered hourly event.
#[derive(Clone, Debug)]
pub struct EventContext {
    pub slug: String,
    pub condition_id: String,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub phase: MarketPhase,
    pub yes_bid: Option<f64>,
    pub no_bid: Option<f64>,
}

impl EventContext {
    pub fn update_phase(&mut self, now_ms: i64) {
        self.phase = if now_ms < self.start_ms {
            MarketPhase::PreMarket
        } else if now_ms < self.end_ms {
            MarketPhase::Live
        } else {
            MarketPhase::Ended
        };
    }

    pub fn time_until_start_ms(&self, now_ms: i64) -> i64 {
        self.start_ms - now_ms
    }

    pub fn token_id(&self, side: Side) -> &str {
        match side {
            Side::Yes => &self.yes_token_id,
            Side::No => &self.no_token_id,
        }
    }

    pub fn best_bid(&self, side: Side) -> Option<f64> {
        match side {
            Side::Yes => self.yes_bid,
            Side::No => self.no_bid,
        }
    }
}

/// Raw order-book snapshot as returned by the exchange: bids/asks are NOT assumed sorted.
#[derive(Clone, Debug, Default)]
pub struct OrderBook {
    pub bids: Vec<(f64, f64)>, // (price, size)
    pub asks: Vec<(f64, f64)>,
}

impl OrderBook {
    /// Best bid filtered by a spam floor — quotes below 0.10 are treated as noise.
    pub fn best_bid(&self, spam_floor: f64) -> Option<f64> {
        self.bids
            .iter()
            .map(|(p, _)| *p)
            .filter(|p| *p >= spam_floor)
            .fold(None, |acc, p| match acc {
                None => Some(p),
                Some(m) if p > m => Some(p),
                Some(m) => Some(m),
            })
    }
}

/// Minimal view of an exchange order record, as returned by `get_order`/`get_open_orders`.
#[derive(Clone, Debug)]
pub struct ExchangeOrder {
    pub order_id: String,
    pub asset_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub original_size: f64,
    pub size_matched: f64,
    pub status: OrderStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("transient exchange error: {0}")]
    Transient(String),
    #[error("semantic exchange error: {0}")]
    Semantic(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Ladder price → exit price table lookup. Queries miss only on a ladder/table
/// inconsistency, in which case the caller falls back to a conservative default.
pub fn exit_price_for(table: &HashMap<i64, f64>, entry_price: f64, fallback_max: f64) -> (f64, bool) {
    let key = price_to_ticks(entry_price);
    match table.get(&key) {
        Some(p) => (*p, false),
        None => (fallback_max, true),
    }
}

/// Quantises a dollar price to integer ticks (1¢ = 1 tick) to defend against float drift
/// when using a price as a hash-map key.
pub fn price_to_ticks(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

pub fn ticks_to_price(ticks: i64) -> f64 {
    ticks as f64 / 100.0
}
