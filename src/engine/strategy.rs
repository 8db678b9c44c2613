use std::collections::HashMap;

use crate::config::Config;
use crate::engine::accumulator::FillAccumulator;
use crate::engine::pending::{retry_pending_sell, PendingSellOutcome};
use crate::engine::stop_loss::{check_stop_loss, StopLossAction};
use crate::engine::tracker::OrderTracker;
use crate::exchange::ExchangeClient;
use crate::telemetry::Notifier;
use crate::types::{
    price_to_ticks, AccumulatorKey, CycleResult, ExchangeError, ExchangeOrder, Fill, OrderSide,
    OrderStatus, PendingSell, Position, Side, StrategyState, TrackedOrder,
};

/// Per-event state machine driving ladder placement, fill reconciliation, the LIVE
/// transition, and completion detection. Exclusively owns all per-event collections —
/// Tracked Orders, Accumulator entries, Pending Sells, open Positions.
pub struct StrategyEngine {
    pub event_slug: String,
    config: Config,
    pub state: StrategyState,
    tracker: OrderTracker,
    accumulator: FillAccumulator,
    pending: Vec<PendingSell>,
    positions: Vec<Position>,
    cycle: CycleResult,
    reload_counts: HashMap<(Side, i64), u32>,
}

impl StrategyEngine {
    pub fn new(event_slug: String, config: Config) -> Self {
        Self {
            event_slug,
            config,
            state: StrategyState::Accumulating,
            tracker: OrderTracker::new(),
            accumulator: FillAccumulator::new(),
            pending: Vec::new(),
            positions: Vec::new(),
            cycle: CycleResult::default(),
            reload_counts: HashMap::new(),
        }
    }

    pub fn open_sell_count(&self) -> usize {
        self.tracker.non_terminal_sells().count()
    }

    pub fn tracked_order_count(&self) -> usize {
        self.tracker.len()
    }

    /// Recovers exchange state if any exists for this event, otherwise places the full
    /// ladder. Rejects any call for an event not in PRE_MARKET as a fatal logic error.
    pub async fn initialize_event(
        &mut self,
        event: &crate::types::EventContext,
        exchange: &dyn ExchangeClient,
    ) -> Result<usize, ExchangeError> {
        if event.phase != crate::types::MarketPhase::PreMarket {
            eprintln!("[STRATEGY] initialize_event({}) called outside PRE_MARKET, rejecting", self.event_slug);
            return Err(ExchangeError::Semantic("initialize_event requires PRE_MARKET".into()));
        }

        let open_ids = exchange.get_open_order_ids().await?;
        let mut recovered = 0usize;
        for id in &open_ids {
            if let Some(order) = exchange.get_order(id).await? {
                if order.asset_id == event.yes_token_id || order.asset_id == event.no_token_id {
                    let side = if order.asset_id == event.yes_token_id { Side::Yes } else { Side::No };
                    let mut tracked = TrackedOrder::new(
                        order.order_id.clone(),
                        order.asset_id.clone(),
                        side,
                        order.side,
                        order.price,
                        order.original_size,
                        self.event_slug.clone(),
                        chrono::Utc::now().timestamp_millis(),
                    );
                    tracked.processed_size = order.size_matched;
                    self.tracker.insert(tracked);
                    recovered += 1;
                }
            }
        }

        if recovered > 0 {
            eprintln!("[STRATEGY] {} recovered {} open orders, skipping ladder", self.event_slug, recovered);
            return Ok(recovered);
        }

        let mut placed = 0usize;
        for &side in &[Side::Yes, Side::No] {
            let token_id = event.token_id(side).to_string();
            for &price in &self.config.ladder_levels {
                match exchange
                    .place_limit_order(&token_id, OrderSide::Buy, price, self.config.order_size, &self.event_slug)
                    .await
                {
                    Ok(p) => {
                        let mut order = TrackedOrder::new(
                            p.order_id,
                            token_id.clone(),
                            side,
                            OrderSide::Buy,
                            price,
                            self.config.order_size,
                            self.event_slug.clone(),
                            chrono::Utc::now().timestamp_millis(),
                        );
                        order.processed_size = p.size_matched_on_submit;
                        self.tracker.insert(order);
                        placed += 1;
                    }
                    Err(e) => {
                        eprintln!("[STRATEGY] rung {side} @ {price:.2} failed to place: {e} (best-effort, no retry)");
                    }
                }
            }
        }
        eprintln!("[STRATEGY] {} placed {} ladder orders", self.event_slug, placed);
        Ok(0)
    }

    /// Called every poll tick with the exchange's open-order-id snapshot, shared across
    /// events to amortise one API call.
    pub async fn check_fills(
        &mut self,
        event: &crate::types::EventContext,
        open_order_ids: &[String],
        exchange: &dyn ExchangeClient,
        notifier: &Notifier,
    ) -> Result<(), ExchangeError> {
        let buy_ids = self.tracker.non_terminal_buy_ids();
        for order_id in buy_ids {
            let price = self.tracker.get(&order_id).map(|o| o.price).unwrap_or(0.0);
            let high_priority = price >= self.config.high_priority_price_threshold;
            let absent = !open_order_ids.iter().any(|id| id == &order_id);
            if !absent && !high_priority {
                continue;
            }

            match exchange.get_order(&order_id).await {
                Ok(Some(raw)) => {
                    if let Some(order) = self.tracker.get_mut(&order_id) {
                        order.api_fail_count = 0;
                    }
                    self.reconcile_buy(event, &order_id, &raw, exchange, notifier).await?;
                }
                Ok(None) => {
                    // Absent everywhere: treat conservatively, bump fail counter.
                    self.bump_fail_counter(&order_id, notifier).await;
                }
                Err(e) => {
                    eprintln!("[STRATEGY] get_order({order_id}) failed: {e}");
                    self.bump_fail_counter(&order_id, notifier).await;
                }
            }
        }

        let sell_ids: Vec<String> = self.tracker.non_terminal_sells().map(|o| o.order_id.clone()).collect();
        for order_id in sell_ids {
            let absent = !open_order_ids.iter().any(|id| id == &order_id);
            if !absent {
                continue;
            }
            if let Ok(Some(raw)) = exchange.get_order(&order_id).await {
                self.reconcile_sell(event, &order_id, &raw, exchange, notifier).await?;
            }
        }

        Ok(())
    }

    async fn bump_fail_counter(&mut self, order_id: &str, notifier: &Notifier) {
        if let Some(order) = self.tracker.get_mut(order_id) {
            order.api_fail_count += 1;
            if order.api_fail_count == self.config.api_fail_alert_threshold {
                notifier
                    .send(&format!(
                        "[{}] order {} unreachable for {} consecutive polls",
                        self.event_slug, order_id, order.api_fail_count
                    ))
                    .await;
            }
        }
    }

    async fn reconcile_buy(
        &mut self,
        event: &crate::types::EventContext,
        order_id: &str,
        raw: &ExchangeOrder,
        exchange: &dyn ExchangeClient,
        notifier: &Notifier,
    ) -> Result<(), ExchangeError> {
        let (delta, price, side, token_id) = {
            let order = match self.tracker.get_mut(order_id) {
                Some(o) => o,
                None => return Ok(()),
            };
            let delta = order.apply_size_matched(raw.size_matched);
            let done = raw.size_matched >= order.original_size - 1e-6
                || matches!(raw.status, OrderStatus::Matched | OrderStatus::Cancelled);
            let dropped = raw.status.is_terminal_without_fill() && raw.size_matched < 1e-9;
            if done || dropped {
                order.terminal = true;
            }
            (delta, order.price, order.side, order.token_id.clone())
        };

        if delta > 1e-6 {
            self.process_buy_fill(event, price, side, &token_id, delta, exchange, notifier).await?;
        }
        Ok(())
    }

    async fn process_buy_fill(
        &mut self,
        event: &crate::types::EventContext,
        entry_price: f64,
        side: Side,
        token_id: &str,
        delta: f64,
        exchange: &dyn ExchangeClient,
        notifier: &Notifier,
    ) -> Result<(), ExchangeError> {
        let (exit_price, missed) =
            crate::types::exit_price_for(&self.config.exit_prices, entry_price, self.config.fallback_exit_price);
        if missed {
            eprintln!("[STRATEGY] WARN: exit price miss for entry {entry_price:.2}, using fallback {exit_price:.2}");
        }

        self.positions.push(Position {
            side,
            entry_price,
            size: delta,
            token_id: token_id.to_string(),
            event_slug: self.event_slug.clone(),
            entry_time_ms: chrono::Utc::now().timestamp_millis(),
        });
        let fill = Fill { price: entry_price, size: delta, ts_ms: chrono::Utc::now().timestamp_millis() };
        match side {
            Side::Yes => self.cycle.fills_yes.push(fill),
            Side::No => self.cycle.fills_no.push(fill),
        }

        let key = AccumulatorKey::new(&self.event_slug, side, token_id, exit_price);
        let entry = self.accumulator.add(key.clone(), delta, entry_price);
        let min_lot = self.config.min_lot_size(exit_price);

        if entry.size + 1e-9 < min_lot {
            return Ok(());
        }

        let avg_entry = entry.avg_entry();
        let mut sell_size = entry.size;

        let balance = exchange.get_token_balance(token_id).await?;
        let reserved: f64 = self
            .tracker
            .non_terminal_sells()
            .filter(|o| o.token_id == token_id)
            .map(|o| o.original_size - o.processed_size)
            .sum();
        let available = (balance - reserved).max(0.0);

        if available < sell_size {
            if available >= min_lot {
                sell_size = available;
            } else {
                // Leave the accumulator intact, try again on the next fill.
                return Ok(());
            }
        }

        match exchange.place_limit_order(token_id, OrderSide::Sell, exit_price, sell_size, &self.event_slug).await {
            Ok(placed) => {
                let mut order = TrackedOrder::new(
                    placed.order_id,
                    token_id.to_string(),
                    side,
                    OrderSide::Sell,
                    exit_price,
                    sell_size,
                    self.event_slug.clone(),
                    chrono::Utc::now().timestamp_millis(),
                );
                order.entry_price = Some(avg_entry);
                order.processed_size = placed.size_matched_on_submit;
                self.tracker.insert(order);
                self.accumulator.reset(&key);
                eprintln!("[STRATEGY] {} SELL posted {side} size={sell_size:.4} @ {exit_price:.2} (entry {avg_entry:.2})", self.event_slug);
            }
            Err(e) => {
                eprintln!("[STRATEGY] sell placement failed, enqueueing pending: {e}");
                self.pending.push(PendingSell {
                    token_id: token_id.to_string(),
                    side,
                    exit_price,
                    size: sell_size,
                    event_slug: self.event_slug.clone(),
                    entry_price: avg_entry,
                    attempts: 1,
                    settlement_wait: false,
                });
                self.accumulator.reset(&key);
            }
        }
        let _ = event;
        let _ = notifier;
        Ok(())
    }

    async fn reconcile_sell(
        &mut self,
        event: &crate::types::EventContext,
        order_id: &str,
        raw: &ExchangeOrder,
        exchange: &dyn ExchangeClient,
        notifier: &Notifier,
    ) -> Result<(), ExchangeError> {
        let (delta, entry_price, side, order_price) = {
            let order = match self.tracker.get_mut(order_id) {
                Some(o) => o,
                None => return Ok(()),
            };
            let delta = order.apply_size_matched(raw.size_matched);
            let done = raw.size_matched >= order.original_size - 1e-6
                || matches!(raw.status, OrderStatus::Matched | OrderStatus::Cancelled);
            if done {
                order.terminal = true;
            }
            (delta, order.entry_price.unwrap_or(order.price), order.side, order.price)
        };

        if delta > 1e-6 {
            let is_stop_loss = (order_price - self.config.stop_loss_tick).abs() < 1e-6;
            self.process_sell_fill(event, order_id, entry_price, side, order_price, delta, is_stop_loss, exchange).await?;
        }
        let _ = notifier;
        Ok(())
    }

    async fn process_sell_fill(
        &mut self,
        event: &crate::types::EventContext,
        order_id: &str,
        entry_price: f64,
        side: Side,
        sell_price: f64,
        filled_size: f64,
        is_stop_loss: bool,
        exchange: &dyn ExchangeClient,
    ) -> Result<(), ExchangeError> {
        let pnl = (sell_price - entry_price) * filled_size;
        self.cycle.total_pnl += pnl;

        if let Some(sibling) = self.tracker.find_sibling_sell(order_id, side, entry_price) {
            let sibling_id = sibling.order_id.clone();
            let _ = exchange.cancel_order(&sibling_id).await;
            self.tracker.mark_terminal(&sibling_id);
        }

        const TOL: f64 = 1e-3;
        self.positions
            .retain(|p| !(p.side == side && (p.entry_price - entry_price).abs() < TOL));

        if self.state == StrategyState::Accumulating && !is_stop_loss {
            let rung_key = (side, price_to_ticks(entry_price));
            let reloads = self.reload_counts.entry(rung_key).or_insert(0);
            if *reloads < self.config.max_reloads_per_rung {
                *reloads += 1;
                let token_id = event.token_id(side).to_string();
                match exchange
                    .place_limit_order(&token_id, OrderSide::Buy, entry_price, self.config.order_size, &self.event_slug)
                    .await
                {
                    Ok(placed) => {
                        let mut order = TrackedOrder::new(
                            placed.order_id,
                            token_id,
                            side,
                            OrderSide::Buy,
                            entry_price,
                            self.config.order_size,
                            self.event_slug.clone(),
                            chrono::Utc::now().timestamp_millis(),
                        );
                        order.processed_size = placed.size_matched_on_submit;
                        self.tracker.insert(order);
                    }
                    Err(e) => eprintln!("[STRATEGY] reload BUY failed (best-effort): {e}"),
                }
            } else {
                eprintln!("[STRATEGY] reload cap ({}) reached for {side} @ {entry_price:.2}, skipping", self.config.max_reloads_per_rung);
            }
        }

        Ok(())
    }

    /// Runs only while ACCUMULATING: batch-cancels open buys, audits for a cancel/fill
    /// race, flushes the accumulator, and moves to EXITING.
    pub async fn transition_to_live(
        &mut self,
        event: &crate::types::EventContext,
        exchange: &dyn ExchangeClient,
        notifier: &Notifier,
    ) -> Result<(), ExchangeError> {
        if self.state != StrategyState::Accumulating {
            return Ok(());
        }

        let buy_ids = self.tracker.non_terminal_buy_ids();
        if !buy_ids.is_empty() {
            let _ = exchange.cancel_orders_batch(&buy_ids).await;
        }

        for order_id in &buy_ids {
            if let Ok(Some(raw)) = exchange.get_order(order_id).await {
                if raw.size_matched > self.tracker.get(order_id).map(|o| o.processed_size).unwrap_or(0.0) {
                    self.reconcile_buy(event, order_id, &raw, exchange, notifier).await?;
                }
            }
            self.tracker.mark_terminal(order_id);
        }

        for (key, entry) in self.accumulator.drain_event(&self.event_slug) {
            let min_lot = self.config.min_lot_size(key.exit_price());
            if entry.size + 1e-9 >= min_lot {
                self.pending.push(PendingSell {
                    token_id: event.token_id(key.side).to_string(),
                    side: key.side,
                    exit_price: key.exit_price(),
                    size: entry.size,
                    event_slug: self.event_slug.clone(),
                    entry_price: entry.avg_entry(),
                    attempts: 0,
                    settlement_wait: false,
                });
            } else {
                notifier
                    .send(&format!(
                        "[{}] dust dropped: {} shares @ exit {:.2} below minimum",
                        self.event_slug, entry.size, key.exit_price()
                    ))
                    .await;
            }
        }

        self.state = StrategyState::Exiting;
        Ok(())
    }

    /// Retries the pending-sell queue once per tick, with balance reconciliation on
    /// every attempt.
    pub async fn retry_pending_sells(&mut self, exchange: &dyn ExchangeClient, notifier: &Notifier) {
        let queue = std::mem::take(&mut self.pending);
        for pending in queue {
            let token_id = pending.token_id.clone();
            let exit_price_ticks = price_to_ticks(pending.exit_price);
            let reserved: f64 = self
                .tracker
                .non_terminal_sells()
                .filter(|o| o.token_id == token_id)
                .map(|o| o.original_size - o.processed_size)
                .sum();
            let matching_open_sell = self
                .tracker
                .non_terminal_sells()
                .any(|o| o.token_id == token_id && price_to_ticks(o.price) == exit_price_ticks);

            let placed_record = pending.clone();
            match retry_pending_sell(&self.config, exchange, reserved, matching_open_sell, pending).await {
                PendingSellOutcome::Placed { order_id } => {
                    let mut order = TrackedOrder::new(
                        order_id,
                        placed_record.token_id.clone(),
                        placed_record.side,
                        OrderSide::Sell,
                        placed_record.exit_price,
                        placed_record.size,
                        placed_record.event_slug.clone(),
                        chrono::Utc::now().timestamp_millis(),
                    );
                    order.entry_price = Some(placed_record.entry_price);
                    self.tracker.insert(order);
                }
                PendingSellOutcome::DroppedDust | PendingSellOutcome::DroppedExhausted => {
                    notifier.send(&format!("[{}] pending sell dropped", self.event_slug)).await;
                }
                PendingSellOutcome::SilentlyAlreadyPlaced => {}
                PendingSellOutcome::Requeued(p) => self.pending.push(p),
            }
        }
    }

    /// Runs stop-loss evaluation for every protected non-terminal sell in this event.
    pub async fn stop_loss_tick(&mut self, event: &crate::types::EventContext, exchange: &dyn ExchangeClient) {
        let protected: Vec<TrackedOrder> = self
            .tracker
            .non_terminal_sells()
            .filter(|o| {
                o.entry_price
                    .map(|e| self.config.stop_loss_entries.iter().any(|se| (se - e).abs() < 1e-3))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        for sell in protected {
            let bid = event.best_bid(sell.side);
            match check_stop_loss(&self.config, exchange, &sell, sell.side, bid).await {
                Ok(StopLossAction::Triggered { cancelled_order_id, dump_order_id }) => {
                    self.tracker.mark_terminal(&cancelled_order_id);
                    let mut dump = TrackedOrder::new(
                        dump_order_id,
                        sell.token_id.clone(),
                        sell.side,
                        OrderSide::Sell,
                        self.config.stop_loss_tick,
                        sell.original_size - sell.processed_size,
                        self.event_slug.clone(),
                        chrono::Utc::now().timestamp_millis(),
                    );
                    dump.entry_price = sell.entry_price;
                    self.tracker.insert(dump);
                }
                Ok(_) => {}
                Err(e) => eprintln!("[STOPLOSS] check failed for {}: {e}", sell.order_id),
            }
        }
    }

    /// Runs only in EXITING: reconciles disappeared sells against final status, with the
    /// vanished-sell resilience path, then checks for completion.
    pub async fn check_completion(
        &mut self,
        event: &crate::types::EventContext,
        open_order_ids: &[String],
        exchange: &dyn ExchangeClient,
    ) -> Result<bool, ExchangeError> {
        if self.state != StrategyState::Exiting {
            return Ok(false);
        }

        let sell_ids: Vec<String> = self.tracker.non_terminal_sells().map(|o| o.order_id.clone()).collect();
        for order_id in sell_ids {
            if open_order_ids.iter().any(|id| id == &order_id) {
                continue;
            }
            let raw = exchange.get_order(&order_id).await?;
            match raw {
                Some(o) if o.size_matched > 0.0 => {
                    let notifier = Notifier::disabled();
                    self.reconcile_sell(event, &order_id, &o, exchange, &notifier).await?;
                }
                _ => {
                    // Vanished without a recorded fill — query balance for the resilience path.
                    let (token_id, side, exit_price, entry_price) = {
                        let order = self.tracker.get(&order_id).unwrap();
                        (order.token_id.clone(), order.side, order.price, order.entry_price.unwrap_or(order.price))
                    };
                    self.tracker.mark_terminal(&order_id);
                    let balance = exchange.get_token_balance(&token_id).await?;
                    if balance > 1e-9 {
                        eprintln!("[STRATEGY] vanished sell {order_id}, re-queueing {balance:.4} shares at {exit_price:.2}");
                        self.pending.push(PendingSell {
                            token_id,
                            side,
                            exit_price,
                            size: balance,
                            event_slug: self.event_slug.clone(),
                            entry_price,
                            attempts: 0,
                            settlement_wait: false,
                        });
                    }
                }
            }
        }

        let still_open_sells = self.tracker.non_terminal_sells().count();
        if still_open_sells == 0 && self.pending.is_empty() {
            self.state = StrategyState::Completed;
            self.cycle.end_time_ms = chrono::Utc::now().timestamp_millis();
            eprintln!(
                "[STRATEGY] {} COMPLETED, total_pnl=${:.2}, fills_yes={} fills_no={}",
                self.event_slug, self.cycle.total_pnl, self.cycle.fills_yes.len(), self.cycle.fills_no.len()
            );
            return Ok(true);
        }
        Ok(false)
    }

    pub fn cycle_result(&self) -> &CycleResult {
        &self.cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PlacedOrder;
    use crate::types::{EventContext, MarketPhase, OrderBook};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    struct FakeExchange {
        orders: Mutex<HashMap<String, ExchangeOrder>>,
        next_id: AtomicI64,
        token_balance: f64,
        placed_sells: Mutex<Vec<(String, f64, f64)>>, // token, price, size
    }

    impl FakeExchange {
        fn new() -> Self {
            Self {
                orders: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                token_balance: 1_000_000.0,
                placed_sells: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn place_limit_order(
            &self,
            token_id: &str,
            side: OrderSide,
            price: f64,
            size: f64,
            _event_slug: &str,
        ) -> Result<PlacedOrder, ExchangeError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
            if side == OrderSide::Sell {
                self.placed_sells.lock().unwrap().push((token_id.to_string(), price, size));
            }
            self.orders.lock().unwrap().insert(
                id.clone(),
                ExchangeOrder {
                    order_id: id.clone(),
                    asset_id: token_id.to_string(),
                    side,
                    price,
                    original_size: size,
                    size_matched: 0.0,
                    status: OrderStatus::Live,
                },
            );
            Ok(PlacedOrder { order_id: id, size_matched_on_submit: 0.0 })
        }
        async fn cancel_order(&self, order_id: &str) -> Result<bool, ExchangeError> {
            if let Some(o) = self.orders.lock().unwrap().get_mut(order_id) {
                o.status = OrderStatus::Cancelled;
            }
            Ok(true)
        }
        async fn cancel_orders_batch(&self, order_ids: &[String]) -> Result<usize, ExchangeError> {
            for id in order_ids {
                self.cancel_order(id).await?;
            }
            Ok(order_ids.len())
        }
        async fn cancel_all(&self) -> Result<usize, ExchangeError> { Ok(0) }
        async fn get_open_order_ids(&self) -> Result<Vec<String>, ExchangeError> { Ok(vec![]) }
        async fn get_order(&self, order_id: &str) -> Result<Option<ExchangeOrder>, ExchangeError> {
            Ok(self.orders.lock().unwrap().get(order_id).cloned())
        }
        async fn get_balance(&self) -> Result<f64, ExchangeError> { Ok(1_000_000.0) }
        async fn get_token_balance(&self, _token_id: &str) -> Result<f64, ExchangeError> { Ok(self.token_balance) }
        async fn get_order_book(&self, _token_id: &str) -> Result<OrderBook, ExchangeError> { Ok(OrderBook::default()) }
    }

    fn event() -> EventContext {
        EventContext {
            slug: "slug".into(),
            condition_id: "cond".into(),
            yes_token_id: "yes".into(),
            no_token_id: "no".into(),
            start_ms: 10_000,
            end_ms: 20_000,
            phase: MarketPhase::PreMarket,
            yes_bid: None,
            no_bid: None,
        }
    }

    fn notifier() -> Notifier {
        Notifier::disabled()
    }

    /// Scenario S1: happy path single rung. A BUY at 0.44 fills fully (delta=30).
    /// Expected: one Position, one SELL posted at 0.47 size 30; on its fill, a reload BUY
    /// is posted at 0.44.
    #[tokio::test]
    async fn happy_path_single_rung_fill_and_reload() {
        let config = Config::from_env();
        let exch = FakeExchange::new();
        let mut engine = StrategyEngine::new("slug".into(), config);

        let buy_id = exch
            .place_limit_order("yes", OrderSide::Buy, 0.44, 30.0, "slug")
            .await
            .unwrap()
            .order_id;
        engine.tracker.insert(TrackedOrder::new(
            buy_id.clone(), "yes".into(), Side::Yes, OrderSide::Buy, 0.44, 30.0, "slug".into(), 0,
        ));
        {
            let mut orders = exch.orders.lock().unwrap();
            let o = orders.get_mut(&buy_id).unwrap();
            o.size_matched = 30.0;
            o.status = OrderStatus::Matched;
        }

        engine.check_fills(&event(), &[], &exch, &notifier()).await.unwrap();

        assert_eq!(engine.positions.len(), 0); // consumed immediately into a sell lot at min_lot
        let sells = exch.placed_sells.lock().unwrap();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].1, 0.47);
        assert_eq!(sells[0].2, 30.0);
        drop(sells);

        // Now fill the sell and confirm reload.
        let sell_id = engine.tracker.non_terminal_sells().next().unwrap().order_id.clone();
        {
            let mut orders = exch.orders.lock().unwrap();
            let o = orders.get_mut(&sell_id).unwrap();
            o.size_matched = 30.0;
            o.status = OrderStatus::Matched;
        }
        engine.check_fills(&event(), &[], &exch, &notifier()).await.unwrap();

        assert!((engine.cycle.total_pnl - (0.47 - 0.44) * 30.0).abs() < 1e-9);
        let reload_buys: Vec<_> = engine.tracker.non_terminal_buys().filter(|o| o.price == 0.44).collect();
        assert_eq!(reload_buys.len(), 1);
        assert_eq!(reload_buys[0].original_size, 30.0);
    }

    /// Scenario S3: dust rejection. A 1.0-share partial fill at 0.40 (exit 0.47) is below
    /// MIN_NOTIONAL. Expected: no sell ever emitted; on LIVE flush the entry drops as dust.
    #[tokio::test]
    async fn dust_is_dropped_on_live_flush() {
        let config = Config::from_env();
        let exch = FakeExchange::new();
        let mut engine = StrategyEngine::new("slug".into(), config);

        let buy_id = exch.place_limit_order("yes", OrderSide::Buy, 0.40, 30.0, "slug").await.unwrap().order_id;
        engine.tracker.insert(TrackedOrder::new(
            buy_id.clone(), "yes".into(), Side::Yes, OrderSide::Buy, 0.40, 30.0, "slug".into(), 0,
        ));
        {
            let mut orders = exch.orders.lock().unwrap();
            let o = orders.get_mut(&buy_id).unwrap();
            o.size_matched = 1.0;
        }
        engine.check_fills(&event(), &[buy_id.clone()], &exch, &notifier()).await.unwrap();
        assert!(exch.placed_sells.lock().unwrap().is_empty());

        let mut ev = event();
        ev.phase = crate::types::MarketPhase::Live;
        engine.transition_to_live(&ev, &exch, &notifier()).await.unwrap();
        assert!(engine.pending.is_empty());
    }

    /// Testable property 7: idempotent recovery. initialize_event on a fresh engine when
    /// the exchange already reports N open orders for the event adopts all N and places
    /// zero new ones.
    #[tokio::test]
    async fn idempotent_recovery_adopts_existing_orders() {
        let config = Config::from_env();
        let exch = FakeExchange::new();
        exch.place_limit_order("yes", OrderSide::Buy, 0.44, 30.0, "slug").await.unwrap();
        exch.place_limit_order("no", OrderSide::Buy, 0.44, 30.0, "slug").await.unwrap();

        struct RecoveryExchange(FakeExchange);
        #[async_trait]
        impl ExchangeClient for RecoveryExchange {
            async fn place_limit_order(&self, t: &str, s: OrderSide, p: f64, sz: f64, e: &str) -> Result<PlacedOrder, ExchangeError> {
                self.0.place_limit_order(t, s, p, sz, e).await
            }
            async fn cancel_order(&self, id: &str) -> Result<bool, ExchangeError> { self.0.cancel_order(id).await }
            async fn cancel_orders_batch(&self, ids: &[String]) -> Result<usize, ExchangeError> { self.0.cancel_orders_batch(ids).await }
            async fn cancel_all(&self) -> Result<usize, ExchangeError> { self.0.cancel_all().await }
            async fn get_open_order_ids(&self) -> Result<Vec<String>, ExchangeError> {
                Ok(self.0.orders.lock().unwrap().keys().cloned().collect())
            }
            async fn get_order(&self, id: &str) -> Result<Option<ExchangeOrder>, ExchangeError> { self.0.get_order(id).await }
            async fn get_balance(&self) -> Result<f64, ExchangeError> { self.0.get_balance().await }
            async fn get_token_balance(&self, t: &str) -> Result<f64, ExchangeError> { self.0.get_token_balance(t).await }
            async fn get_order_book(&self, t: &str) -> Result<OrderBook, ExchangeError> { self.0.get_order_book(t).await }
        }

        let exch = RecoveryExchange(exch);
        let mut engine = StrategyEngine::new("slug".into(), config);
        let recovered = engine.initialize_event(&event(), &exch).await.unwrap();
        assert_eq!(recovered, 2);
        assert_eq!(engine.tracked_order_count(), 2);
    }
}
