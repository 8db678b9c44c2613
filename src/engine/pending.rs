use crate::config::Config;
use crate::exchange::ExchangeClient;
use crate::types::{OrderSide, PendingSell};

pub enum PendingSellOutcome {
    Placed { order_id: String },
    DroppedDust,
    DroppedExhausted,
    Requeued(PendingSell),
    SilentlyAlreadyPlaced,
}

/// Retries sell placements that failed at emission time (settlement delay, balance
/// mismatch, transient API error), once per orchestrator tick, with balance reconciliation
/// on every attempt per the design note against naive same-size retry loops.
pub async fn retry_pending_sell(
    config: &Config,
    exchange: &dyn ExchangeClient,
    open_sell_sizes_for_token: f64,
    open_sell_exists_at_exit_price: bool,
    mut pending: PendingSell,
) -> PendingSellOutcome {
    if pending.size * pending.exit_price < config.min_notional {
        eprintln!(
            "[PENDING] dust: {} {} size={:.4} @ {:.2} < min_notional, dropping",
            pending.event_slug, pending.side, pending.size, pending.exit_price
        );
        return PendingSellOutcome::DroppedDust;
    }

    match exchange
        .place_limit_order(&pending.token_id, OrderSide::Sell, pending.exit_price, pending.size, &pending.event_slug)
        .await
    {
        Ok(placed) => {
            eprintln!("[PENDING] placed {} size={:.4} @ {:.2}", pending.event_slug, pending.size, pending.exit_price);
            return PendingSellOutcome::Placed { order_id: placed.order_id };
        }
        Err(e) => {
            eprintln!("[PENDING] placement failed: {e}");
        }
    }

    let balance = match exchange.get_token_balance(&pending.token_id).await {
        Ok(b) => b,
        Err(e) => {
            eprintln!("[PENDING] balance query failed: {e}");
            pending.attempts += 1;
            return PendingSellOutcome::Requeued(pending);
        }
    };
    let available = (balance - open_sell_sizes_for_token).max(0.0);

    if available <= 1e-9 {
        pending.settlement_wait = true;
        pending.attempts += 1;
        if pending.attempts > config.pending_sell_settlement_cap {
            eprintln!("[PENDING] settlement delay exceeded cap for {}, alerting", pending.event_slug);
            return PendingSellOutcome::DroppedExhausted;
        }
        return PendingSellOutcome::Requeued(pending);
    }

    if available < pending.size {
        if open_sell_exists_at_exit_price {
            // Reservations cover the deficit and a matching sell is already live.
            return PendingSellOutcome::SilentlyAlreadyPlaced;
        }
        let truncated = (available * 1_000_000.0).floor() / 1_000_000.0;
        pending.size = truncated;
        pending.attempts = 0;
        pending.settlement_wait = false;
        return PendingSellOutcome::Requeued(pending);
    }

    // available >= size: transient API error, capped retry.
    pending.attempts += 1;
    if pending.attempts > config.pending_sell_balance_cap {
        eprintln!("[PENDING] balance-sufficient retries exhausted for {}, alerting", pending.event_slug);
        return PendingSellOutcome::DroppedExhausted;
    }
    PendingSellOutcome::Requeued(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PlacedOrder;
    use crate::types::{ExchangeError, ExchangeOrder, OrderBook, Side};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeExchange {
        fail_place: bool,
        balance: f64,
        place_calls: AtomicUsize,
        last_size: Mutex<Option<f64>>,
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn place_limit_order(
            &self,
            _token_id: &str,
            _side: OrderSide,
            _price: f64,
            size: f64,
            _event_slug: &str,
        ) -> Result<PlacedOrder, ExchangeError> {
            self.place_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_size.lock().unwrap() = Some(size);
            if self.fail_place {
                Err(ExchangeError::Transient("no liquidity".into()))
            } else {
                Ok(PlacedOrder { order_id: "x".into(), size_matched_on_submit: 0.0 })
            }
        }
        async fn cancel_order(&self, _order_id: &str) -> Result<bool, ExchangeError> { Ok(true) }
        async fn cancel_orders_batch(&self, _order_ids: &[String]) -> Result<usize, ExchangeError> { Ok(0) }
        async fn cancel_all(&self) -> Result<usize, ExchangeError> { Ok(0) }
        async fn get_open_order_ids(&self) -> Result<Vec<String>, ExchangeError> { Ok(vec![]) }
        async fn get_order(&self, _order_id: &str) -> Result<Option<ExchangeOrder>, ExchangeError> { Ok(None) }
        async fn get_balance(&self) -> Result<f64, ExchangeError> { Ok(1000.0) }
        async fn get_token_balance(&self, _token_id: &str) -> Result<f64, ExchangeError> { Ok(self.balance) }
        async fn get_order_book(&self, _token_id: &str) -> Result<OrderBook, ExchangeError> { Ok(OrderBook::default()) }
    }

    fn pending(size: f64, exit_price: f64) -> PendingSell {
        PendingSell {
            token_id: "tok".into(),
            side: Side::Yes,
            exit_price,
            size,
            event_slug: "slug".into(),
            entry_price: 0.40,
            attempts: 0,
            settlement_wait: false,
        }
    }

    /// Scenario S3: a dust-sized pending sell is dropped permanently without ever
    /// attempting placement.
    #[tokio::test]
    async fn dust_is_dropped_without_placement_attempt() {
        let config = Config::from_env();
        let exch = FakeExchange { fail_place: false, balance: 100.0, place_calls: AtomicUsize::new(0), last_size: Mutex::new(None) };
        let outcome = retry_pending_sell(&config, &exch, 0.0, false, pending(1.0, 0.47)).await;
        assert!(matches!(outcome, PendingSellOutcome::DroppedDust));
        assert_eq!(exch.place_calls.load(Ordering::SeqCst), 0);
    }

    /// Scenario: balance == 0 after a failed placement is treated as settlement delay and
    /// requeued rather than dropped, up to the settlement cap.
    #[tokio::test]
    async fn zero_balance_is_requeued_as_settlement_wait() {
        let config = Config::from_env();
        let exch = FakeExchange { fail_place: true, balance: 0.0, place_calls: AtomicUsize::new(0), last_size: Mutex::new(None) };
        let outcome = retry_pending_sell(&config, &exch, 0.0, false, pending(30.0, 0.47)).await;
        match outcome {
            PendingSellOutcome::Requeued(p) => {
                assert!(p.settlement_wait);
                assert_eq!(p.attempts, 1);
            }
            _ => panic!("expected Requeued"),
        }
    }

    /// Scenario: available balance less than requested size truncates to actual balance
    /// at 6-decimal precision and resets the attempt counter.
    #[tokio::test]
    async fn insufficient_balance_truncates_and_resets_attempts() {
        let config = Config::from_env();
        let exch = FakeExchange { fail_place: true, balance: 29.123456789, place_calls: AtomicUsize::new(0), last_size: Mutex::new(None) };
        let mut p = pending(30.0, 0.47);
        p.attempts = 5;
        let outcome = retry_pending_sell(&config, &exch, 0.0, false, p).await;
        match outcome {
            PendingSellOutcome::Requeued(p) => {
                assert!((p.size - 29.123456).abs() < 1e-9);
                assert_eq!(p.attempts, 0);
            }
            _ => panic!("expected Requeued"),
        }
    }
}
