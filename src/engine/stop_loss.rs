use crate::config::Config;
use crate::exchange::ExchangeClient;
use crate::types::{ExchangeError, OrderSide, Side, TrackedOrder};

pub enum StopLossAction {
    /// No protected sell breached its threshold this tick.
    NoTrigger,
    /// Take-profit cancelled and a market-crossing dump sell posted.
    Triggered { cancelled_order_id: String, dump_order_id: String },
    /// Cancel failed and the order isn't confirmed terminal yet — defer to next tick.
    Deferred,
}

/// Scans one non-terminal take-profit sell whose entry is stop-loss-protected. Called by
/// the Strategy Engine once per event per tick, after fill reconciliation.
pub async fn check_stop_loss(
    config: &Config,
    exchange: &dyn ExchangeClient,
    take_profit: &TrackedOrder,
    side: Side,
    best_bid: Option<f64>,
) -> Result<StopLossAction, ExchangeError> {
    let entry_price = match take_profit.entry_price {
        Some(p) => p,
        None => return Ok(StopLossAction::NoTrigger),
    };

    let protected = config
        .stop_loss_entries
        .iter()
        .any(|e| (e - entry_price).abs() < 1e-3);
    if !protected {
        return Ok(StopLossAction::NoTrigger);
    }

    let bid = match best_bid {
        Some(b) if b >= config.spam_bid_floor => b,
        _ => return Ok(StopLossAction::NoTrigger),
    };

    if bid > config.stop_loss_price {
        return Ok(StopLossAction::NoTrigger);
    }

    eprintln!(
        "[STOPLOSS] entry={:.2} bid={:.2} <= threshold={:.2}, cancelling take-profit {}",
        entry_price, bid, config.stop_loss_price, take_profit.order_id
    );

    match exchange.cancel_order(&take_profit.order_id).await {
        Ok(true) => {}
        Ok(false) => {
            // Not necessarily an error — verify whether it's already terminal.
            match exchange.get_order(&take_profit.order_id).await? {
                Some(o) if o.status.is_terminal_without_fill() || o.status == crate::types::OrderStatus::Matched => {}
                _ => return Ok(StopLossAction::Deferred),
            }
        }
        Err(_) => {
            match exchange.get_order(&take_profit.order_id).await? {
                Some(o) if o.status.is_terminal_without_fill() || o.status == crate::types::OrderStatus::Matched => {}
                _ => return Ok(StopLossAction::Deferred),
            }
        }
    }

    let dump = exchange
        .place_limit_order(
            &take_profit.token_id,
            OrderSide::Sell,
            config.stop_loss_tick,
            take_profit.original_size - take_profit.processed_size,
            &take_profit.event_slug,
        )
        .await;

    match dump {
        Ok(placed) => Ok(StopLossAction::Triggered {
            cancelled_order_id: take_profit.order_id.clone(),
            dump_order_id: placed.order_id,
        }),
        Err(e) => {
            eprintln!("[STOPLOSS] market dump sell failed for {}: {e}, manual intervention required", take_profit.event_slug);
            let _ = side;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PlacedOrder;
    use crate::types::{ExchangeOrder, OrderBook, OrderStatus};
    use async_trait::async_trait;

    struct FakeExchange {
        cancel_ok: bool,
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn place_limit_order(
            &self,
            _token_id: &str,
            _side: OrderSide,
            price: f64,
            size: f64,
            _event_slug: &str,
        ) -> Result<PlacedOrder, ExchangeError> {
            assert_eq!(price, 0.01);
            assert_eq!(size, 30.0);
            Ok(PlacedOrder { order_id: "dump".into(), size_matched_on_submit: 0.0 })
        }
        async fn cancel_order(&self, _order_id: &str) -> Result<bool, ExchangeError> { Ok(self.cancel_ok) }
        async fn cancel_orders_batch(&self, _order_ids: &[String]) -> Result<usize, ExchangeError> { Ok(0) }
        async fn cancel_all(&self) -> Result<usize, ExchangeError> { Ok(0) }
        async fn get_open_order_ids(&self) -> Result<Vec<String>, ExchangeError> { Ok(vec![]) }
        async fn get_order(&self, _order_id: &str) -> Result<Option<ExchangeOrder>, ExchangeError> {
            Ok(Some(ExchangeOrder {
                order_id: "tp".into(),
                asset_id: "tok".into(),
                side: OrderSide::Sell,
                price: 0.49,
                original_size: 30.0,
                size_matched: 0.0,
                status: OrderStatus::Cancelled,
            }))
        }
        async fn get_balance(&self) -> Result<f64, ExchangeError> { Ok(1000.0) }
        async fn get_token_balance(&self, _token_id: &str) -> Result<f64, ExchangeError> { Ok(30.0) }
        async fn get_order_book(&self, _token_id: &str) -> Result<OrderBook, ExchangeError> { Ok(OrderBook::default()) }
    }

    fn protected_sell() -> TrackedOrder {
        let mut o = TrackedOrder::new("tp".into(), "tok".into(), Side::Yes, OrderSide::Sell, 0.49, 30.0, "slug".into(), 0);
        o.entry_price = Some(0.48);
        o
    }

    /// Scenario S5: bid refreshes to 0.17, below STOP_LOSS_PRICE=0.18, on a 0.48-entry
    /// protected sell. Expected: take-profit cancelled and a market-crossing sell at 0.01
    /// for the full size is placed.
    #[tokio::test]
    async fn triggers_on_threshold_breach() {
        let config = Config::from_env();
        let exch = FakeExchange { cancel_ok: true };
        let action = check_stop_loss(&config, &exch, &protected_sell(), Side::Yes, Some(0.17)).await.unwrap();
        match action {
            StopLossAction::Triggered { cancelled_order_id, dump_order_id } => {
                assert_eq!(cancelled_order_id, "tp");
                assert_eq!(dump_order_id, "dump");
            }
            _ => panic!("expected Triggered"),
        }
    }

    /// Scenario: a bid at or above the threshold never triggers a stop-loss.
    #[tokio::test]
    async fn no_trigger_above_threshold() {
        let config = Config::from_env();
        let exch = FakeExchange { cancel_ok: true };
        let action = check_stop_loss(&config, &exch, &protected_sell(), Side::Yes, Some(0.25)).await.unwrap();
        assert!(matches!(action, StopLossAction::NoTrigger));
    }

    /// Scenario: a spam quote below the 0.10 floor must not be treated as a real bid.
    #[tokio::test]
    async fn spam_bid_floor_is_ignored() {
        let config = Config::from_env();
        let exch = FakeExchange { cancel_ok: true };
        let action = check_stop_loss(&config, &exch, &protected_sell(), Side::Yes, Some(0.05)).await.unwrap();
        assert!(matches!(action, StopLossAction::NoTrigger));
    }

    /// Scenario: entries not in STOP_LOSS_ENTRIES are never protected, regardless of bid.
    #[tokio::test]
    async fn unprotected_entry_never_triggers() {
        let config = Config::from_env();
        let exch = FakeExchange { cancel_ok: true };
        let mut order = protected_sell();
        order.entry_price = Some(0.40);
        let action = check_stop_loss(&config, &exch, &order, Side::Yes, Some(0.01)).await.unwrap();
        assert!(matches!(action, StopLossAction::NoTrigger));
    }
}
