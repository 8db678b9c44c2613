mod client;

pub use client::ClobExchangeClient;

use async_trait::async_trait;

use crate::types::{ExchangeError, ExchangeOrder, OrderBook, OrderSide};

/// What the exchange actually gave us back for a placement — the Strategy Engine wraps
/// this into a `TrackedOrder` itself, since it (not the exchange) knows the outcome Side.
#[derive(Clone, Debug)]
pub struct PlacedOrder {
    pub order_id: String,
    pub size_matched_on_submit: f64,
}

/// Authenticated CLOB wrapper. Everything the Strategy Engine needs from the exchange
/// goes through this trait so tests can drive it against a fake instead of the network.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn place_limit_order(
        &self,
        token_id: &str,
        side: OrderSide,
        price: f64,
        size: f64,
        event_slug: &str,
    ) -> Result<PlacedOrder, ExchangeError>;

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ExchangeError>;

    async fn cancel_orders_batch(&self, order_ids: &[String]) -> Result<usize, ExchangeError>;

    async fn cancel_all(&self) -> Result<usize, ExchangeError>;

    async fn get_open_order_ids(&self) -> Result<Vec<String>, ExchangeError>;

    async fn get_order(&self, order_id: &str) -> Result<Option<ExchangeOrder>, ExchangeError>;

    async fn get_balance(&self) -> Result<f64, ExchangeError>;

    async fn get_token_balance(&self, token_id: &str) -> Result<f64, ExchangeError>;

    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, ExchangeError>;
}
