use std::str::FromStr;

use async_trait::async_trait;
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::types::{ExchangeError, ExchangeOrder, OrderBook, OrderSide, OrderStatus};

use super::{ExchangeClient, PlacedOrder};

/// Authenticated handle to the live CLOB client + signer, absent entirely in dry-run mode
/// so a process with no credentials can still run the strategy against simulated fills.
struct Live {
    client: polymarket_client_sdk::clob::Client,
    signer: polymarket_client_sdk::auth::LocalSigner,
}

pub struct ClobExchangeClient {
    config: Config,
    live: Option<Live>,
}

impl ClobExchangeClient {
    /// Connects and authenticates against the live CLOB unless `config.dry_run` is set.
    pub async fn connect(config: Config) -> Result<Self, ExchangeError> {
        if config.dry_run {
            eprintln!("[EXCH] dry_run=true, skipping CLOB authentication");
            return Ok(Self { config, live: None });
        }

        use polymarket_client_sdk::auth::{LocalSigner, Signer};
        use polymarket_client_sdk::clob::{Client as ClobClient, Config as ClobConfig};
        use polymarket_client_sdk::clob::types::SignatureType;
        use polymarket_client_sdk::POLYGON;

        let pk = config
            .private_key
            .as_ref()
            .ok_or_else(|| ExchangeError::Config("PRIVATE_KEY required when DRY_RUN=false".into()))?;

        let signer = LocalSigner::from_str(pk)
            .map_err(|e| ExchangeError::Config(format!("invalid PRIVATE_KEY: {e}")))?
            .with_chain_id(Some(POLYGON));

        let mut auth_builder = ClobClient::new("https://clob.polymarket.com", ClobConfig::default())
            .map_err(|e| ExchangeError::Config(format!("failed to create CLOB client: {e}")))?
            .authentication_builder(&signer)
            .signature_type(SignatureType::Eoa);

        if let Some(ref funder) = config.funder_address {
            let addr = funder
                .parse()
                .map_err(|e| ExchangeError::Config(format!("invalid FUNDER_ADDRESS: {e}")))?;
            auth_builder = auth_builder.funder(addr);
        }

        let client = auth_builder
            .authenticate()
            .await
            .map_err(|e| ExchangeError::Config(format!("CLOB authentication failed: {e}")))?;

        eprintln!("[EXCH] authenticated, address={}", client.address());

        Ok(Self {
            config,
            live: Some(Live { client, signer }),
        })
    }

    fn live(&self) -> Result<&Live, ExchangeError> {
        self.live
            .as_ref()
            .ok_or_else(|| ExchangeError::Config("exchange client not connected (dry_run)".into()))
    }

    async fn place_once(
        &self,
        token_id: &str,
        side: OrderSide,
        price: f64,
        size: f64,
        event_slug: &str,
    ) -> Result<PlacedOrder, ExchangeError> {
        if self.config.dry_run {
            let order_id = format!("dry-{}-{}-{}", event_slug, token_id, chrono::Utc::now().timestamp_millis());
            eprintln!(
                "[EXCH] dry_run {} {} @ {:.2} x {:.2} [{}] -> simulated fill",
                side, token_id, price, size, event_slug
            );
            // Simulate an immediate full fill — dry-run exists to exercise the strategy
            // logic end-to-end without touching the network.
            return Ok(PlacedOrder {
                order_id,
                size_matched_on_submit: size,
            });
        }

        use polymarket_client_sdk::clob::types::{OrderType as ClobOrderType, Side as ClobSide};
        use polymarket_client_sdk::types::{Decimal, U256};

        let live = self.live()?;

        let price_str = format!("{price:.2}");
        let price_dec = Decimal::from_str(&price_str)
            .map_err(|e| ExchangeError::Semantic(format!("bad price {price_str}: {e}")))?;
        let size_str = format!("{size:.2}");
        let size_dec = Decimal::from_str(&size_str)
            .map_err(|e| ExchangeError::Semantic(format!("bad size {size_str}: {e}")))?;
        let token = U256::from_str(token_id)
            .map_err(|e| ExchangeError::Semantic(format!("bad token_id {token_id}: {e}")))?;
        let clob_side = match side {
            OrderSide::Buy => ClobSide::Buy,
            OrderSide::Sell => ClobSide::Sell,
        };

        let signable = live
            .client
            .limit_order()
            .token_id(token)
            .price(price_dec)
            .size(size_dec)
            .side(clob_side)
            .order_type(ClobOrderType::GTC)
            .post_only(false)
            .build()
            .await
            .map_err(|e| ExchangeError::Transient(format!("build order: {e}")))?;

        let signed = live
            .client
            .sign(&live.signer, signable)
            .await
            .map_err(|e| ExchangeError::Transient(format!("sign order: {e}")))?;

        let resp = live
            .client
            .post_order(signed)
            .await
            .map_err(|e| ExchangeError::Transient(format!("post order: {e}")))?;

        if !resp.success {
            let msg = resp.error_msg.unwrap_or_else(|| "order rejected".to_string());
            return Err(ExchangeError::Semantic(msg));
        }

        use polymarket_client_sdk::clob::types::OrderStatusType;
        let size_matched_on_submit = if matches!(resp.status, OrderStatusType::Matched) {
            size
        } else {
            0.0
        };

        Ok(PlacedOrder {
            order_id: resp.order_id,
            size_matched_on_submit,
        })
    }
}

#[async_trait]
impl ExchangeClient for ClobExchangeClient {
    async fn place_limit_order(
        &self,
        token_id: &str,
        side: OrderSide,
        price: f64,
        size: f64,
        event_slug: &str,
    ) -> Result<PlacedOrder, ExchangeError> {
        if side != OrderSide::Sell {
            return self.place_once(token_id, side, price, size, event_slug).await;
        }

        // Sells are on the critical profit path — retry with linear back-off.
        let mut last_err = None;
        for attempt in 1..=self.config.sell_retry_attempts {
            match self.place_once(token_id, side, price, size, event_slug).await {
                Ok(order) => return Ok(order),
                Err(e) => {
                    eprintln!("[EXCH] SELL attempt {attempt}/{} failed: {e}", self.config.sell_retry_attempts);
                    last_err = Some(e);
                    if attempt < self.config.sell_retry_attempts {
                        sleep(Duration::from_millis(self.config.sell_retry_delay_ms * attempt as u64)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ExchangeError::Transient("sell retries exhausted".into())))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ExchangeError> {
        if self.config.dry_run {
            return Ok(true);
        }
        let live = self.live()?;
        live.client
            .cancel_order(order_id)
            .await
            .map(|_| true)
            .map_err(|e| ExchangeError::Transient(format!("cancel_order: {e}")))
    }

    async fn cancel_orders_batch(&self, order_ids: &[String]) -> Result<usize, ExchangeError> {
        if self.config.dry_run {
            return Ok(order_ids.len());
        }
        let live = self.live()?;
        live.client
            .cancel_orders(order_ids)
            .await
            .map(|r| r.len())
            .map_err(|e| ExchangeError::Transient(format!("cancel_orders_batch: {e}")))
    }

    async fn cancel_all(&self) -> Result<usize, ExchangeError> {
        if self.config.dry_run {
            return Ok(0);
        }
        let live = self.live()?;
        live.client
            .cancel_all()
            .await
            .map(|r| r.len())
            .map_err(|e| ExchangeError::Transient(format!("cancel_all: {e}")))
    }

    async fn get_open_order_ids(&self) -> Result<Vec<String>, ExchangeError> {
        if self.config.dry_run {
            return Ok(Vec::new());
        }
        let live = self.live()?;
        live.client
            .open_orders()
            .await
            .map(|orders| orders.into_iter().map(|o| o.id).collect())
            .map_err(|e| ExchangeError::Transient(format!("get_open_order_ids: {e}")))
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<ExchangeOrder>, ExchangeError> {
        if self.config.dry_run {
            return Ok(None);
        }
        let live = self.live()?;
        match live.client.get_order(order_id).await {
            Ok(Some(o)) => Ok(Some(map_exchange_order(o)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ExchangeError::Transient(format!("get_order: {e}"))),
        }
    }

    async fn get_balance(&self) -> Result<f64, ExchangeError> {
        if self.config.dry_run {
            return Ok(f64::MAX);
        }
        let live = self.live()?;
        live.client
            .balance()
            .await
            .map(|b| b as f64 / 1_000_000.0)
            .map_err(|e| ExchangeError::Transient(format!("get_balance: {e}")))
    }

    async fn get_token_balance(&self, token_id: &str) -> Result<f64, ExchangeError> {
        if self.config.dry_run {
            return Ok(f64::MAX);
        }
        let live = self.live()?;
        live.client
            .token_balance(token_id)
            .await
            .map(|b| b as f64 / 1_000_000.0)
            .map_err(|e| ExchangeError::Transient(format!("get_token_balance: {e}")))
    }

    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, ExchangeError> {
        if self.config.dry_run {
            return Ok(OrderBook::default());
        }
        let live = self.live()?;
        live.client
            .order_book(token_id)
            .await
            .map(|book| OrderBook {
                bids: book.bids.into_iter().map(|l| (l.price, l.size)).collect(),
                asks: book.asks.into_iter().map(|l| (l.price, l.size)).collect(),
            })
            .map_err(|e| ExchangeError::Transient(format!("get_order_book: {e}")))
    }
}

fn map_exchange_order(
    raw: polymarket_client_sdk::clob::types::OrderRecord,
) -> Result<ExchangeOrder, ExchangeError> {
    use polymarket_client_sdk::clob::types::{OrderStatusType, Side as ClobSide};

    let side = match raw.side {
        ClobSide::Buy => OrderSide::Buy,
        ClobSide::Sell => OrderSide::Sell,
    };
    let status = match raw.status {
        OrderStatusType::Live | OrderStatusType::Delayed => OrderStatus::Live,
        OrderStatusType::Matched => OrderStatus::Matched,
        OrderStatusType::Cancelled => OrderStatus::Cancelled,
        OrderStatusType::Unmatched => OrderStatus::Live,
        _ => OrderStatus::Invalid,
    };

    Ok(ExchangeOrder {
        order_id: raw.id,
        asset_id: raw.asset_id,
        side,
        price: raw.price,
        original_size: raw.original_size,
        size_matched: raw.size_matched,
        status,
    })
}
