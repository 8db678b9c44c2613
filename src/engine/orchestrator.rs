use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::engine::strategy::StrategyEngine;
use crate::exchange::ExchangeClient;
use crate::health::HealthState;
use crate::market::discovery::EventScanner;
use crate::telemetry::{Notifier, TelemetryEvent};
use crate::types::{EventContext, MarketPhase, StrategyState};

/// Multi-event tick loop. This is the only task that mutates `StrategyEngine` state —
/// every other task (health endpoint, telemetry writer, Telegram sends) communicates
/// through channels or read-only snapshots so there is never a lock to take here.
pub struct Orchestrator {
    config: Config,
    exchange: Arc<dyn ExchangeClient>,
    scanner: EventScanner,
    notifier: Notifier,
    telem_tx: mpsc::Sender<TelemetryEvent>,
    health: HealthState,
    events: HashMap<String, (EventContext, StrategyEngine)>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        exchange: Arc<dyn ExchangeClient>,
        telem_tx: mpsc::Sender<TelemetryEvent>,
        health: HealthState,
    ) -> Self {
        let scanner = EventScanner::new(config.clone());
        let notifier = Notifier::from_config(&config);
        Self { config, exchange, scanner, notifier, telem_tx, health, events: HashMap::new() }
    }

    pub async fn run(mut self) {
        loop {
            if let Err(e) = self.tick().await {
                eprintln!("[ORCH] tick error: {e}");
                self.notifier.error_alert("orchestrator-tick", &e.to_string()).await;
            }
            sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }

    async fn tick(&mut self) -> Result<(), crate::types::ExchangeError> {
        let now_ms = chrono::Utc::now().timestamp_millis();

        let tracked: Vec<String> = self.events.keys().cloned().collect();
        for discovered in self.scanner.scan_for_events(&tracked, now_ms).await {
            if !self.events.contains_key(&discovered.slug) {
                eprintln!("[ORCH] new event discovered: {}", discovered.slug);
                let engine = StrategyEngine::new(discovered.slug.clone(), self.config.clone());
                self.events.insert(discovered.slug.clone(), (discovered, engine));
            }
        }

        let open_order_ids = self.exchange.get_open_order_ids().await?;
        let mut completed = Vec::new();

        for (slug, (event, engine)) in self.events.iter_mut() {
            let prev_phase = event.phase;
            event.update_phase(now_ms);
            if event.phase != prev_phase {
                let _ = self
                    .telem_tx
                    .try_send(TelemetryEvent::PhaseTransition { event_slug: slug.clone(), phase: event.phase });
            }

            if prev_phase == MarketPhase::PreMarket && engine.tracked_order_count() == 0 {
                if let Err(e) = engine.initialize_event(event, self.exchange.as_ref()).await {
                    eprintln!("[ORCH] {slug} initialize_event failed: {e}");
                    continue;
                }
            }

            if let Ok(book) = self.exchange.get_order_book(&event.yes_token_id).await {
                event.yes_bid = book.best_bid(self.config.spam_bid_floor);
            }
            if let Ok(book) = self.exchange.get_order_book(&event.no_token_id).await {
                event.no_bid = book.best_bid(self.config.spam_bid_floor);
            }

            engine.check_fills(event, &open_order_ids, self.exchange.as_ref(), &self.notifier).await?;
            engine.stop_loss_tick(event, self.exchange.as_ref()).await;

            if event.phase == MarketPhase::Live && engine.state == StrategyState::Accumulating {
                engine.transition_to_live(event, self.exchange.as_ref(), &self.notifier).await?;
            }

            engine.retry_pending_sells(self.exchange.as_ref(), &self.notifier).await;

            if engine.state == StrategyState::Exiting {
                let done = engine.check_completion(event, &open_order_ids, self.exchange.as_ref()).await?;
                if done {
                    let _ = self.telem_tx.try_send(TelemetryEvent::CycleReport {
                        event_slug: slug.clone(),
                        cycle: engine.cycle_result().clone(),
                    });
                    completed.push(slug.clone());
                }
            }
        }

        for slug in completed {
            self.events.remove(&slug);
            eprintln!("[ORCH] {slug} retired");
        }

        self.health.record_tick(now_ms, self.events.len());
        Ok(())
    }
}
