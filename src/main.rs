mod config;
mod engine;
mod exchange;
mod health;
mod market;
mod telemetry;
mod types;

use std::sync::Arc;

use tokio::sync::mpsc;

use config::Config;
use engine::orchestrator::Orchestrator;
use exchange::{ClobExchangeClient, ExchangeClient};
use health::HealthState;
use telemetry::writer::telemetry_writer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    eprintln!("╔══════════════════════════════════════════════════╗");
    eprintln!("║  Polymarket {} hourly up/down market maker", config.asset_label());
    eprintln!("║  Series: {} | Dry run: {}", config.series_id, config.dry_run);
    eprintln!("║  Ladder: {:?} | Order size: {:.0}", config.ladder_levels, config.order_size);
    eprintln!("║  Stop-loss: {:.2} on entries {:?}", config.stop_loss_price, config.stop_loss_entries);
    eprintln!("╚══════════════════════════════════════════════════╝");

    let exchange: Arc<dyn ExchangeClient> = match ClobExchangeClient::connect(config.clone()).await {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("[MAIN] exchange connect failed: {e}");
            std::process::exit(1);
        }
    };

    let (telem_tx, telem_rx) = mpsc::channel(4096);
    let telem_config = config.clone();
    let telem_handle = tokio::spawn(async move {
        telemetry_writer(telem_rx, telem_config).await;
    });

    let started_at_ms = chrono::Utc::now().timestamp_millis();
    let health_state = HealthState::new(started_at_ms);
    let health_port = config.port;
    let health_for_server = health_state.clone();
    let health_handle = tokio::spawn(async move {
        health::serve(health_port, health_for_server).await;
    });

    let orchestrator = Orchestrator::new(config, exchange.clone(), telem_tx.clone(), health_state);

    tokio::select! {
        _ = orchestrator.run() => {
            eprintln!("[MAIN] orchestrator loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("[MAIN] ctrl-c received, cancelling all open orders before exit");
            match exchange.cancel_all().await {
                Ok(n) => eprintln!("[MAIN] cancelled {n} open orders"),
                Err(e) => eprintln!("[MAIN] best-effort cancel_all failed: {e}"),
            }
        }
    }

    drop(telem_tx);
    health_handle.abort();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), telem_handle).await;
    eprintln!("[MAIN] shutdown complete");
}
