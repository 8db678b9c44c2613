use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::telemetry::{Notifier, TelemetryEvent};
use crate::types::MarketPhase;

/// Simple CSV writer that buffers writes via the OS page cache; flushed on shutdown.
struct CsvWriter {
    file: File,
}

impl CsvWriter {
    fn new(path: &str, header: &str) -> Self {
        let mut file = File::create(path).unwrap_or_else(|e| panic!("failed to create {path}: {e}"));
        writeln!(file, "{header}").ok();
        Self { file }
    }

    fn flush(&mut self) {
        self.file.flush().ok();
    }
}

/// Single background task that owns all telemetry I/O: per-event orders/fills CSVs plus
/// Telegram alerts. Consolidating this into one task keeps file handles and the HTTP
/// client off the hot path.
pub async fn telemetry_writer(mut rx: mpsc::Receiver<TelemetryEvent>, config: Config) {
    let notifier = Notifier::from_config(&config);
    let mut orders: HashMap<String, CsvWriter> = HashMap::new();
    let mut fills: HashMap<String, CsvWriter> = HashMap::new();

    fn writer_for<'a>(
        map: &'a mut HashMap<String, CsvWriter>,
        event_slug: &str,
        filename: &str,
        header: &str,
    ) -> &'a mut CsvWriter {
        map.entry(event_slug.to_string()).or_insert_with(|| {
            let dir = format!("logs/{event_slug}");
            fs::create_dir_all(&dir).ok();
            CsvWriter::new(&format!("{dir}/{filename}"), header)
        })
    }

    while let Some(event) = rx.recv().await {
        match event {
            TelemetryEvent::OrderPlaced { event_slug, token_id, side, order_side, price, size } => {
                let w = writer_for(&mut orders, &event_slug, "orders.csv", "ts_ms,token_id,side,order_side,price,size");
                writeln!(w.file, "{},{},{},{},{:.4},{:.4}", chrono::Utc::now().timestamp_millis(), token_id, side, order_side, price, size).ok();
                notifier.ladder_placed(&event_slug, 1).await;
            }
            TelemetryEvent::Fill { event_slug, side, order_side, price, size } => {
                let w = writer_for(&mut fills, &event_slug, "fills.csv", "ts_ms,side,order_side,price,size");
                writeln!(w.file, "{},{},{},{:.4},{:.4}", chrono::Utc::now().timestamp_millis(), side, order_side, price, size).ok();
                notifier.fill(&event_slug, side, order_side, price, size).await;
            }
            TelemetryEvent::DustDropped { event_slug, side, size, exit_price } => {
                notifier.dust_dropped(&event_slug, side, size, exit_price).await;
            }
            TelemetryEvent::PhaseTransition { event_slug, phase } => {
                if phase == MarketPhase::Live {
                    notifier.phase_transition(&event_slug, phase).await;
                }
            }
            TelemetryEvent::CycleReport { event_slug, cycle } => {
                notifier.cycle_report(&event_slug, &cycle).await;
                if let Some(w) = orders.remove(&event_slug) {
                    let mut w = w;
                    w.flush();
                }
                if let Some(w) = fills.remove(&event_slug) {
                    let mut w = w;
                    w.flush();
                }
            }
            TelemetryEvent::ErrorAlert { context, message } => {
                notifier.error_alert(&context, &message).await;
            }
        }
    }

    for w in orders.values_mut() {
        w.flush();
    }
    for w in fills.values_mut() {
        w.flush();
    }
    eprintln!("[TELEM] writer stopped, files flushed");
}
