use std::collections::HashMap;

use crate::types::{AccumulatorEntry, AccumulatorKey, Side};

/// Aggregates sub-minimum partial buy fills per `(event_slug, side, token_id, exit_price)`
/// until a sellable lot forms. Without this, a 1¢-wide profit target would strand
/// fragmented partial fills as un-sellable dust until event expiry.
#[derive(Default)]
pub struct FillAccumulator {
    entries: HashMap<AccumulatorKey, AccumulatorEntry>,
}

impl FillAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: AccumulatorKey, delta_size: f64, entry_price: f64) -> &AccumulatorEntry {
        let entry = self.entries.entry(key.clone()).or_default();
        entry.add(delta_size, entry_price);
        self.entries.get(&key).unwrap()
    }

    pub fn get(&self, key: &AccumulatorKey) -> Option<&AccumulatorEntry> {
        self.entries.get(key)
    }

    pub fn reset(&mut self, key: &AccumulatorKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.reset();
        }
    }

    /// Drains every non-empty entry for an event, e.g. on LIVE transition flush.
    pub fn drain_event(&mut self, event_slug: &str) -> Vec<(AccumulatorKey, AccumulatorEntry)> {
        let keys: Vec<AccumulatorKey> = self
            .entries
            .iter()
            .filter(|(k, v)| k.event_slug == event_slug && v.size > 0.0)
            .map(|(k, _)| k.clone())
            .collect();

        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|v| (k, v)))
            .collect()
    }

    pub fn remove_event(&mut self, event_slug: &str) {
        self.entries.retain(|k, _| k.event_slug != event_slug);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(exit_price: f64) -> AccumulatorKey {
        AccumulatorKey::new("slug", Side::Yes, "tok", exit_price)
    }

    /// Scenario S2: two partial buy fills of 3.0 shares each at entry 0.40, both routed
    /// into the same (event, side, token, exit_price=0.47) bucket. Expected: after each
    /// fill the bucket's size grows by 3.0 and its avg_entry stays 0.40.
    #[test]
    fn accumulates_partial_fills_into_sellable_lot() {
        let mut acc = FillAccumulator::new();
        let k = key(0.47);

        let e1 = acc.add(k.clone(), 3.0, 0.40);
        assert_eq!(e1.size, 3.0);
        assert!((e1.avg_entry() - 0.40).abs() < 1e-9);

        acc.reset(&k); // simulate a sell lot being emitted after the first fill
        let e2 = acc.add(k.clone(), 3.0, 0.40);
        assert_eq!(e2.size, 3.0);
    }

    /// Scenario: testable property 3 — accumulator→sell identity. Two fills of different
    /// sizes at the same exit price must produce a share-weighted average entry price.
    #[test]
    fn weighted_average_entry_price() {
        let mut acc = FillAccumulator::new();
        let k = key(0.47);
        acc.add(k.clone(), 2.0, 0.40);
        let entry = acc.add(k.clone(), 1.0, 0.43);
        // (2*0.40 + 1*0.43) / 3 = 0.41
        assert!((entry.avg_entry() - 0.41).abs() < 1e-9);
        assert_eq!(entry.size, 3.0);
    }

    /// Scenario: distinct exit prices on the same outcome must never merge, per the data
    /// model's explicit key requirement.
    #[test]
    fn distinct_exit_prices_do_not_merge() {
        let mut acc = FillAccumulator::new();
        acc.add(key(0.47), 3.0, 0.40);
        acc.add(key(0.48), 3.0, 0.46);
        assert_eq!(acc.get(&key(0.47)).unwrap().size, 3.0);
        assert_eq!(acc.get(&key(0.48)).unwrap().size, 3.0);
    }
}
