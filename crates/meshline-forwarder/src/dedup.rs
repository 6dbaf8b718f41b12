//! The bounded, age-pruned ledger of recently seen message ids.

use std::collections::{HashSet, VecDeque};

use meshline_core::parse_message_id_millis;

const MAX_ENTRIES: usize = 10_000;
const COMPACT_TO: usize = 5_000;

#[derive(Default)]
pub struct DedupLedger {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Marks `id` seen. Returns `true` if it was already present (a
    /// duplicate) — callers must check this before the insert takes effect.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return true;
        }
        self.seen.insert(id.to_string());
        self.order.push_back(id.to_string());
        if self.order.len() > MAX_ENTRIES {
            self.compact();
        }
        false
    }

    fn compact(&mut self) {
        while self.order.len() > COMPACT_TO {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    /// Drops ids whose embedded timestamp predates `now_millis -
    /// max_age_millis`. Ids that don't parse are dropped immediately —
    /// there's nothing in them worth keeping around.
    pub fn prune_older_than(&mut self, now_millis: i64, max_age_millis: i64) {
        let cutoff = now_millis - max_age_millis;
        self.order.retain(|id| match parse_message_id_millis(id) {
            Some(millis) => {
                let keep = millis >= cutoff;
                if !keep {
                    self.seen.remove(id);
                }
                keep
            }
            None => {
                self.seen.remove(id);
                false
            }
        });
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshline_core::generate_message_id;

    #[test]
    fn mark_seen_detects_duplicates() {
        let mut ledger = DedupLedger::new();
        assert!(!ledger.mark_seen("msg_1_aaaaaaaaa"));
        assert!(ledger.mark_seen("msg_1_aaaaaaaaa"));
    }

    #[test]
    fn compacts_to_five_thousand_when_bound_exceeded() {
        let mut ledger = DedupLedger::new();
        for i in 0..(MAX_ENTRIES + 1) {
            ledger.mark_seen(&format!("msg_{i}_aaaaaaaaa"));
        }
        assert_eq!(ledger.len(), COMPACT_TO);
    }

    #[test]
    fn prune_drops_entries_older_than_cutoff() {
        let mut ledger = DedupLedger::new();
        ledger.mark_seen("msg_1000_aaaaaaaaa");
        ledger.mark_seen("msg_5000_bbbbbbbbb");
        ledger.prune_older_than(5000, 2000);
        assert!(!ledger.contains("msg_1000_aaaaaaaaa"));
        assert!(ledger.contains("msg_5000_bbbbbbbbb"));
    }

    #[test]
    fn unparsable_ids_are_pruned_immediately() {
        use chrono::Utc;
        let mut ledger = DedupLedger::new();
        let valid = generate_message_id(Utc::now());
        ledger.mark_seen(&valid);
        ledger.mark_seen("not-a-valid-id");
        ledger.prune_older_than(Utc::now().timestamp_millis(), 2_000_000);
        assert!(!ledger.contains("not-a-valid-id"));
        assert!(ledger.contains(&valid));
    }
}
