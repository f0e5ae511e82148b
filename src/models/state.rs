use crate::models::Slot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Slot keys already notified, mapped to the ISO-8601 time of first detection.
/// Keys are only ever added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherState {
    #[serde(default)]
    pub seen: BTreeMap<String, String>,
}

impl WatcherState {
    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Returns the slots whose keys were not yet seen and marks them seen in the same pass.
    /// Input order is preserved.
    pub fn take_new(&mut self, slots: &[Slot], detected_at: DateTime<Utc>) -> Vec<Slot> {
        let stamp = detected_at.to_rfc3339();
        let mut fresh = Vec::new();
        for slot in slots {
            if self.seen.contains_key(&slot.key) {
                continue;
            }
            self.seen.insert(slot.key.clone(), stamp.clone());
            fresh.push(slot.clone());
        }
        fresh
    }
}
