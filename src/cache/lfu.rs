use std::collections::{BTreeSet, HashMap};

use super::EvictionPolicy;

#[derive(Debug)]
struct Slot {
    value: String,
    hits: u64,
}

/// Least-frequently-used eviction, ties broken by key order.
///
/// `ranking` holds `(hits, key)` pairs so its first element is always the
/// next victim.
#[derive(Debug, Default)]
pub struct LfuCache {
    capacity: usize,
    entries: HashMap<String, Slot>,
    ranking: BTreeSet<(u64, String)>,
}

impl LfuCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            ranking: BTreeSet::new(),
        }
    }

    /// Admit count recorded for a cached key
    pub fn frequency(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|slot| slot.hits)
    }

    /// Key that the next insertion of a new key would evict
    pub fn peek_lfu(&self) -> Option<&str> {
        self.ranking.first().map(|(_, key)| key.as_str())
    }

    fn bump(&mut self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(slot) => {
                self.ranking.remove(&(slot.hits, key.to_string()));
                slot.hits += 1;
                self.ranking.insert((slot.hits, key.to_string()));
                true
            }
            None => false,
        }
    }
}

impl EvictionPolicy for LfuCache {
    fn admit(&mut self, key: &str, value: &str) -> Option<String> {
        if self.bump(key) {
            if let Some(slot) = self.entries.get_mut(key) {
                slot.value = value.to_string();
            }
            return None;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some((_, victim)) = self.ranking.pop_first() {
                self.entries.remove(&victim);
                evicted = Some(victim);
            }
        }

        self.ranking.insert((1, key.to_string()));
        self.entries.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                hits: 1,
            },
        );
        evicted
    }

    /// Reads leave the counter alone; only admits count.
    fn get(&mut self, key: &str) -> Option<String> {
        self.entries.get(key).map(|slot| slot.value.clone())
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        let slot = self.entries.remove(key)?;
        self.ranking.remove(&(slot.hits, key.to_string()));
        Some(slot.value)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.ranking.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
