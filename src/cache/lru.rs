use std::collections::{BTreeMap, HashMap};

use super::EvictionPolicy;

#[derive(Debug)]
struct Slot {
    value: String,
    tick: u64,
}

/// Least-recently-used eviction.
///
/// Every touch stamps the entry with a monotonically increasing tick; the
/// `recency` index maps ticks back to keys so the oldest stamp is the victim.
#[derive(Debug, Default)]
pub struct LruCache {
    capacity: usize,
    clock: u64,
    entries: HashMap<String, Slot>,
    recency: BTreeMap<u64, String>,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            entries: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
        }
    }

    /// Key that the next insertion of a new key would evict
    pub fn peek_lru(&self) -> Option<&str> {
        self.recency.values().next().map(String::as_str)
    }

    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &str) -> bool {
        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some(slot) => {
                self.recency.remove(&slot.tick);
                slot.tick = tick;
                self.recency.insert(tick, key.to_string());
                true
            }
            None => false,
        }
    }
}

impl EvictionPolicy for LruCache {
    fn admit(&mut self, key: &str, value: &str) -> Option<String> {
        if self.touch(key) {
            if let Some(slot) = self.entries.get_mut(key) {
                slot.value = value.to_string();
            }
            return None;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some((_, victim)) = self.recency.pop_first() {
                self.entries.remove(&victim);
                evicted = Some(victim);
            }
        }

        let tick = self.next_tick();
        self.recency.insert(tick, key.to_string());
        self.entries.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                tick,
            },
        );
        evicted
    }

    fn get(&mut self, key: &str) -> Option<String> {
        if !self.touch(key) {
            return None;
        }
        self.entries.get(key).map(|slot| slot.value.clone())
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot.value)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
