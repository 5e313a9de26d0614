use std::collections::{HashMap, VecDeque};

use super::EvictionPolicy;

/// First-in first-out eviction. Updating an existing key keeps its slot.
#[derive(Debug, Default)]
pub struct FifoCache {
    capacity: usize,
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl FifoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Key that the next insertion of a new key would evict
    pub fn peek_oldest(&self) -> Option<&str> {
        self.order.front().map(String::as_str)
    }
}

impl EvictionPolicy for FifoCache {
    fn admit(&mut self, key: &str, value: &str) -> Option<String> {
        if let Some(existing) = self.entries.get_mut(key) {
            *existing = value.to_string();
            return None;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                evicted = Some(oldest);
            }
        }

        self.order.push_back(key.to_string());
        self.entries.insert(key.to_string(), value.to_string());
        evicted
    }

    fn get(&mut self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        let value = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(value)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
