//! Bounded in-memory cache with a pluggable eviction policy.
//!
//! The policy is picked once at startup and never changes. Every policy
//! implements [`EvictionPolicy`]; [`Cache`] wraps the chosen one in a closed
//! enum so callers never inspect the concrete type.

mod fifo;
mod lfu;
mod lru;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use fifo::FifoCache;
pub use lfu::LfuCache;
pub use lru::LruCache;

/// Cache replacement strategy selected at startup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    None,
    #[default]
    Fifo,
    Lru,
    Lfu,
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CachePolicy::None => "None",
            CachePolicy::Fifo => "FIFO",
            CachePolicy::Lru => "LRU",
            CachePolicy::Lfu => "LFU",
        };
        f.write_str(name)
    }
}

impl FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CachePolicy::None),
            "fifo" => Ok(CachePolicy::Fifo),
            "lru" => Ok(CachePolicy::Lru),
            "lfu" => Ok(CachePolicy::Lfu),
            other => Err(format!(
                "unknown cache strategy '{}', expected one of none, fifo, lru, lfu",
                other
            )),
        }
    }
}

/// Operations every eviction policy supports.
///
/// Implementations hold at most `capacity` entries. `admit` evicts at most
/// one entry to make room and returns the evicted key.
pub trait EvictionPolicy {
    /// Insert or refresh an entry.
    fn admit(&mut self, key: &str, value: &str) -> Option<String>;

    /// Look up a cached value, applying the policy's access bookkeeping.
    fn get(&mut self, key: &str) -> Option<String>;

    fn contains(&self, key: &str) -> bool;

    /// Drop an entry and all of its policy metadata.
    fn remove(&mut self, key: &str) -> Option<String>;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
enum Strategy {
    Disabled,
    Fifo(FifoCache),
    Lru(LruCache),
    Lfu(LfuCache),
}

/// The cache the storage engine writes through.
///
/// Capacity 0 or [`CachePolicy::None`] disables caching entirely.
#[derive(Debug)]
pub struct Cache {
    policy: CachePolicy,
    capacity: usize,
    strategy: Strategy,
}

impl Cache {
    pub fn new(policy: CachePolicy, capacity: usize) -> Self {
        let strategy = match policy {
            _ if capacity == 0 => Strategy::Disabled,
            CachePolicy::None => Strategy::Disabled,
            CachePolicy::Fifo => Strategy::Fifo(FifoCache::new(capacity)),
            CachePolicy::Lru => Strategy::Lru(LruCache::new(capacity)),
            CachePolicy::Lfu => Strategy::Lfu(LfuCache::new(capacity)),
        };

        Self {
            policy,
            capacity,
            strategy,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.strategy, Strategy::Disabled)
    }

    fn inner(&self) -> Option<&dyn EvictionPolicy> {
        match &self.strategy {
            Strategy::Disabled => None,
            Strategy::Fifo(c) => Some(c),
            Strategy::Lru(c) => Some(c),
            Strategy::Lfu(c) => Some(c),
        }
    }

    fn inner_mut(&mut self) -> Option<&mut dyn EvictionPolicy> {
        match &mut self.strategy {
            Strategy::Disabled => None,
            Strategy::Fifo(c) => Some(c),
            Strategy::Lru(c) => Some(c),
            Strategy::Lfu(c) => Some(c),
        }
    }
}

impl EvictionPolicy for Cache {
    fn admit(&mut self, key: &str, value: &str) -> Option<String> {
        self.inner_mut()?.admit(key, value)
    }

    fn get(&mut self, key: &str) -> Option<String> {
        self.inner_mut()?.get(key)
    }

    fn contains(&self, key: &str) -> bool {
        self.inner().is_some_and(|c| c.contains(key))
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        self.inner_mut()?.remove(key)
    }

    fn clear(&mut self) {
        if let Some(c) = self.inner_mut() {
            c.clear();
        }
    }

    fn len(&self) -> usize {
        self.inner().map_or(0, |c| c.len())
    }
}
