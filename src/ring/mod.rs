//! Hash-ring ownership: key hashing, range checks and the shared cluster
//! state pushed in by the rebalancing service.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use xxhash_rust::xxh3::xxh3_128;

/// Position of a key on the 2^128 ring
pub type KeyHash = u128;

/// Hash a key onto the ring. Stable across nodes and platforms.
pub fn key_hash(key: &str) -> KeyHash {
    xxh3_128(key.as_bytes())
}

/// Render a ring position as 32 lower-case hex digits
pub fn format_hash(hash: KeyHash) -> String {
    format!("{:032x}", hash)
}

pub fn parse_hash(s: &str) -> Result<KeyHash, RangeError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || digits.len() > 32 {
        return Err(RangeError::InvalidHash(s.to_string()));
    }
    u128::from_str_radix(digits, 16).map_err(|_| RangeError::InvalidHash(s.to_string()))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid ring hash: {0}")]
    InvalidHash(String),

    #[error("Range bounds must be both set or both unset")]
    HalfSpecified,

    #[error("Invalid ring entry: {0}")]
    InvalidEntry(String),

    #[error("Node has no key range assigned")]
    Unassigned,
}

/// Half-open arc `[low, high)` on the ring.
///
/// When `low >= high` the arc wraps through zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    #[serde(with = "hex_hash")]
    pub low: KeyHash,
    #[serde(with = "hex_hash")]
    pub high: KeyHash,
}

impl KeyRange {
    pub fn new(low: KeyHash, high: KeyHash) -> Self {
        Self { low, high }
    }

    /// Build a range from optional bounds; exactly one bound is an error.
    pub fn from_bounds(
        low: Option<KeyHash>,
        high: Option<KeyHash>,
    ) -> Result<Option<Self>, RangeError> {
        match (low, high) {
            (Some(low), Some(high)) => Ok(Some(Self::new(low, high))),
            (None, None) => Ok(None),
            _ => Err(RangeError::HalfSpecified),
        }
    }

    pub fn wraps(&self) -> bool {
        self.low >= self.high
    }

    pub fn contains(&self, hash: KeyHash) -> bool {
        if self.wraps() {
            hash >= self.low || hash < self.high
        } else {
            self.low <= hash && hash < self.high
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", format_hash(self.low), format_hash(self.high))
    }
}

/// Whether `hash` falls in `range`. A node without a range owns nothing.
pub fn is_key_in_range(hash: KeyHash, range: Option<&KeyRange>) -> bool {
    range.is_some_and(|r| r.contains(hash))
}

/// One row of the cluster partition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingEntry {
    #[serde(flatten)]
    pub range: KeyRange,
    pub address: String,
}

impl fmt::Display for RingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{};",
            format_hash(self.range.low),
            format_hash(self.range.high),
            self.address
        )
    }
}

impl FromStr for RingEntry {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.trim().trim_end_matches(';');
        let parts: Vec<&str> = body.split(',').collect();
        if parts.len() != 3 || parts[2].is_empty() {
            return Err(RangeError::InvalidEntry(s.to_string()));
        }

        Ok(Self {
            range: KeyRange::new(parse_hash(parts[0])?, parse_hash(parts[1])?),
            address: parts[2].to_string(),
        })
    }
}

/// Serialize a partition table in the KEYRANGE wire format
pub fn format_metadata(entries: &[RingEntry]) -> String {
    entries.iter().map(ToString::to_string).collect()
}

pub fn parse_metadata(s: &str) -> Result<Vec<RingEntry>, RangeError> {
    s.split(';')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(RingEntry::from_str)
        .collect()
}

/// Range, write-lock and partition table shared by every connection.
///
/// Only the rebalancing surface writes here; handlers read it at the top of
/// each request so an update applies to the next request on every
/// connection.
#[derive(Debug)]
pub struct ClusterState {
    advertised_addr: String,
    range: RwLock<Option<KeyRange>>,
    metadata: RwLock<Vec<RingEntry>>,
    write_locked: AtomicBool,
}

impl ClusterState {
    pub fn new(advertised_addr: impl Into<String>, range: Option<KeyRange>) -> Self {
        Self {
            advertised_addr: advertised_addr.into(),
            range: RwLock::new(range),
            metadata: RwLock::new(Vec::new()),
            write_locked: AtomicBool::new(false),
        }
    }

    pub fn advertised_addr(&self) -> &str {
        &self.advertised_addr
    }

    pub fn range(&self) -> Option<KeyRange> {
        *self.range.read()
    }

    pub fn set_range(&self, range: Option<KeyRange>) {
        match &range {
            Some(r) => info!("Key range set to {}", r),
            None => info!("Key range cleared, node owns nothing"),
        }
        *self.range.write() = range;
    }

    pub fn is_write_locked(&self) -> bool {
        self.write_locked.load(Ordering::SeqCst)
    }

    pub fn set_write_locked(&self, locked: bool) {
        let previous = self.write_locked.swap(locked, Ordering::SeqCst);
        if previous != locked {
            info!("Write lock {}", if locked { "engaged" } else { "released" });
        }
    }

    pub fn metadata(&self) -> Vec<RingEntry> {
        self.metadata.read().clone()
    }

    pub fn set_metadata(&self, entries: Vec<RingEntry>) {
        info!("Partition table updated with {} entries", entries.len());
        *self.metadata.write() = entries;
    }

    /// Whether this node owns `key` under the current range
    pub fn is_responsible(&self, key: &str) -> bool {
        is_key_in_range(key_hash(key), self.range.read().as_ref())
    }

    /// KEYRANGE payload.
    ///
    /// Falls back to a single entry for this node when no table was pushed;
    /// fails if the node has neither.
    pub fn keyrange(&self) -> Result<String, RangeError> {
        let table = self.metadata.read();
        if !table.is_empty() {
            return Ok(format_metadata(&table));
        }

        let range = self.range().ok_or(RangeError::Unassigned)?;
        Ok(RingEntry {
            range,
            address: self.advertised_addr.clone(),
        }
        .to_string())
    }
}

mod hex_hash {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_hash, parse_hash, KeyHash};

    pub fn serialize<S: Serializer>(hash: &KeyHash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_hash(*hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<KeyHash, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_hash(&s).map_err(serde::de::Error::custom)
    }
}

// Ring tests are in test.rs
#[cfg(test)]
mod test;
