//! Ringstore - a storage node for a hash-partitioned distributed KV store
//!
//! Each node owns an arc of a 128-bit hash ring, serves a line-based TCP
//! protocol for the keys in that arc, and keeps its data in memory behind a
//! bounded cache with a flat-file snapshot on disk.

pub mod admin;
pub mod cache;
pub mod client;
pub mod config;
pub mod protocol;
pub mod ring;
pub mod server;
pub mod storage;

pub use cache::{Cache, CachePolicy, EvictionPolicy};
pub use client::KvClient;
pub use config::{ConfigError, RingstoreConfig};
pub use protocol::{KvMessage, ProtocolError, StatusType};
pub use ring::{ClusterState, KeyRange, RangeError, RingEntry};
pub use server::{ClientHandler, KvServer, SessionState};
pub use storage::{StorageEngine, StorageError, StorageStats};

#[derive(thiserror::Error, Debug)]
pub enum RingstoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected reply status: {0}")]
    UnexpectedReply(StatusType),
}

// Tests are in individual modules and integration tests
