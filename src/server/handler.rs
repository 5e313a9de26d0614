//! Per-connection request state machine.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::protocol::{read_message, write_message, KvMessage, StatusType};
use crate::ring::ClusterState;
use crate::storage::StorageEngine;

/// Where a connection is in its request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitRequest,
    Validate(KvMessage),
    Dispatch(KvMessage),
    Respond(KvMessage),
    Closed,
}

/// Serves one client connection until it closes.
///
/// Range, write-lock and partition table are re-read for every request, so
/// updates from the rebalancing service apply to the next request.
pub struct ClientHandler {
    peer: String,
    pub(super) engine: Arc<StorageEngine>,
    pub(super) cluster: Arc<ClusterState>,
    max_line_length: usize,
    shutdown: watch::Receiver<bool>,
}

impl ClientHandler {
    pub fn new(
        peer: impl Into<String>,
        engine: Arc<StorageEngine>,
        cluster: Arc<ClusterState>,
        max_line_length: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            peer: peer.into(),
            engine,
            cluster,
            max_line_length,
            shutdown,
        }
    }

    /// Drive the connection to `Closed`.
    pub async fn run<S>(mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);
        let mut state = SessionState::AwaitRequest;

        loop {
            state = match state {
                SessionState::AwaitRequest => {
                    tokio::select! {
                        _ = self.shutdown.changed() => {
                            debug!("Closing connection to {} for shutdown", self.peer);
                            SessionState::Closed
                        }
                        read = read_message(&mut reader, self.max_line_length) => match read {
                            Ok(Some(request)) => {
                                debug!("Received from {}: {}", self.peer, request);
                                SessionState::Validate(request)
                            }
                            Ok(None) => {
                                info!("Client {} disconnected", self.peer);
                                SessionState::Closed
                            }
                            Err(e) => {
                                warn!("Dropping connection to {}: {}", self.peer, e);
                                SessionState::Closed
                            }
                        }
                    }
                }
                SessionState::Respond(response) => {
                    match write_message(&mut writer, &response).await {
                        Ok(()) => {
                            debug!("Sent to {}: {}", self.peer, response);
                            SessionState::AwaitRequest
                        }
                        Err(e) => {
                            error!("Error! Connection to {} lost: {}", self.peer, e);
                            SessionState::Closed
                        }
                    }
                }
                SessionState::Closed => break,
                other => self.step(other).await,
            };
        }

        info!("Connection to {} closed", self.peer);
    }

    /// Run `request` through validation and dispatch. `None` means the
    /// request kind gets no reply.
    pub async fn handle(&self, request: KvMessage) -> Option<KvMessage> {
        let mut state = SessionState::Validate(request);
        loop {
            state = match state {
                SessionState::Respond(response) => return Some(response),
                SessionState::AwaitRequest | SessionState::Closed => return None,
                other => self.step(other).await,
            };
        }
    }

    /// Advance one of the states that do not touch the socket.
    pub(super) async fn step(&self, state: SessionState) -> SessionState {
        match state {
            SessionState::Validate(request) => self.validate(request),
            SessionState::Dispatch(request) => self.dispatch(request).await,
            other => other,
        }
    }

    /// Node-wide checks that come before any key lookup.
    fn validate(&self, request: KvMessage) -> SessionState {
        if self.cluster.range().is_none() {
            return SessionState::Respond(KvMessage::status(StatusType::ServerStopped));
        }

        if request.status == StatusType::Put && self.cluster.is_write_locked() {
            info!("Rejecting PUT for key {}: write lock active", request.key());
            return SessionState::Respond(KvMessage::status(StatusType::ServerWriteLock));
        }

        if request.status == StatusType::Keyrange {
            let response = match self.cluster.keyrange() {
                Ok(table) => KvMessage::new(StatusType::KeyrangeSuccess, Some(table), None),
                Err(e) => {
                    error!("Error processing keyrange request: {}", e);
                    KvMessage::status(StatusType::ServerStopped)
                }
            };
            return SessionState::Respond(response);
        }

        SessionState::Dispatch(request)
    }

    async fn dispatch(&self, request: KvMessage) -> SessionState {
        let key = request.key();
        if !self.cluster.is_responsible(key) {
            debug!("Key {} is outside this node's range", key);
            return SessionState::Respond(KvMessage::status(StatusType::ServerNotResponsible));
        }

        let response = match request.status {
            StatusType::Get => self.get(key),
            StatusType::Put => match request.value() {
                Some(value) => self.put(key, value).await,
                None => self.delete(key).await,
            },
            other => {
                warn!("Received neither PUT nor GET ({}) from {}", other, self.peer);
                return SessionState::AwaitRequest;
            }
        };

        SessionState::Respond(response)
    }

    fn get(&self, key: &str) -> KvMessage {
        let value = self.engine.get(key);
        let status = if value.is_some() {
            StatusType::GetSuccess
        } else {
            StatusType::GetError
        };
        info!("Processed GET for key: {} ({})", key, status);
        KvMessage::new(status, Some(key.to_string()), value)
    }

    /// Writes run on the blocking pool; the snapshot holds the writer lock.
    async fn put(&self, key: &str, value: &str) -> KvMessage {
        let exists = self.engine.in_storage(key) || self.engine.in_cache(key);
        let (owned_key, owned_value) = (key.to_string(), value.to_string());
        let written = self
            .engine
            .run_blocking(move |engine| engine.put(&owned_key, Some(&owned_value)))
            .await;

        match written {
            Ok(()) => {
                let status = if exists {
                    StatusType::PutUpdate
                } else {
                    StatusType::PutSuccess
                };
                info!("Processed PUT for key: {} ({})", key, status);
                KvMessage::new(status, Some(key.to_string()), Some(value.to_string()))
            }
            Err(e) => {
                error!("Error processing PUT for key {}: {}", key, e);
                KvMessage::status(StatusType::PutError)
            }
        }
    }

    async fn delete(&self, key: &str) -> KvMessage {
        if !(self.engine.in_storage(key) || self.engine.in_cache(key)) {
            info!("DELETE request failed for key: {}: key not found", key);
            return KvMessage::new(StatusType::DeleteError, Some(key.to_string()), None);
        }

        let owned_key = key.to_string();
        let deleted = self
            .engine
            .run_blocking(move |engine| engine.put(&owned_key, None))
            .await;

        match deleted {
            Ok(()) => {
                info!("Processed DELETE for key: {}", key);
                KvMessage::new(StatusType::DeleteSuccess, Some(key.to_string()), None)
            }
            Err(e) => {
                error!("Error processing DELETE for key {}: {}", key, e);
                KvMessage::new(StatusType::DeleteError, Some(key.to_string()), None)
            }
        }
    }
}
