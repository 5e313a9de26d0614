//! Connection supervisor: owns the listening socket, the shared engine and
//! the cluster state, and one handler task per client connection.

mod handler;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

pub use handler::{ClientHandler, SessionState};

use crate::cache::CachePolicy;
use crate::config::RingstoreConfig;
use crate::ring::ClusterState;
use crate::storage::StorageEngine;
use crate::RingstoreError;

pub struct KvServer {
    listen_addr: SocketAddr,
    max_line_length: usize,
    shutdown_timeout: Duration,
    engine: Arc<StorageEngine>,
    cluster: Arc<ClusterState>,
    shutdown: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl KvServer {
    pub fn new(
        config: &RingstoreConfig,
        engine: Arc<StorageEngine>,
        cluster: Arc<ClusterState>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            listen_addr: config.node.listen_addr,
            max_line_length: config.network.max_line_length,
            shutdown_timeout: config.network.shutdown_timeout,
            engine,
            cluster,
            shutdown,
            accept_task: None,
            local_addr: None,
        }
    }

    /// Open storage and cluster state as described by `config`.
    pub fn from_config(config: &RingstoreConfig) -> Result<Self, RingstoreError> {
        let engine = StorageEngine::open(
            &config.node.data_dir,
            config.cache.policy,
            config.cache.capacity,
        )?;

        let range = config.cluster.key_range()?;
        let cluster = ClusterState::new(config.node.listen_addr.to_string(), range);
        cluster.set_write_locked(config.cluster.write_locked);

        Ok(Self::new(config, Arc::new(engine), Arc::new(cluster)))
    }

    pub fn engine(&self) -> Arc<StorageEngine> {
        self.engine.clone()
    }

    pub fn cluster(&self) -> Arc<ClusterState> {
        self.cluster.clone()
    }

    /// Bound address once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.engine.cache_policy()
    }

    pub fn cache_capacity(&self) -> usize {
        self.engine.cache_capacity()
    }

    pub fn is_running(&self) -> bool {
        self.accept_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Bind the listener and start accepting connections.
    pub async fn start(&mut self) -> Result<SocketAddr, RingstoreError> {
        if let Some(addr) = self.local_addr.filter(|_| self.is_running()) {
            return Ok(addr);
        }

        let listener = TcpListener::bind(self.listen_addr).await.map_err(|e| {
            error!("Error! Cannot open server socket on {}: {}", self.listen_addr, e);
            RingstoreError::Io(e)
        })?;
        let addr = listener.local_addr()?;
        info!("KV server listening on {}", addr);

        self.shutdown.send_replace(false);
        let acceptor = Acceptor {
            listener,
            engine: self.engine.clone(),
            cluster: self.cluster.clone(),
            max_line_length: self.max_line_length,
            shutdown_timeout: self.shutdown_timeout,
            shutdown: self.shutdown.subscribe(),
        };

        self.accept_task = Some(tokio::spawn(acceptor.run()));
        self.local_addr = Some(addr);
        Ok(addr)
    }

    /// Stop accepting, let open connections finish their current request,
    /// then write a final snapshot.
    pub async fn stop(&mut self) -> Result<(), RingstoreError> {
        self.shutdown.send_replace(true);
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error!("Accept loop ended abnormally: {}", e);
            }
        }

        self.engine.run_blocking(StorageEngine::flush).await?;
        info!("Server stopped");
        Ok(())
    }

    /// Stop immediately: abort every connection and skip the final snapshot.
    pub fn kill(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        info!("Server socket closed");
    }
}

impl Drop for KvServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

struct Acceptor {
    listener: TcpListener,
    engine: Arc<StorageEngine>,
    cluster: Arc<ClusterState>,
    max_line_length: usize,
    shutdown_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Acceptor {
    /// Accept until shutdown. Dropping this future aborts every handler.
    async fn run(mut self) {
        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Connected to client: {}", peer);
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }
                        let handler = ClientHandler::new(
                            peer.to_string(),
                            self.engine.clone(),
                            self.cluster.clone(),
                            self.max_line_length,
                            self.shutdown.clone(),
                        );
                        handlers.spawn(handler.run(stream));
                    }
                    Err(e) => error!("Error accepting client connection: {}", e),
                },
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        error!("Client handler failed: {}", e);
                    }
                }
            }
        }

        drop(self.listener);
        info!("Server is stopping, waiting for {} connections", handlers.len());

        let drain = async {
            while let Some(joined) = handlers.join_next().await {
                if let Err(e) = joined {
                    error!("Client handler failed: {}", e);
                }
            }
        };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            warn!("Shutdown timeout elapsed, aborting {} connections", handlers.len());
            handlers.abort_all();
        }
    }
}
