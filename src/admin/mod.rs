//! Admin HTTP API: rebalancing control and maintenance operations.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};
use serde::{Deserialize, Serialize};

use crate::ring::{parse_hash, ClusterState, KeyRange, RangeError};
use crate::storage::StorageEngine;

/// Shared handles for the admin handlers
#[derive(Clone)]
pub struct AdminState {
    pub engine: Arc<StorageEngine>,
    pub cluster: Arc<ClusterState>,
    pub node_name: Option<String>,
}

impl AdminState {
    pub fn new(engine: Arc<StorageEngine>, cluster: Arc<ClusterState>) -> Self {
        Self {
            engine,
            cluster,
            node_name: None,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.node_name = name;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RangeUpdate {
    pub low: Option<String>,
    pub high: Option<String>,
}

impl RangeUpdate {
    /// Both bounds or neither; `None` clears the range.
    pub fn key_range(&self) -> Result<Option<KeyRange>, RangeError> {
        let low = self.low.as_deref().map(parse_hash).transpose()?;
        let high = self.high.as_deref().map(parse_hash).transpose()?;
        KeyRange::from_bounds(low, high)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteLockUpdate {
    pub locked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoragePathUpdate {
    pub path: PathBuf,
}

/// Register every admin route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(api::health))
        .route("/stats", web::get().to(api::stats))
        .route("/range", web::get().to(api::get_range))
        .route("/range", web::put().to(api::set_range))
        .route("/write-lock", web::put().to(api::set_write_lock))
        .route("/metadata", web::put().to(api::set_metadata))
        .route("/cache/clear", web::post().to(api::clear_cache))
        .route("/storage/clear", web::post().to(api::clear_storage))
        .route("/storage/path", web::put().to(api::set_storage_path));
}

/// Bind the admin API. The returned server is not yet polled.
pub fn serve(addr: SocketAddr, state: AdminState) -> std::io::Result<Server> {
    let data = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .workers(1)
    .disable_signals()
    .bind(addr)?
    .run();

    Ok(server)
}

pub mod api {
    use super::*;
    use crate::ring::RingEntry;
    use crate::storage::StorageError;
    use actix_web::{HttpResponse, Result};
    use serde_json::json;
    use tracing::{error, info};

    pub async fn health(state: web::Data<AdminState>) -> Result<HttpResponse> {
        Ok(HttpResponse::Ok().json(json!({
            "status": "healthy",
            "service": "ringstore",
            "node": state.node_name,
            "version": env!("CARGO_PKG_VERSION")
        })))
    }

    pub async fn stats(state: web::Data<AdminState>) -> Result<HttpResponse> {
        Ok(HttpResponse::Ok().json(json!({
            "address": state.cluster.advertised_addr(),
            "range": state.cluster.range(),
            "write_locked": state.cluster.is_write_locked(),
            "storage_path": state.engine.storage_path(),
            "storage": state.engine.stats(),
        })))
    }

    pub async fn get_range(state: web::Data<AdminState>) -> Result<HttpResponse> {
        Ok(HttpResponse::Ok().json(json!({ "range": state.cluster.range() })))
    }

    pub async fn set_range(
        req: web::Json<RangeUpdate>,
        state: web::Data<AdminState>,
    ) -> Result<HttpResponse> {
        match req.key_range() {
            Ok(range) => {
                state.cluster.set_range(range);
                Ok(HttpResponse::Ok().json(json!({ "range": range })))
            }
            Err(e) => Ok(HttpResponse::BadRequest().json(json!({"error": e.to_string()}))),
        }
    }

    pub async fn set_write_lock(
        req: web::Json<WriteLockUpdate>,
        state: web::Data<AdminState>,
    ) -> Result<HttpResponse> {
        state.cluster.set_write_locked(req.locked);
        Ok(HttpResponse::Ok().json(json!({ "write_locked": req.locked })))
    }

    pub async fn set_metadata(
        req: web::Json<Vec<RingEntry>>,
        state: web::Data<AdminState>,
    ) -> Result<HttpResponse> {
        let entries = req.into_inner();
        let count = entries.len();
        state.cluster.set_metadata(entries);
        Ok(HttpResponse::Ok().json(json!({ "entries": count })))
    }

    pub async fn clear_cache(state: web::Data<AdminState>) -> Result<HttpResponse> {
        state.engine.clear_cache();
        Ok(HttpResponse::Ok().json(json!({"status": "cache cleared"})))
    }

    pub async fn clear_storage(state: web::Data<AdminState>) -> Result<HttpResponse> {
        match state.engine.run_blocking(StorageEngine::clear_storage).await {
            Ok(()) => Ok(HttpResponse::Ok().json(json!({"status": "storage cleared"}))),
            Err(e) => {
                error!("Failed to clear storage: {}", e);
                Ok(HttpResponse::InternalServerError().json(json!({"error": e.to_string()})))
            }
        }
    }

    pub async fn set_storage_path(
        req: web::Json<StoragePathUpdate>,
        state: web::Data<AdminState>,
    ) -> Result<HttpResponse> {
        let path = req.into_inner().path;
        let moved = state
            .engine
            .run_blocking(move |engine| engine.set_storage_path(path))
            .await;

        match moved {
            Ok(()) => {
                info!("Storage path changed via admin API");
                Ok(HttpResponse::Ok().json(json!({ "storage_path": state.engine.storage_path() })))
            }
            Err(e @ StorageError::InvalidStorageDir(_)) => {
                Ok(HttpResponse::BadRequest().json(json!({"error": e.to_string()})))
            }
            Err(e) => Ok(HttpResponse::InternalServerError().json(json!({"error": e.to_string()}))),
        }
    }
}
