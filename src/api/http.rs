//! HTTP API Server
//!
//! Status queries for operators and `dlockctl`. Lock acquisition and
//! release go through the wire listener, not this API.

use std::sync::Arc;
use axum::{
    extract::{Path, State, Json},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::lock::{LockEntry, LockSummary};
use crate::node::Node;
use crate::state::{HeartbeatRecord, PeerEntry};
use crate::voting::RoundOutcome;
use crate::error::{Error, Result};

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    node: Arc<Node>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, node: Arc<Node>) -> Self {
        Self { config, node }
    }

    /// Create the router
    fn create_router(node: Arc<Node>) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/status", get(handle_status))
            .route("/peers", get(handle_peers))
            .route("/locks", get(handle_locks))
            .route("/locks/:name", get(handle_lock_info))
            .route("/heartbeat", get(handle_heartbeat))
            .layer(TraceLayer::new_for_http())
            .with_state(node)
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return std::future::pending().await;
        }

        let app = Self::create_router(Arc::clone(&self.node));

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Response Types ============

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: String,
}

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub cluster_size: usize,
    pub accept_quorum: usize,
    pub reject_quorum: usize,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub locks: LockSummary,
    pub last_heartbeat: Option<HeartbeatRecord>,
}

/// One lock as seen by this node
#[derive(Debug, Serialize, Deserialize)]
pub struct LockInfo {
    pub name: String,
    pub state: String,
    pub owner: Option<String>,
    pub last_outcome: Option<RoundOutcome>,
    pub updated_at: DateTime<Utc>,
}

impl LockInfo {
    fn new(name: String, entry: LockEntry) -> Self {
        Self {
            name,
            state: entry.state.to_string(),
            owner: entry.state.owner().map(str::to_string),
            last_outcome: entry.last_outcome,
            updated_at: entry.updated_at,
        }
    }
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============ Handlers ============

async fn handle_health(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        node_id: node.node_id().to_string(),
    })
}

async fn handle_status(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let voting = node.voting_config();

    Json(StatusResponse {
        node_id: node.node_id().to_string(),
        cluster_size: node.directory().len(),
        accept_quorum: voting.accept_quorum,
        reject_quorum: voting.reject_quorum,
        poll_interval_ms: voting.poll_interval_ms,
        max_polls: voting.max_polls,
        locks: node.locks().table().summary().await,
        last_heartbeat: node.heartbeat().last().await,
    })
}

async fn handle_peers(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let peers: Vec<PeerEntry> = node.directory().peers().cloned().collect();
    Json(peers)
}

async fn handle_locks(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let locks: Vec<LockInfo> = node
        .locks()
        .table()
        .snapshot()
        .await
        .into_iter()
        .map(|(name, entry)| LockInfo::new(name, entry))
        .collect();
    Json(locks)
}

async fn handle_lock_info(
    State(node): State<Arc<Node>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match node.locks().table().get(&name).await {
        Some(entry) => Json(LockInfo::new(name, entry)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Lock {} has never been referenced on this node", name),
                code: "LOCK_NOT_FOUND".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn handle_heartbeat(State(node): State<Arc<Node>>) -> impl IntoResponse {
    Json(node.heartbeat().last().await)
}
