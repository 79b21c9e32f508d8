//! Network Server
//!
//! HTTP listener for wire messages from peers and clients. Each request
//! is served on its own task, so vote replies keep flowing while a
//! local round is polling.

use std::sync::Arc;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::dispatcher::Dispatcher;
use super::protocol::Envelope;
use crate::error::{Error, Result};

/// Wire listener for one node
pub struct NetworkServer {
    /// Bind address
    bind_address: String,
    /// Routes decoded messages
    dispatcher: Arc<Dispatcher>,
}

impl NetworkServer {
    /// Create a new network server
    pub fn new(bind_address: String, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            bind_address,
            dispatcher,
        }
    }

    /// Create the router
    pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
        Router::new()
            .route("/", post(handle_message))
            .layer(TraceLayer::new_for_http())
            .with_state(dispatcher)
    }

    /// Bind the listener; failure here is fatal at startup
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(&self.bind_address).await.map_err(|e| {
            Error::Network(format!("cannot bind wire listener on {}: {}", self.bind_address, e))
        })
    }

    /// Serve wire messages on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!("Network server listening on {}", self.bind_address);

        axum::serve(listener, Self::router(Arc::clone(&self.dispatcher)))
            .await
            .map_err(|e| Error::Network(format!("Network server error: {}", e)))?;

        tracing::info!("Network server stopped");
        Ok(())
    }

    /// Bind and serve
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

async fn handle_message(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(envelope): Json<Envelope>,
) -> Response {
    match dispatcher.dispatch(envelope).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::OK.into_response(),
    }
}
