//! Inbound HTTP endpoint (`POST /post`) feeding the network channel.

use super::InboundChunk;
use super::ingest::{InboundChannel, TERMINATOR};
use crate::error::Result;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Route the panel accepts text on.
pub const POST_PATH: &str = "/post";

/// Builds the router; accepted bodies go to `inbound`.
pub fn router(inbound: mpsc::Sender<InboundChunk>) -> Router {
    Router::new()
        .route(POST_PATH, post(handle_post))
        .with_state(inbound)
}

async fn handle_post(
    State(inbound): State<mpsc::Sender<InboundChunk>>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "no body");
    }
    if std::str::from_utf8(&body).is_err() {
        return (StatusCode::BAD_REQUEST, "body must be UTF-8 text");
    }

    let mut bytes = body.to_vec();
    if bytes.last() != Some(&TERMINATOR) {
        bytes.push(TERMINATOR);
    }
    let len = bytes.len();
    if inbound
        .send(InboundChunk::new(InboundChannel::Network, bytes))
        .await
        .is_err()
    {
        return (StatusCode::SERVICE_UNAVAILABLE, "panel stopped");
    }
    tracing::debug!(bytes = len, "inbound post accepted");
    (StatusCode::OK, "ok")
}

/// The inbound endpoint running on a background task.
pub struct InboundServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl InboundServer {
    /// Binds `bind_addr` (port `0` picks a free port) and starts serving.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the listener cannot bind.
    pub async fn start(bind_addr: &str, inbound: mpsc::Sender<InboundChunk>) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        let addr = listener.local_addr()?;
        info!("panel endpoint listening on http://{addr}{POST_PATH}");

        let app = router(inbound);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("panel endpoint error: {e}");
            }
        });
        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Full URL of the post route.
    pub fn url(&self) -> String {
        format!("http://{}{POST_PATH}", self.addr)
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for InboundServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
