//! Web control panel.
//!
//! Serves a small single-page panel and bridges it to the coordinator.
//!
//! ## Endpoints
//!
//! - `GET /` - Serves the embedded control panel
//! - `WS /ws` - Panel commands in, coordinator messages out (JSON)
//! - `GET /api/backups` - Snapshot of every job's lifecycle

mod websocket;

use axum::{Json, Router, extract::State, response::Html, routing::get};
use std::net::SocketAddr;
use tokio::sync::broadcast;

use crate::core::{JobSummary, PanelHandle};

/// Embedded HTML panel
const INDEX_HTML: &str = include_str!("assets/index.html");

/// Shared state for the web server
#[derive(Clone)]
pub struct WebState {
    pub panel: PanelHandle,
}

/// Web server for the control panel.
pub struct WebServer {
    bind_addr: SocketAddr,
    state: WebState,
    shutdown_tx: broadcast::Sender<()>,
}

impl WebServer {
    pub fn new(panel: PanelHandle, bind_addr: SocketAddr) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            bind_addr,
            state: WebState { panel },
            shutdown_tx,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(serve_index))
            .route("/ws", get(websocket::ws_handler))
            .route("/api/backups", get(list_backups))
            .with_state(self.state.clone())
    }

    /// Start the web server. Runs until shutdown() is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "Control panel listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Signal the server to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn serve_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn list_backups(State(state): State<WebState>) -> Json<Vec<JobSummary>> {
    Json(state.panel.jobs())
}
