use std::{sync::Arc, time::Duration};

use ais_core::{Publisher, VesselRecord, VesselStore};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    feed::FeedConnector,
    models::Vessel,
    pipeline::Pipeline,
    session::{ConsumerGone, Downstream, Session},
    settings::Mode,
    stats::{RelayStats, StatsSnapshot},
};

/// Everything a request handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub mode: Mode,
    pub connector: Arc<dyn FeedConnector>,
    pub pipeline: Pipeline,
    pub publisher: Publisher<VesselRecord>,
    pub stats: Arc<RelayStats>,
    pub shutdown: CancellationToken,
    pub ping_interval: Duration,
}

/// A downstream consumer connected over WebSocket.
pub struct WsDownstream {
    socket: WebSocket,
    awaiting_pong: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/vessels", get(vessels))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut downstream = WsDownstream {
        socket,
        awaiting_pong: false,
    };
    let mut session = Session::new(state.stats.clone(), state.shutdown.clone())
        .with_keepalive(state.ping_interval);
    info!(session = session.id(), mode = ?state.mode, "consumer connected");

    match (state.mode, state.pipeline.store()) {
        (Mode::Shared, Some(store)) => {
            session
                .run_shared(store, &state.publisher, &mut downstream)
                .await
        }
        _ => {
            session
                .run_dedicated(state.connector.as_ref(), &state.pipeline, &mut downstream)
                .await
        }
    };
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn vessels(State(state): State<AppState>) -> Result<Json<Vec<Vessel>>, StatusCode> {
    let store: &VesselStore = state.pipeline.store().ok_or(StatusCode::NOT_FOUND)?;
    let vessels = store.list(Utc::now()).iter().map(Vessel::from).collect();
    Ok(Json(vessels))
}

async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

#[async_trait]
impl Downstream for WsDownstream {
    async fn send(&mut self, text: String) -> Result<(), ConsumerGone> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| ConsumerGone)
    }

    async fn closed(&mut self) {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "consumer sent close frame");
                    return;
                }
                Some(Ok(Message::Pong(_))) => self.awaiting_pong = false,
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            }
        }
    }

    async fn ping(&mut self) -> Result<(), ConsumerGone> {
        if self.awaiting_pong {
            debug!("consumer never answered the last ping");
            return Err(ConsumerGone);
        }
        self.socket
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|_| ConsumerGone)?;
        self.awaiting_pong = true;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        let _ = self.socket.send(Message::Close(Some(frame))).await;
    }
}
