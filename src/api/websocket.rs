//! Console and provisioning streaming channels. Frame shapes follow the
//! internally-tagged `#[serde(tag = "type")]` idiom from
//! `hostd::websocket_manager::WebSocketMessage`.

use crate::core::progress_channel::ProgressEvent;
use crate::engine::Engine;
use crate::models::{LogLine, ServerState};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> Router<Arc<Engine>> {
    Router::new()
        .route("/ws/console", get(console_upgrade))
        .route("/ws/provisioning", get(provisioning_upgrade))
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ConsoleServerMessage {
    Logs { logs: Vec<LogLine> },
    Log { text: String },
    State { state: ServerState },
    Error { message: String },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ConsoleClientMessage {
    Subscribe { server_id: Uuid },
    Command { text: String },
    Unsubscribe,
}

async fn console_upgrade(ws: WebSocketUpgrade, State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| console_session(socket, engine))
}

async fn console_session(mut socket: WebSocket, engine: Arc<Engine>) {
    // Wait for the client's subscribe frame before touching the hub.
    let server_id = loop {
        let Some(Ok(Message::Text(text))) = socket.recv().await else {
            return;
        };
        match serde_json::from_str::<ConsoleClientMessage>(&text) {
            Ok(ConsoleClientMessage::Subscribe { server_id }) => break server_id,
            Ok(_) => continue,
            Err(_) => continue,
        }
    };

    if engine.get_server(server_id).await.is_err() {
        let msg = ConsoleServerMessage::Error {
            message: format!("server {server_id} not found"),
        };
        if let Ok(text) = serde_json::to_string(&msg) {
            let _ = socket.send(Message::Text(text)).await;
        }
        return;
    }

    let mut log_sub = engine.hub.subscribe_logs(server_id).await;
    let mut state_sub = engine.hub.subscribe_state(server_id).await;

    let backlog = ConsoleServerMessage::Logs { logs: log_sub.backlog.clone() };
    if let Ok(text) = serde_json::to_string(&backlog) {
        if socket.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    if let Some(state) = state_sub.current {
        let msg = ConsoleServerMessage::State { state };
        if let Ok(text) = serde_json::to_string(&msg) {
            let _ = socket.send(Message::Text(text)).await;
        }
    }

    loop {
        tokio::select! {
            line = log_sub.receiver.recv() => {
                let Some(line) = line else { break };
                let msg = ConsoleServerMessage::Log { text: line.text };
                let Ok(text) = serde_json::to_string(&msg) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            state = state_sub.receiver.recv() => {
                let Some(state) = state else { break };
                let msg = ConsoleServerMessage::State { state };
                let Ok(text) = serde_json::to_string(&msg) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                let Some(Ok(frame)) = incoming else { break };
                let Message::Text(text) = frame else { continue };
                match serde_json::from_str::<ConsoleClientMessage>(&text) {
                    Ok(ConsoleClientMessage::Command { text }) => {
                        let _ = engine.send_command(server_id, &text).await;
                    }
                    Ok(ConsoleClientMessage::Unsubscribe) => break,
                    _ => {}
                }
            }
        }
    }

    engine.hub.was_slow_consumer(server_id, log_sub.subscriber_id).await;
    engine.hub.was_slow_consumer(server_id, state_sub.subscriber_id).await;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ProvisioningServerMessage {
    Progress {
        step: String,
        percent: u8,
        message: String,
        current: Option<u32>,
        total: Option<u32>,
    },
    Complete {
        #[serde(rename = "serverId")]
        server_id: Uuid,
    },
    Error {
        message: String,
    },
}

impl From<ProgressEvent> for ProvisioningServerMessage {
    fn from(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::Progress(session) => ProvisioningServerMessage::Progress {
                step: session.current_step,
                percent: session.percent,
                message: session.message,
                current: session.current,
                total: session.total,
            },
            ProgressEvent::Complete { server_id, .. } => ProvisioningServerMessage::Complete { server_id },
            ProgressEvent::Error { message, .. } => ProvisioningServerMessage::Error { message },
        }
    }
}

#[derive(Deserialize)]
struct ProvisioningQuery {
    #[serde(rename = "sessionId")]
    session_id: Uuid,
}

async fn provisioning_upgrade(ws: WebSocketUpgrade, State(engine): State<Arc<Engine>>, Query(q): Query<ProvisioningQuery>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| provisioning_session(socket, engine, q.session_id))
}

async fn provisioning_session(mut socket: WebSocket, engine: Arc<Engine>, session_id: Uuid) {
    let mut receiver = match engine.progress.subscribe(session_id).await {
        Ok(receiver) => receiver,
        Err(err) => {
            let msg = ProvisioningServerMessage::Error { message: err.message() };
            if let Ok(text) = serde_json::to_string(&msg) {
                let _ = socket.send(Message::Text(text)).await;
            }
            return;
        }
    };

    if let Ok(Some(last)) = engine.progress.last_event(session_id).await {
        let msg: ProvisioningServerMessage = last.into();
        if let Ok(text) = serde_json::to_string(&msg) {
            let _ = socket.send(Message::Text(text)).await;
        }
    }

    loop {
        tokio::select! {
            event = receiver.recv() => {
                let Ok(event) = event else { break };
                let terminal = matches!(event, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. });
                let msg: ProvisioningServerMessage = event.into();
                let Ok(text) = serde_json::to_string(&msg) else { continue };
                if socket.send(Message::Text(text)).await.is_err() || terminal {
                    break;
                }
            }
            incoming = socket.recv() => {
                if incoming.is_none() {
                    break;
                }
            }
        }
    }
}
