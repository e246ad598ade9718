//! Progress Channel (C10): session-keyed pub/sub for provisioning progress,
//! with a short terminal-event retention window so a client reconnecting
//! just after completion still observes the final event. Grounded on the
//! session-addressed messaging in `hostd::modpack_installer` progress
//! callbacks and the fctrl reference example's request/response session ids.

use crate::error::{AppError, Result};
use crate::models::ProvisioningSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

const TERMINAL_RETENTION: Duration = Duration::from_secs(60);
const CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress(ProvisioningSession),
    Complete { session_id: Uuid, server_id: Uuid },
    Error { session_id: Uuid, message: String },
}

impl ProgressEvent {
    fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

struct SessionChannel {
    sender: broadcast::Sender<ProgressEvent>,
    last_event: Option<ProgressEvent>,
    terminal_at: Option<Instant>,
}

pub struct ProgressChannel {
    sessions: RwLock<HashMap<Uuid, SessionChannel>>,
}

impl ProgressChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub async fn open_session(&self) -> Uuid {
        let session_id = Uuid::new_v4();
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.sessions.write().await.insert(
            session_id,
            SessionChannel {
                sender,
                last_event: None,
                terminal_at: None,
            },
        );
        session_id
    }

    pub async fn publish(&self, session_id: Uuid, event: ProgressEvent) {
        let mut sessions = self.sessions.write().await;
        if let Some(channel) = sessions.get_mut(&session_id) {
            if event.is_terminal() {
                channel.terminal_at = Some(Instant::now());
            }
            channel.last_event = Some(event.clone());
            let _ = channel.sender.send(event);
        }
    }

    pub async fn subscribe(&self, session_id: Uuid) -> Result<broadcast::Receiver<ProgressEvent>> {
        self.reap_expired().await;
        let sessions = self.sessions.read().await;
        let channel = sessions.get(&session_id).ok_or_else(|| AppError::UnknownSession {
            message: format!("no provisioning session {session_id}"),
        })?;
        Ok(channel.sender.subscribe())
    }

    pub async fn last_event(&self, session_id: Uuid) -> Result<Option<ProgressEvent>> {
        self.reap_expired().await;
        let sessions = self.sessions.read().await;
        let channel = sessions.get(&session_id).ok_or_else(|| AppError::UnknownSession {
            message: format!("no provisioning session {session_id}"),
        })?;
        Ok(channel.last_event.clone())
    }

    async fn reap_expired(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, channel| match channel.terminal_at {
            Some(at) => at.elapsed() < TERMINAL_RETENTION,
            None => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let channel = ProgressChannel::new();
        let err = channel.subscribe(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), "UnknownSession");
    }

    #[tokio::test]
    async fn subscriber_receives_published_progress() {
        let channel = ProgressChannel::new();
        let session_id = channel.open_session().await;
        let mut rx = channel.subscribe(session_id).await.unwrap();
        channel
            .publish(
                session_id,
                ProgressEvent::Progress(ProvisioningSession {
                    session_id,
                    server_id: None,
                    current_step: "download".to_string(),
                    percent: 40,
                    message: "downloading installer".to_string(),
                    current: None,
                    total: None,
                }),
            )
            .await;
        let event = rx.recv().await.unwrap();
        matches!(event, ProgressEvent::Progress(_));
    }

    #[tokio::test]
    async fn last_event_reflects_terminal_state() {
        let channel = ProgressChannel::new();
        let session_id = channel.open_session().await;
        let server_id = Uuid::new_v4();
        channel.publish(session_id, ProgressEvent::Complete { session_id, server_id }).await;
        let last = channel.last_event(session_id).await.unwrap();
        assert!(matches!(last, Some(ProgressEvent::Complete { .. })));
    }
}
