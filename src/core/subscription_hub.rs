//! Subscription Hub (C7): per-server log/state fan-out with immediate
//! backlog delivery and a bounded-queue backpressure policy. Grounded on
//! the broadcast-fan-out pattern in `hostd::websocket_manager::WebSocketManager`.

use crate::models::{LogLine, ServerState};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

const SUBSCRIBER_QUEUE_DEPTH: usize = 256;
const LOG_BACKLOG_CAPACITY: usize = 1000;

struct LogSubscriber {
    id: u64,
    sender: mpsc::Sender<LogLine>,
}

struct StateSubscriber {
    id: u64,
    sender: mpsc::Sender<ServerState>,
}

#[derive(Default)]
struct ServerTopics {
    log_backlog: VecDeque<LogLine>,
    log_subscribers: Vec<LogSubscriber>,
    last_state: Option<ServerState>,
    state_subscribers: Vec<StateSubscriber>,
}

/// Handle returned from [`SubscriptionHub::subscribe_logs`]: the immediate
/// backlog plus a receiver for everything published afterward.
pub struct LogSubscription {
    pub subscriber_id: u64,
    pub backlog: Vec<LogLine>,
    pub receiver: mpsc::Receiver<LogLine>,
}

pub struct StateSubscription {
    pub subscriber_id: u64,
    pub current: Option<ServerState>,
    pub receiver: mpsc::Receiver<ServerState>,
}

pub struct SubscriptionHub {
    topics: RwLock<HashMap<Uuid, ServerTopics>>,
    next_subscriber_id: AtomicU64,
    // Subscribers evicted for falling behind, so the caller can surface
    // SlowConsumer instead of treating channel closure as a clean unsubscribe.
    slow_consumers: RwLock<HashSet<(Uuid, u64)>>,
}

impl SubscriptionHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: RwLock::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            slow_consumers: RwLock::new(HashSet::new()),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_subscriber_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn publish_log(&self, server_id: Uuid, line: LogLine) {
        let mut topics = self.topics.write().await;
        let entry = topics.entry(server_id).or_default();
        entry.log_backlog.push_back(line.clone());
        if entry.log_backlog.len() > LOG_BACKLOG_CAPACITY {
            entry.log_backlog.pop_front();
        }
        let mut evicted = Vec::new();
        entry.log_subscribers.retain(|sub| match sub.sender.try_send(line.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                evicted.push(sub.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        drop(topics);
        if !evicted.is_empty() {
            let mut slow = self.slow_consumers.write().await;
            for id in evicted {
                slow.insert((server_id, id));
            }
        }
    }

    pub async fn publish_state(&self, server_id: Uuid, state: ServerState) {
        let mut topics = self.topics.write().await;
        let entry = topics.entry(server_id).or_default();
        entry.last_state = Some(state);
        let mut evicted = Vec::new();
        entry.state_subscribers.retain(|sub| match sub.sender.try_send(state) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                evicted.push(sub.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        drop(topics);
        if !evicted.is_empty() {
            let mut slow = self.slow_consumers.write().await;
            for id in evicted {
                slow.insert((server_id, id));
            }
        }
    }

    pub async fn subscribe_logs(&self, server_id: Uuid) -> LogSubscription {
        let id = self.next_id();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let mut topics = self.topics.write().await;
        let entry = topics.entry(server_id).or_default();
        let backlog: Vec<LogLine> = entry.log_backlog.iter().cloned().collect();
        entry.log_subscribers.push(LogSubscriber { id, sender: tx });
        LogSubscription {
            subscriber_id: id,
            backlog,
            receiver: rx,
        }
    }

    pub async fn subscribe_state(&self, server_id: Uuid) -> StateSubscription {
        let id = self.next_id();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let mut topics = self.topics.write().await;
        let entry = topics.entry(server_id).or_default();
        let current = entry.last_state;
        entry.state_subscribers.push(StateSubscriber { id, sender: tx });
        StateSubscription {
            subscriber_id: id,
            current,
            receiver: rx,
        }
    }

    /// Called after a subscriber's receiver stream ends, to distinguish a
    /// deliberate unsubscribe from an eviction for falling behind.
    pub async fn was_slow_consumer(&self, server_id: Uuid, subscriber_id: u64) -> bool {
        self.slow_consumers.write().await.remove(&(server_id, subscriber_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::LogStream;

    fn line(seq: u64) -> LogLine {
        LogLine {
            server_id: Uuid::nil(),
            seq,
            wall_time: Utc::now(),
            stream: LogStream::Stdout,
            text: format!("line {seq}"),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_immediate_backlog() {
        let hub = SubscriptionHub::new();
        let server_id = Uuid::new_v4();
        hub.publish_log(server_id, line(1)).await;
        hub.publish_log(server_id, line(2)).await;
        let sub = hub.subscribe_logs(server_id).await;
        assert_eq!(sub.backlog.len(), 2);
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_marked_slow() {
        let hub = SubscriptionHub::new();
        let server_id = Uuid::new_v4();
        let sub = hub.subscribe_logs(server_id).await;
        for i in 0..(SUBSCRIBER_QUEUE_DEPTH as u64 + 10) {
            hub.publish_log(server_id, line(i)).await;
        }
        assert!(hub.was_slow_consumer(server_id, sub.subscriber_id).await);
    }

    #[tokio::test]
    async fn well_behaved_subscriber_is_not_marked_slow() {
        let hub = SubscriptionHub::new();
        let server_id = Uuid::new_v4();
        let mut sub = hub.subscribe_logs(server_id).await;
        hub.publish_log(server_id, line(1)).await;
        let _ = sub.receiver.recv().await;
        drop(sub.receiver);
        assert!(!hub.was_slow_consumer(server_id, sub.subscriber_id).await);
    }
}
