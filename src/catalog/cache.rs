//! 30-minute single-flight cache in front of [`CatalogClient::file_detail`],
//! keyed by `(modpack_id, file_id)`. Grounded on the content-addressed
//! single-flight idiom in `uv_cache::Cache`, adapted to a TTL'd metadata
//! cache rather than a durable content store.

use crate::catalog::client::CatalogClient;
use crate::catalog::types::FileDetail;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(30 * 60);

enum Slot {
    Ready { value: FileDetail, fetched_at: Instant },
    InFlight(Arc<tokio::sync::Notify>),
}

pub struct FileDetailCache {
    client: Arc<CatalogClient>,
    slots: RwLock<HashMap<(String, String), Slot>>,
    lock: Mutex<()>,
}

impl FileDetailCache {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self {
            client,
            slots: RwLock::new(HashMap::new()),
            lock: Mutex::new(()),
        }
    }

    pub async fn get(&self, modpack_id: &str, file_id: &str) -> Result<FileDetail> {
        let key = (modpack_id.to_string(), file_id.to_string());

        loop {
            let _serialize = self.lock.lock().await;
            let mut slots = self.slots.write().await;
            match slots.get(&key) {
                Some(Slot::Ready { value, fetched_at }) if fetched_at.elapsed() < TTL => {
                    return Ok(value.clone());
                }
                Some(Slot::InFlight(notify)) => {
                    let notify = notify.clone();
                    drop(slots);
                    drop(_serialize);
                    notify.notified().await;
                    continue;
                }
                _ => {
                    let notify = Arc::new(tokio::sync::Notify::new());
                    slots.insert(key.clone(), Slot::InFlight(notify.clone()));
                    drop(slots);
                    drop(_serialize);

                    let result = self.client.file_detail(&key.0, &key.1).await;
                    let mut slots = self.slots.write().await;
                    match &result {
                        Ok(value) => {
                            slots.insert(
                                key.clone(),
                                Slot::Ready {
                                    value: value.clone(),
                                    fetched_at: Instant::now(),
                                },
                            );
                        }
                        Err(_) => {
                            slots.remove(&key);
                        }
                    }
                    drop(slots);
                    notify.notify_waiters();
                    return result;
                }
            }
        }
    }
}
