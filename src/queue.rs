//! Local durable queue of pending writes.
//!
//! The full record list lives under a single key in a [`LocalStore`]. Every
//! mutation is a read-modify-write of that list, serialized by `write_lock`
//! so concurrent enqueue / mark / prune calls cannot lose each other's
//! changes. The queue keeps no in-memory copy of the records; every call
//! reads the persisted list.

use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::constants::{DEFAULT_STORAGE_CAP_BYTES, QUEUE_STORAGE_KEY};
use crate::error::QueueError;
use crate::record::{QueueRecord, RecordId, RecordKind};
use crate::storage::LocalStore;

/// Serialized size of the queue against the advisory capacity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub percentage_of_cap: f64,
}

impl StorageUsage {
    pub fn new(used_bytes: u64, cap_bytes: u64) -> Self {
        let percentage_of_cap = if cap_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / cap_bytes as f64 * 100.0
        };
        Self {
            used_bytes,
            percentage_of_cap,
        }
    }
}

pub struct OfflineQueue {
    store: Arc<dyn LocalStore>,
    key: String,
    cap_bytes: u64,
    write_lock: Mutex<()>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self::with_options(store, QUEUE_STORAGE_KEY, DEFAULT_STORAGE_CAP_BYTES)
    }

    pub fn with_options(store: Arc<dyn LocalStore>, key: &str, cap_bytes: u64) -> Self {
        Self {
            store,
            key: key.to_string(),
            cap_bytes,
            write_lock: Mutex::new(()),
        }
    }

    /// Append a new unsynced record and return its id
    pub async fn enqueue(&self, kind: RecordKind, payload: Value) -> Result<RecordId, QueueError> {
        let record = QueueRecord::new(kind, payload);
        let id = record.id.clone();

        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        records.push(record);
        self.save(&records).await?;

        info!("Queued {} record {} ({} total)", kind, id, records.len());
        Ok(id)
    }

    /// All records, synced and unsynced, in insertion order
    pub async fn list_all(&self) -> Result<Vec<QueueRecord>, QueueError> {
        self.load().await
    }

    /// Records still waiting for a successful remote write, in insertion order
    pub async fn list_unsynced(&self) -> Result<Vec<QueueRecord>, QueueError> {
        let records = self.load().await?;
        Ok(records.into_iter().filter(|r| !r.synced).collect())
    }

    pub async fn unsynced_count(&self) -> Result<usize, QueueError> {
        let records = self.load().await?;
        Ok(records.iter().filter(|r| !r.synced).count())
    }

    /// Flip a record's `synced` flag. Absent ids are ignored: the record may
    /// have been pruned in the meantime.
    pub async fn mark_synced(&self, id: &RecordId) -> Result<(), QueueError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;

        match records.iter_mut().find(|r| &r.id == id) {
            Some(record) if !record.synced => {
                record.synced = true;
                self.save(&records).await?;
            }
            Some(_) => {}
            None => debug!("mark_synced: record {} not found, ignoring", id),
        }
        Ok(())
    }

    /// Drop every synced record. Unsynced records are never touched.
    /// Returns how many records were removed.
    pub async fn prune_synced(&self) -> Result<usize, QueueError> {
        let _guard = self.write_lock.lock().await;
        let records = self.load().await?;
        let before = records.len();

        let remaining: Vec<QueueRecord> = records.into_iter().filter(|r| !r.synced).collect();
        let removed = before - remaining.len();
        if removed > 0 {
            self.save(&remaining).await?;
            info!("Pruned {} synced record(s)", removed);
        }
        Ok(removed)
    }

    /// Serialized size of the full list. Informational only, never enforced.
    pub async fn storage_usage(&self) -> Result<StorageUsage, QueueError> {
        let records = self.load().await?;
        let serialized = encode(&records)?;
        Ok(StorageUsage::new(serialized.len() as u64, self.cap_bytes))
    }

    async fn load(&self) -> Result<Vec<QueueRecord>, QueueError> {
        match self.store.read(&self.key).await? {
            Some(content) => serde_json::from_str(&content)
                .map_err(|e| QueueError::Corrupt(format!("key '{}': {}", self.key, e))),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, records: &[QueueRecord]) -> Result<(), QueueError> {
        let serialized = encode(records)?;
        self.store.write(&self.key, &serialized).await
    }
}

fn encode(records: &[QueueRecord]) -> Result<String, QueueError> {
    serde_json::to_string(records).map_err(|e| QueueError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn memory_queue() -> (Arc<MemoryStore>, OfflineQueue) {
        let store = Arc::new(MemoryStore::new());
        let queue = OfflineQueue::new(store.clone());
        (store, queue)
    }

    #[tokio::test]
    async fn test_enqueue_preserves_insertion_order() {
        let (_store, queue) = memory_queue();
        let a = queue.enqueue(RecordKind::Incident, json!({"n": 1})).await.unwrap();
        let b = queue.enqueue(RecordKind::Checklist, json!({"n": 2})).await.unwrap();
        let c = queue.enqueue(RecordKind::Report, json!({"n": 3})).await.unwrap();

        let ids: Vec<RecordId> = queue
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[tokio::test]
    async fn test_mark_synced_filters_unsynced() {
        let (_store, queue) = memory_queue();
        let a = queue.enqueue(RecordKind::Incident, json!({})).await.unwrap();
        let b = queue.enqueue(RecordKind::Incident, json!({})).await.unwrap();

        queue.mark_synced(&a).await.unwrap();

        let unsynced = queue.list_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, b);
        assert_eq!(queue.unsynced_count().await.unwrap(), 1);
        assert_eq!(queue.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_synced_unknown_id_is_noop() {
        let (_store, queue) = memory_queue();
        queue.enqueue(RecordKind::Report, json!({})).await.unwrap();

        queue.mark_synced(&RecordId::from("missing")).await.unwrap();
        assert_eq!(queue.unsynced_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_unsynced() {
        let (_store, queue) = memory_queue();
        let a = queue.enqueue(RecordKind::Incident, json!({"n": 1})).await.unwrap();
        queue.enqueue(RecordKind::Incident, json!({"n": 2})).await.unwrap();
        queue.mark_synced(&a).await.unwrap();

        let before = queue.list_unsynced().await.unwrap();
        assert_eq!(queue.prune_synced().await.unwrap(), 1);
        assert_eq!(queue.prune_synced().await.unwrap(), 0);
        let after = queue.list_unsynced().await.unwrap();

        assert_eq!(before, after);
        assert_eq!(queue.list_all().await.unwrap(), after);
    }

    #[tokio::test]
    async fn test_storage_usage_matches_serialized_size() {
        let store = Arc::new(MemoryStore::new());
        let queue = OfflineQueue::with_options(store.clone(), "usage_test", 1000);

        let empty = queue.storage_usage().await.unwrap();
        assert_eq!(empty.used_bytes, 2); // "[]"

        queue.enqueue(RecordKind::Checklist, json!({"item": "helmet"})).await.unwrap();
        let stored = store.read("usage_test").await.unwrap().unwrap();
        let usage = queue.storage_usage().await.unwrap();
        assert_eq!(usage.used_bytes, stored.len() as u64);
        assert!((usage.percentage_of_cap - stored.len() as f64 / 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_corrupt_list_is_surfaced() {
        let (store, queue) = memory_queue();
        store.write(QUEUE_STORAGE_KEY, "{not json").await.unwrap();

        assert!(matches!(
            queue.list_all().await,
            Err(QueueError::Corrupt(_))
        ));
        assert!(matches!(
            queue.enqueue(RecordKind::Incident, json!({})).await,
            Err(QueueError::Corrupt(_))
        ));
        // The corrupt value is left in place for inspection
        assert_eq!(
            store.read(QUEUE_STORAGE_KEY).await.unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn test_enqueue_surfaces_storage_unavailable() {
        let (store, queue) = memory_queue();
        store.set_unavailable(true);

        let err = queue
            .enqueue(RecordKind::Incident, json!({"lost": false}))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_are_not_lost() {
        let (_store, queue) = memory_queue();
        let queue = Arc::new(queue);

        let mut handles = Vec::new();
        for i in 0..20 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue.enqueue(RecordKind::Inspection, json!({"i": i})).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.unsynced_count().await.unwrap(), 20);
    }
}
