use crate::{Result, TaskRecordStore};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use mail_queue_core::{TaskId, TaskRecord};
use std::sync::Arc;
use tracing::debug;

/// In-memory record store. Not durable; everything is lost on restart.
#[derive(Clone)]
pub struct MemoryRecordStore {
    records: Arc<DashMap<TaskId, TaskRecord>>,
    retention: Duration,
}

impl MemoryRecordStore {
    pub fn new(retention: Duration) -> Self {
        MemoryRecordStore {
            records: Arc::new(DashMap::new()),
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TaskRecordStore for MemoryRecordStore {
    async fn put(&self, record: &TaskRecord) -> Result<()> {
        let mut record = record.clone();
        record.expires_at = Some(Utc::now() + self.retention);
        self.records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>> {
        let now = Utc::now();
        let expired = match self.records.get(task_id) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value().clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.records.remove_if(task_id, |_, record| record.is_expired(now));
            debug!("Dropped expired record {}", task_id);
        }
        Ok(None)
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        Ok(before.saturating_sub(self.records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_queue_core::{EmailJob, Progress, TaskState};
    use uuid::Uuid;

    fn record() -> TaskRecord {
        let job = EmailJob::SingleEmail {
            recipient: "a@b.com".to_string(),
            subject: "Hi".to_string(),
            body: "Test".to_string(),
        };
        TaskRecord::pending(Uuid::new_v4(), &job)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryRecordStore::new(Duration::hours(1));
        let mut record = record();
        store.put(&record).await.unwrap();

        record
            .advance(TaskState::Processing, Progress::step(1, "Validating email address"))
            .unwrap();
        store.put(&record).await.unwrap();

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, TaskState::Processing);
        assert!(loaded.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let store = MemoryRecordStore::new(Duration::hours(1));
        assert!(store.get(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_records_read_as_absent() {
        let store = MemoryRecordStore::new(Duration::seconds(-1));
        let record = record();
        store.put(&record).await.unwrap();

        assert!(store.get(&record.id).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let expired = MemoryRecordStore::new(Duration::seconds(-1));
        expired.put(&record()).await.unwrap();
        expired.put(&record()).await.unwrap();
        assert_eq!(expired.purge_expired().await.unwrap(), 2);

        let live = MemoryRecordStore::new(Duration::hours(1));
        live.put(&record()).await.unwrap();
        assert_eq!(live.purge_expired().await.unwrap(), 0);
        assert_eq!(live.len(), 1);
    }
}
