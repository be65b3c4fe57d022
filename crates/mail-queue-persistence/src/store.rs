use crate::{Result, TaskRecordStore};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use mail_queue_core::{TaskId, TaskRecord};
use rocksdb::{IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the on-disk record store
#[derive(Debug, Clone)]
pub struct TaskStoreConfig {
    pub data_dir: PathBuf,
    /// How long a record stays readable after its last write
    pub retention: Duration,
}

impl Default for TaskStoreConfig {
    fn default() -> Self {
        TaskStoreConfig {
            data_dir: PathBuf::from("./data"),
            retention: Duration::hours(1),
        }
    }
}

/// Task records persisted in RocksDB, one JSON value per task id.
pub struct RocksRecordStore {
    db: Arc<DB>,
    retention: Duration,
}

impl RocksRecordStore {
    /// Open or create the store under `config.data_dir`
    pub fn open(config: TaskStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);

        let db = DB::open(&db_opts, config.data_dir.join("records"))?;

        info!("Opened task record store at {:?}", config.data_dir);

        Ok(RocksRecordStore {
            db: Arc::new(db),
            retention: config.retention,
        })
    }

    fn write_options() -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        opts
    }
}

#[async_trait]
impl TaskRecordStore for RocksRecordStore {
    async fn put(&self, record: &TaskRecord) -> Result<()> {
        let mut record = record.clone();
        record.expires_at = Some(Utc::now() + self.retention);

        self.db
            .put_opt(record.id.as_bytes(), record.to_bytes()?, &Self::write_options())?;

        debug!("Stored task {} in state {}", record.id, record.state.as_str());
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>> {
        let key = task_id.as_bytes();

        let Some(value) = self.db.get(key)? else {
            return Ok(None);
        };

        let record = TaskRecord::from_bytes(&value)?;
        if record.is_expired(Utc::now()) {
            self.db.delete(key)?;
            debug!("Dropped expired record {}", task_id);
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut batch = WriteBatch::default();
        let mut removed = 0;

        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item?;
            match TaskRecord::from_bytes(&value) {
                Ok(record) if record.is_expired(now) => {
                    batch.delete(&key);
                    removed += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Removing undecodable record: {}", e);
                    batch.delete(&key);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            self.db.write(batch)?;
            info!("Purged {} expired task records", removed);
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_queue_core::{EmailJob, Progress, TaskState};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn open(dir: &TempDir, retention: Duration) -> RocksRecordStore {
        RocksRecordStore::open(TaskStoreConfig {
            data_dir: dir.path().to_path_buf(),
            retention,
        })
        .unwrap()
    }

    fn record() -> TaskRecord {
        let job = EmailJob::BulkEmail {
            recipients: vec!["a@x.com".to_string(), "b@x.com".to_string()],
            subject: "News".to_string(),
            body: "Hello".to_string(),
        };
        TaskRecord::pending(Uuid::new_v4(), &job)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, Duration::hours(1));

        let mut record = record();
        store.put(&record).await.unwrap();
        record
            .advance(TaskState::Processing, Progress::new(1, 2, "Sending email 1/2 to a@x.com"))
            .unwrap();
        store.put(&record).await.unwrap();

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, TaskState::Processing);
        assert_eq!(loaded.progress.unwrap().current, 1);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let record = record();
        {
            let store = open(&dir, Duration::hours(1));
            store.put(&record).await.unwrap();
        }

        let store = open(&dir, Duration::hours(1));
        assert!(store.get(&record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_records() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, Duration::seconds(-1));

        let first = record();
        store.put(&first).await.unwrap();
        store.put(&record()).await.unwrap();

        assert!(store.get(&first.id).await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }
}
