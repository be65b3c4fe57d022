mod memory;
mod queue;
mod store;

pub use memory::MemoryRecordStore;
pub use queue::{Broker, MemoryBroker};
pub use store::{RocksRecordStore, TaskStoreConfig};

use async_trait::async_trait;
use mail_queue_core::{TaskId, TaskRecord};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),

    #[error("Task error: {0}")]
    TaskError(#[from] mail_queue_core::TaskError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Broker is closed")]
    BrokerClosed,
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Key-value store for task records with per-record expiry.
///
/// Each `put` stamps `expires_at` and must be visible to `get` once it returns.
/// Expired records read as absent.
#[async_trait]
pub trait TaskRecordStore: Send + Sync + 'static {
    async fn put(&self, record: &TaskRecord) -> Result<()>;

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>>;

    /// Drop every expired record, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}
