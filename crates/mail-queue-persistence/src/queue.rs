use crate::{PersistenceError, Result};
use async_trait::async_trait;
use mail_queue_core::TaskEnvelope;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Hand-off queue between the dispatcher and the worker pool.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<()>;

    /// Wait for the next envelope. Returns `None` once the broker is closed and drained.
    async fn dequeue(&self) -> Option<TaskEnvelope>;

    /// Number of envelopes waiting for pickup
    async fn depth(&self) -> Result<usize>;

    /// Remove and return every envelope still waiting.
    fn drain(&self) -> Vec<TaskEnvelope>;

    /// Stop accepting work and wake idle consumers.
    fn close(&self);
}

/// In-process FIFO broker
pub struct MemoryBroker {
    queue: Mutex<VecDeque<TaskEnvelope>>,
    available: Notify,
    closed: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        MemoryBroker {
            queue: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<()> {
        if self.is_closed() {
            return Err(PersistenceError::BrokerClosed);
        }
        self.queue.lock().push_back(envelope);
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Option<TaskEnvelope> {
        loop {
            // Register interest before checking so a concurrent push is not missed
            let notified = self.available.notified();

            if let Some(envelope) = self.queue.lock().pop_front() {
                return Some(envelope);
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }

    async fn depth(&self) -> Result<usize> {
        Ok(self.len())
    }

    fn drain(&self) -> Vec<TaskEnvelope> {
        self.queue.lock().drain(..).collect()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_queue_core::EmailJob;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn envelope(recipient: &str) -> TaskEnvelope {
        TaskEnvelope::new(
            Uuid::new_v4(),
            EmailJob::SingleEmail {
                recipient: recipient.to_string(),
                subject: "Hi".to_string(),
                body: "Test".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let broker = MemoryBroker::new();
        let first = envelope("a@x.com");
        let second = envelope("b@x.com");

        broker.enqueue(first.clone()).await.unwrap();
        broker.enqueue(second.clone()).await.unwrap();
        assert_eq!(broker.depth().await.unwrap(), 2);

        assert_eq!(broker.dequeue().await.unwrap().task_id, first.task_id);
        assert_eq!(broker.dequeue().await.unwrap().task_id, second.task_id);
        assert_eq!(broker.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let broker = Arc::new(MemoryBroker::new());
        let consumer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let sent = envelope("a@x.com");
        broker.enqueue(sent.clone()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.unwrap().task_id, sent.task_id);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let broker = Arc::new(MemoryBroker::new());
        broker.enqueue(envelope("a@x.com")).await.unwrap();
        broker.close();

        assert!(broker.enqueue(envelope("b@x.com")).await.is_err());
        assert!(broker.dequeue().await.is_some());
        assert!(broker.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_drain_empties_queue_in_order() {
        let broker = MemoryBroker::new();
        let first = envelope("a@x.com");
        let second = envelope("b@x.com");
        broker.enqueue(first.clone()).await.unwrap();
        broker.enqueue(second.clone()).await.unwrap();
        broker.close();

        let drained: Vec<_> = broker.drain().into_iter().map(|e| e.task_id).collect();
        assert_eq!(drained, vec![first.task_id, second.task_id]);
        assert!(broker.is_empty());
        assert!(broker.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_idle_consumer() {
        let broker = Arc::new(MemoryBroker::new());
        let consumer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.close();

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(received.is_none());
    }
}
