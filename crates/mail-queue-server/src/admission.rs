use crate::config::AdmissionConfig;
use mail_queue_core::TaskKind;
use mail_queue_persistence::Broker;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected { current_depth: usize },
}

/// Turns submissions away while the broker backlog is at or above the per-kind threshold.
pub struct AdmissionController {
    broker: Arc<dyn Broker>,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(broker: Arc<dyn Broker>, config: AdmissionConfig) -> Self {
        AdmissionController { broker, config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Current backlog. A failed depth query counts as an empty queue.
    pub async fn queue_depth(&self) -> usize {
        match self.broker.depth().await {
            Ok(depth) => depth,
            Err(e) => {
                warn!("Could not read queue depth, admitting: {}", e);
                0
            }
        }
    }

    pub async fn admit(&self, kind: TaskKind) -> Admission {
        let depth = self.queue_depth().await;
        let threshold = self.config.threshold(kind);

        if depth >= threshold {
            warn!(
                "Rejecting {} submission: queue depth {} >= {}",
                kind.as_str(),
                depth,
                threshold
            );
            return Admission::Rejected {
                current_depth: depth,
            };
        }

        debug!("Admitting {} submission at depth {}", kind.as_str(), depth);
        Admission::Allowed
    }
}
