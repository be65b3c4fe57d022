//! Outbound mail delivery.
//!
//! The engine only talks to [`MailTransport`]; swapping the simulated transport
//! for SMTP (or any other provider) does not touch the state machine.

use crate::config::TransportConfig;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport not available: {0}")]
    Unsupported(String),
}

/// Capability the engine uses to reach the outside world.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Establish (or verify) the outbound connection.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Deliver one message.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}

/// Build the transport selected in configuration
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn MailTransport>, TransportError> {
    match config {
        TransportConfig::Simulated {
            min_latency_ms,
            max_latency_ms,
            failure_rate,
        } => Ok(Arc::new(SimulatedTransport::new(
            Duration::from_millis(*min_latency_ms),
            Duration::from_millis(*max_latency_ms),
            *failure_rate,
        ))),
        #[cfg(feature = "smtp")]
        TransportConfig::Smtp(smtp) => Ok(Arc::new(crate::smtp::SmtpTransport::from_config(smtp)?)),
        #[cfg(not(feature = "smtp"))]
        TransportConfig::Smtp(_) => Err(TransportError::Unsupported(
            "built without the `smtp` feature".to_string(),
        )),
    }
}

/// Stand-in transport that sleeps for a random latency and optionally fails.
pub struct SimulatedTransport {
    min_latency: Duration,
    max_latency: Duration,
    failure_rate: f64,
}

impl SimulatedTransport {
    pub fn new(min_latency: Duration, max_latency: Duration, failure_rate: f64) -> Self {
        SimulatedTransport {
            min_latency,
            max_latency: max_latency.max(min_latency),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    /// Zero latency, never fails
    pub fn instant() -> Self {
        SimulatedTransport::new(Duration::ZERO, Duration::ZERO, 0.0)
    }

    fn roll(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let latency = if self.max_latency > self.min_latency {
            rng.gen_range(self.min_latency..=self.max_latency)
        } else {
            self.min_latency
        };
        let fails = self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate);
        (latency, fails)
    }
}

#[async_trait]
impl MailTransport for SimulatedTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        let (latency, fails) = self.roll();
        tokio::time::sleep(latency).await;

        if fails {
            return Err(TransportError::Delivery(format!(
                "simulated failure delivering to {}",
                recipient
            )));
        }

        info!("[SIMULATED] Email sent to {}", recipient);
        debug!(
            subject,
            preview = %body.chars().take(50).collect::<String>(),
            latency_ms = latency.as_millis() as u64,
            "Simulated delivery details"
        );
        Ok(())
    }
}
