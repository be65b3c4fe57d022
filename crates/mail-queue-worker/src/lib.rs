pub mod config;
pub mod engine;
pub mod executor;
pub mod observer;
pub mod pool;
#[cfg(feature = "smtp")]
pub mod smtp;
pub mod transport;

pub use config::{SmtpConfig, StepDelays, TransportConfig, WorkerConfig};
pub use engine::{EmailEngine, EngineError, EngineResult};
pub use executor::{ExecutionError, TaskExecutor};
pub use observer::{LoggingObserver, TaskObserver};
pub use pool::{WorkerPool, SHUTDOWN_BEFORE_START};
pub use transport::{build_transport, MailTransport, SimulatedTransport, TransportError};
