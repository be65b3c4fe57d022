pub mod admission;
pub mod api;
pub mod config;
pub mod dispatcher;
pub mod metrics;
pub mod service;
pub mod status;

pub use config::ServerConfig;
pub use service::MailQueue;
