use mail_queue_core::{TaskKind, DEFAULT_MAX_BULK_RECIPIENTS};
use mail_queue_persistence::TaskStoreConfig;
use mail_queue_worker::{TransportConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub admission: AdmissionConfig,
    pub worker: WorkerConfig,
    pub transport: TransportConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub data_dir: PathBuf,
    /// How long a record stays readable after its last write
    pub result_expires_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub single_threshold: usize,
    pub bulk_threshold: usize,
    pub max_bulk_recipients: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: StoreBackend::Memory,
            data_dir: PathBuf::from("./data"),
            result_expires_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        AdmissionConfig {
            single_threshold: 50,
            bulk_threshold: 30,
            max_bulk_recipients: DEFAULT_MAX_BULK_RECIPIENTS,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl AdmissionConfig {
    /// Queue depth at which submissions of `kind` are turned away
    pub fn threshold(&self, kind: TaskKind) -> usize {
        match kind {
            TaskKind::SingleEmail => self.single_threshold,
            TaskKind::BulkEmail => self.bulk_threshold,
        }
    }
}

impl StoreConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.result_expires_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_task_store_config(&self) -> TaskStoreConfig {
        TaskStoreConfig {
            data_dir: self.store.data_dir.clone(),
            retention: self.store.retention(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.result_expires_secs, 3600);
        assert_eq!(config.admission.threshold(TaskKind::SingleEmail), 50);
        assert_eq!(config.admission.threshold(TaskKind::BulkEmail), 30);
        assert_eq!(config.admission.max_bulk_recipients, 100);
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
api:
  port: 9000
store:
  backend: rocksdb
  data_dir: /var/lib/mail-queue
admission:
  bulk_threshold: 5
worker:
  concurrency: 8
transport:
  kind: simulated
  failure_rate: 0.1
monitoring:
  json_logs: true
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.store.backend, StoreBackend::Rocksdb);
        assert_eq!(config.store.result_expires_secs, 3600);
        assert_eq!(config.admission.bulk_threshold, 5);
        assert_eq!(config.admission.single_threshold, 50);
        assert_eq!(config.worker.concurrency, 8);
        assert_eq!(config.worker.task_time_limit_secs, 300);
        assert!(config.monitoring.json_logs);
        assert_eq!(config.monitoring.log_level, "info");

        let store = config.to_task_store_config();
        assert_eq!(store.data_dir, PathBuf::from("/var/lib/mail-queue"));
        assert_eq!(store.retention, chrono::Duration::hours(1));
    }

    #[test]
    fn test_example_config_parses() {
        let config: ServerConfig =
            serde_yaml::from_str(include_str!("../../../config.example.yaml")).unwrap();
        assert_eq!(config.admission.single_threshold, 50);
        assert_eq!(config.worker.steps.connect_ms, 2000);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "api:\n  host: 127.0.0.1\n").unwrap();

        let config = ServerConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
    }
}
