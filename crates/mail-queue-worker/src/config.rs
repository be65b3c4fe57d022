use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker id prefix; derived from hostname and pid when unset
    pub worker_id: Option<String>,
    /// Number of tasks executed in parallel
    pub concurrency: usize,
    pub task_time_limit_secs: u64,
    /// Warning threshold, normally shorter than the hard limit
    pub task_soft_time_limit_secs: u64,
    pub graceful_shutdown_timeout_secs: u64,
    pub steps: StepDelays,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            worker_id: None,
            concurrency: 4,
            task_time_limit_secs: 300,
            task_soft_time_limit_secs: 240,
            graceful_shutdown_timeout_secs: 60,
            steps: StepDelays::default(),
        }
    }
}

impl WorkerConfig {
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.task_time_limit_secs)
    }

    /// Log-only threshold: passing it warns and notifies observers, the task keeps running.
    /// `None` when the soft limit would not fire before the hard one.
    pub fn soft_time_limit(&self) -> Option<Duration> {
        if self.task_soft_time_limit_secs == 0
            || self.task_soft_time_limit_secs >= self.task_time_limit_secs
        {
            None
        } else {
            Some(Duration::from_secs(self.task_soft_time_limit_secs))
        }
    }

    pub fn generate_worker_id(&self) -> String {
        use std::process;
        use uuid::Uuid;

        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = process::id();
        let random = Uuid::new_v4().simple().to_string();

        format!("{}-{}-{}", hostname, pid, &random[..8])
    }
}

/// Pauses standing in for network latency between engine steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDelays {
    pub validate_ms: u64,
    pub prepare_ms: u64,
    pub connect_ms: u64,
    pub finalize_ms: u64,
    /// Pause after each attempted bulk delivery
    pub between_recipients_ms: u64,
}

impl Default for StepDelays {
    fn default() -> Self {
        StepDelays {
            validate_ms: 1000,
            prepare_ms: 1000,
            connect_ms: 2000,
            finalize_ms: 500,
            between_recipients_ms: 1000,
        }
    }
}

impl StepDelays {
    pub fn none() -> Self {
        StepDelays {
            validate_ms: 0,
            prepare_ms: 0,
            connect_ms: 0,
            finalize_ms: 0,
            between_recipients_ms: 0,
        }
    }
}

/// Which mail transport workers deliver through
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Simulated {
        #[serde(default = "default_min_latency_ms")]
        min_latency_ms: u64,
        #[serde(default = "default_max_latency_ms")]
        max_latency_ms: u64,
        /// Probability in [0, 1] that a delivery fails
        #[serde(default)]
        failure_rate: f64,
    },
    Smtp(SmtpConfig),
}

fn default_min_latency_ms() -> u64 {
    1000
}

fn default_max_latency_ms() -> u64 {
    3000
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Simulated {
            min_latency_ms: default_min_latency_ms(),
            max_latency_ms: default_max_latency_ms(),
            failure_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address
    pub from: String,
    /// "starttls" (default), "tls" or "none"
    #[serde(default = "default_tls")]
    pub tls: String,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_tls() -> String {
    "starttls".to_string()
}

fn default_smtp_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_limit() {
        let config = WorkerConfig::default();
        assert_eq!(config.time_limit(), Duration::from_secs(300));
        assert_eq!(config.soft_time_limit(), Some(Duration::from_secs(240)));

        let config = WorkerConfig {
            task_time_limit_secs: 10,
            task_soft_time_limit_secs: 10,
            ..Default::default()
        };
        assert_eq!(config.soft_time_limit(), None);
    }

    #[test]
    fn test_worker_id() {
        let config = WorkerConfig {
            worker_id: Some("worker-a".to_string()),
            ..Default::default()
        };
        assert_eq!(config.generate_worker_id(), "worker-a");

        let generated = WorkerConfig::default().generate_worker_id();
        assert!(generated.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_transport_config_yaml() {
        let yaml = "kind: simulated\nfailure_rate: 0.1\n";
        let config: TransportConfig = serde_yaml::from_str(yaml).unwrap();
        match config {
            TransportConfig::Simulated { min_latency_ms, max_latency_ms, failure_rate } => {
                assert_eq!(min_latency_ms, 1000);
                assert_eq!(max_latency_ms, 3000);
                assert_eq!(failure_rate, 0.1);
            }
            other => panic!("unexpected transport config: {:?}", other),
        }

        let yaml = "kind: smtp\nhost: smtp.example.com\nfrom: noreply@example.com\n";
        let config: TransportConfig = serde_yaml::from_str(yaml).unwrap();
        match config {
            TransportConfig::Smtp(smtp) => {
                assert_eq!(smtp.port, 587);
                assert_eq!(smtp.tls, "starttls");
            }
            other => panic!("unexpected transport config: {:?}", other),
        }
    }
}
