use mail_queue_core::{TaskId, TaskKind, TaskOutcome, TaskRecord};
use mail_queue_worker::TaskObserver;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Prometheus metrics for the mail queue
pub struct ServiceMetrics {
    pub registry: Registry,

    // Submission counters
    pub tasks_submitted: IntCounterVec,
    pub tasks_rejected: IntCounterVec,

    // Terminal outcomes
    pub tasks_finished: IntCounterVec,
    pub task_duration: HistogramVec,
    pub soft_time_limit_hits: IntCounter,

    pub queue_depth: IntGauge,

    // Per-recipient outcomes inside bulk tasks
    pub bulk_recipients: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let tasks_submitted = IntCounterVec::new(
            Opts::new("mq_tasks_submitted_total", "Tasks accepted for dispatch by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(tasks_submitted.clone()))?;

        let tasks_rejected = IntCounterVec::new(
            Opts::new("mq_tasks_rejected_total", "Submissions turned away by admission control"),
            &["kind"],
        )?;
        registry.register(Box::new(tasks_rejected.clone()))?;

        let tasks_finished = IntCounterVec::new(
            Opts::new("mq_tasks_finished_total", "Tasks reaching a terminal state"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(tasks_finished.clone()))?;

        let task_duration = HistogramVec::new(
            HistogramOpts::new("mq_task_duration_seconds", "Task execution time in seconds")
                .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            &["kind"],
        )?;
        registry.register(Box::new(task_duration.clone()))?;

        let soft_time_limit_hits = IntCounter::new(
            "mq_tasks_soft_time_limit_total",
            "Tasks that ran past their soft time limit",
        )?;
        registry.register(Box::new(soft_time_limit_hits.clone()))?;

        let queue_depth = IntGauge::new("mq_queue_depth", "Envelopes waiting for a worker")?;
        registry.register(Box::new(queue_depth.clone()))?;

        let bulk_recipients = IntCounterVec::new(
            Opts::new("mq_bulk_recipients_total", "Bulk recipients by delivery outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(bulk_recipients.clone()))?;

        Ok(ServiceMetrics {
            registry,
            tasks_submitted,
            tasks_rejected,
            tasks_finished,
            task_duration,
            soft_time_limit_hits,
            queue_depth,
            bulk_recipients,
        })
    }

    pub fn inc_submitted(&self, kind: TaskKind) {
        self.tasks_submitted.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn inc_rejected(&self, kind: TaskKind) {
        self.tasks_rejected.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    /// Render the registry in the Prometheus text format
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn record_finished(&self, record: &TaskRecord, outcome: &str, elapsed: Duration) {
        let kind = record.kind.as_str();
        self.tasks_finished.with_label_values(&[kind, outcome]).inc();
        self.task_duration
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
    }
}

/// Feeds terminal transitions from the worker pool into [`ServiceMetrics`].
pub struct MetricsObserver {
    metrics: Arc<ServiceMetrics>,
}

impl MetricsObserver {
    pub fn new(metrics: Arc<ServiceMetrics>) -> Self {
        MetricsObserver { metrics }
    }
}

impl TaskObserver for MetricsObserver {
    fn on_success(&self, record: &TaskRecord, elapsed: Duration) {
        self.metrics.record_finished(record, "completed", elapsed);

        if let Some(TaskOutcome::BulkEmail(result)) = &record.result {
            self.metrics
                .bulk_recipients
                .with_label_values(&["sent"])
                .inc_by(result.summary.sent_count as u64);
            self.metrics
                .bulk_recipients
                .with_label_values(&["failed"])
                .inc_by(result.summary.failed_count as u64);
        }
    }

    fn on_failure(&self, record: &TaskRecord, _error: &str, elapsed: Duration) {
        self.metrics.record_finished(record, "failed", elapsed);
    }

    fn on_soft_time_limit(&self, _task_id: TaskId, _limit: Duration) {
        self.metrics.soft_time_limit_hits.inc();
    }
}
