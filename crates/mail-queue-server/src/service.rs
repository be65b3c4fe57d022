use crate::admission::AdmissionController;
use crate::config::{ServerConfig, StoreBackend};
use crate::dispatcher::TaskDispatcher;
use crate::metrics::{MetricsObserver, ServiceMetrics};
use crate::status::StatusService;
use mail_queue_persistence::{
    Broker, MemoryBroker, MemoryRecordStore, RocksRecordStore, TaskRecordStore,
};
use mail_queue_worker::{build_transport, EmailEngine, LoggingObserver, MailTransport, WorkerPool};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// The assembled service: store, broker, dispatcher, status queries and the worker pool.
pub struct MailQueue {
    config: ServerConfig,
    store: Arc<dyn TaskRecordStore>,
    broker: Arc<dyn Broker>,
    dispatcher: TaskDispatcher,
    status: StatusService,
    metrics: Arc<ServiceMetrics>,
    workers: Arc<WorkerPool>,
}

impl MailQueue {
    /// Build every component from configuration
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn TaskRecordStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryRecordStore::new(config.store.retention())),
            StoreBackend::Rocksdb => {
                Arc::new(RocksRecordStore::open(config.to_task_store_config())?)
            }
        };
        let transport = build_transport(&config.transport)?;

        info!(
            "Using {:?} record store, results expire after {}s",
            config.store.backend, config.store.result_expires_secs
        );

        Self::with_components(config, store, Arc::new(MemoryBroker::new()), transport)
    }

    pub fn with_components(
        config: ServerConfig,
        store: Arc<dyn TaskRecordStore>,
        broker: Arc<dyn Broker>,
        transport: Arc<dyn MailTransport>,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(ServiceMetrics::new()?);

        let admission = AdmissionController::new(broker.clone(), config.admission.clone());
        let dispatcher =
            TaskDispatcher::new(store.clone(), broker.clone(), admission, metrics.clone());
        let status = StatusService::new(store.clone());

        let engine = Arc::new(EmailEngine::new(
            store.clone(),
            transport,
            config.worker.steps.clone(),
        ));
        let workers = Arc::new(
            WorkerPool::new(config.worker.clone(), broker.clone(), engine)
                .with_observer(Arc::new(LoggingObserver))
                .with_observer(Arc::new(MetricsObserver::new(metrics.clone()))),
        );

        Ok(MailQueue {
            config,
            store,
            broker,
            dispatcher,
            status,
            metrics,
            workers,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    pub fn status(&self) -> &StatusService {
        &self.status
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Current backlog, also published to the depth gauge
    pub async fn queue_depth(&self) -> usize {
        let depth = self.dispatcher.admission().queue_depth().await;
        self.metrics.set_queue_depth(depth);
        depth
    }

    pub fn start_workers(&self) -> Vec<JoinHandle<()>> {
        self.workers.start()
    }

    /// Periodically drop expired records until `shutdown` fires.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = self.store.clone();
        let period = self.config.store.sweep_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => match store.purge_expired().await {
                        Ok(0) => {}
                        Ok(purged) => debug!("Purged {} expired task records", purged),
                        Err(e) => error!("Expired record sweep failed: {}", e),
                    },
                }
            }
        })
    }

    /// Refuse new submissions and let the worker pool drain in-flight tasks.
    pub async fn shutdown(&self, worker_handles: Vec<JoinHandle<()>>) {
        self.broker.close();
        self.workers.shutdown_gracefully(worker_handles).await;
    }
}
