use clap::Parser;
use mail_queue_server::api::create_rest_api;
use mail_queue_server::config::StoreBackend;
use mail_queue_server::{MailQueue, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "mq-server")]
#[command(about = "Email task queue: HTTP API and in-process worker pool", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// API host
    #[arg(long, env = "MQ_HOST")]
    host: Option<String>,

    /// API port
    #[arg(long, env = "MQ_PORT")]
    port: Option<u16>,

    /// Number of worker slots
    #[arg(long, env = "MQ_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Record store backend
    #[arg(long, env = "MQ_STORE", value_enum)]
    store: Option<StoreBackend>,

    /// Data directory for the rocksdb store
    #[arg(long, env = "MQ_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_found = std::path::Path::new(&args.config).exists();
    let mut config = if config_found {
        ServerConfig::from_file(&args.config)?
    } else {
        ServerConfig::default()
    };

    // Override with CLI args
    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(concurrency) = args.concurrency {
        config.worker.concurrency = concurrency;
    }
    if let Some(store) = args.store {
        config.store.backend = store;
    }
    if let Some(data_dir) = args.data_dir {
        config.store.data_dir = data_dir;
    }
    if let Some(log_level) = args.log_level {
        config.monitoring.log_level = log_level;
    }

    init_tracing(&config);
    if !config_found {
        tracing::warn!("Config file {} not found, using defaults", args.config);
    }
    tracing::info!("Starting mail queue with config: {:?}", config);

    let queue = Arc::new(MailQueue::new(config.clone())?);

    let worker_handles = queue.start_workers();
    let shutdown = CancellationToken::new();
    let sweeper = queue.spawn_sweeper(shutdown.clone());

    let app = create_rest_api(queue.clone());
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("REST API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    shutdown.cancel();
    queue.shutdown(worker_handles).await;
    let _ = sweeper.await;

    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.monitoring.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.monitoring.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
