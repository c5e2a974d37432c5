use metrics_exporter_prometheus::PrometheusBuilder;
use promo_pipeline::{
    app_state::AppState,
    config::AppConfig,
    db::{self, PgJobStore},
    render::TemplateEngine,
    services::{delivery::FtpTransfer, queue::RedisQueue, storage::S3ArtifactStore},
    worker::WorkerSettings,
};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting promo image worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    if let Some(addr) = &config.metrics_addr {
        let addr: SocketAddr = addr.parse().expect("Invalid METRICS_ADDR");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus exporter");
        describe_metrics();
        tracing::info!(%addr, "Prometheus exporter listening");
    }

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing services");
    let queue = RedisQueue::new(
        &config.redis_url,
        &config.queue_name,
        config.visibility_timeout(),
    )
    .expect("Failed to initialize job queue");
    queue.health_check().await.expect("Redis is not reachable");

    let artifacts = S3ArtifactStore::new(
        &config.s3_bucket,
        &config.s3_region,
        config.s3_endpoint.as_deref(),
        &config.s3_access_key,
        &config.s3_secret_key,
        Duration::from_secs(config.storage_timeout_secs),
    )
    .expect("Failed to initialize artifact store");

    let renderer =
        TemplateEngine::load(Path::new(&config.assets_dir)).expect("Failed to load render assets");

    let transfer = FtpTransfer::from_config(&config);

    let state = AppState::new(
        PgJobStore::new(db_pool),
        artifacts,
        queue,
        renderer,
        transfer,
    );
    let dispatcher = state.dispatcher(WorkerSettings::from(&config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    tracing::info!(queue = %config.queue_name, "Worker ready, starting dispatch loop");
    dispatcher.run(shutdown_rx).await;
    tracing::info!("Worker stopped");
}

fn describe_metrics() {
    metrics::describe_counter!("promo_messages_received_total", "Queue messages received");
    metrics::describe_counter!(
        "promo_messages_acknowledged_total",
        "Queue messages deleted after handling"
    );
    metrics::describe_counter!(
        "promo_messages_retained_total",
        "Queue messages left for redelivery"
    );
    metrics::describe_counter!(
        "promo_messages_dead_lettered_total",
        "Queue messages moved to the dead-letter list"
    );
    metrics::describe_counter!("promo_items_rendered_total", "Items rendered, by outcome");
    metrics::describe_histogram!(
        "promo_job_duration_seconds",
        "Time spent handling one job message"
    );
    metrics::describe_counter!(
        "promo_deliveries_total",
        "Deliveries finished, by target and outcome"
    );
}

/// Resolves on SIGINT or SIGTERM. The dispatcher finishes its current message first.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down after the current message"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down after the current message"),
    }
}
