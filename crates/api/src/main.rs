//! redi-shop service entry point.

use std::sync::Arc;

use api::config::{Backend, Config};
use messaging::{InMemoryBus, MessageBus, RedisBus};
use metrics_exporter_prometheus::PrometheusHandle;
use state_store::{InMemoryStateStore, PostgresStateStore, StateStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Starts the configured service on `store` and serves it until shutdown.
async fn run<S: StateStore>(
    config: Config,
    store: S,
    bus: Arc<dyn MessageBus>,
    metrics_handle: PrometheusHandle,
) {
    let runtime = api::start(&config, store, bus)
        .await
        .expect("failed to start saga participants");
    let app = api::create_app(&runtime.state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, service = config.service.as_str(), "starting redi-shop server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    runtime.shutdown();
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration
    let config = Config::from_env().expect("invalid configuration");

    // 2. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::routes::metrics::describe();

    // 4. Connect the message bus
    let bus: Arc<dyn MessageBus> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisBus::connect(url)
                .await
                .expect("failed to connect to Redis"),
        ),
        None => Arc::new(InMemoryBus::new()),
    };

    // 5. Open the store and serve
    match config.backend {
        Backend::Memory => run(config, InMemoryStateStore::new(), bus, metrics_handle).await,
        Backend::Postgres => {
            let url = config.database_url.clone().unwrap_or_default();
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(20)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStateStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            run(config, store, bus, metrics_handle).await
        }
    }
}
