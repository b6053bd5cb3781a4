//! HTTP services and runtime wiring for the redi-shop backend.
//!
//! One binary runs any of the user, order, stock and payment services, or
//! all of them in one process. Services that take part in checkout also
//! start their saga participant: the order service its gateway, the payment
//! and stock services their workers.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use messaging::MessageBus;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    HttpCatalog, HttpUserCredit, OrderGateway, PaymentWorker, PriceLookup, SagaError,
    StockWorker, StoreCatalog, StoreUserCredit, UserCredit,
};
use state_store::StateStore;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::{Config, ServiceKind};
use routes::orders::OrderState;

/// Everything the HTTP layer of one process serves.
pub struct AppState<S> {
    pub service: ServiceKind,
    pub store: S,
    /// Present when this process runs the order service.
    pub orders: Option<Arc<OrderState<S>>>,
}

/// A started service process: its HTTP state and the saga tasks behind it.
pub struct Runtime<S> {
    pub state: AppState<S>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl<S> Runtime<S> {
    /// Stops the background saga tasks.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Creates the Axum application router for the configured service.
pub fn create_app<S: StateStore>(state: &AppState<S>, metrics_handle: PrometheusHandle) -> Router {
    let mut app = routes::health::router(state.service);
    if state.service.runs(ServiceKind::User) {
        app = app.merge(routes::users::router(state.store.clone()));
    }
    if state.service.runs(ServiceKind::Stock) {
        app = app.merge(routes::stock::router(state.store.clone()));
    }
    if state.service.runs(ServiceKind::Payment) {
        app = app.merge(routes::payment::router(state.store.clone()));
    }
    if let Some(orders) = &state.orders {
        app = app.merge(routes::orders::router(Arc::clone(orders)));
    }

    app.merge(routes::metrics::router(metrics_handle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Starts the saga participants of the configured service and builds its
/// HTTP state.
///
/// Co-located services talk to each other through the store; otherwise the
/// payment worker reaches the user service and the order service reaches the
/// stock service over HTTP.
pub async fn start<S: StateStore>(
    config: &Config,
    store: S,
    bus: Arc<dyn MessageBus>,
) -> Result<Runtime<S>, SagaError> {
    let service = config.service;
    let http = reqwest::Client::new();
    let mut tasks = Vec::new();

    if service.runs(ServiceKind::Payment) {
        let credit: Arc<dyn UserCredit> = match (&config.user_url, service) {
            (Some(url), ServiceKind::Payment) => Arc::new(HttpUserCredit::new(http.clone(), url)),
            _ => Arc::new(StoreUserCredit::new(store.clone())),
        };
        let worker = PaymentWorker::new(store.clone(), credit, Arc::clone(&bus));
        tasks.push(worker.spawn().await?);
    }

    if service.runs(ServiceKind::Stock) {
        let worker = StockWorker::new(store.clone(), Arc::clone(&bus));
        tasks.push(worker.spawn().await?);
    }

    let orders = if service.runs(ServiceKind::Order) {
        let catalog: Arc<dyn PriceLookup> = match (&config.stock_url, service) {
            (Some(url), ServiceKind::Order) => Arc::new(HttpCatalog::new(http.clone(), url)),
            _ => Arc::new(StoreCatalog::new(store.clone())),
        };
        let gateway = OrderGateway::new(
            store.clone(),
            Arc::clone(&bus),
            config.instance_id.clone(),
            config.checkout_timeout,
        );
        tasks.push(gateway.start().await?);
        Some(Arc::new(OrderState {
            store: store.clone(),
            gateway,
            catalog,
        }))
    } else {
        None
    };

    tracing::info!(
        service = service.as_str(),
        instance_id = %config.instance_id,
        "service started"
    );

    Ok(Runtime {
        state: AppState {
            service,
            store,
            orders,
        },
        tasks,
    })
}
