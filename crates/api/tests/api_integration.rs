//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::config::{Config, ServiceKind};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use messaging::{InMemoryBus, MessageBus};
use metrics_exporter_prometheus::PrometheusHandle;
use state_store::InMemoryStateStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn config(service: ServiceKind) -> Config {
    Config {
        service,
        checkout_timeout: Duration::from_secs(2),
        ..Config::default()
    }
}

async fn service_app(config: &Config, bus: Arc<dyn MessageBus>) -> Router {
    let runtime = api::start(config, InMemoryStateStore::new(), bus)
        .await
        .unwrap();
    api::create_app(&runtime.state, get_metrics_handle())
}

/// All services in one process on an in-process bus.
async fn setup() -> Router {
    service_app(&config(ServiceKind::All), Arc::new(InMemoryBus::new())).await
}

/// Serves `app` on an ephemeral local port and returns its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn create_user(app: &Router, credit: i64) -> String {
    let (status, json) = send(app, "POST", "/users/create").await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = json["user_id"].as_str().unwrap().to_string();
    let (status, _) = send(app, "POST", &format!("/users/credit/add/{user_id}/{credit}")).await;
    assert_eq!(status, StatusCode::OK);
    user_id
}

async fn create_item(app: &Router, price: i64, stock: i64) -> String {
    let (status, json) = send(app, "POST", &format!("/stock/item/create/{price}")).await;
    assert_eq!(status, StatusCode::CREATED);
    let item_id = json["item_id"].as_str().unwrap().to_string();
    let (status, _) = send(app, "POST", &format!("/stock/add/{item_id}/{stock}")).await;
    assert_eq!(status, StatusCode::OK);
    item_id
}

async fn create_order(app: &Router, user_id: &str, items: &[&str]) -> String {
    let (status, json) = send(app, "POST", &format!("/orders/create/{user_id}")).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = json["order_id"].as_str().unwrap().to_string();
    for item in items {
        let (status, _) = send(app, "POST", &format!("/orders/additem/{order_id}/{item}")).await;
        assert_eq!(status, StatusCode::OK);
    }
    order_id
}

async fn credit(app: &Router, user_id: &str) -> i64 {
    let (_, json) = send(app, "GET", &format!("/users/credit/{user_id}")).await;
    json["credit"].as_i64().unwrap()
}

async fn stock(app: &Router, item_id: &str) -> i64 {
    let (_, json) = send(app, "GET", &format!("/stock/find/{item_id}")).await;
    json["stock"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;
    let (status, json) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "all");
}

#[tokio::test]
async fn test_user_credit_endpoints() {
    let app = setup().await;
    let user_id = create_user(&app, 20).await;

    let (status, json) = send(&app, "GET", &format!("/users/find/{user_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_id"], user_id.as_str());
    assert_eq!(json["credit"], 20);

    let (status, _) = send(&app, "POST", &format!("/users/credit/subtract/{user_id}/15")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", &format!("/users/credit/subtract/{user_id}/6")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(credit(&app, &user_id).await, 5);

    let (status, _) = send(&app, "POST", "/users/credit/add/ghost/5").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", &format!("/users/remove/{user_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &format!("/users/find/{user_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stock_endpoints() {
    let app = setup().await;
    let item_id = create_item(&app, 7, 2).await;

    let (status, json) = send(&app, "GET", &format!("/stock/find/{item_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["price"], 7);
    assert_eq!(json["stock"], 2);

    let (status, _) = send(&app, "POST", &format!("/stock/subtract/{item_id}/3")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, "POST", &format!("/stock/subtract/{item_id}/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock(&app, &item_id).await, 0);

    let (status, _) = send(&app, "POST", "/stock/subtract/ghost/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "POST", &format!("/stock/add/{item_id}/-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_additions_past_the_maximum_are_rejected() {
    let app = setup().await;
    let item_id = create_item(&app, 7, 0).await;
    let max = i64::MAX;

    let (status, _) = send(&app, "POST", &format!("/stock/add/{item_id}/{max}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", &format!("/stock/add/{item_id}/{max}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(stock(&app, &item_id).await, max);

    let user_id = create_user(&app, 0).await;
    let (status, _) = send(&app, "POST", &format!("/users/credit/add/{user_id}/{max}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", &format!("/users/credit/add/{user_id}/1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(credit(&app, &user_id).await, max);
}

#[tokio::test]
async fn test_order_items_and_cost() {
    let app = setup().await;
    let user_id = create_user(&app, 0).await;
    let a = create_item(&app, 10, 1).await;
    let b = create_item(&app, 5, 1).await;
    let order_id = create_order(&app, &user_id, &[&a, &b]).await;

    let (status, json) = send(&app, "GET", &format!("/orders/find/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_id"], user_id.as_str());
    assert_eq!(json["total_cost"], 15);
    assert_eq!(json["paid"], false);
    assert_eq!(json["items"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, "DELETE", &format!("/orders/removeitem/{order_id}/{a}")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = send(&app, "GET", &format!("/orders/find/{order_id}")).await;
    assert_eq!(json["total_cost"], 5);

    let (status, _) = send(&app, "POST", &format!("/orders/additem/{order_id}/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "POST", &format!("/orders/additem/ghost/{a}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", &format!("/orders/remove/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &format!("/orders/find/{order_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_happy_path() {
    let app = setup().await;
    let user_id = create_user(&app, 20).await;
    let i1 = create_item(&app, 10, 3).await;
    let i2 = create_item(&app, 5, 3).await;
    let order_id = create_order(&app, &user_id, &[&i1, &i2]).await;

    let (status, _) = send(&app, "POST", &format!("/orders/checkout/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(credit(&app, &user_id).await, 5);
    assert_eq!(stock(&app, &i1).await, 2);
    assert_eq!(stock(&app, &i2).await, 2);
    let (status, json) = send(&app, "GET", &format!("/payment/status/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["paid"], true);
    let (_, json) = send(&app, "GET", &format!("/orders/find/{order_id}")).await;
    assert_eq!(json["paid"], true);

    let (status, _) = send(&app, "POST", &format!("/orders/checkout/{order_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(credit(&app, &user_id).await, 5);
}

#[tokio::test]
async fn test_checkout_insufficient_funds() {
    let app = setup().await;
    let user_id = create_user(&app, 10).await;
    let i1 = create_item(&app, 10, 3).await;
    let i2 = create_item(&app, 5, 3).await;
    let order_id = create_order(&app, &user_id, &[&i1, &i2]).await;

    let (status, _) = send(&app, "POST", &format!("/orders/checkout/{order_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(credit(&app, &user_id).await, 10);
    assert_eq!(stock(&app, &i1).await, 3);
    let (status, _) = send(&app, "GET", &format!("/payment/status/{order_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_out_of_stock_compensates() {
    let app = setup().await;
    let user_id = create_user(&app, 100).await;
    let a = create_item(&app, 10, 1).await;
    let b = create_item(&app, 20, 1).await;
    let c = create_item(&app, 30, 0).await;
    let order_id = create_order(&app, &user_id, &[&a, &b, &c]).await;

    let (status, _) = send(&app, "POST", &format!("/orders/checkout/{order_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(stock(&app, &a).await, 1);
    assert_eq!(stock(&app, &b).await, 1);
    assert_eq!(stock(&app, &c).await, 0);

    // The refund travels through the bus after the reply.
    let mut refunded = false;
    for _ in 0..100 {
        let (_, json) = send(&app, "GET", &format!("/payment/status/{order_id}")).await;
        if json["paid"] == false && credit(&app, &user_id).await == 100 {
            refunded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refunded);
}

#[tokio::test]
async fn test_checkout_unknown_order() {
    let app = setup().await;
    let (status, json) = send(&app, "POST", "/orders/checkout/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_checkout_times_out_without_workers() {
    let app = service_app(
        &Config {
            checkout_timeout: Duration::from_millis(100),
            ..config(ServiceKind::Order)
        },
        Arc::new(InMemoryBus::new()),
    )
    .await;

    let (status, json) = send(&app, "POST", "/orders/create/u1").await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = json["order_id"].as_str().unwrap();

    let (status, _) = send(&app, "POST", &format!("/orders/checkout/{order_id}")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_service_selection_limits_routes() {
    let app = service_app(&config(ServiceKind::Stock), Arc::new(InMemoryBus::new())).await;

    let (status, _) = send(&app, "POST", "/stock/item/create/5").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, "POST", "/users/create").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "POST", "/orders/create/u1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_split_deployment_checkout() {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());

    let user_app = service_app(&config(ServiceKind::User), bus.clone()).await;
    let stock_app = service_app(&config(ServiceKind::Stock), bus.clone()).await;
    let user_url = serve(user_app.clone()).await;
    let stock_url = serve(stock_app.clone()).await;

    let _payment_app = service_app(
        &Config {
            user_url: Some(user_url),
            ..config(ServiceKind::Payment)
        },
        bus.clone(),
    )
    .await;
    let order_app = service_app(
        &Config {
            stock_url: Some(stock_url),
            ..config(ServiceKind::Order)
        },
        bus,
    )
    .await;

    let user_id = create_user(&user_app, 20).await;
    let i1 = create_item(&stock_app, 10, 1).await;
    let i2 = create_item(&stock_app, 5, 1).await;
    let order_id = create_order(&order_app, &user_id, &[&i1, &i2]).await;

    let (_, json) = send(&order_app, "GET", &format!("/orders/find/{order_id}")).await;
    assert_eq!(json["total_cost"], 15);

    let (status, _) = send(&order_app, "POST", &format!("/orders/checkout/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(credit(&user_app, &user_id).await, 5);
    assert_eq!(stock(&stock_app, &i1).await, 0);
    assert_eq!(stock(&stock_app, &i2).await, 0);

    let other = create_order(&order_app, &user_id, &[&i1]).await;
    let (status, _) = send(&order_app, "POST", &format!("/orders/checkout/{other}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;
    let user_id = create_user(&app, 0).await;
    let order_id = create_order(&app, &user_id, &[]).await;
    let (status, _) = send(&app, "POST", &format!("/orders/checkout/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_checkouts_total"));
}
