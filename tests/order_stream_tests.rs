// End-to-end tests: a real server on a loopback port and StreamConsumer clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use shop_api::{create_app, ApiSettings, AppState};
use shop_models::{NewOrder, OrderSnapshot, OrderStatus, UserId};
use shop_stream::{
    AuthState, ConsumerConfig, ConsumerExit, ConsumerState, SessionStream, StreamConsumer, StreamError,
};

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server() -> (SocketAddr, AppState) {
    let state = AppState::new(ApiSettings {
        keep_alive_seconds: 1,
        ..ApiSettings::default()
    });
    let app = create_app(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });

    (addr, state)
}

fn client_for(user: &str) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert("x-user-id", HeaderValue::from_str(user).unwrap());
    reqwest::Client::builder().default_headers(headers).build().unwrap()
}

fn consumer_for(addr: SocketAddr, user: &str) -> Arc<StreamConsumer> {
    let config = ConsumerConfig::new(format!("http://{addr}"));
    Arc::new(StreamConsumer::new(client_for(user), &config))
}

fn sample_order() -> NewOrder {
    serde_json::from_value(json!({
        "items": [{"service_id": "dry-clean", "name": "Dry Cleaning", "quantity": 1, "unit_price": 18.0}]
    }))
    .unwrap()
}

struct RunningConsumer {
    cancel: CancellationToken,
    updates: mpsc::UnboundedReceiver<OrderSnapshot>,
    task: JoinHandle<ConsumerExit>,
}

fn start(consumer: Arc<StreamConsumer>) -> RunningConsumer {
    let cancel = CancellationToken::new();
    let (tx, updates) = mpsc::unbounded_channel();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        consumer
            .run(&token, move |order| {
                let _ = tx.send(order);
            })
            .await
    });
    RunningConsumer { cancel, updates, task }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_update(updates: &mut mpsc::UnboundedReceiver<OrderSnapshot>) -> OrderSnapshot {
    tokio::time::timeout(WAIT, updates.recv())
        .await
        .expect("no update received in time")
        .expect("update channel closed")
}

async fn admin_patch(addr: SocketAddr, order_id: uuid::Uuid, status: &str) -> reqwest::StatusCode {
    reqwest::Client::new()
        .patch(format!("http://{addr}/api/v1/admin/orders/{order_id}/status"))
        .header("x-user-id", "ops")
        .header("x-user-role", "admin")
        .json(&json!({ "status": status }))
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_admin_update_reaches_owner_stream() {
    let (addr, state) = spawn_server().await;
    let u1 = UserId::from("u1");
    let order = state.orders.place_order(u1.clone(), sample_order()).unwrap();

    let consumer = consumer_for(addr, "u1");
    let mut running = start(Arc::clone(&consumer));
    wait_until(|| state.registry.is_subscribed(&u1)).await;
    wait_until(|| consumer.state() == ConsumerState::Streaming).await;

    assert_eq!(admin_patch(addr, order.id, "processing").await, reqwest::StatusCode::OK);

    let update = next_update(&mut running.updates).await;
    assert_eq!(update.id(), Some(order.id.to_string().as_str()));
    assert_eq!(update.status(), Some("processing"));

    running.cancel.cancel();
    let exit = tokio::time::timeout(WAIT, running.task).await.unwrap().unwrap();
    assert!(exit.is_cancelled());
    assert_eq!(consumer.state(), ConsumerState::Idle);
    assert_eq!(consumer.stats().updates, 1);

    // the server notices the disconnect on its next keep-alive write
    wait_until(|| !state.registry.is_subscribed(&u1)).await;
}

#[tokio::test]
async fn test_updates_fan_out_per_user() {
    let (addr, state) = spawn_server().await;
    let u1 = UserId::from("u1");
    let u2 = UserId::from("u2");
    let order = state.orders.place_order(u1.clone(), sample_order()).unwrap();

    let mut c1 = start(consumer_for(addr, "u1"));
    let mut c2 = start(consumer_for(addr, "u1"));
    let mut c3 = start(consumer_for(addr, "u2"));
    wait_until(|| state.registry.connection_count(&u1) == 2 && state.registry.connection_count(&u2) == 1).await;

    state.orders.update_status(order.id, OrderStatus::Processing).unwrap();
    assert_eq!(next_update(&mut c1.updates).await.status(), Some("processing"));
    assert_eq!(next_update(&mut c2.updates).await.status(), Some("processing"));

    c1.cancel.cancel();
    let exit = tokio::time::timeout(WAIT, c1.task).await.unwrap().unwrap();
    assert!(exit.is_cancelled());
    wait_until(|| state.registry.connection_count(&u1) == 1).await;

    state.orders.update_status(order.id, OrderStatus::Completed).unwrap();
    assert_eq!(next_update(&mut c2.updates).await.status(), Some("completed"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(c1.updates.try_recv().is_err());
    assert!(c3.updates.try_recv().is_err());

    c2.cancel.cancel();
    c3.cancel.cancel();
}

#[tokio::test]
async fn test_server_shutdown_ends_stream() {
    let (addr, state) = spawn_server().await;
    let u1 = UserId::from("u1");

    let running = start(consumer_for(addr, "u1"));
    wait_until(|| state.registry.is_subscribed(&u1)).await;

    state.shutdown.cancel();

    let exit = tokio::time::timeout(WAIT, running.task).await.unwrap().unwrap();
    assert!(matches!(exit, ConsumerExit::EndOfStream));
    wait_until(|| !state.registry.is_subscribed(&u1)).await;
}

#[tokio::test]
async fn test_missing_identity_fails_without_callback() {
    let (addr, state) = spawn_server().await;
    let consumer = Arc::new(StreamConsumer::with_cookie_store(&ConsumerConfig::new(format!("http://{addr}"))).unwrap());

    let mut running = start(Arc::clone(&consumer));
    let exit = tokio::time::timeout(WAIT, running.task).await.unwrap().unwrap();

    assert!(matches!(exit, ConsumerExit::Failed(StreamError::UnexpectedStatus(401))));
    assert!(running.updates.try_recv().is_err());
    assert_eq!(consumer.stats().transport_failures, 1);
    assert_eq!(state.registry.user_count(), 0);
}

#[tokio::test]
async fn test_session_stream_follows_auth_state() {
    let (addr, state) = spawn_server().await;
    let u1 = UserId::from("u1");
    let order = state.orders.place_order(u1.clone(), sample_order()).unwrap();

    let consumer = consumer_for(addr, "u1");
    let (auth_tx, auth_rx) = watch::channel(AuthState::loading());
    let (tx, mut updates) = mpsc::unbounded_channel();
    let session = SessionStream::spawn(Arc::clone(&consumer), auth_rx, move |order| {
        let _ = tx.send(order);
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state.registry.user_count(), 0);

    auth_tx.send_replace(AuthState::signed_in(u1.clone()));
    wait_until(|| state.registry.is_subscribed(&u1)).await;

    state.orders.update_status(order.id, OrderStatus::Cancelled).unwrap();
    assert_eq!(next_update(&mut updates).await.status(), Some("cancelled"));

    auth_tx.send_replace(AuthState::signed_out());
    wait_until(|| consumer.state() == ConsumerState::Idle).await;
    wait_until(|| !state.registry.is_subscribed(&u1)).await;

    session.shutdown().await;
    assert_eq!(consumer.stats().connect_attempts, 1);
}
