mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use sea_orm::{ActiveModelTrait, Set};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use carpool_backend::entities::trip::{self, TripStatus};
use carpool_backend::entities::user::UserRole;
use carpool_backend::eta::EtaEstimator;
use carpool_backend::hub::LiveHub;
use carpool_backend::utils::jwt::create_token;
use carpool_backend::{routes, AppState, Config};

use common::{create_trip, create_user, setup_db};

type WsConn = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const JWT_SECRET: &str = "test-secret";

async fn start_server() -> (SocketAddr, AppState) {
    let db = setup_db().await;

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration_hours: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        // Nothing listens here; every estimate takes the fallback path
        routing_api_url: "http://127.0.0.1:9".to_string(),
        routing_timeout_secs: 1,
    };

    let state = AppState {
        db,
        eta: EtaEstimator::new(config.routing_api_url.clone(), Duration::from_millis(250)),
        hub: Arc::new(LiveHub::new()),
        config,
    };

    let app = routes::create_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr, user_id: Uuid, email: &str, role: UserRole) -> WsConn {
    let token = create_token(user_id, email, role, JWT_SECRET, 1).unwrap();
    let url = format!("ws://{}/api/ws?token={}", addr, token);
    let (ws, _) = connect_async(url).await.expect("WebSocket connect failed");
    ws
}

async fn next_json(ws: &mut WsConn) -> serde_json::Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .expect("connection error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut WsConn, payload: serde_json::Value) {
    ws.send(Message::Text(payload.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_join_pushes_snapshot_of_live_trip() {
    let (addr, state) = start_server().await;

    let driver = create_user(&state.db, UserRole::Driver).await;
    let watcher = create_user(&state.db, UserRole::Passenger).await;
    let trip = create_trip(&state.db, driver.id, 2).await;

    let mut active: trip::ActiveModel = trip.clone().into();
    active.status = Set(TripStatus::InProgress);
    active.current_lat = Set(Some(12.9));
    active.current_lng = Set(Some(77.6));
    active.update(&state.db).await.unwrap();

    let mut ws = connect(addr, watcher.id, &watcher.email, watcher.role).await;
    send_json(&mut ws, json!({ "type": "join_trip", "trip_id": trip.id })).await;

    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["event"], "trip:snapshot");
    assert_eq!(snapshot["payload"]["status"], "IN_PROGRESS");
    assert_eq!(snapshot["payload"]["location"]["lat"], 12.9);
    assert_eq!(snapshot["payload"]["location"]["lng"], 77.6);
}

#[tokio::test]
async fn test_driver_location_update_fans_out_with_eta() {
    let (addr, state) = start_server().await;

    let driver = create_user(&state.db, UserRole::Driver).await;
    let watcher = create_user(&state.db, UserRole::Passenger).await;
    let trip = create_trip(&state.db, driver.id, 2).await;

    let mut active: trip::ActiveModel = trip.clone().into();
    active.status = Set(TripStatus::InProgress);
    active.update(&state.db).await.unwrap();

    // Watcher joins first so membership is established before the update
    let mut watcher_ws = connect(addr, watcher.id, &watcher.email, watcher.role).await;
    send_json(&mut watcher_ws, json!({ "type": "join_trip", "trip_id": trip.id })).await;
    let snapshot = next_json(&mut watcher_ws).await;
    assert_eq!(snapshot["event"], "trip:snapshot");

    let mut driver_ws = connect(addr, driver.id, &driver.email, driver.role).await;
    send_json(&mut driver_ws, json!({ "type": "join_trip", "trip_id": trip.id })).await;
    let _ = next_json(&mut driver_ws).await; // driver's own snapshot

    send_json(
        &mut driver_ws,
        json!({
            "type": "update_location",
            "trip_id": trip.id,
            "location": { "lat": 12.93, "lng": 77.68 },
        }),
    )
    .await;

    let broadcast = next_json(&mut watcher_ws).await;
    assert_eq!(broadcast["event"], "trip:location");
    assert_eq!(broadcast["payload"]["location"]["lat"], 12.93);
    // The routing provider is unreachable, so the estimate is the fallback
    assert_eq!(broadcast["payload"]["eta"]["used_fallback"], true);

    // The sender is a room member too and receives its own broadcast
    let echoed = next_json(&mut driver_ws).await;
    assert_eq!(echoed["event"], "trip:location");
}

#[tokio::test]
async fn test_invalid_token_is_refused_before_any_join() {
    let (addr, _state) = start_server().await;

    let url = format!("ws://{}/api/ws?token=not-a-token", addr);
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn test_handler_errors_keep_the_connection_open() {
    let (addr, state) = start_server().await;

    let driver = create_user(&state.db, UserRole::Driver).await;
    let passenger = create_user(&state.db, UserRole::Passenger).await;
    let trip = create_trip(&state.db, driver.id, 2).await;

    let mut active: trip::ActiveModel = trip.clone().into();
    active.status = Set(TripStatus::InProgress);
    active.update(&state.db).await.unwrap();

    let mut ws = connect(addr, passenger.id, &passenger.email, passenger.role).await;

    // Only the trip's driver may push telemetry
    send_json(
        &mut ws,
        json!({
            "type": "update_location",
            "trip_id": trip.id,
            "location": { "lat": 12.9, "lng": 77.6 },
        }),
    )
    .await;

    let error = next_json(&mut ws).await;
    assert_eq!(error["event"], "error");

    // Same connection still works afterwards
    send_json(&mut ws, json!({ "type": "join_trip", "trip_id": trip.id })).await;
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["event"], "trip:snapshot");
}

#[tokio::test]
async fn test_start_trip_over_socket_broadcasts_status() {
    let (addr, state) = start_server().await;

    let driver = create_user(&state.db, UserRole::Driver).await;
    let watcher = create_user(&state.db, UserRole::Passenger).await;
    let trip = create_trip(&state.db, driver.id, 2).await;

    let mut watcher_ws = connect(addr, watcher.id, &watcher.email, watcher.role).await;
    send_json(&mut watcher_ws, json!({ "type": "join_trip", "trip_id": trip.id })).await;
    let _ = next_json(&mut watcher_ws).await;

    let mut driver_ws = connect(addr, driver.id, &driver.email, driver.role).await;
    send_json(&mut driver_ws, json!({ "type": "start_trip", "trip_id": trip.id })).await;

    let status = next_json(&mut watcher_ws).await;
    assert_eq!(status["event"], "trip:status");
    assert_eq!(status["payload"]["status"], "STARTED");
}
