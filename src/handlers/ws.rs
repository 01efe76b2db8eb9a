//! Live tracking channel.
//!
//! Clients connect with a signed token, land in their personal room, and may
//! join trip rooms to watch live location, ETA, and status events. Drivers
//! push telemetry over the same connection. Handler failures are emitted as
//! an `error` event on the connection, which stays open.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures::{stream::StreamExt, SinkExt};
use sea_orm::EntityTrait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::entities::trip;
use crate::error::AppResult;
use crate::eta::Point;
use crate::hub::{trip_room, user_room, Event};
use crate::lifecycle;
use crate::utils::geo::is_valid_point;
use crate::utils::jwt::{verify_token, Claims};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Client-to-server events on the tracking channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    JoinTrip { trip_id: Uuid },
    LeaveTrip { trip_id: Uuid },
    UpdateLocation { trip_id: Uuid, location: Point },
    StartTrip { trip_id: Uuid },
    CompleteTrip { trip_id: Uuid },
}

/// Authenticate and upgrade. A bad token refuses the connection before any
/// room join is possible.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let claims = verify_token(&query.token, &state.config.jwt_secret)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims)))
}

async fn handle_socket(socket: WebSocket, state: AppState, claims: Claims) {
    tracing::debug!(user_id = %claims.sub, "Tracking connection established");

    let (mut sender, mut receiver) = socket.split();

    // Single ordered outbound channel per connection; every room feeds it.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Event>();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                // Client disconnected
                break;
            }
        }
    });

    // Every connection watches its own personal room for direct notifications.
    let personal_task = spawn_forward(state.hub.subscribe(&user_room(claims.sub)), out_tx.clone());

    // Trip-room memberships held by this connection.
    let mut joined: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_message) => {
                            handle_client_message(&state, &claims, client_message, &out_tx, &mut joined)
                                .await;
                        }
                        Err(e) => send_error(&out_tx, format!("Unrecognized message: {}", e)),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = &mut send_task => break,
        }
    }

    // Drop all room memberships; nothing is persisted on disconnect.
    personal_task.abort();
    for (_, task) in joined {
        task.abort();
    }
    send_task.abort();

    tracing::debug!(user_id = %claims.sub, "Tracking connection closed");
}

async fn handle_client_message(
    state: &AppState,
    claims: &Claims,
    message: ClientMessage,
    out_tx: &mpsc::UnboundedSender<Event>,
    joined: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    match message {
        ClientMessage::JoinTrip { trip_id } => {
            if joined.contains_key(&trip_id) {
                return;
            }
            let trip = match trip::Entity::find_by_id(trip_id).one(&state.db).await {
                Ok(Some(trip)) => trip,
                Ok(None) => return send_error(out_tx, "Trip not found".to_string()),
                Err(e) => return send_error(out_tx, format!("Database error: {}", e)),
            };

            // Subscribe before the snapshot so nothing published in between
            // is lost; the snapshot closes the gap to the next broadcast.
            let rx = state.hub.subscribe(&trip_room(trip_id));
            let location = match (trip.current_lat, trip.current_lng) {
                (Some(lat), Some(lng)) => Some(Point { lat, lng }),
                _ => None,
            };
            let _ = out_tx.send(Event {
                event: "trip:snapshot".to_string(),
                payload: json!({
                    "trip_id": trip_id,
                    "status": trip.status,
                    "location": location,
                }),
            });
            joined.insert(trip_id, spawn_forward(rx, out_tx.clone()));
        }

        ClientMessage::LeaveTrip { trip_id } => {
            if let Some(task) = joined.remove(&trip_id) {
                task.abort();
            }
        }

        ClientMessage::UpdateLocation { trip_id, location } => {
            if !is_valid_point(location.lat, location.lng) {
                return send_error(out_tx, "Invalid coordinates".to_string());
            }

            let trip = match lifecycle::record_live_location(
                &state.db,
                state.hub.as_ref(),
                trip_id,
                claims.sub,
                location,
            )
            .await
            {
                Ok(trip) => trip,
                Err(e) => return send_error(out_tx, e.to_string()),
            };

            let eta = match (trip.dest_lat, trip.dest_lng) {
                (Some(lat), Some(lng)) => {
                    state.eta.estimate(location, Point { lat, lng }).await
                }
                _ => None,
            };

            state.hub.publish(
                &trip_room(trip_id),
                "trip:location",
                json!({
                    "trip_id": trip_id,
                    "location": location,
                    "eta": eta,
                    "timestamp": Utc::now(),
                }),
            );
        }

        ClientMessage::StartTrip { trip_id } => {
            if let Err(e) = lifecycle::start(&state.db, state.hub.as_ref(), trip_id, claims.sub).await
            {
                send_error(out_tx, e.to_string());
            }
        }

        ClientMessage::CompleteTrip { trip_id } => {
            if let Err(e) =
                lifecycle::complete(&state.db, state.hub.as_ref(), trip_id, claims.sub).await
            {
                send_error(out_tx, e.to_string());
            }
        }
    }
}

/// Pump one room's broadcasts into the connection's outbound channel.
fn spawn_forward(
    mut rx: broadcast::Receiver<Event>,
    out_tx: mpsc::UnboundedSender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if out_tx.send(event).is_err() {
                        break;
                    }
                }
                // A lagged receiver skips what it missed and keeps going.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn send_error(out_tx: &mpsc::UnboundedSender<Event>, message: String) {
    let _ = out_tx.send(Event {
        event: "error".to_string(),
        payload: json!({ "message": message }),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let trip_id = Uuid::new_v4();

        let join: ClientMessage =
            serde_json::from_str(&format!(r#"{{"type":"join_trip","trip_id":"{}"}}"#, trip_id))
                .unwrap();
        assert!(matches!(join, ClientMessage::JoinTrip { trip_id: t } if t == trip_id));

        let update: ClientMessage = serde_json::from_str(&format!(
            r#"{{"type":"update_location","trip_id":"{}","location":{{"lat":12.9,"lng":77.6}}}}"#,
            trip_id
        ))
        .unwrap();
        match update {
            ClientMessage::UpdateLocation { location, .. } => {
                assert_eq!(location.lat, 12.9);
                assert_eq!(location.lng, 77.6);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"fly_to_moon"}"#);
        assert!(result.is_err());
    }
}
