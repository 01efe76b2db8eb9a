//! Room-based fan-out for the real-time channel.
//!
//! Every connected client subscribes to its personal room (`user:{id}`) and
//! to any trip rooms it joins (`trip:{id}`). Request handlers never touch
//! connections directly; they go through the [`Notifier`] trait so tests can
//! swap in a recording fake.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Buffered events per room before slow receivers start lagging.
const ROOM_CAPACITY: usize = 256;

/// A single server-to-client event, tagged with its name.
#[derive(Clone, Debug, Serialize)]
pub struct Event {
    pub event: String,
    pub payload: serde_json::Value,
}

/// Push interface handed to the booking and lifecycle code.
pub trait Notifier: Send + Sync {
    /// Deliver an event to every connection of one user.
    fn notify_user(&self, user_id: Uuid, event: &str, payload: serde_json::Value);
    /// Deliver an event to every member of a trip room.
    fn notify_trip_room(&self, trip_id: Uuid, event: &str, payload: serde_json::Value);
}

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

pub fn trip_room(trip_id: Uuid) -> String {
    format!("trip:{}", trip_id)
}

/// Process-wide hub mapping room names to broadcast channels.
///
/// Membership is connection-local transient state: a room exists while at
/// least one receiver is subscribed and is dropped on the next publish
/// afterwards. Nothing here is persisted.
#[derive(Default)]
pub struct LiveHub {
    rooms: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl LiveHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room, creating its channel on first subscription.
    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<Event> {
        let mut rooms = self.rooms.write().expect("hub lock poisoned");
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Publish to a room. A room nobody watches is a no-op.
    pub fn publish(&self, room: &str, event: &str, payload: serde_json::Value) {
        let mut rooms = self.rooms.write().expect("hub lock poisoned");
        if let Some(sender) = rooms.get(room) {
            if sender.receiver_count() == 0 {
                rooms.remove(room);
                return;
            }
            let _ = sender.send(Event {
                event: event.to_string(),
                payload,
            });
        }
    }
}

impl Notifier for LiveHub {
    fn notify_user(&self, user_id: Uuid, event: &str, payload: serde_json::Value) {
        self.publish(&user_room(user_id), event, payload);
    }

    fn notify_trip_room(&self, trip_id: Uuid, event: &str, payload: serde_json::Value) {
        self.publish(&trip_room(trip_id), event, payload);
    }
}
