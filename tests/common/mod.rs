//! Shared setup for integration tests: an in-memory SQLite database with the
//! schema derived from the entities, plus fixture helpers and a recording
//! notifier standing in for the live hub.
#![allow(dead_code)]

use std::sync::Mutex;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema, Set,
};
use uuid::Uuid;

use carpool_backend::entities::ride_request::{self, PickupStatus, RequestStatus};
use carpool_backend::entities::trip::{self, TripStatus, VehicleType};
use carpool_backend::entities::user::{self, UserRole};
use carpool_backend::hub::Notifier;

pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();

    let schema = Schema::new(DbBackend::Sqlite);
    let statements = [
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(trip::Entity),
        schema.create_table_from_entity(ride_request::Entity),
    ];
    for statement in statements {
        db.execute(db.get_database_backend().build(&statement))
            .await
            .unwrap();
    }

    db
}

pub async fn create_user(db: &DatabaseConnection, role: UserRole) -> user::Model {
    let id = Uuid::new_v4();
    user::ActiveModel {
        id: Set(id),
        email: Set(format!("{}@example.com", id)),
        password_hash: Set("not-a-real-hash".to_string()),
        name: Set("Test User".to_string()),
        role: Set(role),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_trip(db: &DatabaseConnection, driver_id: Uuid, seats: i32) -> trip::Model {
    trip::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(driver_id),
        vehicle_type: Set(VehicleType::Car),
        total_seats: Set(seats),
        available_seats: Set(seats),
        source: Set("Indiranagar".to_string()),
        destination: Set("Whitefield".to_string()),
        source_lat: Set(Some(12.9716)),
        source_lng: Set(Some(77.6412)),
        dest_lat: Set(Some(12.9698)),
        dest_lng: Set(Some(77.7500)),
        scheduled_time: Set((Utc::now() + Duration::days(1)).fixed_offset()),
        actual_start_time: Set(None),
        actual_end_time: Set(None),
        status: Set(TripStatus::Scheduled),
        current_lat: Set(None),
        current_lng: Set(None),
        estimated_cost: Set(50.0 + seats as f64 * 10.0),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn set_trip_status(db: &DatabaseConnection, trip: &trip::Model, status: TripStatus) {
    let mut active: trip::ActiveModel = trip.clone().into();
    active.status = Set(status);
    active.update(db).await.unwrap();
}

pub async fn create_request(
    db: &DatabaseConnection,
    trip_id: Uuid,
    passenger_id: Uuid,
) -> ride_request::Model {
    ride_request::ActiveModel {
        id: Set(Uuid::new_v4()),
        trip_id: Set(trip_id),
        passenger_id: Set(passenger_id),
        status: Set(RequestStatus::Pending),
        pickup_status: Set(PickupStatus::Waiting),
        picked_up_at: Set(None),
        dropped_off_at: Set(None),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await
    .unwrap()
}

/// Captures every notification as `(room, event, payload)`.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_named(&self, event: &str) -> Vec<(String, String, serde_json::Value)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, name, _)| name == event)
            .cloned()
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_user(&self, user_id: Uuid, event: &str, payload: serde_json::Value) {
        self.events.lock().unwrap().push((
            format!("user:{}", user_id),
            event.to_string(),
            payload,
        ));
    }

    fn notify_trip_room(&self, trip_id: Uuid, event: &str, payload: serde_json::Value) {
        self.events.lock().unwrap().push((
            format!("trip:{}", trip_id),
            event.to_string(),
            payload,
        ));
    }
}
