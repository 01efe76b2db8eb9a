use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::ride_request;
use crate::entities::trip::{self, TripStatus, VehicleType};
use crate::error::{AppError, AppResult};
use crate::eta::Point;
use crate::lifecycle;
use crate::utils::geo::{is_valid_point, is_within_radius};
use crate::utils::jwt::Claims;
use crate::AppState;

/// Base fare plus a per-seat premium.
const BASE_COST: f64 = 50.0;
const COST_PER_SEAT: f64 = 10.0;

/// Trips may be published at most this far ahead.
const SCHEDULING_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Serialize)]
pub struct TripResponse {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_type: VehicleType,
    pub total_seats: i32,
    pub available_seats: i32,
    pub source: String,
    pub destination: String,
    pub source_location: Option<Point>,
    pub destination_location: Option<Point>,
    /// Two-point path, present when both endpoints are geocoded and distinct.
    pub route: Option<Vec<Point>>,
    pub scheduled_time: DateTime<Utc>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub status: TripStatus,
    pub current_location: Option<Point>,
    pub estimated_cost: f64,
    pub created_at: DateTime<Utc>,
}

impl From<trip::Model> for TripResponse {
    fn from(t: trip::Model) -> Self {
        let source_location = point_from(t.source_lat, t.source_lng);
        let destination_location = point_from(t.dest_lat, t.dest_lng);
        let route = match (source_location, destination_location) {
            (Some(a), Some(b)) if a != b => Some(vec![a, b]),
            _ => None,
        };

        Self {
            id: t.id,
            driver_id: t.driver_id,
            vehicle_type: t.vehicle_type,
            total_seats: t.total_seats,
            available_seats: t.available_seats,
            source: t.source,
            destination: t.destination,
            source_location,
            destination_location,
            route,
            scheduled_time: t.scheduled_time.with_timezone(&Utc),
            actual_start_time: t.actual_start_time.map(|v| v.with_timezone(&Utc)),
            actual_end_time: t.actual_end_time.map(|v| v.with_timezone(&Utc)),
            status: t.status,
            current_location: point_from(t.current_lat, t.current_lng),
            estimated_cost: t.estimated_cost,
            created_at: t.created_at.with_timezone(&Utc),
        }
    }
}

fn point_from(lat: Option<f64>, lng: Option<f64>) -> Option<Point> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(Point { lat, lng }),
        _ => None,
    }
}

// ============ Trip Creation ============

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub vehicle_type: VehicleType,
    pub total_seats: i32,
    pub scheduled_time: DateTime<Utc>,
    pub source: String,
    pub destination: String,
    pub source_location: Option<Point>,
    pub destination_location: Option<Point>,
}

/// Publish a new trip
pub async fn create_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTripRequest>,
) -> AppResult<Json<TripResponse>> {
    if payload.source.trim().is_empty() || payload.destination.trim().is_empty() {
        return Err(AppError::Validation(
            "Source and destination are required".to_string(),
        ));
    }

    match payload.vehicle_type {
        VehicleType::Car => {
            if !(1..=7).contains(&payload.total_seats) {
                return Err(AppError::Validation(
                    "A car trip must offer between 1 and 7 seats".to_string(),
                ));
            }
        }
        VehicleType::Bike => {
            if payload.total_seats != 1 {
                return Err(AppError::Validation(
                    "A bike trip offers exactly 1 seat".to_string(),
                ));
            }
        }
    }

    let now = Utc::now();
    if payload.scheduled_time <= now {
        return Err(AppError::Validation(
            "Scheduled time must be in the future".to_string(),
        ));
    }
    if payload.scheduled_time > now + Duration::days(SCHEDULING_WINDOW_DAYS) {
        return Err(AppError::Validation(format!(
            "Trips can be scheduled at most {} days ahead",
            SCHEDULING_WINDOW_DAYS
        )));
    }

    for location in [&payload.source_location, &payload.destination_location]
        .into_iter()
        .flatten()
    {
        if !is_valid_point(location.lat, location.lng) {
            return Err(AppError::Validation("Invalid coordinates".to_string()));
        }
    }

    let new_trip = trip::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(claims.sub),
        vehicle_type: Set(payload.vehicle_type),
        total_seats: Set(payload.total_seats),
        available_seats: Set(payload.total_seats),
        source: Set(payload.source.trim().to_string()),
        destination: Set(payload.destination.trim().to_string()),
        source_lat: Set(payload.source_location.map(|p| p.lat)),
        source_lng: Set(payload.source_location.map(|p| p.lng)),
        dest_lat: Set(payload.destination_location.map(|p| p.lat)),
        dest_lng: Set(payload.destination_location.map(|p| p.lng)),
        scheduled_time: Set(payload.scheduled_time.fixed_offset()),
        actual_start_time: Set(None),
        actual_end_time: Set(None),
        status: Set(TripStatus::Scheduled),
        current_lat: Set(None),
        current_lng: Set(None),
        estimated_cost: Set(BASE_COST + payload.total_seats as f64 * COST_PER_SEAT),
        created_at: Set(now.fixed_offset()),
    };

    let created = new_trip.insert(&state.db).await?;
    Ok(Json(created.into()))
}

// ============ Search ============

#[derive(Debug, Deserialize)]
pub struct SearchTripsQuery {
    pub source: String,
    pub destination: String,
    pub vehicle_type: Option<VehicleType>,
}

/// Text search over open trips
pub async fn search_trips(
    State(state): State<AppState>,
    Query(query): Query<SearchTripsQuery>,
) -> AppResult<Json<Vec<TripResponse>>> {
    let mut finder = trip::Entity::find()
        .filter(trip::Column::Status.eq(TripStatus::Scheduled))
        .filter(trip::Column::AvailableSeats.gt(0))
        .filter(trip::Column::Source.contains(query.source.trim()))
        .filter(trip::Column::Destination.contains(query.destination.trim()));

    if let Some(vehicle_type) = query.vehicle_type {
        finder = finder.filter(trip::Column::VehicleType.eq(vehicle_type));
    }

    let trips = finder.all(&state.db).await?;
    Ok(Json(trips.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
pub struct NearbyTripsQuery {
    pub source_lat: f64,
    pub source_lng: f64,
    pub dest_lat: f64,
    pub dest_lng: f64,
    /// Radius in kilometers around both endpoints.
    pub max_distance: f64,
}

/// Geo search over open trips: both endpoints within `max_distance` km
pub async fn nearby_trips(
    State(state): State<AppState>,
    Query(query): Query<NearbyTripsQuery>,
) -> AppResult<Json<Vec<TripResponse>>> {
    if !is_valid_point(query.source_lat, query.source_lng)
        || !is_valid_point(query.dest_lat, query.dest_lng)
        || query.max_distance <= 0.0
    {
        return Err(AppError::Validation("Invalid search area".to_string()));
    }

    let trips = trip::Entity::find()
        .filter(trip::Column::Status.eq(TripStatus::Scheduled))
        .filter(trip::Column::AvailableSeats.gt(0))
        .all(&state.db)
        .await?;

    let matches: Vec<TripResponse> = trips
        .into_iter()
        .filter(|t| {
            let near_source = matches!(
                (t.source_lat, t.source_lng),
                (Some(lat), Some(lng)) if is_within_radius(lat, lng, query.source_lat, query.source_lng, query.max_distance)
            );
            let near_dest = matches!(
                (t.dest_lat, t.dest_lng),
                (Some(lat), Some(lng)) if is_within_radius(lat, lng, query.dest_lat, query.dest_lng, query.max_distance)
            );
            near_source && near_dest
        })
        .map(Into::into)
        .collect();

    Ok(Json(matches))
}

// ============ Detail & Lifecycle ============

#[derive(Debug, Serialize)]
pub struct TripDetailResponse {
    pub trip: TripResponse,
    pub ride_requests: Vec<ride_request::Model>,
}

/// Get a trip with its ride requests
pub async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripDetailResponse>> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    let ride_requests = ride_request::Entity::find()
        .filter(ride_request::Column::TripId.eq(trip_id))
        .all(&state.db)
        .await?;

    Ok(Json(TripDetailResponse {
        trip: trip.into(),
        ride_requests,
    }))
}

/// Start a scheduled trip
pub async fn start_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripResponse>> {
    let trip = lifecycle::start(&state.db, state.hub.as_ref(), trip_id, claims.sub).await?;
    Ok(Json(trip.into()))
}

/// Move a started trip into live progress
pub async fn begin_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripResponse>> {
    let trip = lifecycle::begin_progress(&state.db, state.hub.as_ref(), trip_id, claims.sub).await?;
    Ok(Json(trip.into()))
}

/// Complete a trip
pub async fn complete_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripResponse>> {
    let trip = lifecycle::complete(&state.db, state.hub.as_ref(), trip_id, claims.sub).await?;
    Ok(Json(trip.into()))
}

/// Cancel a trip
pub async fn cancel_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripResponse>> {
    let trip = lifecycle::cancel(&state.db, state.hub.as_ref(), trip_id, claims.sub).await?;
    Ok(Json(trip.into()))
}

#[derive(Debug, Deserialize)]
pub struct LocationUpdateRequest {
    pub lat: f64,
    pub lng: f64,
}

/// Correct the trip's recorded position via the request/response path
pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
    Json(payload): Json<LocationUpdateRequest>,
) -> AppResult<Json<TripResponse>> {
    if !is_valid_point(payload.lat, payload.lng) {
        return Err(AppError::Validation("Invalid coordinates".to_string()));
    }

    let point = Point {
        lat: payload.lat,
        lng: payload.lng,
    };
    let trip = lifecycle::update_location(&state.db, trip_id, claims.sub, point).await?;
    Ok(Json(trip.into()))
}
