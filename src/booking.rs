//! Passenger request -> driver approve/reject workflow, plus the pickup and
//! drop-off progression for approved riders.
//!
//! Approval is the only path that touches seat counts, and it goes through
//! [`crate::seats::reserve_seat`]. Two concurrent approvals on the last seat
//! are serialized at the store: exactly one succeeds, the loser surfaces
//! `SeatUnavailable` and its request stays PENDING.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

use crate::entities::ride_request::{self, PickupStatus, RequestStatus};
use crate::entities::trip::{self, TripStatus};
use crate::error::{AppError, AppResult};
use crate::hub::Notifier;
use crate::seats;

/// Create a PENDING ride request and notify the driver.
pub async fn request_ride(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    passenger_id: Uuid,
    trip_id: Uuid,
) -> AppResult<ride_request::Model> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if trip.driver_id == passenger_id {
        return Err(AppError::Validation(
            "You cannot request a seat on your own trip".to_string(),
        ));
    }

    if trip.status != TripStatus::Scheduled {
        return Err(AppError::Conflict(
            "Trip is no longer open for requests".to_string(),
        ));
    }

    // Pre-check only; the authoritative check is the atomic decrement at
    // approval time.
    if trip.available_seats < 1 {
        return Err(AppError::SeatUnavailable);
    }

    let existing = ride_request::Entity::find()
        .filter(ride_request::Column::TripId.eq(trip_id))
        .filter(ride_request::Column::PassengerId.eq(passenger_id))
        .filter(ride_request::Column::Status.eq(RequestStatus::Pending))
        .one(db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "You already have a pending request for this trip".to_string(),
        ));
    }

    let request = ride_request::ActiveModel {
        id: Set(Uuid::new_v4()),
        trip_id: Set(trip_id),
        passenger_id: Set(passenger_id),
        status: Set(RequestStatus::Pending),
        pickup_status: Set(PickupStatus::Waiting),
        picked_up_at: Set(None),
        dropped_off_at: Set(None),
        created_at: Set(Utc::now().fixed_offset()),
    };

    let request = request.insert(db).await?;

    notifier.notify_user(
        trip.driver_id,
        "ride:requested",
        json!({
            "request_id": request.id,
            "trip_id": trip_id,
            "passenger_id": passenger_id,
        }),
    );

    Ok(request)
}

/// Approve a pending request, reserving its seat atomically.
///
/// On `SeatUnavailable` the request is left PENDING; it is the driver's
/// call whether to reject it outright.
pub async fn approve(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    driver_id: Uuid,
    request_id: Uuid,
) -> AppResult<ride_request::Model> {
    let (request, trip) = load_request_with_trip(db, request_id).await?;

    if trip.driver_id != driver_id {
        return Err(AppError::Forbidden(
            "Only the trip's driver can decide requests".to_string(),
        ));
    }

    if request.status != RequestStatus::Pending {
        return Err(AppError::Conflict("Request already decided".to_string()));
    }

    let trip = seats::reserve_seat(db, trip.id).await?;

    let mut active: ride_request::ActiveModel = request.into();
    active.status = Set(RequestStatus::Approved);
    let request = active.update(db).await?;

    notifier.notify_user(
        request.passenger_id,
        "ride:approved",
        json!({ "request_id": request.id, "trip_id": trip.id }),
    );
    notifier.notify_trip_room(
        trip.id,
        "trip:seats",
        json!({ "trip_id": trip.id, "available_seats": trip.available_seats }),
    );

    Ok(request)
}

/// Reject a pending request. Never touches seat counts.
pub async fn reject(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    driver_id: Uuid,
    request_id: Uuid,
) -> AppResult<ride_request::Model> {
    let (request, trip) = load_request_with_trip(db, request_id).await?;

    if trip.driver_id != driver_id {
        return Err(AppError::Forbidden(
            "Only the trip's driver can decide requests".to_string(),
        ));
    }

    if request.status != RequestStatus::Pending {
        return Err(AppError::Conflict("Request already decided".to_string()));
    }

    let mut active: ride_request::ActiveModel = request.into();
    active.status = Set(RequestStatus::Rejected);
    let request = active.update(db).await?;

    notifier.notify_user(
        request.passenger_id,
        "ride:rejected",
        json!({ "request_id": request.id, "trip_id": trip.id }),
    );

    Ok(request)
}

/// Mark an approved, waiting passenger as picked up.
pub async fn mark_picked_up(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    driver_id: Uuid,
    request_id: Uuid,
) -> AppResult<ride_request::Model> {
    let (request, trip) = load_request_with_trip(db, request_id).await?;

    if trip.driver_id != driver_id {
        return Err(AppError::Forbidden(
            "Only the trip's driver can record pickups".to_string(),
        ));
    }

    if request.status != RequestStatus::Approved {
        return Err(AppError::Conflict(
            "Only approved passengers can be picked up".to_string(),
        ));
    }

    if request.pickup_status != PickupStatus::Waiting {
        return Err(AppError::Conflict("Passenger already picked up".to_string()));
    }

    let now = Utc::now().fixed_offset();
    let mut active: ride_request::ActiveModel = request.into();
    active.pickup_status = Set(PickupStatus::PickedUp);
    active.picked_up_at = Set(Some(now));
    let request = active.update(db).await?;

    let payload = json!({
        "request_id": request.id,
        "trip_id": trip.id,
        "passenger_id": request.passenger_id,
        "timestamp": now,
    });
    notifier.notify_user(request.passenger_id, "ride:picked_up", payload.clone());
    notifier.notify_trip_room(trip.id, "ride:picked_up", payload);

    Ok(request)
}

/// Mark a picked-up passenger as dropped off.
pub async fn mark_dropped_off(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    driver_id: Uuid,
    request_id: Uuid,
) -> AppResult<ride_request::Model> {
    let (request, trip) = load_request_with_trip(db, request_id).await?;

    if trip.driver_id != driver_id {
        return Err(AppError::Forbidden(
            "Only the trip's driver can record drop-offs".to_string(),
        ));
    }

    if request.status != RequestStatus::Approved {
        return Err(AppError::Conflict(
            "Only approved passengers can be dropped off".to_string(),
        ));
    }

    if request.pickup_status != PickupStatus::PickedUp {
        return Err(AppError::Conflict(
            "Passenger must be picked up before drop-off".to_string(),
        ));
    }

    let now = Utc::now().fixed_offset();
    let mut active: ride_request::ActiveModel = request.into();
    active.pickup_status = Set(PickupStatus::DroppedOff);
    active.dropped_off_at = Set(Some(now));
    let request = active.update(db).await?;

    let payload = json!({
        "request_id": request.id,
        "trip_id": trip.id,
        "passenger_id": request.passenger_id,
        "timestamp": now,
    });
    notifier.notify_user(request.passenger_id, "ride:dropped_off", payload.clone());
    notifier.notify_trip_room(trip.id, "ride:dropped_off", payload);

    Ok(request)
}

/// List every request on a trip. Driver-only.
pub async fn list_for_trip(
    db: &DatabaseConnection,
    driver_id: Uuid,
    trip_id: Uuid,
) -> AppResult<Vec<ride_request::Model>> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if trip.driver_id != driver_id {
        return Err(AppError::Forbidden(
            "Only the trip's driver can list its requests".to_string(),
        ));
    }

    Ok(ride_request::Entity::find()
        .filter(ride_request::Column::TripId.eq(trip_id))
        .all(db)
        .await?)
}

/// List a passenger's own requests across all trips.
pub async fn my_requests(
    db: &DatabaseConnection,
    passenger_id: Uuid,
) -> AppResult<Vec<ride_request::Model>> {
    Ok(ride_request::Entity::find()
        .filter(ride_request::Column::PassengerId.eq(passenger_id))
        .all(db)
        .await?)
}

async fn load_request_with_trip(
    db: &DatabaseConnection,
    request_id: Uuid,
) -> AppResult<(ride_request::Model, trip::Model)> {
    let request = ride_request::Entity::find_by_id(request_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride request not found".to_string()))?;

    let trip = trip::Entity::find_by_id(request.trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    Ok((request, trip))
}
