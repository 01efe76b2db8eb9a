//! Trip state machine.
//!
//! SCHEDULED -> STARTED -> IN_PROGRESS -> COMPLETED, with CANCELLED
//! reachable from any non-terminal state. Transition writes are guarded
//! conditional updates filtered on the expected current status, so a raced
//! double-transition loses at the store instead of overwriting.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

use crate::entities::trip::{self, TripStatus};
use crate::error::{AppError, AppResult};
use crate::eta::Point;
use crate::hub::Notifier;

/// Start a scheduled trip. Driver-only; stamps `actual_start_time`.
pub async fn start(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    trip_id: Uuid,
    caller_id: Uuid,
) -> AppResult<trip::Model> {
    transition(db, notifier, trip_id, caller_id, TripStatus::Started).await
}

/// Move a started trip into live progress. Driver-only.
pub async fn begin_progress(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    trip_id: Uuid,
    caller_id: Uuid,
) -> AppResult<trip::Model> {
    transition(db, notifier, trip_id, caller_id, TripStatus::InProgress).await
}

/// Complete a trip from any non-terminal state. Stamps `actual_end_time`.
pub async fn complete(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    trip_id: Uuid,
    caller_id: Uuid,
) -> AppResult<trip::Model> {
    transition(db, notifier, trip_id, caller_id, TripStatus::Completed).await
}

/// Cancel a trip unless it already reached a terminal state.
pub async fn cancel(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    trip_id: Uuid,
    caller_id: Uuid,
) -> AppResult<trip::Model> {
    transition(db, notifier, trip_id, caller_id, TripStatus::Cancelled).await
}

fn check_edge(from: TripStatus, to: TripStatus) -> AppResult<()> {
    let legal = match to {
        TripStatus::Started => from == TripStatus::Scheduled,
        TripStatus::InProgress => from == TripStatus::Started,
        TripStatus::Completed | TripStatus::Cancelled => !from.is_terminal(),
        TripStatus::Scheduled => false,
    };

    if legal {
        Ok(())
    } else {
        Err(AppError::InvalidTransition { from, to })
    }
}

async fn transition(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    trip_id: Uuid,
    caller_id: Uuid,
    to: TripStatus,
) -> AppResult<trip::Model> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if trip.driver_id != caller_id {
        return Err(AppError::Forbidden(
            "Only the trip's driver can change its status".to_string(),
        ));
    }

    check_edge(trip.status, to)?;

    let now = Utc::now().fixed_offset();
    let mut update = trip::Entity::update_many()
        .col_expr(trip::Column::Status, Expr::value(to))
        .filter(trip::Column::Id.eq(trip_id))
        .filter(trip::Column::Status.eq(trip.status));

    match to {
        TripStatus::Started => {
            update = update.col_expr(trip::Column::ActualStartTime, Expr::value(Some(now)));
        }
        TripStatus::Completed => {
            update = update.col_expr(trip::Column::ActualEndTime, Expr::value(Some(now)));
        }
        _ => {}
    }

    let result = update.exec(db).await?;
    if result.rows_affected == 0 {
        // Someone else moved the trip between our read and the update.
        let current = trip::Entity::find_by_id(trip_id)
            .one(db)
            .await?
            .map(|t| t.status)
            .unwrap_or(trip.status);
        return Err(AppError::InvalidTransition { from: current, to });
    }

    let updated = trip::Entity::find_by_id(trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Trip vanished after transition".to_string()))?;

    notifier.notify_trip_room(
        trip_id,
        "trip:status",
        json!({ "trip_id": trip_id, "status": updated.status, "timestamp": now }),
    );

    Ok(updated)
}

/// Persist a driver-reported position via the request/response path.
///
/// Unlike the live telemetry path this has no status gate: it is treated as
/// an administrative correction.
pub async fn update_location(
    db: &DatabaseConnection,
    trip_id: Uuid,
    caller_id: Uuid,
    point: Point,
) -> AppResult<trip::Model> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if trip.driver_id != caller_id {
        return Err(AppError::Forbidden(
            "Only the trip's driver can report its location".to_string(),
        ));
    }

    let mut active: trip::ActiveModel = trip.into();
    active.current_lat = Set(Some(point.lat));
    active.current_lng = Set(Some(point.lng));

    Ok(active.update(db).await?)
}

/// Persist a live telemetry point from the tracking channel.
///
/// Accepted only while the trip is IN_PROGRESS; the first update after
/// `start` promotes STARTED to IN_PROGRESS, which is when live tracking
/// begins.
pub async fn record_live_location(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    trip_id: Uuid,
    caller_id: Uuid,
    point: Point,
) -> AppResult<trip::Model> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if trip.driver_id != caller_id {
        return Err(AppError::Forbidden(
            "Only the trip's driver can report its location".to_string(),
        ));
    }

    match trip.status {
        TripStatus::InProgress => {}
        TripStatus::Started => {
            begin_progress(db, notifier, trip_id, caller_id).await?;
        }
        other => {
            return Err(AppError::InvalidTransition {
                from: other,
                to: TripStatus::InProgress,
            });
        }
    }

    let mut active: trip::ActiveModel = trip::Entity::find_by_id(trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?
        .into();
    active.current_lat = Set(Some(point.lat));
    active.current_lng = Set(Some(point.lng));

    Ok(active.update(db).await?)
}
