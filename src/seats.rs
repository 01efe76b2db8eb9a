//! Atomic seat reservation.
//!
//! The check and the decrement are a single conditional UPDATE against the
//! store; no caller ever reads `available_seats` and writes back a
//! decremented value. Under concurrent approvals the store serializes the
//! updates, so successful reservations can never exceed `total_seats`.
//!
//! There is no release counterpart: rejections and cancellations after
//! approval do not restore seats.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::trip;
use crate::error::{AppError, AppResult};

/// Reserve exactly one seat on a trip, or fail cleanly.
///
/// Runs `UPDATE trip SET available_seats = available_seats - 1 WHERE id = ?
/// AND available_seats > 0` and inspects the affected row count. Zero rows
/// means either the trip does not exist (`NotFound`) or the reservation lost
/// the race (`SeatUnavailable`); a follow-up read tells the two apart.
pub async fn reserve_seat(db: &DatabaseConnection, trip_id: Uuid) -> AppResult<trip::Model> {
    let result = trip::Entity::update_many()
        .col_expr(
            trip::Column::AvailableSeats,
            Expr::col(trip::Column::AvailableSeats).sub(1),
        )
        .filter(trip::Column::Id.eq(trip_id))
        .filter(trip::Column::AvailableSeats.gt(0))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return match trip::Entity::find_by_id(trip_id).one(db).await? {
            Some(_) => Err(AppError::SeatUnavailable),
            None => Err(AppError::NotFound("Trip not found".to_string())),
        };
    }

    trip::Entity::find_by_id(trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Trip vanished after reservation".to_string()))
}
