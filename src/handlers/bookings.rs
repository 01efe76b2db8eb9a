use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::booking;
use crate::entities::ride_request;
use crate::error::AppResult;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RequestRideRequest {
    pub trip_id: Uuid,
}

/// Request a seat on a trip
pub async fn request_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RequestRideRequest>,
) -> AppResult<Json<ride_request::Model>> {
    let request =
        booking::request_ride(&state.db, state.hub.as_ref(), claims.sub, payload.trip_id).await?;
    Ok(Json(request))
}

/// List the caller's own ride requests
pub async fn my_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<ride_request::Model>>> {
    Ok(Json(booking::my_requests(&state.db, claims.sub).await?))
}

/// List all requests for one of the caller's trips
pub async fn list_for_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<Vec<ride_request::Model>>> {
    Ok(Json(
        booking::list_for_trip(&state.db, claims.sub, trip_id).await?,
    ))
}

/// Approve a pending request
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ride_request::Model>> {
    let request = booking::approve(&state.db, state.hub.as_ref(), claims.sub, request_id).await?;
    Ok(Json(request))
}

/// Reject a pending request
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ride_request::Model>> {
    let request = booking::reject(&state.db, state.hub.as_ref(), claims.sub, request_id).await?;
    Ok(Json(request))
}

/// Record a passenger pickup
pub async fn mark_picked_up(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ride_request::Model>> {
    let request =
        booking::mark_picked_up(&state.db, state.hub.as_ref(), claims.sub, request_id).await?;
    Ok(Json(request))
}

/// Record a passenger drop-off
pub async fn mark_dropped_off(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ride_request::Model>> {
    let request =
        booking::mark_dropped_off(&state.db, state.hub.as_ref(), claims.sub, request_id).await?;
    Ok(Json(request))
}
