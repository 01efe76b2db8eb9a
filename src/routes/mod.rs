use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{auth, bookings, trips, ws};
use crate::middleware::auth::{auth_middleware, require_driver};
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Role-specific governor layers, keyed by user id
    let driver_governor = create_role_governor(RateLimitedRole::Driver);
    let passenger_governor = create_role_governor(RateLimitedRole::Passenger);
    // IP-based governor for unauthenticated routes
    let public_governor = create_public_governor();

    // Public routes (IP rate limited)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor.clone());

    // Public trip discovery
    let public_routes = Router::new()
        .route("/trips/search", get(trips::search_trips))
        .route("/trips/nearby", get(trips::nearby_trips))
        .layer(public_governor);

    // Driver routes (requires auth + driver role)
    let driver_routes = Router::new()
        .route("/trips", post(trips::create_trip))
        .route("/trips/{id}/start", post(trips::start_trip))
        .route("/trips/{id}/progress", post(trips::begin_progress))
        .route("/trips/{id}/complete", post(trips::complete_trip))
        .route("/trips/{id}/cancel", post(trips::cancel_trip))
        .route("/trips/{id}/location", put(trips::update_location))
        .route("/trips/{id}/requests", get(bookings::list_for_trip))
        .route("/rides/{id}/approve", post(bookings::approve_request))
        .route("/rides/{id}/reject", post(bookings::reject_request))
        .route("/rides/{id}/pickup", post(bookings::mark_picked_up))
        .route("/rides/{id}/dropoff", post(bookings::mark_dropped_off))
        .layer(driver_governor)
        .layer(middleware::from_fn(require_driver))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Authenticated routes open to any role
    let user_routes = Router::new()
        .route("/trips/{id}", get(trips::get_trip))
        .route("/rides", post(bookings::request_ride))
        .route("/rides", get(bookings::my_requests))
        .layer(passenger_governor)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Tracking channel; authenticates via token at upgrade time
    let ws_routes = Router::new().route("/ws", get(ws::ws_handler));

    // Combine all routes
    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", public_routes)
        .nest("/api", driver_routes)
        .nest("/api", user_routes)
        .nest("/api", ws_routes)
        .with_state(state)
}
