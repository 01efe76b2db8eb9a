mod common;

use sea_orm::EntityTrait;
use uuid::Uuid;

use carpool_backend::entities::trip;
use carpool_backend::entities::user::UserRole;
use carpool_backend::error::AppError;
use carpool_backend::seats;

use common::{create_trip, create_user, setup_db};

#[tokio::test]
async fn test_reservations_stop_at_zero() {
    let db = setup_db().await;

    let driver = create_user(&db, UserRole::Driver).await;
    let trip = create_trip(&db, driver.id, 3).await;

    for expected_left in [2, 1, 0] {
        let reserved = seats::reserve_seat(&db, trip.id).await.unwrap();
        assert_eq!(reserved.available_seats, expected_left);
    }

    let err = seats::reserve_seat(&db, trip.id).await.unwrap_err();
    assert!(matches!(err, AppError::SeatUnavailable));

    // The counter never went below zero
    let trip_now = trip::Entity::find_by_id(trip.id).one(&db).await.unwrap().unwrap();
    assert_eq!(trip_now.available_seats, 0);
}

#[tokio::test]
async fn test_missing_trip_is_distinguished_from_full_trip() {
    let db = setup_db().await;

    let err = seats::reserve_seat(&db, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_reservations_never_oversell() {
    let db = setup_db().await;

    let driver = create_user(&db, UserRole::Driver).await;
    let trip = create_trip(&db, driver.id, 2).await;

    let attempts = 5;
    let mut handles = Vec::new();
    for _ in 0..attempts {
        let db = db.clone();
        let trip_id = trip.id;
        handles.push(tokio::spawn(async move {
            seats::reserve_seat(&db, trip_id).await
        }));
    }

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(AppError::SeatUnavailable) => lost += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(won, 2, "successful reservations must equal total seats");
    assert_eq!(lost, attempts - 2);

    let trip_now = trip::Entity::find_by_id(trip.id).one(&db).await.unwrap().unwrap();
    assert_eq!(trip_now.available_seats, 0);
}
