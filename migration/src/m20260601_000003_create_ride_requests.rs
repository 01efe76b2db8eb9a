use sea_orm_migration::{prelude::*, schema::*};

use super::m20260601_000001_create_users::User;
use super::m20260601_000002_create_trips::Trip;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RideRequest::Table)
                    .if_not_exists()
                    .col(uuid(RideRequest::Id).primary_key())
                    .col(uuid(RideRequest::TripId).not_null())
                    .col(uuid(RideRequest::PassengerId).not_null())
                    .col(string_len(RideRequest::Status, 16).not_null())
                    .col(string_len(RideRequest::PickupStatus, 16).not_null())
                    .col(timestamp_with_time_zone_null(RideRequest::PickedUpAt))
                    .col(timestamp_with_time_zone_null(RideRequest::DroppedOffAt))
                    .col(
                        timestamp_with_time_zone(RideRequest::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_trip")
                            .from(RideRequest::Table, RideRequest::TripId)
                            .to(Trip::Table, Trip::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_passenger")
                            .from(RideRequest::Table, RideRequest::PassengerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ride_request_trip")
                    .table(RideRequest::Table)
                    .col(RideRequest::TripId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RideRequest::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum RideRequest {
    Table,
    Id,
    TripId,
    PassengerId,
    Status,
    PickupStatus,
    PickedUpAt,
    DroppedOffAt,
    CreatedAt,
}
