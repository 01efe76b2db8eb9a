use sea_orm_migration::{prelude::*, schema::*};

use super::m20260601_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Trip::Table)
                    .if_not_exists()
                    .col(uuid(Trip::Id).primary_key())
                    .col(uuid(Trip::DriverId).not_null())
                    .col(string_len(Trip::VehicleType, 16).not_null())
                    .col(integer(Trip::TotalSeats).not_null())
                    .col(integer(Trip::AvailableSeats).not_null())
                    .col(string_len(Trip::Source, 255).not_null())
                    .col(string_len(Trip::Destination, 255).not_null())
                    .col(double_null(Trip::SourceLat))
                    .col(double_null(Trip::SourceLng))
                    .col(double_null(Trip::DestLat))
                    .col(double_null(Trip::DestLng))
                    .col(timestamp_with_time_zone(Trip::ScheduledTime).not_null())
                    .col(timestamp_with_time_zone_null(Trip::ActualStartTime))
                    .col(timestamp_with_time_zone_null(Trip::ActualEndTime))
                    .col(string_len(Trip::Status, 16).not_null())
                    .col(double_null(Trip::CurrentLat))
                    .col(double_null(Trip::CurrentLng))
                    .col(double(Trip::EstimatedCost).not_null())
                    .col(
                        timestamp_with_time_zone(Trip::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_driver")
                            .from(Trip::Table, Trip::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_trip_status")
                    .table(Trip::Table)
                    .col(Trip::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Trip::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Trip {
    Table,
    Id,
    DriverId,
    VehicleType,
    TotalSeats,
    AvailableSeats,
    Source,
    Destination,
    SourceLat,
    SourceLng,
    DestLat,
    DestLng,
    ScheduledTime,
    ActualStartTime,
    ActualEndTime,
    Status,
    CurrentLat,
    CurrentLng,
    EstimatedCost,
    CreatedAt,
}
