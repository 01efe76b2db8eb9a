pub mod booking;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod eta;
pub mod handlers;
pub mod hub;
pub mod lifecycle;
pub mod middleware;
pub mod routes;
pub mod seats;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::eta::EtaEstimator;
use crate::hub::LiveHub;

pub use config::Config;
pub use error::{AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub hub: Arc<LiveHub>,
    pub eta: EtaEstimator,
}
