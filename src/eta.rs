//! Remaining time/distance estimation between two points.
//!
//! The primary path asks an OSRM-compatible routing service for driving
//! duration and distance. Any provider failure (network, timeout, bad body)
//! falls back to great-circle distance at an assumed average speed; the
//! caller never sees a provider error, only `used_fallback = true`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::geo::{haversine_distance, is_valid_point};

/// Assumed average driving speed when the routing provider is unreachable.
const FALLBACK_SPEED_KMH: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Eta {
    pub duration_seconds: f64,
    pub distance_meters: f64,
    pub eta_text: String,
    pub distance_text: String,
    pub used_fallback: bool,
}

#[derive(Debug, Error)]
enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response")]
    Malformed,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    duration: f64,
    distance: f64,
}

#[derive(Clone)]
pub struct EtaEstimator {
    client: reqwest::Client,
    base_url: String,
}

impl EtaEstimator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build routing HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Estimate driving time and distance from `from` to `to`.
    ///
    /// Returns `None` only when either input point is invalid. Provider-side
    /// failures are absorbed by the fallback path.
    pub async fn estimate(&self, from: Point, to: Point) -> Option<Eta> {
        if !is_valid_point(from.lat, from.lng) || !is_valid_point(to.lat, to.lng) {
            return None;
        }

        match self.query_provider(from, to).await {
            Ok((duration, distance)) => Some(build_eta(duration, distance, false)),
            Err(e) => {
                tracing::warn!(error = %e, "Routing provider unavailable, using fallback");
                Some(fallback_estimate(from, to))
            }
        }
    }

    async fn query_provider(&self, from: Point, to: Point) -> Result<(f64, f64), ProviderError> {
        // OSRM expects lng,lat pairs
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.base_url, from.lng, from.lat, to.lng, to.lat
        );

        let response = self
            .client
            .get(&url)
            .query(&[("overview", "false")])
            .send()
            .await?
            .error_for_status()?
            .json::<RouteResponse>()
            .await?;

        if response.code != "Ok" {
            return Err(ProviderError::Malformed);
        }

        let route = response.routes.first().ok_or(ProviderError::Malformed)?;
        Ok((route.duration, route.distance))
    }
}

fn fallback_estimate(from: Point, to: Point) -> Eta {
    let distance_km = haversine_distance(from.lat, from.lng, to.lat, to.lng);
    let duration_seconds = distance_km / FALLBACK_SPEED_KMH * 3600.0;
    build_eta(duration_seconds, distance_km * 1000.0, true)
}

fn build_eta(duration_seconds: f64, distance_meters: f64, used_fallback: bool) -> Eta {
    Eta {
        duration_seconds,
        distance_meters,
        eta_text: format_duration(duration_seconds),
        distance_text: format_distance(distance_meters),
        used_fallback,
    }
}

pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return "<1 min".to_string();
    }
    let minutes = (seconds / 60.0).round() as i64;
    if minutes < 60 {
        format!("{} min", minutes)
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}
