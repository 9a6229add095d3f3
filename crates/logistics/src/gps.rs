//! GPS readings and their reduction into a per-route summary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockroute_core::{DeviceId, DomainError, DomainResult, ReadingId, RouteId, VehicleId};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A validated WGS84 coordinate pair, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    latitude: f64,
    longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> DomainResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(DomainError::validation(format!(
                "latitude {latitude} out of range [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(DomainError::validation(format!(
                "longitude {longitude} out of range [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Link to the position on a public map.
    pub fn map_url(&self) -> String {
        format!(
            "https://maps.google.com/maps?q={},{}",
            self.latitude, self.longitude
        )
    }
}

/// Great-circle distance between two positions, in km.
pub fn haversine_km(a: Position, b: Position) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// A reading as reported by a device, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGpsReading {
    pub device_id: DeviceId,
    pub vehicle_id: VehicleId,
    pub position: Position,
    /// Metres above sea level.
    pub altitude_m: Option<f64>,
    /// Reported ground speed in km/h.
    pub speed_kmh: Option<f64>,
    /// Heading in degrees, clockwise from north.
    pub heading_deg: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub route_id: Option<RouteId>,
}

impl NewGpsReading {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(speed) = self.speed_kmh {
            if !speed.is_finite() || speed < 0.0 {
                return Err(DomainError::validation(format!(
                    "speed must be a non-negative number (got {speed})"
                )));
            }
        }
        if let Some(heading) = self.heading_deg {
            if !heading.is_finite() || !(0.0..=360.0).contains(&heading) {
                return Err(DomainError::validation(format!(
                    "heading {heading} out of range [0, 360]"
                )));
            }
        }
        if let Some(altitude) = self.altitude_m {
            if !altitude.is_finite() {
                return Err(DomainError::validation("altitude must be a finite number"));
            }
        }
        Ok(())
    }

    pub fn into_reading(self, id: ReadingId) -> GpsReading {
        GpsReading {
            id,
            device_id: self.device_id,
            vehicle_id: self.vehicle_id,
            position: self.position,
            altitude_m: self.altitude_m,
            speed_kmh: self.speed_kmh,
            heading_deg: self.heading_deg,
            timestamp: self.timestamp,
            route_id: self.route_id,
        }
    }
}

/// A stored reading. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsReading {
    pub id: ReadingId,
    pub device_id: DeviceId,
    pub vehicle_id: VehicleId,
    pub position: Position,
    pub altitude_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_deg: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub route_id: Option<RouteId>,
}

/// What a vehicle did on one route, reduced from its readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub route_id: RouteId,
    pub vehicle_id: Option<VehicleId>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub reading_count: usize,
    pub distance_km: f64,
    pub avg_speed_kmh: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub fuel_used_l: Option<f64>,
}

impl RouteSummary {
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end_time? - self.start_time?)
    }
}

fn hours_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (b - a).num_milliseconds() as f64 / 3_600_000.0
}

/// Reduce a route's readings to a summary.
///
/// Readings are ordered by timestamp first, so the input order does not
/// matter. The result depends only on the arguments.
pub fn summarize(
    route_id: RouteId,
    vehicle_id: Option<VehicleId>,
    readings: &[GpsReading],
    fuel_l_per_100km: Option<f64>,
) -> RouteSummary {
    let mut ordered: Vec<&GpsReading> = readings.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    let mut distance_km = 0.0;
    let mut derived_max: Option<f64> = None;
    for pair in ordered.windows(2) {
        let leg = haversine_km(pair[0].position, pair[1].position);
        distance_km += leg;

        let hours = hours_between(pair[0].timestamp, pair[1].timestamp);
        if hours > 0.0 {
            let speed = leg / hours;
            derived_max = Some(derived_max.map_or(speed, |m: f64| m.max(speed)));
        }
    }

    let start_time = ordered.first().map(|r| r.timestamp);
    let end_time = ordered.last().map(|r| r.timestamp);

    let avg_speed_kmh = match (start_time, end_time) {
        (Some(start), Some(end)) => {
            let hours = hours_between(start, end);
            (hours > 0.0).then(|| distance_km / hours)
        }
        _ => None,
    };

    let reported_max = ordered
        .iter()
        .filter_map(|r| r.speed_kmh)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |m| m.max(s))));

    RouteSummary {
        route_id,
        vehicle_id: vehicle_id.or_else(|| ordered.first().map(|r| r.vehicle_id)),
        start_time,
        end_time,
        reading_count: ordered.len(),
        distance_km,
        avg_speed_kmh,
        max_speed_kmh: reported_max.or(derived_max),
        fuel_used_l: fuel_l_per_100km.map(|rate| distance_km * rate / 100.0),
    }
}
