//! Append-only storage for GPS readings.
//!
//! Readings are indexed by route and by vehicle. A route is sealed when it
//! completes; after that, readings tagged with it are refused, so the summary
//! computed at completion covers every reading the route will ever have.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use stockroute_core::{DomainError, DomainResult, ReadingId, RouteId, VehicleId};
use stockroute_logistics::GpsReading;

#[derive(Debug, Default)]
struct Inner {
    readings: Vec<GpsReading>,
    by_route: HashMap<RouteId, Vec<usize>>,
    by_vehicle: HashMap<VehicleId, Vec<usize>>,
    sealed: HashSet<RouteId>,
}

#[derive(Debug, Default)]
pub struct InMemoryGpsLog {
    inner: RwLock<Inner>,
}

fn poisoned() -> DomainError {
    DomainError::conflict("gps log lock poisoned")
}

impl InMemoryGpsLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading. Fails if it is tagged with a sealed route.
    pub fn record(&self, reading: GpsReading) -> DomainResult<ReadingId> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if let Some(route_id) = reading.route_id {
            if inner.sealed.contains(&route_id) {
                return Err(DomainError::invalid_transition(format!(
                    "route {route_id} is completed; no further readings accepted"
                )));
            }
        }

        let id = reading.id;
        let idx = inner.readings.len();
        if let Some(route_id) = reading.route_id {
            inner.by_route.entry(route_id).or_default().push(idx);
        }
        inner.by_vehicle.entry(reading.vehicle_id).or_default().push(idx);
        inner.readings.push(reading);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.readings.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Readings tagged with `route_id`, in arrival order.
    pub fn for_route(&self, route_id: RouteId) -> DomainResult<Vec<GpsReading>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .by_route
            .get(&route_id)
            .map(|idxs| idxs.iter().map(|&i| inner.readings[i].clone()).collect())
            .unwrap_or_default())
    }

    /// A vehicle's readings within `[from, to]`, ordered by timestamp.
    pub fn for_vehicle(
        &self,
        vehicle_id: VehicleId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<Vec<GpsReading>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut track: Vec<GpsReading> = inner
            .by_vehicle
            .get(&vehicle_id)
            .into_iter()
            .flatten()
            .map(|&i| &inner.readings[i])
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .cloned()
            .collect();
        track.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(track)
    }

    /// Most recent reading of a vehicle by timestamp.
    pub fn latest_for_vehicle(&self, vehicle_id: VehicleId) -> DomainResult<Option<GpsReading>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .by_vehicle
            .get(&vehicle_id)
            .into_iter()
            .flatten()
            .map(|&i| &inner.readings[i])
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    /// Seal a route and return its readings as of sealing. Sealing twice is a
    /// state error.
    pub fn seal(&self, route_id: RouteId) -> DomainResult<Vec<GpsReading>> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if !inner.sealed.insert(route_id) {
            return Err(DomainError::invalid_transition(format!(
                "route {route_id} is already sealed"
            )));
        }
        Ok(inner
            .by_route
            .get(&route_id)
            .map(|idxs| idxs.iter().map(|&i| inner.readings[i].clone()).collect())
            .unwrap_or_default())
    }

    pub fn is_sealed(&self, route_id: RouteId) -> bool {
        self.inner
            .read()
            .map(|i| i.sealed.contains(&route_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stockroute_core::DeviceId;
    use stockroute_logistics::{NewGpsReading, Position};

    fn reading(vehicle: VehicleId, route: Option<RouteId>, at: DateTime<Utc>) -> GpsReading {
        NewGpsReading {
            device_id: DeviceId::new(),
            vehicle_id: vehicle,
            position: Position::new(50.45, 30.52).unwrap(),
            altitude_m: None,
            speed_kmh: None,
            heading_deg: None,
            timestamp: at,
            route_id: route,
        }
        .into_reading(ReadingId::new())
    }

    #[test]
    fn sealed_route_refuses_tagged_readings() {
        let log = InMemoryGpsLog::new();
        let vehicle = VehicleId::new();
        let route = RouteId::new();
        let t0 = Utc::now();

        log.record(reading(vehicle, Some(route), t0)).unwrap();
        let snapshot = log.seal(route).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(log.is_sealed(route));

        let err = log
            .record(reading(vehicle, Some(route), t0 + Duration::seconds(5)))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));

        // Untagged readings for the same vehicle still land.
        log.record(reading(vehicle, None, t0 + Duration::seconds(5))).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.for_route(route).unwrap().len(), 1);
        assert!(log.seal(route).is_err());
    }

    #[test]
    fn vehicle_track_is_windowed_and_time_ordered() {
        let log = InMemoryGpsLog::new();
        let vehicle = VehicleId::new();
        let t0 = Utc::now();
        for offset in [30, 10, 20, 90] {
            log.record(reading(vehicle, None, t0 + Duration::minutes(offset))).unwrap();
        }
        log.record(reading(VehicleId::new(), None, t0 + Duration::minutes(15))).unwrap();

        let track = log
            .for_vehicle(vehicle, t0 + Duration::minutes(10), t0 + Duration::minutes(30))
            .unwrap();
        let stamps: Vec<_> = track.iter().map(|r| r.timestamp).collect();
        assert_eq!(
            stamps,
            vec![
                t0 + Duration::minutes(10),
                t0 + Duration::minutes(20),
                t0 + Duration::minutes(30)
            ]
        );

        let latest = log.latest_for_vehicle(vehicle).unwrap().unwrap();
        assert_eq!(latest.timestamp, t0 + Duration::minutes(90));
        assert!(log.latest_for_vehicle(VehicleId::new()).unwrap().is_none());
    }
}
