//! Vehicles and the GPS trackers installed in them.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroute_core::{DeviceId, DomainError, DomainResult, Entity, UserId, VehicleId, WarehouseId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleKind {
    Truck,
    Van,
    Car,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Active,
    Inactive,
    Maintenance,
    Repair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub name: String,
    pub plate_number: String,
    pub kind: VehicleKind,
    pub model: String,
    pub year: u16,
    pub capacity_kg: f64,
    pub volume_m3: f64,
    pub home_warehouse: Option<WarehouseId>,
    pub driver: Option<UserId>,
    pub status: VehicleStatus,
    pub last_maintenance: Option<NaiveDate>,
    pub next_maintenance: Option<NaiveDate>,
    pub notes: String,
}

impl Vehicle {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("vehicle name cannot be empty"));
        }
        if self.plate_number.trim().is_empty() {
            return Err(DomainError::validation("plate number cannot be empty"));
        }
        for (what, value) in [("capacity", self.capacity_kg), ("volume", self.volume_m3)] {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::validation(format!(
                    "{what} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.status == VehicleStatus::Active
    }

    /// The next scheduled maintenance date has been reached.
    pub fn maintenance_due(&self, today: NaiveDate) -> bool {
        self.next_maintenance.is_some_and(|d| d <= today)
    }
}

impl Entity for Vehicle {
    type Id = VehicleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Malfunction,
}

/// A tracker. Each device is installed in exactly one vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpsDevice {
    pub id: DeviceId,
    pub vehicle_id: VehicleId,
    pub model: String,
    pub serial_number: String,
    pub installed_on: NaiveDate,
    pub status: DeviceStatus,
    pub last_connection: Option<DateTime<Utc>>,
    pub notes: String,
}

impl GpsDevice {
    /// Heard from within `window` before `now`.
    pub fn is_online(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_connection.is_some_and(|seen| now - seen < window)
    }
}

impl Entity for GpsDevice {
    type Id = DeviceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn van() -> Vehicle {
        Vehicle {
            id: VehicleId::new(),
            name: "Van 3".into(),
            plate_number: "AA1234BB".into(),
            kind: VehicleKind::Van,
            model: "Sprinter".into(),
            year: 2021,
            capacity_kg: 1500.0,
            volume_m3: 10.5,
            home_warehouse: None,
            driver: None,
            status: VehicleStatus::Active,
            last_maintenance: None,
            next_maintenance: NaiveDate::from_ymd_opt(2026, 5, 1),
            notes: String::new(),
        }
    }

    #[test]
    fn availability_follows_status() {
        let mut v = van();
        assert!(v.is_available());
        v.status = VehicleStatus::Repair;
        assert!(!v.is_available());
    }

    #[test]
    fn maintenance_due_on_the_day() {
        let v = van();
        assert!(!v.maintenance_due(NaiveDate::from_ymd_opt(2026, 4, 30).unwrap()));
        assert!(v.maintenance_due(NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()));

        let unscheduled = Vehicle {
            next_maintenance: None,
            ..van()
        };
        assert!(!unscheduled.maintenance_due(NaiveDate::MAX));
    }

    #[test]
    fn negative_capacity_is_invalid() {
        let v = Vehicle {
            capacity_kg: -1.0,
            ..van()
        };
        assert!(v.validate().is_err());
        assert!(van().validate().is_ok());
    }

    #[test]
    fn device_online_window() {
        let now = Utc::now();
        let mut device = GpsDevice {
            id: DeviceId::new(),
            vehicle_id: VehicleId::new(),
            model: "TK-103".into(),
            serial_number: "SN-1".into(),
            installed_on: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            status: DeviceStatus::Active,
            last_connection: None,
            notes: String::new(),
        };
        let window = Duration::minutes(15);
        assert!(!device.is_online(now, window));

        device.last_connection = Some(now - Duration::minutes(14));
        assert!(device.is_online(now, window));

        device.last_connection = Some(now - Duration::minutes(15));
        assert!(!device.is_online(now, window));
    }
}
