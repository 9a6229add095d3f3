//! Registry of vehicles and the trackers installed in them.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use stockroute_core::{DeviceId, DomainError, DomainResult, VehicleId};
use stockroute_logistics::{GpsDevice, Vehicle};

#[derive(Debug, Default)]
struct Inner {
    vehicles: HashMap<VehicleId, Vehicle>,
    devices: HashMap<DeviceId, GpsDevice>,
    device_of: HashMap<VehicleId, DeviceId>,
}

#[derive(Debug, Default)]
pub struct FleetRegistry {
    inner: RwLock<Inner>,
}

fn poisoned() -> DomainError {
    DomainError::conflict("fleet registry lock poisoned")
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vehicle(&self, vehicle: Vehicle) -> DomainResult<()> {
        vehicle.validate()?;
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if inner.vehicles.contains_key(&vehicle.id) {
            return Err(DomainError::conflict(format!("vehicle {} already registered", vehicle.id)));
        }
        let plate_taken = inner
            .vehicles
            .values()
            .any(|v| v.plate_number.eq_ignore_ascii_case(&vehicle.plate_number));
        if plate_taken {
            return Err(DomainError::conflict(format!(
                "plate number {} already registered",
                vehicle.plate_number
            )));
        }
        inner.vehicles.insert(vehicle.id, vehicle);
        Ok(())
    }

    pub fn vehicle(&self, id: VehicleId) -> DomainResult<Vehicle> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        inner
            .vehicles
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("vehicle {id}")))
    }

    pub fn contains_vehicle(&self, id: VehicleId) -> bool {
        self.inner
            .read()
            .map(|i| i.vehicles.contains_key(&id))
            .unwrap_or(false)
    }

    /// Install a tracker. The vehicle must exist and carry no other device.
    pub fn add_device(&self, device: GpsDevice) -> DomainResult<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if !inner.vehicles.contains_key(&device.vehicle_id) {
            return Err(DomainError::not_found(format!("vehicle {}", device.vehicle_id)));
        }
        if inner.devices.contains_key(&device.id) {
            return Err(DomainError::conflict(format!("device {} already registered", device.id)));
        }
        if let Some(existing) = inner.device_of.get(&device.vehicle_id) {
            return Err(DomainError::conflict(format!(
                "vehicle {} already carries device {existing}",
                device.vehicle_id
            )));
        }
        inner.device_of.insert(device.vehicle_id, device.id);
        inner.devices.insert(device.id, device);
        Ok(())
    }

    pub fn device(&self, id: DeviceId) -> DomainResult<GpsDevice> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        inner
            .devices
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("gps device {id}")))
    }

    /// Record that a device was heard from. Never moves the timestamp backwards.
    pub fn touch_device(&self, id: DeviceId, seen_at: DateTime<Utc>) -> DomainResult<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let device = inner
            .devices
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("gps device {id}")))?;
        if device.last_connection.is_none_or(|prev| prev < seen_at) {
            device.last_connection = Some(seen_at);
        }
        Ok(())
    }

    pub fn available_vehicles(&self) -> DomainResult<Vec<Vehicle>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut out: Vec<Vehicle> = inner.vehicles.values().filter(|v| v.is_available()).cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub fn maintenance_due(&self, today: NaiveDate) -> DomainResult<Vec<Vehicle>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut out: Vec<Vehicle> = inner
            .vehicles
            .values()
            .filter(|v| v.maintenance_due(today))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.next_maintenance.cmp(&b.next_maintenance));
        Ok(out)
    }

    pub fn online_devices(&self, now: DateTime<Utc>, window: Duration) -> DomainResult<Vec<GpsDevice>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .devices
            .values()
            .filter(|d| d.is_online(now, window))
            .cloned()
            .collect())
    }
}
