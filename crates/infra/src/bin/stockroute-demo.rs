//! Walks one day of the system end to end on in-memory stores: stock arrives,
//! a department orders, the order is approved, routed, driven and summarized.
//!
//! Configuration comes from `STOCKROUTE_*` environment variables.

use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use tracing::info;

use stockroute_auth::{Actor, Role};
use stockroute_core::{AggregateRoot, DepartmentId, DeviceId, ProductId, SystemClock, UserId, VehicleId, WarehouseId};
use stockroute_infra::{NewRoute, NewRoutePoint, ServiceConfig, StockRoute};
use stockroute_inventory::{Catalog, Department, NewBatch, Product, Warehouse};
use stockroute_logistics::{
    DeviceStatus, GpsDevice, NewGpsReading, Position, Vehicle, VehicleKind, VehicleStatus,
};

fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("invalid STOCKROUTE_* configuration")?;
    stockroute_observability::init_with(&config.log_filter, config.log_format);

    let catalog = Arc::new(Catalog::new());
    let product = catalog.add_product(Product {
        id: ProductId::new(),
        name: "Gauze pads".into(),
        unit: "pcs".into(),
        category: "medical".into(),
        description: String::new(),
    })?;
    let central = catalog.add_warehouse(Warehouse {
        id: WarehouseId::new(),
        name: "Central".into(),
        address: "1 Depot Rd".into(),
        manager: None,
    })?;
    let north = catalog.add_warehouse(Warehouse {
        id: WarehouseId::new(),
        name: "North".into(),
        address: "9 Hill St".into(),
        manager: None,
    })?;
    let surgery = catalog.add_department(Department {
        id: DepartmentId::new(),
        name: "Surgery".into(),
        contact_person: "Duty nurse".into(),
        contact_phone: "100".into(),
    })?;

    let service = StockRoute::new(config, catalog, Arc::new(SystemClock));

    let keeper = Actor::with_role(UserId::new(), Role::WAREHOUSE);
    let manager = Actor::with_role(UserId::new(), Role::MANAGER);
    let logistician = Actor::with_role(UserId::new(), Role::LOGISTICIAN);
    let driver = Actor::with_role(UserId::new(), Role::DRIVER);

    let today = Utc::now().date_naive();
    let batch = service
        .create_batch(
            &keeper,
            NewBatch {
                product_id: product,
                warehouse_id: central,
                location_id: None,
                batch_number: "GZ-2401".into(),
                quantity: 50,
                production_date: today - Duration::days(30),
                expiry_date: today + Duration::days(700),
            },
        )?
        .batch;
    service.transfer(&keeper, batch.id, 10, north, "stock the north site")?;

    let request = service.create_request(&manager, surgery, Some(today))?;
    let request_id = *request.id();
    service.add_request_item(&manager, request_id, product, 20)?;
    service.approve_request(&logistician, request_id)?;
    service.dispense(&keeper, batch.id, 20, Some(surgery), format!("request {request_id}"))?;
    service.fulfill_request(&keeper, request_id)?;

    let vehicle = Vehicle {
        id: VehicleId::new(),
        name: "Van 1".into(),
        plate_number: "AA0001AA".into(),
        kind: VehicleKind::Van,
        model: "Transit".into(),
        year: 2022,
        capacity_kg: 1200.0,
        volume_m3: 9.0,
        home_warehouse: Some(central),
        driver: Some(driver.user_id),
        status: VehicleStatus::Active,
        last_maintenance: None,
        next_maintenance: NaiveDate::from_ymd_opt(2027, 1, 1),
        notes: String::new(),
    };
    let device = GpsDevice {
        id: DeviceId::new(),
        vehicle_id: vehicle.id,
        model: "TK-103".into(),
        serial_number: "SN-0001".into(),
        installed_on: today,
        status: DeviceStatus::Active,
        last_connection: None,
        notes: String::new(),
    };
    let (vehicle_id, device_id) = (vehicle.id, device.id);
    service.fleet().add_vehicle(vehicle)?;
    service.fleet().add_device(device)?;

    let route = service.create_route(
        &logistician,
        NewRoute {
            name: "Surgery delivery".into(),
            warehouse_id: central,
            date: today,
            driver: Some(driver.user_id),
            vehicle: Some(vehicle_id),
            planned_start: NaiveTime::from_hms_opt(8, 0, 0),
            planned_end: NaiveTime::from_hms_opt(12, 0, 0),
            planned_distance_km: Some(5.0),
            notes: String::new(),
        },
    )?;
    let route_id = *route.id();
    service.add_route_point(
        &logistician,
        route_id,
        NewRoutePoint {
            request_id: Some(request_id),
            coordinates: Some(Position::new(50.4550, 30.5300)?),
            ..NewRoutePoint::at("Surgery, block B")
        },
    )?;
    service.start_route(&driver, route_id)?;

    let start = Utc::now();
    let track = [(50.4501, 30.5234), (50.4522, 30.5261), (50.4550, 30.5300)];
    for (i, (lat, lon)) in track.into_iter().enumerate() {
        service.record_gps_reading(NewGpsReading {
            device_id,
            vehicle_id,
            position: Position::new(lat, lon)?,
            altitude_m: None,
            speed_kmh: None,
            heading_deg: None,
            timestamp: start + Duration::minutes(4 * i as i64),
            route_id: Some(route_id),
        })?;
    }
    service.visit_route_point(&driver, route_id, 1, Some(start + Duration::minutes(8)))?;
    service.complete_route(&driver, route_id)?;

    let summary = service.route_summary(route_id)?;
    info!(
        %route_id,
        readings = summary.reading_count,
        distance_km = summary.distance_km,
        avg_speed_kmh = ?summary.avg_speed_kmh,
        fuel_used_l = ?summary.fuel_used_l,
        "route summary"
    );
    info!(
        central_qty = service.inventory().quantity(batch.id)?,
        ledger_entries = stockroute_inventory::Ledger::len(service.ledger()),
        "inventory after the day"
    );

    Ok(())
}
