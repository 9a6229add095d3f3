//! Application service facade.
//!
//! `StockRoute` wires the inventory engine, the event-sourced request and route
//! workflows, the fleet registry and the GPS log behind one entry point. It
//! owns the cross-aggregate checks the pure aggregates cannot make (does the
//! department exist, is the linked request approved) and the capability gates
//! of the workflow operations.
//!
//! Everything committed is published on the shared bus as
//! `EventEnvelope<serde_json::Value>`: workflow events by the dispatcher, ledger
//! entries by this facade right after the stock operation returns.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use stockroute_auth::{Actor, Capability};
use stockroute_core::{
    BatchId, Clock, DepartmentId, DeviceId, DomainError, ProductId, ReadingId, RequestId,
    RouteId, SystemClock, UserId, VehicleId, WarehouseId,
};
use stockroute_events::{Event, EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use stockroute_inventory::{
    BatchCreated, Catalog, InMemoryLedger, InventoryEngine, KeyedLocks, LedgerEntry, NewBatch,
    StockMovement, TransferOutcome,
};
use stockroute_logistics::{
    AddItem, AddPoint, ApproveRequest, AssignRoute, CompleteRoute, CreateRequest, CreateRoute,
    FulfillRequest, GpsDevice, GpsReading, LinkedRequest, NewGpsReading, Position, RejectRequest,
    Request, RequestCommand, Route, RouteCommand, RouteSummary, StartRoute, VisitPoint, summarize,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, require};
use crate::config::ServiceConfig;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::fleet_registry::FleetRegistry;
use crate::gps_log::InMemoryGpsLog;
use crate::projections::request_board::REQUEST_STREAM;
use crate::projections::{RequestBoardEntry, RequestBoardProjection};
use crate::read_model::{InMemoryStore, KeyValueStore};

pub const ROUTE_STREAM: &str = "logistics.route";
pub const BATCH_STREAM: &str = "inventory.batch";

pub type EnvelopeBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

/// Input of [`StockRoute::create_route`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoute {
    pub name: String,
    pub warehouse_id: WarehouseId,
    pub date: NaiveDate,
    pub driver: Option<UserId>,
    pub vehicle: Option<VehicleId>,
    pub planned_start: Option<NaiveTime>,
    pub planned_end: Option<NaiveTime>,
    pub planned_distance_km: Option<f64>,
    pub notes: String,
}

/// Input of [`StockRoute::add_route_point`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoutePoint {
    pub address: String,
    pub request_id: Option<RequestId>,
    pub coordinates: Option<Position>,
    pub planned_arrival: Option<NaiveTime>,
    pub note: String,
}

impl NewRoutePoint {
    pub fn at(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            request_id: None,
            coordinates: None,
            planned_arrival: None,
            note: String::new(),
        }
    }
}

pub struct StockRoute {
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    catalog: Arc<Catalog>,
    inventory: InventoryEngine,
    fleet: FleetRegistry,
    gps: InMemoryGpsLog,
    summaries: InMemoryStore<RouteId, RouteSummary>,
    request_board: RequestBoardProjection<InMemoryStore<RequestId, RequestBoardEntry>>,
    dispatcher: CommandDispatcher<InMemoryEventStore, Arc<EnvelopeBus>>,
    route_locks: KeyedLocks<RouteId>,
}

impl core::fmt::Debug for StockRoute {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockRoute")
            .field("config", &self.config)
            .field("inventory", &self.inventory)
            .finish_non_exhaustive()
    }
}

impl StockRoute {
    pub fn new(config: ServiceConfig, catalog: Arc<Catalog>, clock: Arc<dyn Clock>) -> Self {
        let bus = Arc::new(EnvelopeBus::new());
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), bus)
            .with_max_attempts(config.dispatch_attempts);

        Self {
            inventory: InventoryEngine::in_memory(Arc::clone(&catalog), Arc::clone(&clock)),
            config,
            clock,
            catalog,
            fleet: FleetRegistry::new(),
            gps: InMemoryGpsLog::new(),
            summaries: InMemoryStore::new(),
            request_board: RequestBoardProjection::new(InMemoryStore::new()),
            dispatcher,
            route_locks: KeyedLocks::new(),
        }
    }

    /// In-memory service on the wall clock with an empty catalog.
    pub fn in_memory(config: ServiceConfig) -> Self {
        Self::new(config, Arc::new(Catalog::new()), Arc::new(SystemClock))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn inventory(&self) -> &InventoryEngine {
        &self.inventory
    }

    pub fn ledger(&self) -> &InMemoryLedger {
        self.inventory.ledger()
    }

    pub fn fleet(&self) -> &FleetRegistry {
        &self.fleet
    }

    /// Receive every envelope committed after this call.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    fn publish_entries(&self, entries: &[&LedgerEntry]) -> Result<(), DispatchError> {
        for entry in entries {
            let payload = serde_json::to_value(entry)
                .map_err(|e| DispatchError::Publish(format!("ledger entry encoding failed: {e}")))?;
            let envelope = EventEnvelope::new(
                *entry.id.as_uuid(),
                *entry.batch_id.as_uuid(),
                BATCH_STREAM,
                entry.event_type(),
                entry.sequence,
                entry.timestamp,
                payload,
            );
            self.dispatcher
                .bus()
                .publish(envelope)
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }

    // ---- stock -------------------------------------------------------------

    pub fn create_batch(&self, actor: &Actor, new: NewBatch) -> Result<BatchCreated, DispatchError> {
        let created = self.inventory.create_batch(actor, new)?;
        if let Some(receipt) = &created.receipt {
            self.publish_entries(&[receipt])?;
        }
        Ok(created)
    }

    pub fn receive(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        qty: i64,
        note: impl Into<String>,
    ) -> Result<StockMovement, DispatchError> {
        let movement = self.inventory.receive(actor, batch_id, qty, note)?;
        self.publish_entries(&[&movement.entry])?;
        Ok(movement)
    }

    pub fn dispense(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        qty: i64,
        department: Option<DepartmentId>,
        note: impl Into<String>,
    ) -> Result<StockMovement, DispatchError> {
        let movement = self.inventory.dispense(actor, batch_id, qty, department, note)?;
        self.publish_entries(&[&movement.entry])?;
        Ok(movement)
    }

    pub fn transfer(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        qty: i64,
        target_warehouse: WarehouseId,
        note: impl Into<String>,
    ) -> Result<TransferOutcome, DispatchError> {
        let outcome = self.inventory.transfer(actor, batch_id, qty, target_warehouse, note)?;
        self.publish_entries(&outcome.entries())?;
        Ok(outcome)
    }

    pub fn reconcile(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        actual: i64,
        note: impl Into<String>,
    ) -> Result<StockMovement, DispatchError> {
        let movement = self.inventory.reconcile(actor, batch_id, actual, note)?;
        self.publish_entries(&[&movement.entry])?;
        Ok(movement)
    }

    // ---- requests ----------------------------------------------------------

    fn dispatch_request(&self, request_id: RequestId, command: RequestCommand) -> Result<Request, DispatchError> {
        let (request, committed) = self.dispatcher.dispatch(
            *request_id.as_uuid(),
            REQUEST_STREAM,
            &command,
            || Request::empty(request_id),
        )?;
        for stored in &committed {
            if let Err(err) = self.request_board.apply_envelope(&stored.to_envelope()) {
                warn!(%request_id, error = %err, "request board projection rejected event");
            }
        }
        Ok(request)
    }

    pub fn create_request(
        &self,
        actor: &Actor,
        department_id: DepartmentId,
        planned_date: Option<NaiveDate>,
    ) -> Result<Request, DispatchError> {
        require(actor, &Capability::REQUEST_SUBMISSION)?;
        self.catalog.department(department_id)?;

        let request_id = RequestId::new();
        let request = self.dispatch_request(
            request_id,
            RequestCommand::CreateRequest(CreateRequest {
                request_id,
                requester: actor.user_id,
                department_id,
                planned_date,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%request_id, %department_id, requester = %actor.user_id, "request created");
        Ok(request)
    }

    pub fn add_request_item(
        &self,
        actor: &Actor,
        request_id: RequestId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Request, DispatchError> {
        require(actor, &Capability::REQUEST_SUBMISSION)?;
        self.catalog.product(product_id)?;

        let request = self.dispatch_request(
            request_id,
            RequestCommand::AddItem(AddItem {
                request_id,
                product_id,
                quantity,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%request_id, %product_id, quantity, "request item added");
        Ok(request)
    }

    pub fn approve_request(&self, actor: &Actor, request_id: RequestId) -> Result<Request, DispatchError> {
        require(actor, &Capability::LOGISTICS_APPROVAL)?;
        let request = self.dispatch_request(
            request_id,
            RequestCommand::ApproveRequest(ApproveRequest {
                request_id,
                approved_by: actor.user_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%request_id, approved_by = %actor.user_id, "request approved");
        Ok(request)
    }

    pub fn reject_request(
        &self,
        actor: &Actor,
        request_id: RequestId,
        note: impl Into<String>,
    ) -> Result<Request, DispatchError> {
        require(actor, &Capability::LOGISTICS_APPROVAL)?;
        let request = self.dispatch_request(
            request_id,
            RequestCommand::RejectRequest(RejectRequest {
                request_id,
                rejected_by: actor.user_id,
                note: note.into(),
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%request_id, rejected_by = %actor.user_id, "request rejected");
        Ok(request)
    }

    /// Mark an approved request fulfilled. Stock is not dispensed here; the
    /// caller dispenses per item through [`StockRoute::dispense`].
    pub fn fulfill_request(&self, actor: &Actor, request_id: RequestId) -> Result<Request, DispatchError> {
        require(actor, &Capability::WAREHOUSE_OPERATIONS)?;
        let request = self.dispatch_request(
            request_id,
            RequestCommand::FulfillRequest(FulfillRequest {
                request_id,
                fulfilled_by: actor.user_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%request_id, fulfilled_by = %actor.user_id, "request fulfilled");
        Ok(request)
    }

    pub fn request(&self, request_id: RequestId) -> Result<Request, DispatchError> {
        let request = self
            .dispatcher
            .load(*request_id.as_uuid(), || Request::empty(request_id))?;
        if !request.exists() {
            return Err(DomainError::not_found(format!("request {request_id}")).into());
        }
        Ok(request)
    }

    /// Pending requests of one department, from the request board.
    pub fn pending_requests(&self, department_id: DepartmentId) -> Vec<RequestBoardEntry> {
        self.request_board.pending_for(department_id)
    }

    // ---- routes ------------------------------------------------------------

    fn dispatch_route(&self, route_id: RouteId, command: RouteCommand) -> Result<Route, DispatchError> {
        let (route, _) = self.dispatcher.dispatch(
            *route_id.as_uuid(),
            ROUTE_STREAM,
            &command,
            || Route::empty(route_id),
        )?;
        Ok(route)
    }

    pub fn create_route(&self, actor: &Actor, new: NewRoute) -> Result<Route, DispatchError> {
        require(actor, &Capability::ROUTE_OPERATIONS)?;
        self.catalog.warehouse(new.warehouse_id)?;
        if let Some(vehicle_id) = new.vehicle {
            self.fleet.vehicle(vehicle_id)?;
        }

        let route_id = RouteId::new();
        let route = self.dispatch_route(
            route_id,
            RouteCommand::CreateRoute(CreateRoute {
                route_id,
                name: new.name,
                warehouse_id: new.warehouse_id,
                date: new.date,
                driver: new.driver,
                vehicle: new.vehicle,
                planned_start: new.planned_start,
                planned_end: new.planned_end,
                planned_distance_km: new.planned_distance_km,
                notes: new.notes,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%route_id, warehouse_id = %new.warehouse_id, date = %new.date, "route created");
        Ok(route)
    }

    /// Change the driver and/or vehicle of a planned route. `None` keeps the
    /// current assignment.
    pub fn assign_route(
        &self,
        actor: &Actor,
        route_id: RouteId,
        driver: Option<UserId>,
        vehicle: Option<VehicleId>,
    ) -> Result<Route, DispatchError> {
        require(actor, &Capability::ROUTE_OPERATIONS)?;
        if let Some(vehicle_id) = vehicle {
            self.fleet.vehicle(vehicle_id)?;
        }
        let route = self.dispatch_route(
            route_id,
            RouteCommand::AssignRoute(AssignRoute {
                route_id,
                driver,
                vehicle,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%route_id, "route assigned");
        Ok(route)
    }

    pub fn add_route_point(
        &self,
        actor: &Actor,
        route_id: RouteId,
        point: NewRoutePoint,
    ) -> Result<Route, DispatchError> {
        require(actor, &Capability::ROUTE_OPERATIONS)?;
        let linked = match point.request_id {
            Some(request_id) => {
                let request = self.request(request_id)?;
                Some(LinkedRequest {
                    request_id,
                    status: request.status(),
                })
            }
            None => None,
        };

        let route = self.dispatch_route(
            route_id,
            RouteCommand::AddPoint(AddPoint {
                route_id,
                address: point.address,
                request: linked,
                coordinates: point.coordinates,
                planned_arrival: point.planned_arrival,
                note: point.note,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%route_id, points = route.points().len(), "route point added");
        Ok(route)
    }

    pub fn start_route(&self, actor: &Actor, route_id: RouteId) -> Result<Route, DispatchError> {
        require(actor, &Capability::ROUTE_OPERATIONS)?;
        let route = self.dispatch_route(
            route_id,
            RouteCommand::StartRoute(StartRoute {
                route_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%route_id, "route started");
        Ok(route)
    }

    /// Complete an in-progress route, seal its GPS track and store the summary.
    ///
    /// Runs under the route lock shared with route-tagged GPS recording, so no
    /// reading can slip in between the transition and the seal.
    pub fn complete_route(&self, actor: &Actor, route_id: RouteId) -> Result<Route, DispatchError> {
        require(actor, &Capability::ROUTE_OPERATIONS)?;

        self.route_locks.with_locked(&[route_id], || -> Result<Route, DispatchError> {
            let route = self.dispatch_route(
                route_id,
                RouteCommand::CompleteRoute(CompleteRoute {
                    route_id,
                    occurred_at: self.clock.now(),
                }),
            )?;

            let readings = self.gps.seal(route_id)?;
            let summary = summarize(route_id, route.vehicle(), &readings, self.config.fuel_l_per_100km);
            if !self.summaries.insert_if_absent(route_id, summary.clone()) {
                warn!(%route_id, "route summary already stored");
            }
            info!(
                %route_id,
                readings = summary.reading_count,
                distance_km = summary.distance_km,
                "route completed"
            );
            Ok(route)
        })
    }

    /// Mark a point reached. Allowed in any route status.
    pub fn visit_route_point(
        &self,
        actor: &Actor,
        route_id: RouteId,
        order: u32,
        arrival: Option<DateTime<Utc>>,
    ) -> Result<Route, DispatchError> {
        require(actor, &Capability::ROUTE_OPERATIONS)?;
        let route = self.dispatch_route(
            route_id,
            RouteCommand::VisitPoint(VisitPoint {
                route_id,
                order,
                arrival,
                occurred_at: self.clock.now(),
            }),
        )?;
        info!(%route_id, order, "route point visited");
        Ok(route)
    }

    pub fn route(&self, route_id: RouteId) -> Result<Route, DispatchError> {
        let route = self.dispatcher.load(*route_id.as_uuid(), || Route::empty(route_id))?;
        if !route.exists() {
            return Err(DomainError::not_found(format!("route {route_id}")).into());
        }
        Ok(route)
    }

    /// Planned routes whose start time has passed.
    pub fn late_routes(&self) -> Result<Vec<Route>, DispatchError> {
        let now = self.clock.now();
        let mut late = Vec::new();
        for stream_id in self.dispatcher.store().stream_ids(ROUTE_STREAM)? {
            let route = self.route(RouteId::from_uuid(stream_id))?;
            if route.is_late(now) {
                late.push(route);
            }
        }
        Ok(late)
    }

    pub fn route_summary(&self, route_id: RouteId) -> Result<RouteSummary, DispatchError> {
        self.summaries
            .get(&route_id)
            .ok_or_else(|| DomainError::not_found(format!("summary for route {route_id}")).into())
    }

    // ---- gps ---------------------------------------------------------------

    /// Store a reading reported by a device.
    ///
    /// The device must be installed in the reported vehicle. A reading tagged
    /// with a route needs the route to exist and not be completed.
    pub fn record_gps_reading(&self, reading: NewGpsReading) -> Result<ReadingId, DispatchError> {
        reading.validate()?;
        let device = self.fleet.device(reading.device_id)?;
        if device.vehicle_id != reading.vehicle_id {
            return Err(DomainError::validation(format!(
                "device {} is installed in vehicle {}, not {}",
                device.id, device.vehicle_id, reading.vehicle_id
            ))
            .into());
        }

        let stored = reading.into_reading(ReadingId::new());
        let (device_id, seen_at, route_tag) = (stored.device_id, stored.timestamp, stored.route_id);

        let reading_id = match route_tag {
            Some(route_id) => self.route_locks.with_locked(&[route_id], || -> Result<_, DispatchError> {
                self.route(route_id)?;
                Ok(self.gps.record(stored)?)
            })?,
            None => self.gps.record(stored)?,
        };

        self.fleet.touch_device(device_id, seen_at)?;
        debug!(%reading_id, %device_id, "gps reading recorded");
        Ok(reading_id)
    }

    /// A vehicle's readings within `[from, to]`, oldest first.
    pub fn vehicle_track(
        &self,
        vehicle_id: VehicleId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<GpsReading>, DispatchError> {
        Ok(self.gps.for_vehicle(vehicle_id, from, to)?)
    }

    pub fn vehicle_position(&self, vehicle_id: VehicleId) -> Result<Option<GpsReading>, DispatchError> {
        Ok(self.gps.latest_for_vehicle(vehicle_id)?)
    }

    /// Devices heard from within the configured window.
    pub fn online_devices(&self) -> Result<Vec<GpsDevice>, DispatchError> {
        Ok(self
            .fleet
            .online_devices(self.clock.now(), self.config.device_online_window())?)
    }

    pub fn device(&self, device_id: DeviceId) -> Result<GpsDevice, DispatchError> {
        Ok(self.fleet.device(device_id)?)
    }
}
