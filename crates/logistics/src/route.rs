use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use stockroute_core::{
    Aggregate, AggregateRoot, DomainError, RequestId, RouteId, UserId, VehicleId, WarehouseId,
};
use stockroute_events::Event;

use crate::gps::Position;
use crate::request::RequestStatus;

/// Route status lifecycle: `planned -> in_progress -> completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Planned,
    InProgress,
    Completed,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Planned => "planned",
            RouteStatus::InProgress => "in_progress",
            RouteStatus::Completed => "completed",
        }
    }
}

/// A stop on a route. `order` is contiguous from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub order: u32,
    pub address: String,
    pub request_id: Option<RequestId>,
    pub coordinates: Option<Position>,
    /// Planned arrival, time of day on the route date (UTC).
    pub planned_arrival: Option<NaiveTime>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub completed: bool,
    pub note: String,
}

impl RoutePoint {
    /// Not yet visited although its planned arrival has passed.
    pub fn is_late(&self, route_date: NaiveDate, now: DateTime<Utc>) -> bool {
        if self.completed {
            return false;
        }
        self.planned_arrival
            .is_some_and(|at| now > route_date.and_time(at).and_utc())
    }
}

/// Aggregate root: a delivery route.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    id: RouteId,
    name: String,
    warehouse_id: Option<WarehouseId>,
    date: Option<NaiveDate>,
    status: RouteStatus,
    driver: Option<UserId>,
    vehicle: Option<VehicleId>,
    planned_start: Option<NaiveTime>,
    planned_end: Option<NaiveTime>,
    actual_start: Option<DateTime<Utc>>,
    actual_end: Option<DateTime<Utc>>,
    planned_distance_km: Option<f64>,
    notes: String,
    points: Vec<RoutePoint>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Route {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RouteId) -> Self {
        Self {
            id,
            name: String::new(),
            warehouse_id: None,
            date: None,
            status: RouteStatus::Planned,
            driver: None,
            vehicle: None,
            planned_start: None,
            planned_end: None,
            actual_start: None,
            actual_end: None,
            planned_distance_km: None,
            notes: String::new(),
            points: Vec::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn status(&self) -> RouteStatus {
        self.status
    }

    pub fn driver(&self) -> Option<UserId> {
        self.driver
    }

    pub fn vehicle(&self) -> Option<VehicleId> {
        self.vehicle
    }

    pub fn planned_start(&self) -> Option<NaiveTime> {
        self.planned_start
    }

    pub fn planned_end(&self) -> Option<NaiveTime> {
        self.planned_end
    }

    pub fn actual_start(&self) -> Option<DateTime<Utc>> {
        self.actual_start
    }

    pub fn actual_end(&self) -> Option<DateTime<Utc>> {
        self.actual_end
    }

    pub fn planned_distance_km(&self) -> Option<f64> {
        self.planned_distance_km
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn point(&self, order: u32) -> Option<&RoutePoint> {
        self.points.iter().find(|p| p.order == order)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Still planned although the planned start has passed.
    pub fn is_late(&self, now: DateTime<Utc>) -> bool {
        if self.status != RouteStatus::Planned {
            return false;
        }
        match (self.date, self.planned_start) {
            (Some(date), Some(start)) => now > date.and_time(start).and_utc(),
            _ => false,
        }
    }

    /// Points whose planned arrival has passed without a visit.
    pub fn late_points(&self, now: DateTime<Utc>) -> Vec<&RoutePoint> {
        let Some(date) = self.date else {
            return Vec::new();
        };
        self.points.iter().filter(|p| p.is_late(date, now)).collect()
    }
}

impl AggregateRoot for Route {
    type Id = RouteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRoute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRoute {
    pub route_id: RouteId,
    pub name: String,
    pub warehouse_id: WarehouseId,
    pub date: NaiveDate,
    pub driver: Option<UserId>,
    pub vehicle: Option<VehicleId>,
    pub planned_start: Option<NaiveTime>,
    pub planned_end: Option<NaiveTime>,
    pub planned_distance_km: Option<f64>,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignRoute. `None` leaves the current assignment in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRoute {
    pub route_id: RouteId,
    pub driver: Option<UserId>,
    pub vehicle: Option<VehicleId>,
    pub occurred_at: DateTime<Utc>,
}

/// A request a point delivers to, with its status as seen when the point is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRequest {
    pub request_id: RequestId,
    pub status: RequestStatus,
}

/// Command: AddPoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPoint {
    pub route_id: RouteId,
    pub address: String,
    pub request: Option<LinkedRequest>,
    pub coordinates: Option<Position>,
    pub planned_arrival: Option<NaiveTime>,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartRoute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRoute {
    pub route_id: RouteId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteRoute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRoute {
    pub route_id: RouteId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VisitPoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitPoint {
    pub route_id: RouteId,
    pub order: u32,
    pub arrival: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouteCommand {
    CreateRoute(CreateRoute),
    AssignRoute(AssignRoute),
    AddPoint(AddPoint),
    StartRoute(StartRoute),
    CompleteRoute(CompleteRoute),
    VisitPoint(VisitPoint),
}

/// Event: RouteCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCreated {
    pub route_id: RouteId,
    pub name: String,
    pub warehouse_id: WarehouseId,
    pub date: NaiveDate,
    pub driver: Option<UserId>,
    pub vehicle: Option<VehicleId>,
    pub planned_start: Option<NaiveTime>,
    pub planned_end: Option<NaiveTime>,
    pub planned_distance_km: Option<f64>,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RouteAssigned. Carries the full assignment after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAssigned {
    pub route_id: RouteId,
    pub driver: Option<UserId>,
    pub vehicle: Option<VehicleId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PointAdded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointAdded {
    pub route_id: RouteId,
    pub order: u32,
    pub address: String,
    pub request_id: Option<RequestId>,
    pub coordinates: Option<Position>,
    pub planned_arrival: Option<NaiveTime>,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RouteStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStarted {
    pub route_id: RouteId,
    pub started_at: DateTime<Utc>,
}

/// Event: RouteCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCompleted {
    pub route_id: RouteId,
    pub vehicle: Option<VehicleId>,
    pub completed_at: DateTime<Utc>,
}

/// Event: PointVisited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointVisited {
    pub route_id: RouteId,
    pub order: u32,
    pub arrival: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouteEvent {
    RouteCreated(RouteCreated),
    RouteAssigned(RouteAssigned),
    PointAdded(PointAdded),
    RouteStarted(RouteStarted),
    RouteCompleted(RouteCompleted),
    PointVisited(PointVisited),
}

impl Event for RouteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RouteEvent::RouteCreated(_) => "logistics.route.created",
            RouteEvent::RouteAssigned(_) => "logistics.route.assigned",
            RouteEvent::PointAdded(_) => "logistics.route.point_added",
            RouteEvent::RouteStarted(_) => "logistics.route.started",
            RouteEvent::RouteCompleted(_) => "logistics.route.completed",
            RouteEvent::PointVisited(_) => "logistics.route.point_visited",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RouteEvent::RouteCreated(e) => e.occurred_at,
            RouteEvent::RouteAssigned(e) => e.occurred_at,
            RouteEvent::PointAdded(e) => e.occurred_at,
            RouteEvent::RouteStarted(e) => e.started_at,
            RouteEvent::RouteCompleted(e) => e.completed_at,
            RouteEvent::PointVisited(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Route {
    type Command = RouteCommand;
    type Event = RouteEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RouteEvent::RouteCreated(e) => {
                self.id = e.route_id;
                self.name = e.name.clone();
                self.warehouse_id = Some(e.warehouse_id);
                self.date = Some(e.date);
                self.status = RouteStatus::Planned;
                self.driver = e.driver;
                self.vehicle = e.vehicle;
                self.planned_start = e.planned_start;
                self.planned_end = e.planned_end;
                self.planned_distance_km = e.planned_distance_km;
                self.notes = e.notes.clone();
                self.points.clear();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            RouteEvent::RouteAssigned(e) => {
                self.driver = e.driver;
                self.vehicle = e.vehicle;
            }
            RouteEvent::PointAdded(e) => {
                self.points.push(RoutePoint {
                    order: e.order,
                    address: e.address.clone(),
                    request_id: e.request_id,
                    coordinates: e.coordinates,
                    planned_arrival: e.planned_arrival,
                    actual_arrival: None,
                    completed: false,
                    note: e.note.clone(),
                });
            }
            RouteEvent::RouteStarted(e) => {
                self.status = RouteStatus::InProgress;
                self.actual_start = Some(e.started_at);
            }
            RouteEvent::RouteCompleted(e) => {
                self.status = RouteStatus::Completed;
                self.actual_end = Some(e.completed_at);
            }
            RouteEvent::PointVisited(e) => {
                if let Some(point) = self.points.iter_mut().find(|p| p.order == e.order) {
                    point.actual_arrival = Some(e.arrival);
                    point.completed = true;
                }
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RouteCommand::CreateRoute(cmd) => self.handle_create(cmd),
            RouteCommand::AssignRoute(cmd) => self.handle_assign(cmd),
            RouteCommand::AddPoint(cmd) => self.handle_add_point(cmd),
            RouteCommand::StartRoute(cmd) => self.handle_start(cmd),
            RouteCommand::CompleteRoute(cmd) => self.handle_complete(cmd),
            RouteCommand::VisitPoint(cmd) => self.handle_visit(cmd),
        }
    }
}

impl Route {
    fn ensure_exists(&self, route_id: RouteId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("route {route_id}")));
        }
        if self.id != route_id {
            return Err(DomainError::validation("route_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: RouteStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} a route that is {} (must be {})",
                self.status.as_str(),
                expected.as_str()
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateRoute) -> Result<Vec<RouteEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("route already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("route name cannot be empty"));
        }
        if let (Some(start), Some(end)) = (cmd.planned_start, cmd.planned_end) {
            if end < start {
                return Err(DomainError::validation(
                    "planned end time cannot precede planned start time",
                ));
            }
        }
        if let Some(km) = cmd.planned_distance_km {
            if !km.is_finite() || km < 0.0 {
                return Err(DomainError::validation(
                    "planned distance must be a non-negative number",
                ));
            }
        }

        Ok(vec![RouteEvent::RouteCreated(RouteCreated {
            route_id: cmd.route_id,
            name: cmd.name.trim().to_string(),
            warehouse_id: cmd.warehouse_id,
            date: cmd.date,
            driver: cmd.driver,
            vehicle: cmd.vehicle,
            planned_start: cmd.planned_start,
            planned_end: cmd.planned_end,
            planned_distance_km: cmd.planned_distance_km,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignRoute) -> Result<Vec<RouteEvent>, DomainError> {
        self.ensure_exists(cmd.route_id)?;
        self.ensure_status(RouteStatus::Planned, "reassign")?;

        Ok(vec![RouteEvent::RouteAssigned(RouteAssigned {
            route_id: cmd.route_id,
            driver: cmd.driver.or(self.driver),
            vehicle: cmd.vehicle.or(self.vehicle),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_point(&self, cmd: &AddPoint) -> Result<Vec<RouteEvent>, DomainError> {
        self.ensure_exists(cmd.route_id)?;
        self.ensure_status(RouteStatus::Planned, "add points to")?;

        if cmd.address.trim().is_empty() {
            return Err(DomainError::validation("point address cannot be empty"));
        }
        if let Some(linked) = cmd.request {
            if !matches!(
                linked.status,
                RequestStatus::Approved | RequestStatus::Fulfilled
            ) {
                return Err(DomainError::invalid_transition(format!(
                    "request {} is {}; only approved requests can be routed",
                    linked.request_id,
                    linked.status.as_str()
                )));
            }
        }

        let order = (self.points.len() as u32) + 1;

        Ok(vec![RouteEvent::PointAdded(PointAdded {
            route_id: cmd.route_id,
            order,
            address: cmd.address.trim().to_string(),
            request_id: cmd.request.map(|r| r.request_id),
            coordinates: cmd.coordinates,
            planned_arrival: cmd.planned_arrival,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartRoute) -> Result<Vec<RouteEvent>, DomainError> {
        self.ensure_exists(cmd.route_id)?;
        self.ensure_status(RouteStatus::Planned, "start")?;

        Ok(vec![RouteEvent::RouteStarted(RouteStarted {
            route_id: cmd.route_id,
            started_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteRoute) -> Result<Vec<RouteEvent>, DomainError> {
        self.ensure_exists(cmd.route_id)?;
        self.ensure_status(RouteStatus::InProgress, "complete")?;

        Ok(vec![RouteEvent::RouteCompleted(RouteCompleted {
            route_id: cmd.route_id,
            vehicle: self.vehicle,
            completed_at: cmd.occurred_at,
        })])
    }

    fn handle_visit(&self, cmd: &VisitPoint) -> Result<Vec<RouteEvent>, DomainError> {
        self.ensure_exists(cmd.route_id)?;

        let point = self.point(cmd.order).ok_or_else(|| {
            DomainError::not_found(format!("point #{} on route {}", cmd.order, cmd.route_id))
        })?;
        if point.completed {
            return Err(DomainError::invalid_transition(format!(
                "point #{} is already completed",
                cmd.order
            )));
        }
        let arrival = cmd.arrival.ok_or(DomainError::MissingArrival(cmd.order))?;

        Ok(vec![RouteEvent::PointVisited(PointVisited {
            route_id: cmd.route_id,
            order: cmd.order,
            arrival,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t() -> DateTime<Utc> {
        Utc::now()
    }

    fn execute(route: &mut Route, cmd: RouteCommand) -> Result<(), DomainError> {
        for event in route.handle(&cmd)? {
            route.apply(&event);
        }
        Ok(())
    }

    fn planned_route(date: NaiveDate, start: Option<NaiveTime>) -> Route {
        let id = RouteId::new();
        let mut route = Route::empty(id);
        execute(
            &mut route,
            RouteCommand::CreateRoute(CreateRoute {
                route_id: id,
                name: "Morning run".into(),
                warehouse_id: WarehouseId::new(),
                date,
                driver: None,
                vehicle: Some(VehicleId::new()),
                planned_start: start,
                planned_end: None,
                planned_distance_km: Some(42.0),
                notes: String::new(),
                occurred_at: t(),
            }),
        )
        .unwrap();
        route
    }

    fn today_route() -> Route {
        planned_route(Utc::now().date_naive(), None)
    }

    fn add_point(route: &mut Route, request: Option<LinkedRequest>) -> Result<(), DomainError> {
        let route_id = *route.id();
        execute(
            route,
            RouteCommand::AddPoint(AddPoint {
                route_id,
                address: "12 Clinic St".into(),
                request,
                coordinates: Some(Position::new(50.45, 30.52).unwrap()),
                planned_arrival: None,
                note: String::new(),
                occurred_at: t(),
            }),
        )
    }

    fn start(route: &mut Route) -> Result<(), DomainError> {
        let route_id = *route.id();
        execute(
            route,
            RouteCommand::StartRoute(StartRoute {
                route_id,
                occurred_at: t(),
            }),
        )
    }

    fn complete(route: &mut Route) -> Result<(), DomainError> {
        let route_id = *route.id();
        execute(
            route,
            RouteCommand::CompleteRoute(CompleteRoute {
                route_id,
                occurred_at: t(),
            }),
        )
    }

    fn visit(route: &mut Route, order: u32, arrival: Option<DateTime<Utc>>) -> Result<(), DomainError> {
        let route_id = *route.id();
        execute(
            route,
            RouteCommand::VisitPoint(VisitPoint {
                route_id,
                order,
                arrival,
                occurred_at: t(),
            }),
        )
    }

    #[test]
    fn lifecycle_sets_actual_times() {
        let mut route = today_route();
        start(&mut route).unwrap();
        assert_eq!(route.status(), RouteStatus::InProgress);
        assert!(route.actual_start().is_some());

        complete(&mut route).unwrap();
        assert_eq!(route.status(), RouteStatus::Completed);
        assert!(route.actual_end() >= route.actual_start());

        assert!(matches!(complete(&mut route), Err(DomainError::InvalidTransition(_))));
        assert!(matches!(start(&mut route), Err(DomainError::InvalidTransition(_))));
    }

    #[test]
    fn planned_route_cannot_complete() {
        let mut route = today_route();
        assert!(matches!(complete(&mut route), Err(DomainError::InvalidTransition(_))));
    }

    #[test]
    fn points_are_numbered_contiguously() {
        let mut route = today_route();
        add_point(&mut route, None).unwrap();
        add_point(&mut route, None).unwrap();
        add_point(&mut route, None).unwrap();
        let orders: Vec<u32> = route.points().iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn points_only_while_planned() {
        let mut route = today_route();
        start(&mut route).unwrap();
        assert!(matches!(
            add_point(&mut route, None),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn linked_request_must_be_approved() {
        let mut route = today_route();
        let pending = LinkedRequest {
            request_id: RequestId::new(),
            status: RequestStatus::Pending,
        };
        assert!(matches!(
            add_point(&mut route, Some(pending)),
            Err(DomainError::InvalidTransition(_))
        ));

        let approved = LinkedRequest {
            status: RequestStatus::Approved,
            ..pending
        };
        add_point(&mut route, Some(approved)).unwrap();
        assert_eq!(route.points()[0].request_id, Some(pending.request_id));
    }

    #[test]
    fn visiting_requires_arrival_and_happens_once() {
        let mut route = today_route();
        add_point(&mut route, None).unwrap();

        assert_eq!(visit(&mut route, 1, None), Err(DomainError::MissingArrival(1)));
        assert!(!route.points()[0].completed);

        assert!(matches!(visit(&mut route, 9, Some(t())), Err(DomainError::NotFound(_))));

        let arrival = t();
        visit(&mut route, 1, Some(arrival)).unwrap();
        assert!(route.points()[0].completed);
        assert_eq!(route.points()[0].actual_arrival, Some(arrival));

        assert!(matches!(
            visit(&mut route, 1, Some(t())),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn points_can_be_visited_after_completion() {
        let mut route = today_route();
        add_point(&mut route, None).unwrap();
        start(&mut route).unwrap();
        complete(&mut route).unwrap();
        visit(&mut route, 1, Some(t())).unwrap();
        assert!(route.points()[0].completed);
    }

    #[test]
    fn assign_keeps_unspecified_fields() {
        let mut route = today_route();
        let vehicle = route.vehicle();
        let driver = UserId::new();
        let route_id = *route.id();
        execute(
            &mut route,
            RouteCommand::AssignRoute(AssignRoute {
                route_id,
                driver: Some(driver),
                vehicle: None,
                occurred_at: t(),
            }),
        )
        .unwrap();
        assert_eq!(route.driver(), Some(driver));
        assert_eq!(route.vehicle(), vehicle);
    }

    #[test]
    fn lateness() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let mut route = planned_route(date, Some(nine));
        let route_id = *route.id();
        execute(
            &mut route,
            RouteCommand::AddPoint(AddPoint {
                route_id,
                address: "Depot".into(),
                request: None,
                coordinates: None,
                planned_arrival: Some(NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
                note: String::new(),
                occurred_at: t(),
            }),
        )
        .unwrap();

        let before = date.and_time(nine).and_utc() - Duration::minutes(1);
        let after = date.and_time(nine).and_utc() + Duration::minutes(1);
        assert!(!route.is_late(before));
        assert!(route.is_late(after));
        assert!(route.late_points(after).is_empty());
        assert_eq!(route.late_points(after + Duration::hours(2)).len(), 1);

        start(&mut route).unwrap();
        assert!(!route.is_late(after));
    }

    #[test]
    fn end_before_start_is_invalid() {
        let id = RouteId::new();
        let route = Route::empty(id);
        let err = route
            .handle(&RouteCommand::CreateRoute(CreateRoute {
                route_id: id,
                name: "Evening".into(),
                warehouse_id: WarehouseId::new(),
                date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                driver: None,
                vehicle: None,
                planned_start: NaiveTime::from_hms_opt(18, 0, 0),
                planned_end: NaiveTime::from_hms_opt(17, 0, 0),
                planned_distance_km: None,
                notes: String::new(),
                occurred_at: t(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
