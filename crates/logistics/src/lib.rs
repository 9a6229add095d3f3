//! Delivery side of the system: department requests, delivery routes, the fleet
//! that drives them, and the reduction of GPS readings into route summaries.
//!
//! `Request` and `Route` are event-sourced aggregates: `handle` decides, `apply`
//! evolves. Both are pure; reference checks and authorization happen in the
//! service layer before a command is dispatched.

pub mod fleet;
pub mod gps;
pub mod request;
pub mod route;

pub use fleet::{DeviceStatus, GpsDevice, Vehicle, VehicleKind, VehicleStatus};
pub use gps::{GpsReading, NewGpsReading, Position, RouteSummary, haversine_km, summarize};
pub use request::{
    AddItem, ApproveRequest, CreateRequest, FulfillRequest, ItemAdded, RejectRequest, Request,
    RequestApproved, RequestCommand, RequestCreated, RequestEvent, RequestFulfilled, RequestItem,
    RequestRejected, RequestStatus,
};
pub use route::{
    AddPoint, AssignRoute, CompleteRoute, CreateRoute, LinkedRequest, PointAdded, PointVisited,
    Route, RouteAssigned, RouteCommand, RouteCompleted, RouteCreated, RouteEvent, RoutePoint,
    RouteStarted, RouteStatus, StartRoute, VisitPoint,
};
