//! `stockroute-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the inventory and
//! logistics modules (no infrastructure concerns).

pub mod aggregate;
pub mod clock;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    BatchId, DepartmentId, DeviceId, LedgerEntryId, LocationId, ProductId, ReadingId, RequestId,
    RouteId, UserId, VehicleId, WarehouseId,
};
