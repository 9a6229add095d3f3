//! Infrastructure layer: event store, command dispatch, read models, GPS and
//! fleet storage, configuration, and the `StockRoute` service facade.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod fleet_registry;
pub mod gps_log;
pub mod projections;
pub mod read_model;
pub mod services;


pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use config::{ConfigError, ServiceConfig};
pub use services::{NewRoute, NewRoutePoint, StockRoute};
