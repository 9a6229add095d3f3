//! `stockroute-auth`: capability-based authorization boundary.
//!
//! Authentication happens outside the core. What arrives here is an already
//! authenticated [`Actor`] carrying roles; the core only checks whether the
//! actor's capabilities cover the operation being invoked.

pub mod actor;
pub mod authorize;
pub mod capabilities;
pub mod roles;

pub use actor::Actor;
pub use authorize::{AuthorizationExplanation, AuthzError, RolePolicy, authorize, explain_authorization};
pub use capabilities::Capability;
pub use roles::Role;
