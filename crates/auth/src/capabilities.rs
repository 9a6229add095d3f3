use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Capability identifier (e.g. "logistics-approval").
///
/// The wildcard capability `"*"` grants everything and is held by admins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    pub const ALL: Capability = Capability(Cow::Borrowed("*"));
    /// Approve or reject department requests.
    pub const LOGISTICS_APPROVAL: Capability = Capability(Cow::Borrowed("logistics-approval"));
    /// Move stock and fulfil approved requests.
    pub const WAREHOUSE_OPERATIONS: Capability = Capability(Cow::Borrowed("warehouse-operations"));
    /// Plan and drive delivery routes.
    pub const ROUTE_OPERATIONS: Capability = Capability(Cow::Borrowed("route-operations"));
    /// Submit department requests.
    pub const REQUEST_SUBMISSION: Capability = Capability(Cow::Borrowed("request-submission"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
