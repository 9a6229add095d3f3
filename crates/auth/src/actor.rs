use serde::{Deserialize, Serialize};

use stockroute_core::UserId;

use crate::{Capability, Role, RolePolicy};

/// An authenticated user acting on the core.
///
/// Capabilities are resolved once, when the actor is built, and then carried as
/// plain data into every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub capabilities: Vec<Capability>,
}

impl Actor {
    /// Build an actor whose capabilities are granted by `roles` under `policy`.
    pub fn with_roles(user_id: UserId, roles: Vec<Role>, policy: &RolePolicy) -> Self {
        let mut capabilities: Vec<Capability> = Vec::new();
        for role in &roles {
            for cap in policy.capabilities_of(role) {
                if !capabilities.contains(cap) {
                    capabilities.push(cap.clone());
                }
            }
        }
        Self {
            user_id,
            roles,
            capabilities,
        }
    }

    /// Convenience: a single role under the default policy.
    pub fn with_role(user_id: UserId, role: Role) -> Self {
        Self::with_roles(user_id, vec![role], &RolePolicy::default())
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}
