use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use stockroute_core::{DomainError, UserId};

use crate::{Actor, Capability, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing capability '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(cap) => DomainError::Forbidden(cap),
        }
    }
}

/// Authorize an actor for one capability.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(actor: &Actor, required: &Capability) -> Result<(), AuthzError> {
    let granted = actor
        .capabilities
        .iter()
        .any(|c| c.is_wildcard() || c == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Role → capability mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    grants: HashMap<Role, Vec<Capability>>,
}

impl RolePolicy {
    pub fn empty() -> Self {
        Self {
            grants: HashMap::new(),
        }
    }

    pub fn grant(mut self, role: Role, capability: Capability) -> Self {
        let caps = self.grants.entry(role).or_default();
        if !caps.contains(&capability) {
            caps.push(capability);
        }
        self
    }

    pub fn capabilities_of(&self, role: &Role) -> &[Capability] {
        self.grants.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Roles (from `candidates`) that would grant `required`.
    pub fn roles_granting<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a Role>,
        required: &Capability,
    ) -> Vec<Role> {
        candidates
            .into_iter()
            .filter(|role| {
                self.capabilities_of(role)
                    .iter()
                    .any(|c| c.is_wildcard() || c == required)
            })
            .cloned()
            .collect()
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        RolePolicy::empty()
            .grant(Role::ADMIN, Capability::ALL)
            .grant(Role::LOGISTICIAN, Capability::LOGISTICS_APPROVAL)
            .grant(Role::LOGISTICIAN, Capability::ROUTE_OPERATIONS)
            .grant(Role::WAREHOUSE, Capability::WAREHOUSE_OPERATIONS)
            .grant(Role::DRIVER, Capability::ROUTE_OPERATIONS)
            .grant(Role::MANAGER, Capability::REQUEST_SUBMISSION)
    }
}

/// Detailed explanation of an authorization decision, for audit logs.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub user_id: UserId,
    pub required_capability: String,
    pub granted: bool,
    pub reason: String,
    pub effective_capabilities: Vec<String>,
    /// Known roles that would grant the capability (only filled on denial).
    pub granting_roles: Vec<String>,
}

/// Explain why `authorize` would allow or deny `actor`.
pub fn explain_authorization(
    actor: &Actor,
    required: &Capability,
    policy: &RolePolicy,
) -> AuthorizationExplanation {
    let mut effective: Vec<String> = actor
        .capabilities
        .iter()
        .map(|c| c.as_str().to_string())
        .collect();
    effective.sort();

    let has_wildcard = actor.capabilities.iter().any(Capability::is_wildcard);
    let granted = authorize(actor, required).is_ok();

    let reason = if has_wildcard {
        "actor holds the wildcard capability".to_string()
    } else if granted {
        format!("actor holds capability '{required}'")
    } else {
        format!("actor lacks capability '{required}'; holds {effective:?}")
    };

    let known = [
        Role::ADMIN,
        Role::WAREHOUSE,
        Role::LOGISTICIAN,
        Role::MANAGER,
        Role::DRIVER,
    ];
    let granting_roles = if granted {
        Vec::new()
    } else {
        policy
            .roles_granting(known.iter(), required)
            .into_iter()
            .map(|r| r.as_str().to_string())
            .collect()
    };

    AuthorizationExplanation {
        user_id: actor.user_id,
        required_capability: required.as_str().to_string(),
        granted,
        reason,
        effective_capabilities: effective,
        granting_roles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor::with_role(UserId::new(), role)
    }

    #[test]
    fn logistician_can_approve_but_not_fulfil() {
        let a = actor(Role::LOGISTICIAN);
        assert!(authorize(&a, &Capability::LOGISTICS_APPROVAL).is_ok());
        assert_eq!(
            authorize(&a, &Capability::WAREHOUSE_OPERATIONS),
            Err(AuthzError::Forbidden("warehouse-operations".to_string()))
        );
    }

    #[test]
    fn admin_wildcard_grants_everything() {
        let a = actor(Role::ADMIN);
        assert!(authorize(&a, &Capability::LOGISTICS_APPROVAL).is_ok());
        assert!(authorize(&a, &Capability::new("anything-else")).is_ok());
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let a = actor(Role::new("auditor"));
        assert!(a.capabilities.is_empty());
        assert!(authorize(&a, &Capability::ROUTE_OPERATIONS).is_err());
    }

    #[test]
    fn forbidden_maps_to_domain_error() {
        let err: DomainError = AuthzError::Forbidden("route-operations".into()).into();
        assert_eq!(err, DomainError::Forbidden("route-operations".into()));
    }

    #[test]
    fn explanation_lists_granting_roles_on_denial() {
        let a = actor(Role::DRIVER);
        let exp = explain_authorization(&a, &Capability::LOGISTICS_APPROVAL, &RolePolicy::default());
        assert!(!exp.granted);
        assert!(exp.granting_roles.contains(&"logistician".to_string()));
        assert!(exp.granting_roles.contains(&"admin".to_string()));
        assert_eq!(exp.effective_capabilities, vec!["route-operations".to_string()]);
    }
}
