//! Policy evaluator
//!
//! Answers "may a principal holding these roles perform this action on this
//! resource?" against one registry snapshot.
//!
//! # Policy
//!
//! ```text
//! roles ─┬─ grants(role₁, resource) ─┐
//!        ├─ grants(role₂, resource) ─┼─ union ─ action ∈ union ? allow : deny
//!        └─ grants(roleₙ, resource) ─┘
//! ```
//!
//! Grants are additive across roles, so there is never a conflict to break.
//! Unknown roles, resources and actions fall through to deny. If explicit
//! deny grants are ever introduced, a deny from any held role must override
//! every allow.

pub mod decision;

pub use decision::{AuthorizationRequest, Decision, DecisionReason, MatchedGrant};

use crate::error::{PolicyError, Result};
use crate::registry::{PolicyRegistry, RegistrySnapshot};
use crate::types::{Principal, RoleSet, WILDCARD_ACTION};

use std::sync::Arc;

/// Evaluate a request against a snapshot
///
/// Pure: the result depends only on the snapshot and the request. When more
/// than one held role allows, the matched grant belongs to the smallest role
/// identifier.
pub fn evaluate(snapshot: &RegistrySnapshot, request: &AuthorizationRequest) -> Result<Decision> {
    if request.roles.is_empty() {
        return Err(PolicyError::NoRoleAssigned);
    }
    if request.resource.trim().is_empty() {
        return Err(PolicyError::InvalidRequest(
            "resource identifier cannot be empty".to_string(),
        ));
    }
    if request.action.trim().is_empty() {
        return Err(PolicyError::InvalidRequest(
            "action identifier cannot be empty".to_string(),
        ));
    }

    for role in &request.roles {
        let Some(permission) = snapshot.permission(role, &request.resource) else {
            continue;
        };

        if permission.permits(&request.action) {
            let wildcard = !permission.actions.contains(&request.action)
                && permission.actions.contains(WILDCARD_ACTION);

            return Ok(Decision::allow(
                MatchedGrant {
                    role: role.clone(),
                    resource: permission.resource.clone(),
                },
                wildcard,
                snapshot.version(),
            ));
        }
    }

    Ok(Decision::deny(snapshot.version()))
}

/// Evaluator bound to a registry
///
/// Every call takes a fresh snapshot, so registry mutations are visible to
/// the next check without notifying the evaluator.
#[derive(Clone)]
pub struct PolicyEvaluator {
    registry: Arc<PolicyRegistry>,
}

impl PolicyEvaluator {
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    /// Decide whether `roles` may perform `action` on `resource`
    ///
    /// # Errors
    ///
    /// * `NoRoleAssigned` - `roles` is empty
    /// * `InvalidRequest` - `resource` or `action` is empty
    pub fn authorize(&self, roles: &RoleSet, resource: &str, action: &str) -> Result<Decision> {
        let request = AuthorizationRequest::new(roles.clone(), resource, action);
        self.check(&request)
    }

    /// Decide on behalf of a principal
    pub fn authorize_principal(
        &self,
        principal: &Principal,
        resource: &str,
        action: &str,
    ) -> Result<Decision> {
        self.authorize(&principal.roles, resource, action)
    }

    /// Decide a prepared request
    pub fn check(&self, request: &AuthorizationRequest) -> Result<Decision> {
        let snapshot = self.registry.snapshot();
        evaluate(&snapshot, request)
    }

    /// Fail-closed boolean check: any error is a deny
    pub fn is_allowed(&self, roles: &RoleSet, resource: &str, action: &str) -> bool {
        self.authorize(roles, resource, action)
            .map(|decision| decision.allowed)
            .unwrap_or(false)
    }
}
