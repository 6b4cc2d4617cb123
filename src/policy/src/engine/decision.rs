//! Authorization request and decision types

use crate::types::{Principal, Role, RoleSet};
use serde::{Deserialize, Serialize};

/// Authorization request: who (roles) wants to do what (action) on which resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Roles held by the principal, as supplied by the authentication layer
    pub roles: RoleSet,

    /// Resource being accessed (e.g., "practice")
    pub resource: String,

    /// Action being performed (e.g., "approve")
    pub action: String,
}

impl AuthorizationRequest {
    pub fn new(roles: RoleSet, resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            roles,
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Request on behalf of a principal
    pub fn for_principal(
        principal: &Principal,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::new(principal.roles.clone(), resource, action)
    }
}

/// The (role, resource) grant that produced an allow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedGrant {
    pub role: Role,
    pub resource: String,
}

/// Reason for authorization decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DecisionReason {
    /// A held role grants the action on the resource
    GrantMatch { wildcard: bool },

    /// No held role grants the action, default deny
    DefaultDeny,
}

/// Authorization decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Grant that allowed the request; `None` on deny
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_grant: Option<MatchedGrant>,

    pub reason: DecisionReason,

    /// Registry snapshot version the decision was taken against
    pub registry_version: u64,
}

impl Decision {
    /// Allow decision
    pub fn allow(matched_grant: MatchedGrant, wildcard: bool, registry_version: u64) -> Self {
        Self {
            allowed: true,
            matched_grant: Some(matched_grant),
            reason: DecisionReason::GrantMatch { wildcard },
            registry_version,
        }
    }

    /// Deny decision
    pub fn deny(registry_version: u64) -> Self {
        Self {
            allowed: false,
            matched_grant: None,
            reason: DecisionReason::DefaultDeny,
            registry_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::role_set;

    #[test]
    fn test_allow_decision() {
        let decision = Decision::allow(
            MatchedGrant {
                role: Role::new("coordinator"),
                resource: "practice".to_string(),
            },
            false,
            3,
        );

        assert!(decision.allowed);
        assert_eq!(decision.matched_grant.as_ref().unwrap().role.as_str(), "coordinator");
        assert_eq!(decision.reason, DecisionReason::GrantMatch { wildcard: false });
    }

    #[test]
    fn test_deny_decision_serialization() {
        let json = serde_json::to_value(Decision::deny(7)).unwrap();

        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"]["type"], "DefaultDeny");
        assert!(json.get("matched_grant").is_none());
    }

    #[test]
    fn test_request_for_principal() {
        let principal = Principal::new("user:ana@ftr.edu").with_role("tutor");
        let request = AuthorizationRequest::for_principal(&principal, "practice", "read");

        assert_eq!(request.roles, role_set(["tutor"]));
        assert_eq!(request.action, "read");
    }
}
