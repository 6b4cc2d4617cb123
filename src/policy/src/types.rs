//! Core access policy types

use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Action verb matching every requested action on a resource
pub const WILDCARD_ACTION: &str = "*";

/// Well-known SION role identifiers
///
/// Roles are data: the registry accepts any identifier, these are only the
/// names the platform provisions out of the box.
pub mod roles {
    pub const STUDENT: &str = "student";
    pub const TUTOR: &str = "tutor";
    pub const PRACTICE_TEACHER: &str = "practice_teacher";
    pub const COORDINATOR: &str = "coordinator";
    pub const DEAN: &str = "dean";
    pub const INSTITUTION_CONTACT: &str = "institution_contact";
    pub const TECHNICAL_ADMIN: &str = "technical_admin";
}

/// Role identifier (e.g., "student", "coordinator")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Create a role from an identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Role identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.0.trim().is_empty() {
            return Err(PolicyError::InvalidRequest(
                "role identifier cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Set of roles held by a principal, ordered for deterministic evaluation
pub type RoleSet = BTreeSet<Role>;

/// Build a [`RoleSet`] from role identifiers
pub fn role_set<I, R>(roles: I) -> RoleSet
where
    I: IntoIterator<Item = R>,
    R: Into<Role>,
{
    roles.into_iter().map(Into::into).collect()
}

/// Actions allowed on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Protected entity type or instance class (e.g., "practice", "report")
    pub resource: String,

    /// Allowed verbs; unique and unordered
    pub actions: BTreeSet<String>,
}

impl Permission {
    /// Create a permission, rejecting empty resources, empty action sets and empty verbs
    pub fn new<I, A>(role: &Role, resource: impl Into<String>, actions: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let resource = resource.into();
        if resource.trim().is_empty() {
            return Err(PolicyError::InvalidRequest(
                "resource identifier cannot be empty".to_string(),
            ));
        }

        let actions: BTreeSet<String> = actions.into_iter().map(Into::into).collect();
        if actions.is_empty() || actions.iter().any(|a| a.trim().is_empty()) {
            return Err(PolicyError::InvalidActionSet {
                role: role.to_string(),
                resource,
            });
        }

        Ok(Self { resource, actions })
    }

    /// Whether this permission covers the action (literal match or wildcard)
    pub fn permits(&self, action: &str) -> bool {
        self.actions.contains(action) || self.actions.contains(WILDCARD_ACTION)
    }
}

/// All permissions held by one role, keyed by resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissions {
    pub role: Role,

    #[serde(default)]
    pub permissions: BTreeMap<String, Permission>,
}

impl RolePermissions {
    /// Role with no grants
    pub fn new(role: Role) -> Self {
        Self {
            role,
            permissions: BTreeMap::new(),
        }
    }

    /// Permission for a resource, if granted
    pub fn get(&self, resource: &str) -> Option<&Permission> {
        self.permissions.get(resource)
    }

    /// Iterate permissions in resource order
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Check the record's invariants (used when loading persisted state)
    pub fn validate(&self) -> Result<()> {
        self.role.validate()?;
        for (resource, permission) in &self.permissions {
            if resource != &permission.resource {
                return Err(PolicyError::InvalidRequest(format!(
                    "role '{}' keys resource '{}' under '{}'",
                    self.role, permission.resource, resource
                )));
            }
            Permission::new(&self.role, resource.clone(), permission.actions.iter().cloned())?;
        }
        Ok(())
    }
}

/// Authenticated actor (user, service account) holding one or more roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier (e.g., "user:ana@ftr.edu")
    pub id: String,

    /// Roles assigned at provisioning
    #[serde(default)]
    pub roles: RoleSet,
}

impl Principal {
    /// Create a principal with no roles
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: RoleSet::new(),
        }
    }

    /// Add a role to the principal
    pub fn with_role(mut self, role: impl Into<Role>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Check whether the principal holds a role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == role)
    }
}
