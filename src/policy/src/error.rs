//! Error types for the access policy registry and evaluator

use thiserror::Error;

/// Access policy errors
///
/// Every variant describes a malformed call or an unavailable backend.
/// A deny is a normal [`Decision`](crate::engine::Decision), never an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Role is not defined in the registry
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// Role already defined (strict definition mode only)
    #[error("Role already defined: {0}")]
    DuplicateRole(String),

    /// Grant with an empty action set or an empty action verb
    #[error("Invalid action set for role '{role}' on resource '{resource}'")]
    InvalidActionSet {
        role: String,
        resource: String,
    },

    /// Authorization requested for a principal holding no roles
    #[error("Principal has no role assigned")]
    NoRoleAssigned,

    /// Empty resource, action or role identifier
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Role removal refused while grants still reference the role
    #[error("Role '{role}' still holds {grants} grant(s)")]
    RoleInUse {
        role: String,
        grants: usize,
    },

    /// Backing store failure
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl PolicyError {
    /// Wrap a store failure
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
