//! # SION Prácticas FTR Access Policy
//!
//! Role-based access policy registry and evaluator for the SION practice
//! management platform.
//!
//! ## Features
//!
//! - **Multi-role principals**: a request is allowed when *any* held role grants it
//! - **Fail-closed**: unknown roles, resources and actions deny
//! - **Copy-on-write registry**: lock-free evaluation against immutable snapshots
//! - **Pluggable persistence** via [`RegistryStore`] (PostgreSQL behind the `postgres` feature)
//! - **Change log** of every registry mutation for compliance review
//!
//! ## Example
//!
//! ```rust
//! use sion_policy::{role_set, PolicyEvaluator, PolicyRegistry, RegistryConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = PolicyRegistry::new(RegistryConfig::default());
//!     registry.define_role("coordinator").await?;
//!     registry.define_role("tutor").await?;
//!     registry.grant("coordinator", "practice", ["read", "approve"]).await?;
//!     registry.grant("tutor", "practice", ["read"]).await?;
//!
//!     let evaluator = PolicyEvaluator::new(Arc::new(registry));
//!
//!     let decision = evaluator.authorize(&role_set(["tutor"]), "practice", "approve")?;
//!     assert!(!decision.allowed);
//!
//!     let decision = evaluator.authorize(&role_set(["coordinator", "tutor"]), "practice", "approve")?;
//!     assert!(decision.allowed);
//!
//!     Ok(())
//! }
//! ```

pub mod changelog;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use changelog::{Change, ChangeEntry, ChangeLog, ChangeLogSummary};
pub use config::{bootstrap, PolicyConfig};
pub use engine::{evaluate, AuthorizationRequest, Decision, DecisionReason, MatchedGrant, PolicyEvaluator};
pub use error::{PolicyError, Result};
pub use registry::{
    AdminSession, InMemoryRegistryStore, PolicyRegistry, RegistryConfig, RegistrySnapshot,
    RegistryStore, RoleRemoval,
};
pub use types::{role_set, roles, Permission, Principal, Role, RolePermissions, RoleSet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
