//! Policy registry: the authoritative role → grants table
//!
//! State is published as an immutable [`RegistrySnapshot`] behind an `Arc`
//! that mutations replace atomically (copy-on-write). Readers clone the `Arc`
//! and never see a half-applied grant. Mutations are serialized by a single
//! writer lock, persisted to the optional [`RegistryStore`] first, and only
//! then published.
//!
//! # Example
//!
//! ```rust
//! use sion_policy::registry::{PolicyRegistry, RegistryConfig};
//!
//! # async fn example() -> sion_policy::Result<()> {
//! let registry = PolicyRegistry::new(RegistryConfig::default());
//!
//! registry.define_role("coordinator").await?;
//! registry.grant("coordinator", "practice", ["read", "approve"]).await?;
//!
//! let grants = registry.list_grants(&"coordinator".into())?;
//! assert!(grants.get("practice").unwrap().permits("approve"));
//! # Ok(())
//! # }
//! ```

pub mod store;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use store::{InMemoryRegistryStore, RegistryStore};
#[cfg(feature = "postgres")]
pub use postgres::PostgresRegistryStore;

use crate::changelog::{Change, ChangeLog, SYSTEM_ACTOR};
use crate::error::{PolicyError, Result};
use crate::types::{Permission, Role, RolePermissions};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Registry configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Reject re-definition of an existing role with `DuplicateRole`
    #[serde(default)]
    pub strict_role_definition: bool,
}

/// How `remove_role` treats a role that still holds grants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRemoval {
    /// Refuse with `RoleInUse`
    Restrict,
    /// Remove the grants together with the role
    Cascade,
}

/// Role definition with its initial grants, as read from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSeed {
    pub name: String,

    #[serde(default)]
    pub grants: Vec<GrantSeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSeed {
    pub resource: String,
    pub actions: Vec<String>,
}

/// Immutable view of the registry at one version
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    version: u64,
    roles: BTreeMap<Role, Arc<RolePermissions>>,
}

impl RegistrySnapshot {
    /// Monotonic version, bumped by every applied mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains_role(&self, role: &Role) -> bool {
        self.roles.contains_key(role)
    }

    /// Known roles in sorted order
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.keys()
    }

    /// Grants held by a role
    pub fn grants(&self, role: &Role) -> Option<&Arc<RolePermissions>> {
        self.roles.get(role)
    }

    /// Permission for (role, resource)
    pub fn permission(&self, role: &Role, resource: &str) -> Option<&Permission> {
        self.roles.get(role).and_then(|grants| grants.get(resource))
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    /// Total number of (role, resource) grants
    pub fn grant_count(&self) -> usize {
        self.roles.values().map(|g| g.len()).sum()
    }

    fn successor(&self) -> Self {
        Self {
            version: self.version + 1,
            roles: self.roles.clone(),
        }
    }
}

enum StoreWrite {
    Put(Arc<RolePermissions>),
    Delete(Role),
}

/// Role → grants registry
pub struct PolicyRegistry {
    config: RegistryConfig,
    current: RwLock<Arc<RegistrySnapshot>>,
    writer: Mutex<()>,
    store: Option<Arc<dyn RegistryStore>>,
    change_log: Option<Arc<ChangeLog>>,
}

impl PolicyRegistry {
    /// Create an empty, purely in-memory registry
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            writer: Mutex::new(()),
            store: None,
            change_log: None,
        }
    }

    /// Open a registry backed by a store, loading its persisted state
    ///
    /// Records violating the registry invariants are rejected as
    /// `StorageUnavailable` instead of producing a partially valid registry.
    pub async fn open(config: RegistryConfig, store: Arc<dyn RegistryStore>) -> Result<Self> {
        let records = store.load_all().await.map_err(into_storage)?;

        let mut roles = BTreeMap::new();
        for record in records {
            record.validate().map_err(|e| {
                PolicyError::storage(format!(
                    "Invalid persisted record for role '{}': {}",
                    record.role, e
                ))
            })?;

            let role = record.role.clone();
            if roles.insert(role.clone(), Arc::new(record)).is_some() {
                return Err(PolicyError::storage(format!(
                    "Role '{}' persisted more than once",
                    role
                )));
            }
        }

        info!("Policy registry loaded {} role(s) from store", roles.len());

        Ok(Self {
            config,
            current: RwLock::new(Arc::new(RegistrySnapshot { version: 0, roles })),
            writer: Mutex::new(()),
            store: Some(store),
            change_log: None,
        })
    }

    /// Record mutations in a change log
    pub fn with_change_log(mut self, change_log: Arc<ChangeLog>) -> Self {
        self.change_log = Some(change_log);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn change_log(&self) -> Option<&Arc<ChangeLog>> {
        self.change_log.as_ref()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().clone()
    }

    /// Known roles in sorted order
    pub fn roles(&self) -> Vec<Role> {
        self.snapshot().roles().cloned().collect()
    }

    pub fn contains_role(&self, role: &Role) -> bool {
        self.snapshot().contains_role(role)
    }

    /// Current grants of a role
    pub fn list_grants(&self, role: &Role) -> Result<Arc<RolePermissions>> {
        self.snapshot()
            .grants(role)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownRole(role.to_string()))
    }

    /// Administrative session attributing mutations to `actor`
    pub fn admin(&self, actor: impl Into<String>) -> AdminSession<'_> {
        AdminSession {
            registry: self,
            actor: actor.into(),
        }
    }

    /// Define a role (idempotent unless strict definition is configured)
    pub async fn define_role(&self, role: impl Into<Role>) -> Result<()> {
        self.define_role_by(SYSTEM_ACTOR, role.into()).await
    }

    /// Add or replace the permission for (role, resource)
    pub async fn grant<I, A>(
        &self,
        role: impl Into<Role>,
        resource: impl Into<String>,
        actions: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let actions = actions.into_iter().map(Into::into).collect();
        self.grant_by(SYSTEM_ACTOR, role.into(), resource.into(), actions)
            .await
    }

    /// Remove the permission for (role, resource); no-op when absent
    pub async fn revoke(&self, role: impl Into<Role>, resource: &str) -> Result<()> {
        self.revoke_by(SYSTEM_ACTOR, role.into(), resource).await
    }

    /// Remove a role
    pub async fn remove_role(&self, role: impl Into<Role>, mode: RoleRemoval) -> Result<()> {
        self.remove_role_by(SYSTEM_ACTOR, role.into(), mode).await
    }

    /// Define missing roles and apply their grants
    ///
    /// Roles already present (e.g., loaded from the store) are left as they
    /// are, so administrative edits survive a restart.
    pub async fn seed(&self, seeds: &[RoleSeed]) -> Result<usize> {
        let mut seeded = 0;
        for seed in seeds {
            let role = Role::new(seed.name.as_str());
            if self.contains_role(&role) {
                debug!("Role '{}' already present, seed skipped", role);
                continue;
            }

            self.define_role(role.clone()).await?;
            for grant in &seed.grants {
                self.grant(role.clone(), grant.resource.as_str(), grant.actions.iter().cloned())
                    .await?;
            }
            seeded += 1;
        }
        debug!("Seeded {} of {} role(s)", seeded, seeds.len());
        Ok(seeded)
    }

    async fn define_role_by(&self, actor: &str, role: Role) -> Result<()> {
        role.validate()?;

        let _guard = self.writer.lock().await;
        let current = self.snapshot();

        if current.contains_role(&role) {
            if self.config.strict_role_definition {
                return Err(PolicyError::DuplicateRole(role.to_string()));
            }
            debug!("Role '{}' already defined", role);
            return Ok(());
        }

        let record = Arc::new(RolePermissions::new(role.clone()));
        let mut next = current.successor();
        next.roles.insert(role.clone(), record.clone());

        self.commit(actor, next, StoreWrite::Put(record), Change::RoleDefined { role: role.clone() })
            .await?;

        info!("Role '{}' defined by {}", role, actor);
        Ok(())
    }

    async fn grant_by(
        &self,
        actor: &str,
        role: Role,
        resource: String,
        actions: Vec<String>,
    ) -> Result<()> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot();

        let existing = current
            .grants(&role)
            .ok_or_else(|| PolicyError::UnknownRole(role.to_string()))?;

        let permission = Permission::new(&role, resource, actions)?;
        let previous = existing.get(&permission.resource).cloned();

        if previous.as_ref() == Some(&permission) {
            debug!("Grant '{}' on '{}' unchanged", role, permission.resource);
            return Ok(());
        }

        let mut record = RolePermissions::clone(existing);
        record
            .permissions
            .insert(permission.resource.clone(), permission.clone());
        let record = Arc::new(record);

        let mut next = current.successor();
        next.roles.insert(role.clone(), record.clone());

        let resource = permission.resource.clone();
        let change = Change::GrantSet {
            role: role.clone(),
            resource: resource.clone(),
            previous,
            current: permission,
        };
        self.commit(actor, next, StoreWrite::Put(record), change).await?;

        info!("Grant set for role '{}' on '{}' by {}", role, resource, actor);
        Ok(())
    }

    async fn revoke_by(&self, actor: &str, role: Role, resource: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot();

        let existing = current
            .grants(&role)
            .ok_or_else(|| PolicyError::UnknownRole(role.to_string()))?;

        let Some(previous) = existing.get(resource).cloned() else {
            debug!("No grant for role '{}' on '{}' to revoke", role, resource);
            return Ok(());
        };

        let mut record = RolePermissions::clone(existing);
        record.permissions.remove(resource);
        let record = Arc::new(record);

        let mut next = current.successor();
        next.roles.insert(role.clone(), record.clone());

        let change = Change::GrantRevoked {
            role: role.clone(),
            resource: resource.to_string(),
            previous,
        };
        self.commit(actor, next, StoreWrite::Put(record), change).await?;

        info!("Grant revoked for role '{}' on '{}' by {}", role, resource, actor);
        Ok(())
    }

    async fn remove_role_by(&self, actor: &str, role: Role, mode: RoleRemoval) -> Result<()> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot();

        let existing = current
            .grants(&role)
            .ok_or_else(|| PolicyError::UnknownRole(role.to_string()))?;

        if mode == RoleRemoval::Restrict && !existing.is_empty() {
            return Err(PolicyError::RoleInUse {
                role: role.to_string(),
                grants: existing.len(),
            });
        }

        let cascaded: Vec<Permission> = existing.iter().cloned().collect();
        let mut next = current.successor();
        next.roles.remove(&role);

        let change = Change::RoleRemoved {
            role: role.clone(),
            cascaded,
        };
        self.commit(actor, next, StoreWrite::Delete(role.clone()), change)
            .await?;

        info!("Role '{}' removed by {}", role, actor);
        Ok(())
    }

    /// Persist, publish, then log. Caller holds the writer lock.
    async fn commit(
        &self,
        actor: &str,
        next: RegistrySnapshot,
        write: StoreWrite,
        change: Change,
    ) -> Result<()> {
        if let Some(store) = &self.store {
            let persisted = match &write {
                StoreWrite::Put(record) => store.put_role(record).await,
                StoreWrite::Delete(role) => store.delete_role(role).await,
            };
            if let Err(e) = persisted {
                warn!("Registry store write failed, change discarded: {}", e);
                return Err(into_storage(e));
            }
        }

        // No suspension point from here on: a mutation that becomes visible
        // is always logged.
        let version = next.version;
        {
            let mut current = self.current.write();
            *current = Arc::new(next);
            if let Some(change_log) = &self.change_log {
                change_log.append(actor, version, change);
            }
        }

        Ok(())
    }
}

/// Administrative handle recording its actor on every mutation
pub struct AdminSession<'a> {
    registry: &'a PolicyRegistry,
    actor: String,
}

impl AdminSession<'_> {
    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub async fn define_role(&self, role: impl Into<Role>) -> Result<()> {
        self.registry.define_role_by(&self.actor, role.into()).await
    }

    pub async fn grant<I, A>(
        &self,
        role: impl Into<Role>,
        resource: impl Into<String>,
        actions: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let actions = actions.into_iter().map(Into::into).collect();
        self.registry
            .grant_by(&self.actor, role.into(), resource.into(), actions)
            .await
    }

    pub async fn revoke(&self, role: impl Into<Role>, resource: &str) -> Result<()> {
        self.registry
            .revoke_by(&self.actor, role.into(), resource)
            .await
    }

    pub async fn remove_role(&self, role: impl Into<Role>, mode: RoleRemoval) -> Result<()> {
        self.registry
            .remove_role_by(&self.actor, role.into(), mode)
            .await
    }
}

fn into_storage(err: PolicyError) -> PolicyError {
    match err {
        PolicyError::StorageUnavailable(_) => err,
        other => PolicyError::storage(other),
    }
}
