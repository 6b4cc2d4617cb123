//! Registry persistence

use crate::error::Result;
use crate::types::{Role, RolePermissions};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Durable backing for the policy registry
///
/// One record per role holding its full permission set. Implementations
/// report failures as [`PolicyError::StorageUnavailable`](crate::PolicyError).
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Load every persisted role record
    async fn load_all(&self) -> Result<Vec<RolePermissions>>;

    /// Insert or replace a role record
    async fn put_role(&self, record: &RolePermissions) -> Result<()>;

    /// Delete a role record (no-op if absent)
    async fn delete_role(&self, role: &Role) -> Result<()>;
}

/// In-memory registry store
#[derive(Clone, Default)]
pub struct InMemoryRegistryStore {
    records: Arc<RwLock<HashMap<Role, RolePermissions>>>,
}

impl InMemoryRegistryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored role records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Stored record for a role
    pub async fn get(&self, role: &Role) -> Option<RolePermissions> {
        self.records.read().await.get(role).cloned()
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn load_all(&self) -> Result<Vec<RolePermissions>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }

    async fn put_role(&self, record: &RolePermissions) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.role.clone(), record.clone());
        Ok(())
    }

    async fn delete_role(&self, role: &Role) -> Result<()> {
        let mut records = self.records.write().await;
        records.remove(role);
        Ok(())
    }
}
