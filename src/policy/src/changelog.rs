//! Append-only log of registry mutations
//!
//! Records who changed which grant, when, and the old/new value, for review
//! by dean- and coordinator-level users. Entries are immutable once appended
//! and never feed back into authorization decisions. Persistence and
//! retention belong to the host application.

use crate::types::{Permission, Role};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actor recorded for mutations made outside an administrative session
pub const SYSTEM_ACTOR: &str = "system";

/// A single registry mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// Role added to the known role set
    RoleDefined { role: Role },

    /// Role removed, with the grants that cascaded along with it
    RoleRemoved {
        role: Role,
        cascaded: Vec<Permission>,
    },

    /// Permission added or replaced for (role, resource)
    GrantSet {
        role: Role,
        resource: String,
        previous: Option<Permission>,
        current: Permission,
    },

    /// Permission removed for (role, resource)
    GrantRevoked {
        role: Role,
        resource: String,
        previous: Permission,
    },
}

impl Change {
    /// Role the change applies to
    pub fn role(&self) -> &Role {
        match self {
            Change::RoleDefined { role }
            | Change::RoleRemoved { role, .. }
            | Change::GrantSet { role, .. }
            | Change::GrantRevoked { role, .. } => role,
        }
    }
}

/// Immutable change log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Unique entry ID
    pub id: Uuid,

    /// Position in the log, starting at 1
    pub sequence: u64,

    /// Who performed the change (e.g., "user:admin@ftr.edu")
    pub actor: String,

    /// When the change was applied
    pub timestamp: DateTime<Utc>,

    /// Registry snapshot version the change produced
    pub registry_version: u64,

    pub change: Change,
}

/// Counts per change kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogSummary {
    pub total: usize,
    pub roles_defined: usize,
    pub roles_removed: usize,
    pub grants_set: usize,
    pub grants_revoked: usize,
}

/// Append-only in-memory change log
///
/// Appends never suspend, so the registry records a change in the same step
/// that publishes it.
#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: RwLock<Vec<ChangeEntry>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change and return the written entry
    pub fn append(
        &self,
        actor: impl Into<String>,
        registry_version: u64,
        change: Change,
    ) -> ChangeEntry {
        let mut entries = self.entries.write();
        let entry = ChangeEntry {
            id: Uuid::new_v4(),
            sequence: entries.len() as u64 + 1,
            actor: actor.into(),
            timestamp: Utc::now(),
            registry_version,
            change,
        };
        entries.push(entry.clone());
        entry
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<ChangeEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entries touching a role, oldest first
    pub fn for_role(&self, role: &Role) -> Vec<ChangeEntry> {
        let entries = self.entries.read();
        entries
            .iter()
            .filter(|e| e.change.role() == role)
            .cloned()
            .collect()
    }

    /// Entries made by an actor, oldest first
    pub fn by_actor(&self, actor: &str) -> Vec<ChangeEntry> {
        let entries = self.entries.read();
        entries
            .iter()
            .filter(|e| e.actor == actor)
            .cloned()
            .collect()
    }

    /// Entries written at or after `since`
    pub fn since(&self, since: DateTime<Utc>) -> Vec<ChangeEntry> {
        let entries = self.entries.read();
        entries
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect()
    }

    /// Most recent entries, newest first
    pub fn latest(&self, limit: usize) -> Vec<ChangeEntry> {
        let entries = self.entries.read();
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn summary(&self) -> ChangeLogSummary {
        let entries = self.entries.read();
        let mut summary = ChangeLogSummary {
            total: entries.len(),
            ..Default::default()
        };

        for entry in entries.iter() {
            match entry.change {
                Change::RoleDefined { .. } => summary.roles_defined += 1,
                Change::RoleRemoved { .. } => summary.roles_removed += 1,
                Change::GrantSet { .. } => summary.grants_set += 1,
                Change::GrantRevoked { .. } => summary.grants_revoked += 1,
            }
        }

        summary
    }
}
