//! Policy configuration loading, validation and bootstrap

use crate::changelog::ChangeLog;
use crate::registry::{PolicyRegistry, RegistryConfig, RoleSeed};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const DEFAULT_POLICY: &str = include_str!("../config/default_policy.toml");

/// Complete policy configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub change_log: ChangeLogSection,

    /// Roles and grants applied at bootstrap
    #[serde(default)]
    pub roles: Vec<RoleSeed>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSection {
    /// "memory" or "postgres"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Connection string for the postgres backend
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_url: None,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChangeLogSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ChangeLogSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool { true }
fn default_backend() -> String { "memory".to_string() }

impl PolicyConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .context("Failed to read policy configuration file")?;

        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: PolicyConfig = toml::from_str(contents)
            .context("Failed to parse policy configuration")?;

        Ok(config)
    }

    /// Bundled SION roles and grants
    pub fn sion_defaults() -> Result<Self> {
        Self::from_toml_str(DEFAULT_POLICY).context("Bundled default policy is invalid")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.storage.backend.as_str() {
            "memory" => {}
            "postgres" => {
                if self.storage.database_url.is_none() {
                    anyhow::bail!("storage.database_url is required for the postgres backend");
                }
                if !cfg!(feature = "postgres") {
                    anyhow::bail!("postgres backend requested but the 'postgres' feature is disabled");
                }
            }
            other => anyhow::bail!("Storage backend must be 'memory' or 'postgres', got '{}'", other),
        }

        let mut names = HashSet::new();
        for seed in &self.roles {
            if seed.name.trim().is_empty() {
                anyhow::bail!("Seed role name cannot be empty");
            }
            if !names.insert(seed.name.as_str()) {
                anyhow::bail!("Seed role '{}' declared more than once", seed.name);
            }

            let mut resources = HashSet::new();
            for grant in &seed.grants {
                if grant.resource.trim().is_empty() {
                    anyhow::bail!("Role '{}' has a grant with an empty resource", seed.name);
                }
                if !resources.insert(grant.resource.as_str()) {
                    anyhow::bail!(
                        "Role '{}' grants resource '{}' more than once",
                        seed.name,
                        grant.resource
                    );
                }
                if grant.actions.is_empty() || grant.actions.iter().any(|a| a.trim().is_empty()) {
                    anyhow::bail!(
                        "Role '{}' has an invalid action set on '{}'",
                        seed.name,
                        grant.resource
                    );
                }
            }
        }

        Ok(())
    }
}

/// Build a seeded registry from configuration
pub async fn bootstrap(config: &PolicyConfig) -> Result<Arc<PolicyRegistry>> {
    config.validate()?;

    let registry = match config.storage.backend.as_str() {
        #[cfg(feature = "postgres")]
        "postgres" => {
            use crate::registry::PostgresRegistryStore;

            let url = config
                .storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            let store = PostgresRegistryStore::new(url)
                .await
                .context("Failed to connect registry store")?;
            if config.storage.run_migrations {
                store.run_migrations().await.context("Failed to migrate registry store")?;
            }
            PolicyRegistry::open(config.registry.clone(), Arc::new(store))
                .await
                .context("Failed to load registry")?
        }
        _ => PolicyRegistry::new(config.registry.clone()),
    };

    let registry = if config.change_log.enabled {
        registry.with_change_log(Arc::new(ChangeLog::new()))
    } else {
        registry
    };

    registry
        .seed(&config.roles)
        .await
        .context("Failed to seed registry")?;

    let snapshot = registry.snapshot();
    info!(
        "Policy registry ready: {} role(s), {} grant(s), backend={}",
        snapshot.role_count(),
        snapshot.grant_count(),
        config.storage.backend
    );

    Ok(Arc::new(registry))
}
