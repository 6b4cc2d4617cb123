//! Change log and store integration tests
//!
//! Attribution of administrative mutations, ordering of entries, and
//! fail-closed behaviour when the backing store is unavailable.

use async_trait::async_trait;
use sion_policy::{
    role_set, Change, ChangeLog, InMemoryRegistryStore, PolicyError, PolicyEvaluator,
    PolicyRegistry, RegistryConfig, RegistryStore, Role, RolePermissions, RoleRemoval,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store that fails writes while `offline` is set
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryRegistryStore,
    offline: AtomicBool,
}

#[async_trait]
impl RegistryStore for FlakyStore {
    async fn load_all(&self) -> sion_policy::Result<Vec<RolePermissions>> {
        self.inner.load_all().await
    }

    async fn put_role(&self, record: &RolePermissions) -> sion_policy::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PolicyError::storage("connection refused"));
        }
        self.inner.put_role(record).await
    }

    async fn delete_role(&self, role: &Role) -> sion_policy::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PolicyError::storage("connection refused"));
        }
        self.inner.delete_role(role).await
    }
}

/// Store that suspends a varying number of times before each write
#[derive(Default)]
struct SlowStore {
    inner: InMemoryRegistryStore,
    writes: AtomicUsize,
}

impl SlowStore {
    async fn pause(&self) {
        let yields = self.writes.fetch_add(1, Ordering::SeqCst) % 4;
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl RegistryStore for SlowStore {
    async fn load_all(&self) -> sion_policy::Result<Vec<RolePermissions>> {
        self.inner.load_all().await
    }

    async fn put_role(&self, record: &RolePermissions) -> sion_policy::Result<()> {
        self.pause().await;
        self.inner.put_role(record).await
    }

    async fn delete_role(&self, role: &Role) -> sion_policy::Result<()> {
        self.pause().await;
        self.inner.delete_role(role).await
    }
}

fn logged_registry() -> (PolicyRegistry, Arc<ChangeLog>) {
    let change_log = Arc::new(ChangeLog::new());
    let registry =
        PolicyRegistry::new(RegistryConfig::default()).with_change_log(change_log.clone());
    (registry, change_log)
}

#[tokio::test]
async fn test_admin_mutations_are_attributed() {
    let (registry, change_log) = logged_registry();
    let admin = registry.admin("user:admin@ftr.edu");

    admin.define_role("coordinator").await.unwrap();
    admin
        .grant("coordinator", "practice", ["read", "approve"])
        .await
        .unwrap();
    registry.define_role("tutor").await.unwrap();

    let by_admin = change_log.by_actor("user:admin@ftr.edu");
    assert_eq!(by_admin.len(), 2);
    assert_eq!(change_log.by_actor("system").len(), 1);

    match &by_admin[1].change {
        Change::GrantSet {
            role,
            resource,
            previous,
            current,
        } => {
            assert_eq!(role.as_str(), "coordinator");
            assert_eq!(resource, "practice");
            assert!(previous.is_none());
            assert!(current.permits("approve"));
        }
        other => panic!("unexpected change: {:?}", other),
    }
}

#[tokio::test]
async fn test_change_log_records_old_and_new_values() {
    let (registry, change_log) = logged_registry();
    let admin = registry.admin("user:admin@ftr.edu");

    admin.define_role("tutor").await.unwrap();
    admin.grant("tutor", "practice", ["read"]).await.unwrap();
    admin.grant("tutor", "practice", ["read", "comment"]).await.unwrap();
    admin.revoke("tutor", "practice").await.unwrap();

    let entries = change_log.for_role(&Role::new("tutor"));
    assert_eq!(entries.len(), 4);

    let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    let versions: Vec<u64> = entries.iter().map(|e| e.registry_version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4]);

    match &entries[2].change {
        Change::GrantSet {
            previous: Some(previous),
            current,
            ..
        } => {
            assert!(!previous.permits("comment"));
            assert!(current.permits("comment"));
        }
        other => panic!("unexpected change: {:?}", other),
    }

    match &entries[3].change {
        Change::GrantRevoked { previous, .. } => assert!(previous.permits("comment")),
        other => panic!("unexpected change: {:?}", other),
    }
}

#[tokio::test]
async fn test_noop_mutations_are_not_logged() {
    let (registry, change_log) = logged_registry();

    registry.define_role("student").await.unwrap();
    registry.define_role("student").await.unwrap();
    registry.grant("student", "report", ["write"]).await.unwrap();
    registry.grant("student", "report", ["write"]).await.unwrap();
    registry.revoke("student", "practice").await.unwrap();

    assert_eq!(change_log.len(), 2);
}

#[tokio::test]
async fn test_cascade_removal_logs_grants() {
    let (registry, change_log) = logged_registry();

    registry.define_role("institution_contact").await.unwrap();
    registry
        .grant("institution_contact", "evaluation", ["read", "write"])
        .await
        .unwrap();
    registry
        .remove_role("institution_contact", RoleRemoval::Cascade)
        .await
        .unwrap();

    let latest = change_log.latest(1);
    match &latest[0].change {
        Change::RoleRemoved { role, cascaded } => {
            assert_eq!(role.as_str(), "institution_contact");
            assert_eq!(cascaded.len(), 1);
            assert_eq!(cascaded[0].resource, "evaluation");
        }
        other => panic!("unexpected change: {:?}", other),
    }

    let summary = change_log.summary();
    assert_eq!(summary.roles_defined, 1);
    assert_eq!(summary.grants_set, 1);
    assert_eq!(summary.roles_removed, 1);
}

#[tokio::test]
async fn test_store_failure_leaves_registry_unchanged() {
    let store = Arc::new(FlakyStore::default());
    let change_log = Arc::new(ChangeLog::new());
    let registry = PolicyRegistry::open(RegistryConfig::default(), store.clone())
        .await
        .unwrap()
        .with_change_log(change_log.clone());

    registry.define_role("coordinator").await.unwrap();
    registry.grant("coordinator", "practice", ["read"]).await.unwrap();
    let version = registry.snapshot().version();

    store.offline.store(true, Ordering::SeqCst);

    let err = registry
        .grant("coordinator", "practice", ["read", "approve"])
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::StorageUnavailable(_)));

    let err = registry
        .remove_role("coordinator", RoleRemoval::Cascade)
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::StorageUnavailable(_)));

    assert_eq!(registry.snapshot().version(), version);
    assert_eq!(change_log.len(), 2);

    let evaluator = PolicyEvaluator::new(Arc::new(registry));
    let roles = role_set(["coordinator"]);
    assert!(evaluator.is_allowed(&roles, "practice", "read"));
    assert!(!evaluator.is_allowed(&roles, "practice", "approve"));

    store.offline.store(false, Ordering::SeqCst);
    evaluator
        .registry()
        .grant("coordinator", "practice", ["read", "approve"])
        .await
        .unwrap();
    assert!(evaluator.is_allowed(&roles, "practice", "approve"));
}

#[tokio::test]
async fn test_open_rejects_invalid_persisted_record() {
    let store = Arc::new(InMemoryRegistryStore::new());
    let mut record = RolePermissions::new(Role::new("dean"));
    record.permissions.insert(
        "report".to_string(),
        sion_policy::Permission {
            resource: "report".to_string(),
            actions: Default::default(),
        },
    );
    store.put_role(&record).await.unwrap();

    let result = PolicyRegistry::open(RegistryConfig::default(), store).await;
    assert!(matches!(result, Err(PolicyError::StorageUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_mutations_are_never_published_unlogged() {
    let change_log = Arc::new(ChangeLog::new());
    let registry = Arc::new(
        PolicyRegistry::open(RegistryConfig::default(), Arc::new(SlowStore::default()))
            .await
            .unwrap()
            .with_change_log(change_log.clone()),
    );
    registry.define_role("tutor").await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let change_log = change_log.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let tutor = Role::new("tutor");
            while !done.load(Ordering::SeqCst) {
                let _ = change_log.for_role(&tutor);
                tokio::task::yield_now().await;
            }
        }));
    }

    let mut completed = 0;
    for i in 0..2000 {
        let action = format!("a{}", i);
        let mutation = registry.grant("tutor", "practice", [action]);
        if let Ok(result) = tokio::time::timeout(Duration::ZERO, mutation).await {
            result.unwrap();
            completed += 1;
        }
        if i % 64 == 0 {
            tokio::task::yield_now().await;
        }
    }

    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.await.unwrap();
    }

    // define_role plus every grant that ran to completion
    assert!(completed > 0);
    let version = registry.snapshot().version();
    assert_eq!(version, completed + 1);
    assert_eq!(change_log.len() as u64, version);

    let versions: Vec<u64> = change_log
        .entries()
        .iter()
        .map(|e| e.registry_version)
        .collect();
    assert_eq!(versions, (1..=version).collect::<Vec<_>>());

    let last = change_log.latest(1).pop().unwrap();
    match last.change {
        Change::GrantSet { current, .. } => {
            assert_eq!(
                registry.snapshot().permission(&Role::new("tutor"), "practice"),
                Some(&current)
            );
        }
        other => panic!("unexpected change: {:?}", other),
    }
}
