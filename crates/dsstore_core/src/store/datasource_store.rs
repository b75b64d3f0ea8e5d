//! `Datasource` store backed by the legacy datasource repository.
//!
//! # Responsibility
//! - Serve the generic [`Store`] contract for the `Datasource` kind.
//! - Route each operation to one legacy repository call.
//!
//! # Invariants
//! - Wrong-kind or wrong-api-version objects are rejected before any
//!   repository call.
//! - Unparseable resource versions are rejected before any repository call.
//! - Repository failures are surfaced once, classified, never retried.
//! - No state is kept between calls; the repository owns consistency.

use crate::model::legacy::{DataSourceLookup, DeleteDataSourceCommand, OrgId};
use crate::model::resource::{
    Datasource, ObjectMeta, TypeMeta, DATASOURCE_API_VERSION, DATASOURCE_KIND,
};
use crate::repo::data_source_repo::LegacyDataSourceRepository;
use crate::store::translate::{add_command, legacy_to_resource, update_command};
use crate::store::{ensure_type, Resource, Store, StoreError, StoreResult};
use log::{info, warn};

impl Resource for Datasource {
    const KIND: &'static str = DATASOURCE_KIND;
    const API_VERSION: &'static str = DATASOURCE_API_VERSION;

    fn type_meta(&self) -> &TypeMeta {
        &self.type_meta
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

/// Store adapter for `Datasource` resources.
pub struct DatasourceStore<R: LegacyDataSourceRepository> {
    repo: R,
}

impl<R: LegacyDataSourceRepository> DatasourceStore<R> {
    /// Creates a store over the provided legacy repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Borrows the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }
}

impl<R: LegacyDataSourceRepository> Store for DatasourceStore<R> {
    type Object = Datasource;

    fn get(&self, scope: OrgId, name: &str) -> StoreResult<Datasource> {
        let result = self
            .repo
            .get(scope, &DataSourceLookup::Uid(name.to_string()))
            .map(|record| legacy_to_resource(&record))
            .map_err(StoreError::from);
        log_outcome("get", scope, name, &result);
        result
    }

    fn insert(&self, scope: OrgId, object: &Datasource) -> StoreResult<()> {
        let result = ensure_type::<Datasource>(object.type_meta())
            .and_then(|()| add_command(scope, object))
            .and_then(|cmd| self.repo.create(&cmd).map_err(StoreError::from))
            .map(|_| ());
        log_outcome("insert", scope, &object.metadata().name, &result);
        result
    }

    fn update(&self, scope: OrgId, object: &Datasource) -> StoreResult<()> {
        let result = ensure_type::<Datasource>(object.type_meta())
            .and_then(|()| update_command(scope, object))
            .and_then(|cmd| self.repo.update_by_uid(&cmd).map_err(StoreError::from))
            .map(|_| ());
        log_outcome("update", scope, &object.metadata().name, &result);
        result
    }

    fn delete(&self, scope: OrgId, name: &str) -> StoreResult<()> {
        let cmd = DeleteDataSourceCommand {
            org_id: scope,
            lookup: DataSourceLookup::Uid(name.to_string()),
        };
        let result = self.repo.delete(&cmd).map_err(StoreError::from);
        log_outcome("delete", scope, name, &result);
        result
    }
}

fn log_outcome<T>(op: &str, scope: OrgId, name: &str, result: &StoreResult<T>) {
    match result {
        Ok(_) => info!(
            "event=store_{op} module=store status=ok kind={DATASOURCE_KIND} org_id={scope} name={name}"
        ),
        Err(err) => warn!(
            "event=store_{op} module=store status=error kind={DATASOURCE_KIND} org_id={scope} name={name} error_kind={}",
            err.kind().as_str()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::DatasourceStore;
    use crate::model::legacy::{
        AddDataSourceCommand, DataSource, DataSourceLookup, DeleteDataSourceCommand, OrgId,
        UpdateDataSourceCommand,
    };
    use crate::model::resource::{Datasource, DatasourceSpec};
    use crate::repo::data_source_repo::{LegacyDataSourceRepository, RepoError, RepoResult};
    use crate::store::{ErrorKind, Store, UnstructuredStore};
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    /// Records every call and answers NotFound.
    #[derive(Default)]
    struct RecordingRepo {
        calls: RefCell<Vec<String>>,
    }

    impl RecordingRepo {
        fn not_found(org_id: OrgId, uid: &str) -> RepoError {
            RepoError::NotFound {
                org_id,
                lookup: DataSourceLookup::Uid(uid.to_string()),
            }
        }
    }

    impl LegacyDataSourceRepository for RecordingRepo {
        fn get(&self, org_id: OrgId, lookup: &DataSourceLookup) -> RepoResult<DataSource> {
            self.calls.borrow_mut().push(format!("get {org_id} {lookup}"));
            Err(RepoError::NotFound {
                org_id,
                lookup: lookup.clone(),
            })
        }

        fn create(&self, cmd: &AddDataSourceCommand) -> RepoResult<DataSource> {
            self.calls
                .borrow_mut()
                .push(format!("create {} {}", cmd.org_id, cmd.uid));
            Err(Self::not_found(cmd.org_id, &cmd.uid))
        }

        fn update_by_uid(&self, cmd: &UpdateDataSourceCommand) -> RepoResult<DataSource> {
            self.calls
                .borrow_mut()
                .push(format!("update {} {} v{}", cmd.org_id, cmd.uid, cmd.version));
            Err(Self::not_found(cmd.org_id, &cmd.uid))
        }

        fn delete(&self, cmd: &DeleteDataSourceCommand) -> RepoResult<()> {
            self.calls
                .borrow_mut()
                .push(format!("delete {} {}", cmd.org_id, cmd.lookup));
            Err(RepoError::NotFound {
                org_id: cmd.org_id,
                lookup: cmd.lookup.clone(),
            })
        }
    }

    /// Fails every call as if the statement had been interrupted.
    #[derive(Default)]
    struct InterruptedRepo {
        attempts: Cell<usize>,
    }

    impl InterruptedRepo {
        fn interrupted(&self) -> RepoError {
            self.attempts.set(self.attempts.get() + 1);
            RepoError::Interrupted
        }
    }

    impl LegacyDataSourceRepository for InterruptedRepo {
        fn get(&self, _: OrgId, _: &DataSourceLookup) -> RepoResult<DataSource> {
            Err(self.interrupted())
        }

        fn create(&self, _: &AddDataSourceCommand) -> RepoResult<DataSource> {
            Err(self.interrupted())
        }

        fn update_by_uid(&self, _: &UpdateDataSourceCommand) -> RepoResult<DataSource> {
            Err(self.interrupted())
        }

        fn delete(&self, _: &DeleteDataSourceCommand) -> RepoResult<()> {
            Err(self.interrupted())
        }
    }

    fn datasource(name: &str) -> Datasource {
        Datasource::new(
            name,
            DatasourceSpec {
                kind: "prometheus".to_string(),
                access: "proxy".to_string(),
                ..DatasourceSpec::default()
            },
        )
    }

    #[test]
    fn wrong_kind_never_reaches_repository() {
        let repo = RecordingRepo::default();
        let store = DatasourceStore::new(&repo);

        let mut ds = datasource("ds-1");
        ds.type_meta.kind = "Dashboard".to_string();
        ds.metadata.resource_version = "1".to_string();

        assert_eq!(
            store.insert(OrgId(1), &ds).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            store.update(OrgId(1), &ds).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
        assert!(repo.calls.borrow().is_empty());
    }

    #[test]
    fn foreign_api_version_never_reaches_repository() {
        let repo = RecordingRepo::default();
        let store = DatasourceStore::new(&repo);

        let versionless = json!({
            "kind": "Datasource",
            "metadata": { "name": "ds-1", "resourceVersion": "1" },
            "spec": { "type": "prometheus", "access": "proxy" }
        });
        assert_eq!(
            store.insert_unstructured(OrgId(1), &versionless).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );

        let mut ds = datasource("ds-1");
        ds.type_meta.api_version = "datasource.dsstore.io/v0".to_string();
        ds.metadata.resource_version = "1".to_string();
        assert_eq!(
            store.update(OrgId(1), &ds).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
        assert!(repo.calls.borrow().is_empty());
    }

    #[test]
    fn invalid_version_never_reaches_repository() {
        let repo = RecordingRepo::default();
        let store = DatasourceStore::new(&repo);

        for version in ["", "one", "-4", "1e3"] {
            let mut ds = datasource("ds-1");
            ds.metadata.resource_version = version.to_string();
            let err = store.update(OrgId(1), &ds).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidVersion);
        }
        assert!(repo.calls.borrow().is_empty());
    }

    #[test]
    fn invalid_access_never_reaches_repository() {
        let repo = RecordingRepo::default();
        let store = DatasourceStore::new(&repo);

        let mut ds = datasource("ds-1");
        ds.spec.access = "browser".to_string();
        assert_eq!(
            store.insert(OrgId(1), &ds).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert!(repo.calls.borrow().is_empty());
    }

    #[test]
    fn every_call_carries_the_caller_scope() {
        let repo = RecordingRepo::default();
        let store = DatasourceStore::new(&repo);

        let mut ds = datasource("ds-1");
        ds.metadata.resource_version = "5".to_string();

        assert_eq!(
            store.get(OrgId(9), "ds-1").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store.insert(OrgId(9), &ds).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store.update(OrgId(9), &ds).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store.delete(OrgId(9), "ds-1").unwrap_err().kind(),
            ErrorKind::NotFound
        );

        assert_eq!(
            *repo.calls.borrow(),
            vec![
                "get 9 uid=ds-1".to_string(),
                "create 9 ds-1".to_string(),
                "update 9 ds-1 v5".to_string(),
                "delete 9 uid=ds-1".to_string(),
            ]
        );
    }

    #[test]
    fn unstructured_documents_dispatch_on_kind() {
        let repo = RecordingRepo::default();
        let store = DatasourceStore::new(&repo);

        let foreign = json!({
            "apiVersion": "dashboard.dsstore.io/v1",
            "kind": "Dashboard",
            "metadata": { "name": "ds-1" },
            "spec": {}
        });
        assert_eq!(
            store.insert_unstructured(OrgId(1), &foreign).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );

        let kindless = json!({ "metadata": { "name": "ds-1" }, "spec": {} });
        assert_eq!(
            store.insert_unstructured(OrgId(1), &kindless).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );

        let malformed = json!({ "kind": "Datasource", "metadata": "ds-1" });
        assert_eq!(
            store.update_unstructured(OrgId(1), &malformed).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert!(repo.calls.borrow().is_empty());
    }

    #[test]
    fn cancellation_is_surfaced_once_without_retry() {
        let store = DatasourceStore::new(InterruptedRepo::default());

        let mut ds = datasource("ds-1");
        ds.metadata.resource_version = "1".to_string();

        assert_eq!(
            store.get(OrgId(1), "ds-1").unwrap_err().kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            store.insert(OrgId(1), &ds).unwrap_err().kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            store.update(OrgId(1), &ds).unwrap_err().kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            store.delete(OrgId(1), "ds-1").unwrap_err().kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(store.repo().attempts.get(), 4);
    }
}
