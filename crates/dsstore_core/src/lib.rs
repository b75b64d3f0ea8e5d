//! Resource-store adapter for datasources.
//!
//! Exposes a kind-agnostic Get/Insert/Update/Delete contract for the
//! `Datasource` resource over the legacy, org-scoped `data_source` table.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::legacy::{
    AddDataSourceCommand, DataSource, DataSourceFields, DataSourceLookup,
    DeleteDataSourceCommand, DsAccess, OrgId, SettingsMap, UpdateDataSourceCommand,
};
pub use model::resource::{Datasource, DatasourceSpec, ObjectMeta, TypeMeta};
pub use repo::data_source_repo::{
    CancelHandle, LegacyDataSourceRepository, RepoError, RepoResult, SqliteDataSourceRepository,
};
pub use store::datasource_store::DatasourceStore;
pub use store::{ErrorKind, Resource, Store, StoreError, StoreResult, UnstructuredStore};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
