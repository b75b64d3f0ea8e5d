//! Kind-agnostic resource store contract.
//!
//! # Responsibility
//! - Define the Get/Insert/Update/Delete contract generic callers program to.
//! - Classify every failure so callers can branch without knowing the backend.
//! - Offer a document-level entry point that dispatches on `kind`.
//!
//! # Invariants
//! - Every operation is scoped by an explicit [`OrgId`].
//! - Errors cross this boundary with their classification intact.
//! - Stores hold no mutable state between calls and never retry.

use crate::model::legacy::OrgId;
use crate::model::resource::{ObjectMeta, TypeMeta};
use crate::repo::data_source_repo::RepoError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod datasource_store;
pub mod translate;

pub type StoreResult<T> = Result<T, StoreError>;

/// A resource kind a [`Store`] can serve.
pub trait Resource: Serialize + DeserializeOwned {
    const KIND: &'static str;
    const API_VERSION: &'static str;

    fn type_meta(&self) -> &TypeMeta;
    fn metadata(&self) -> &ObjectMeta;
}

/// Generic CRUD contract for one resource kind.
pub trait Store {
    type Object: Resource;

    fn get(&self, scope: OrgId, name: &str) -> StoreResult<Self::Object>;
    /// Any resource version on `object` is ignored.
    fn insert(&self, scope: OrgId, object: &Self::Object) -> StoreResult<()>;
    /// `object` must carry the resource version it was read at.
    fn update(&self, scope: OrgId, object: &Self::Object) -> StoreResult<()>;
    fn delete(&self, scope: OrgId, name: &str) -> StoreResult<()>;
}

/// Flat classification of [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    InvalidVersion,
    NotFound,
    Duplicate,
    Conflict,
    Validation,
    Cancelled,
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TypeMismatch => "type_mismatch",
            Self::InvalidVersion => "invalid_version",
            Self::NotFound => "not_found",
            Self::Duplicate => "duplicate",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Cancelled => "cancelled",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unexpected object kind `{found}`; expected `{expected}`")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("invalid resource version `{value}`")]
    InvalidVersion { value: String },
    #[error(transparent)]
    NotFound(RepoError),
    #[error(transparent)]
    Duplicate(RepoError),
    #[error(transparent)]
    Conflict(RepoError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("persistence layer unavailable: {0}")]
    Unavailable(#[source] RepoError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::InvalidVersion { .. } => ErrorKind::InvalidVersion,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Duplicate(_) => ErrorKind::Duplicate,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { .. } => Self::NotFound(value),
            RepoError::DuplicateUid { .. } | RepoError::DuplicateName { .. } => {
                Self::Duplicate(value)
            }
            RepoError::VersionConflict { .. } => Self::Conflict(value),
            RepoError::Interrupted => Self::Cancelled,
            other => Self::Unavailable(other),
        }
    }
}

/// Fails with [`StoreError::TypeMismatch`] unless `kind` names `R`.
pub fn ensure_kind<R: Resource>(kind: &str) -> StoreResult<()> {
    if kind == R::KIND {
        return Ok(());
    }
    Err(StoreError::TypeMismatch {
        expected: R::KIND,
        found: kind.to_string(),
    })
}

/// Fails with [`StoreError::TypeMismatch`] unless `type_meta` names `R`
/// with its exact api version.
pub fn ensure_type<R: Resource>(type_meta: &TypeMeta) -> StoreResult<()> {
    ensure_kind::<R>(&type_meta.kind)?;
    if type_meta.api_version == R::API_VERSION {
        return Ok(());
    }
    Err(StoreError::TypeMismatch {
        expected: R::API_VERSION,
        found: type_meta.api_version.clone(),
    })
}

/// Document-level access for callers that only know the resource layout.
///
/// Implemented for every [`Store`]; documents are checked against the
/// store's kind before they are decoded, and against its api version
/// once decoded.
pub trait UnstructuredStore {
    fn get_unstructured(&self, scope: OrgId, name: &str) -> StoreResult<serde_json::Value>;
    fn insert_unstructured(&self, scope: OrgId, document: &serde_json::Value) -> StoreResult<()>;
    fn update_unstructured(&self, scope: OrgId, document: &serde_json::Value) -> StoreResult<()>;
}

impl<S: Store> UnstructuredStore for S {
    fn get_unstructured(&self, scope: OrgId, name: &str) -> StoreResult<serde_json::Value> {
        let object = self.get(scope, name)?;
        serde_json::to_value(&object).map_err(|err| StoreError::Validation(err.to_string()))
    }

    fn insert_unstructured(&self, scope: OrgId, document: &serde_json::Value) -> StoreResult<()> {
        let object = decode_document::<S::Object>(document)?;
        self.insert(scope, &object)
    }

    fn update_unstructured(&self, scope: OrgId, document: &serde_json::Value) -> StoreResult<()> {
        let object = decode_document::<S::Object>(document)?;
        self.update(scope, &object)
    }
}

fn decode_document<R: Resource>(document: &serde_json::Value) -> StoreResult<R> {
    let kind = document
        .get("kind")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    ensure_kind::<R>(kind)?;
    serde_json::from_value(document.clone())
        .map_err(|err| StoreError::Validation(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{ensure_type, ErrorKind, StoreError};
    use crate::model::legacy::{DataSourceLookup, OrgId};
    use crate::model::resource::{Datasource, DatasourceSpec, TypeMeta};
    use crate::repo::data_source_repo::RepoError;

    #[test]
    fn type_meta_must_match_kind_and_api_version() {
        let declared = Datasource::new("ds-1", DatasourceSpec::default()).type_meta;
        assert!(ensure_type::<Datasource>(&declared).is_ok());

        for api_version in ["", "datasource.dsstore.io/v2"] {
            let other = TypeMeta {
                api_version: api_version.to_string(),
                ..declared.clone()
            };
            let err = ensure_type::<Datasource>(&other).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TypeMismatch);
            assert!(err.to_string().contains("datasource.dsstore.io/v1"));
        }

        let foreign = TypeMeta {
            kind: "Dashboard".to_string(),
            ..declared
        };
        assert!(ensure_type::<Datasource>(&foreign)
            .unwrap_err()
            .to_string()
            .contains("Dashboard"));
    }

    #[test]
    fn repo_errors_keep_their_classification() {
        let not_found = StoreError::from(RepoError::NotFound {
            org_id: OrgId(1),
            lookup: DataSourceLookup::Uid("ds-1".to_string()),
        });
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert!(not_found.to_string().contains("ds-1"));

        let conflict = StoreError::from(RepoError::VersionConflict {
            uid: "ds-1".to_string(),
            expected: 1,
            actual: 2,
        });
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let duplicate = StoreError::from(RepoError::DuplicateName {
            org_id: OrgId(1),
            name: "Prometheus".to_string(),
        });
        assert_eq!(duplicate.kind(), ErrorKind::Duplicate);

        assert_eq!(
            StoreError::from(RepoError::Interrupted).kind(),
            ErrorKind::Cancelled
        );
    }

    #[test]
    fn transport_errors_are_never_reclassified() {
        let corrupted = StoreError::from(RepoError::InvalidData("bad row".to_string()));
        assert_eq!(corrupted.kind(), ErrorKind::Unavailable);
        assert_eq!(corrupted.kind().as_str(), "unavailable");
    }
}
