//! Resource-shaped `Datasource` object.
//!
//! # Responsibility
//! - Define the caller-facing representation handled by generic stores.
//!
//! # Invariants
//! - `metadata.name` is the identity and never changes after creation.
//! - `metadata.resource_version` is opaque to callers; equal iff same version.
//! - `type_meta.kind` names the resource kind the object claims to be.

use crate::model::legacy::SettingsMap;
use serde::{Deserialize, Serialize};

pub const DATASOURCE_KIND: &str = "Datasource";
pub const DATASOURCE_API_VERSION: &str = "datasource.dsstore.io/v1";

/// Kind header carried by every resource document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
}

/// Identity and version of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    /// Empty on objects that were never read from a store.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
}

/// Datasource connection settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasourceSpec {
    /// Display label.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// One of `proxy` or `direct`; checked when written.
    pub access: String,
    pub url: String,
    pub password: String,
    pub database: String,
    pub user: String,
    pub basic_auth: bool,
    pub basic_auth_user: String,
    pub basic_auth_password: String,
    pub with_credentials: bool,
    pub is_default: bool,
    pub json_data: SettingsMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datasource {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    pub spec: DatasourceSpec,
}

impl Datasource {
    /// Builds an unversioned object ready for insertion.
    pub fn new(name: impl Into<String>, spec: DatasourceSpec) -> Self {
        Self {
            type_meta: TypeMeta {
                api_version: DATASOURCE_API_VERSION.to_string(),
                kind: DATASOURCE_KIND.to_string(),
            },
            metadata: ObjectMeta {
                name: name.into(),
                resource_version: String::new(),
            },
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn resource_version(&self) -> &str {
        &self.metadata.resource_version
    }
}
