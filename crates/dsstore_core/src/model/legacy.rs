//! Legacy datasource record and command shapes.
//!
//! # Responsibility
//! - Mirror the flat, row-shaped `data_source` table.
//! - Define the scoped commands accepted by the legacy repository.
//!
//! # Invariants
//! - Every record and command is scoped by an explicit [`OrgId`].
//! - `version` starts at 1 and is only ever bumped by the repository.
//! - `json_data` is always a JSON object; a NULL column reads as empty.
//! - The internal `id` and the timestamps never leave this layer.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// String-keyed settings document with JSON-compatible values.
pub type SettingsMap = serde_json::Map<String, serde_json::Value>;

/// Organization scope of a legacy record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub i64);

impl OrgId {
    /// Main organization of a fresh installation.
    pub const DEFAULT: OrgId = OrgId(1);
}

impl Display for OrgId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How clients reach the datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsAccess {
    /// Requests go through the server-side proxy.
    Proxy,
    /// Clients talk to the datasource directly.
    Direct,
}

impl DsAccess {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Direct => "direct",
        }
    }
}

impl Display for DsAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected access-mode text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported access mode `{0}`; expected proxy|direct")]
pub struct ParseAccessError(pub String);

impl FromStr for DsAccess {
    type Err = ParseAccessError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "proxy" => Ok(Self::Proxy),
            "direct" => Ok(Self::Direct),
            other => Err(ParseAccessError(other.to_string())),
        }
    }
}

/// Mutable column group shared by stored rows and write commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceFields {
    pub name: String,
    /// Plugin/connector type, stored in the `type` column.
    #[serde(rename = "type")]
    pub kind: String,
    pub access: DsAccess,
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

impl DataSourceFields {
    /// Minimal field group: everything optional left empty/false.
    pub fn new(name: impl Into<String>, kind: impl Into<String>, access: DsAccess) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            access,
            url: String::new(),
            password: String::new(),
            database: String::new(),
            user: String::new(),
            basic_auth: false,
            basic_auth_user: String::new(),
            basic_auth_password: String::new(),
            with_credentials: false,
            is_default: false,
            json_data: SettingsMap::new(),
        }
    }
}

/// One stored `data_source` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Internal primary key.
    pub id: i64,
    pub org_id: OrgId,
    pub uid: String,
    /// Bumped by one on every successful update.
    pub version: i64,
    pub fields: DataSourceFields,
    /// Unix epoch milliseconds.
    pub created: i64,
    /// Unix epoch milliseconds.
    pub updated: i64,
}

/// Addresses one record inside an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceLookup {
    Id(i64),
    Uid(String),
    Name(String),
}

impl Display for DataSourceLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Uid(uid) => write!(f, "uid={uid}"),
            Self::Name(name) => write!(f, "name={name}"),
        }
    }
}

/// Creates a record. An empty `uid` asks the repository to generate one.
#[derive(Debug, Clone, PartialEq)]
pub struct AddDataSourceCommand {
    pub org_id: OrgId,
    pub uid: String,
    pub fields: DataSourceFields,
}

/// Replaces the field group of the record addressed by `uid`.
///
/// `version` is the version the caller last read; the repository refuses the
/// write when the stored version differs.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDataSourceCommand {
    pub org_id: OrgId,
    pub uid: String,
    pub version: i64,
    pub fields: DataSourceFields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteDataSourceCommand {
    pub org_id: OrgId,
    pub lookup: DataSourceLookup,
}
