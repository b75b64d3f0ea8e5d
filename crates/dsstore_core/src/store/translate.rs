//! Mapping between legacy `data_source` rows and `Datasource` resources.
//!
//! # Responsibility
//! - Turn stored rows into resource objects for reads.
//! - Turn resource objects into legacy create/update commands for writes.
//!
//! # Invariants
//! - `legacy_to_resource` is pure and total; it never fails.
//! - `resource_version` is exactly the decimal rendering of `version`.
//! - `org_id`, `id` and timestamps never reach the resource form.
//! - Access mode and identity are validated here, before the legacy layer.
//! - Settings values pass through unchanged in both directions.

use crate::model::legacy::{
    AddDataSourceCommand, DataSource, DataSourceFields, DsAccess, OrgId,
    UpdateDataSourceCommand,
};
use crate::model::resource::{Datasource, DatasourceSpec};
use crate::store::{StoreError, StoreResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Longest identity the legacy `uid` column accepts.
pub const MAX_UID_LENGTH: usize = 40;

static UID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid uid regex"));

/// Materializes the resource view of a stored row.
pub fn legacy_to_resource(ds: &DataSource) -> Datasource {
    let fields = &ds.fields;
    let mut resource = Datasource::new(
        ds.uid.clone(),
        DatasourceSpec {
            name: fields.name.clone(),
            kind: fields.kind.clone(),
            access: fields.access.to_string(),
            url: fields.url.clone(),
            password: fields.password.clone(),
            database: fields.database.clone(),
            user: fields.user.clone(),
            basic_auth: fields.basic_auth,
            basic_auth_user: fields.basic_auth_user.clone(),
            basic_auth_password: fields.basic_auth_password.clone(),
            with_credentials: fields.with_credentials,
            is_default: fields.is_default,
            json_data: fields.json_data.clone(),
        },
    );
    resource.metadata.resource_version = ds.version.to_string();
    resource
}

/// Builds the legacy column group from a resource spec.
///
/// Fails with [`StoreError::Validation`] on an unknown access mode.
pub fn spec_to_fields(spec: &DatasourceSpec) -> StoreResult<DataSourceFields> {
    let access = spec
        .access
        .parse::<DsAccess>()
        .map_err(|err| StoreError::Validation(err.to_string()))?;

    Ok(DataSourceFields {
        name: spec.name.clone(),
        kind: spec.kind.clone(),
        access,
        url: spec.url.clone(),
        password: spec.password.clone(),
        database: spec.database.clone(),
        user: spec.user.clone(),
        basic_auth: spec.basic_auth,
        basic_auth_user: spec.basic_auth_user.clone(),
        basic_auth_password: spec.basic_auth_password.clone(),
        with_credentials: spec.with_credentials,
        is_default: spec.is_default,
        json_data: spec.json_data.clone(),
    })
}

/// Create command for `ds`; its resource version is ignored.
pub fn add_command(scope: OrgId, ds: &Datasource) -> StoreResult<AddDataSourceCommand> {
    validate_uid(ds.name())?;
    Ok(AddDataSourceCommand {
        org_id: scope,
        uid: ds.name().to_string(),
        fields: spec_to_fields(&ds.spec)?,
    })
}

/// Update command for `ds`, carrying its resource version as the base version.
pub fn update_command(scope: OrgId, ds: &Datasource) -> StoreResult<UpdateDataSourceCommand> {
    let version = parse_resource_version(ds.resource_version())?;
    validate_uid(ds.name())?;
    Ok(UpdateDataSourceCommand {
        org_id: scope,
        uid: ds.name().to_string(),
        version,
        fields: spec_to_fields(&ds.spec)?,
    })
}

/// Parses a resource version back into the legacy version counter.
///
/// Only plain decimal digits are accepted; signs, whitespace and values
/// beyond `i64::MAX` are rejected.
pub fn parse_resource_version(value: &str) -> StoreResult<i64> {
    let invalid = || StoreError::InvalidVersion {
        value: value.to_string(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    value.parse::<i64>().map_err(|_| invalid())
}

fn validate_uid(uid: &str) -> StoreResult<()> {
    if uid.is_empty() {
        return Err(StoreError::Validation(
            "metadata.name cannot be empty".to_string(),
        ));
    }
    if uid.len() > MAX_UID_LENGTH {
        return Err(StoreError::Validation(format!(
            "metadata.name `{uid}` is longer than {MAX_UID_LENGTH} characters"
        )));
    }
    if !UID_RE.is_match(uid) {
        return Err(StoreError::Validation(format!(
            "metadata.name `{uid}` may only contain letters, digits, `-` and `_`"
        )));
    }
    Ok(())
}
