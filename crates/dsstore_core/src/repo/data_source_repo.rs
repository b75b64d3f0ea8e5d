//! Legacy datasource repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide org-scoped get/create/update/delete over the `data_source` table.
//! - Own uniqueness, version bumping and timestamp maintenance.
//!
//! # Invariants
//! - Every statement filters on `org_id`; rows of other orgs are invisible.
//! - Create starts at version 1; update bumps by exactly one.
//! - Update only applies when the stored version equals the command version.
//! - At most one record per org has `is_default` set.
//! - `secure_json_data` is never written by create/update.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Once cancelled, a repository fails every call with `Interrupted`,
//!   including one still waiting for the write lock.

use crate::db::{DbError, BUSY_TIMEOUT};
use crate::model::legacy::{
    AddDataSourceCommand, DataSource, DataSourceFields, DataSourceLookup,
    DeleteDataSourceCommand, DsAccess, OrgId, SettingsMap, UpdateDataSourceCommand,
};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, Connection, ErrorCode, InterruptHandle, Row, Transaction, TransactionBehavior};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

const DATA_SOURCE_SELECT_SQL: &str = "SELECT
    id,
    org_id,
    version,
    type,
    name,
    access,
    url,
    password,
    user,
    database,
    basic_auth,
    basic_auth_user,
    basic_auth_password,
    with_credentials,
    is_default,
    json_data,
    uid,
    created,
    updated
FROM data_source";

const NOW_MS_SQL: &str = "(strftime('%s', 'now') * 1000)";

/// Slice of SQLite's busy wait between two cancellation checks.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

pub type RepoResult<T> = Result<T, RepoError>;

/// Legacy repository error: semantic outcomes plus transport failures.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("data source not found: org_id={org_id} {lookup}")]
    NotFound {
        org_id: OrgId,
        lookup: DataSourceLookup,
    },
    #[error("data source with uid `{uid}` already exists in org {org_id}")]
    DuplicateUid { org_id: OrgId, uid: String },
    #[error("data source with name `{name}` already exists in org {org_id}")]
    DuplicateName { org_id: OrgId, name: String },
    #[error("data source `{uid}` was modified: expected version {expected}, stored version {actual}")]
    VersionConflict {
        uid: String,
        expected: i64,
        actual: i64,
    },
    #[error("data source statement was interrupted")]
    Interrupted,
    #[error("invalid persisted data source data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if is_interrupt(&value) {
            return Self::Interrupted;
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Scoped persistence primitives for legacy datasource records.
pub trait LegacyDataSourceRepository {
    fn get(&self, org_id: OrgId, lookup: &DataSourceLookup) -> RepoResult<DataSource>;
    fn create(&self, cmd: &AddDataSourceCommand) -> RepoResult<DataSource>;
    /// Conditional update; returns the record with its bumped version.
    fn update_by_uid(&self, cmd: &UpdateDataSourceCommand) -> RepoResult<DataSource>;
    fn delete(&self, cmd: &DeleteDataSourceCommand) -> RepoResult<()>;
}

impl<R: LegacyDataSourceRepository + ?Sized> LegacyDataSourceRepository for &R {
    fn get(&self, org_id: OrgId, lookup: &DataSourceLookup) -> RepoResult<DataSource> {
        (**self).get(org_id, lookup)
    }

    fn create(&self, cmd: &AddDataSourceCommand) -> RepoResult<DataSource> {
        (**self).create(cmd)
    }

    fn update_by_uid(&self, cmd: &UpdateDataSourceCommand) -> RepoResult<DataSource> {
        (**self).update_by_uid(cmd)
    }

    fn delete(&self, cmd: &DeleteDataSourceCommand) -> RepoResult<()> {
        (**self).delete(cmd)
    }
}

/// Cancels the calls of one [`SqliteDataSourceRepository`] from any thread.
///
/// Cancelling aborts the statement in flight, stops a wait on another
/// connection's write lock, and makes every later call on the same
/// repository fail with [`RepoError::Interrupted`].
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    interrupt: Arc<InterruptHandle>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.interrupt.interrupt();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// SQLite-backed legacy datasource repository.
pub struct SqliteDataSourceRepository<'conn> {
    conn: &'conn Connection,
    cancel: CancelHandle,
}

impl<'conn> SqliteDataSourceRepository<'conn> {
    /// Wraps a connection returned by [`crate::db::open_db`] or
    /// [`crate::db::open_db_in_memory`].
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            cancel: CancelHandle {
                cancelled: Arc::new(AtomicBool::new(false)),
                interrupt: Arc::new(conn.get_interrupt_handle()),
            },
        }
    }

    /// Handle another thread can use to cancel this repository's calls.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn ensure_live(&self) -> RepoResult<()> {
        if self.cancel.is_cancelled() {
            return Err(RepoError::Interrupted);
        }
        Ok(())
    }

    /// Opens an IMMEDIATE transaction, waiting up to [`BUSY_TIMEOUT`] for a
    /// competing writer in short slices so cancellation is seen promptly.
    fn begin_write(&self) -> RepoResult<Transaction<'conn>> {
        let deadline = Instant::now() + BUSY_TIMEOUT;
        self.conn.busy_timeout(LOCK_POLL_INTERVAL)?;
        let outcome = loop {
            if let Err(err) = self.ensure_live() {
                break Err(err);
            }
            match Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate) {
                Ok(tx) => break Ok(tx),
                Err(err) if is_busy(&err) && Instant::now() < deadline => continue,
                Err(err) if is_busy(&err) && self.cancel.is_cancelled() => {
                    break Err(RepoError::Interrupted)
                }
                Err(err) => break Err(RepoError::from(err)),
            }
        };
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        outcome
    }
}

impl LegacyDataSourceRepository for SqliteDataSourceRepository<'_> {
    fn get(&self, org_id: OrgId, lookup: &DataSourceLookup) -> RepoResult<DataSource> {
        self.ensure_live()?;
        query_one(self.conn, org_id, lookup)?.ok_or_else(|| RepoError::NotFound {
            org_id,
            lookup: lookup.clone(),
        })
    }

    fn create(&self, cmd: &AddDataSourceCommand) -> RepoResult<DataSource> {
        self.ensure_live()?;
        let uid = if cmd.uid.is_empty() {
            generate_uid()
        } else {
            cmd.uid.clone()
        };
        let json_data = serde_json::to_string(&cmd.fields.json_data)?;

        let tx = self.begin_write()?;
        if query_one(&tx, cmd.org_id, &DataSourceLookup::Uid(uid.clone()))?.is_some() {
            return Err(RepoError::DuplicateUid {
                org_id: cmd.org_id,
                uid,
            });
        }
        ensure_name_free(&tx, cmd.org_id, &cmd.fields.name, None)?;

        let fields = &cmd.fields;
        tx.execute(
            &format!(
                "INSERT INTO data_source (
                    org_id,
                    version,
                    type,
                    name,
                    access,
                    url,
                    password,
                    user,
                    database,
                    basic_auth,
                    basic_auth_user,
                    basic_auth_password,
                    with_credentials,
                    is_default,
                    json_data,
                    uid,
                    created,
                    updated
                ) VALUES (
                    ?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    {NOW_MS_SQL}, {NOW_MS_SQL}
                );"
            ),
            params![
                cmd.org_id.0,
                fields.kind.as_str(),
                fields.name.as_str(),
                fields.access.as_str(),
                fields.url.as_str(),
                fields.password.as_str(),
                fields.user.as_str(),
                fields.database.as_str(),
                fields.basic_auth,
                fields.basic_auth_user.as_str(),
                fields.basic_auth_password.as_str(),
                fields.with_credentials,
                fields.is_default,
                json_data,
                uid.as_str(),
            ],
        )
        .map_err(|err| map_unique_violation(err, cmd.org_id, &uid, &fields.name))?;
        let id = tx.last_insert_rowid();

        if fields.is_default {
            clear_other_defaults(&tx, cmd.org_id, id)?;
        }

        let stored = query_one(&tx, cmd.org_id, &DataSourceLookup::Id(id))?.ok_or_else(|| {
            RepoError::InvalidData(format!("inserted data source id {id} is not readable"))
        })?;
        tx.commit()?;

        debug!(
            "event=legacy_create module=repo status=ok org_id={} uid={} version={}",
            stored.org_id, stored.uid, stored.version
        );
        Ok(stored)
    }

    fn update_by_uid(&self, cmd: &UpdateDataSourceCommand) -> RepoResult<DataSource> {
        self.ensure_live()?;
        let json_data = serde_json::to_string(&cmd.fields.json_data)?;
        let lookup = DataSourceLookup::Uid(cmd.uid.clone());

        let tx = self.begin_write()?;
        let current = query_one(&tx, cmd.org_id, &lookup)?.ok_or_else(|| RepoError::NotFound {
            org_id: cmd.org_id,
            lookup: lookup.clone(),
        })?;
        if current.version != cmd.version {
            return Err(RepoError::VersionConflict {
                uid: cmd.uid.clone(),
                expected: cmd.version,
                actual: current.version,
            });
        }
        ensure_name_free(&tx, cmd.org_id, &cmd.fields.name, Some(current.id))?;

        let fields = &cmd.fields;
        let changed = tx
            .execute(
                &format!(
                    "UPDATE data_source
                     SET
                        type = ?1,
                        name = ?2,
                        access = ?3,
                        url = ?4,
                        password = ?5,
                        user = ?6,
                        database = ?7,
                        basic_auth = ?8,
                        basic_auth_user = ?9,
                        basic_auth_password = ?10,
                        with_credentials = ?11,
                        is_default = ?12,
                        json_data = ?13,
                        version = version + 1,
                        updated = {NOW_MS_SQL}
                     WHERE org_id = ?14
                       AND uid = ?15
                       AND version = ?16;"
                ),
                params![
                    fields.kind.as_str(),
                    fields.name.as_str(),
                    fields.access.as_str(),
                    fields.url.as_str(),
                    fields.password.as_str(),
                    fields.user.as_str(),
                    fields.database.as_str(),
                    fields.basic_auth,
                    fields.basic_auth_user.as_str(),
                    fields.basic_auth_password.as_str(),
                    fields.with_credentials,
                    fields.is_default,
                    json_data,
                    cmd.org_id.0,
                    cmd.uid.as_str(),
                    cmd.version,
                ],
            )
            .map_err(|err| map_unique_violation(err, cmd.org_id, &cmd.uid, &fields.name))?;

        if changed == 0 {
            return Err(RepoError::VersionConflict {
                uid: cmd.uid.clone(),
                expected: cmd.version,
                actual: current.version,
            });
        }

        if fields.is_default {
            clear_other_defaults(&tx, cmd.org_id, current.id)?;
        }

        let stored = query_one(&tx, cmd.org_id, &lookup)?.ok_or_else(|| RepoError::NotFound {
            org_id: cmd.org_id,
            lookup: lookup.clone(),
        })?;
        tx.commit()?;

        debug!(
            "event=legacy_update module=repo status=ok org_id={} uid={} version={}",
            stored.org_id, stored.uid, stored.version
        );
        Ok(stored)
    }

    fn delete(&self, cmd: &DeleteDataSourceCommand) -> RepoResult<()> {
        self.ensure_live()?;
        let (column, value) = lookup_binding(&cmd.lookup);
        let tx = self.begin_write()?;
        let changed = tx.execute(
            &format!("DELETE FROM data_source WHERE org_id = ?1 AND {column} = ?2;"),
            params![cmd.org_id.0, value],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                org_id: cmd.org_id,
                lookup: cmd.lookup.clone(),
            });
        }
        tx.commit()?;

        debug!(
            "event=legacy_delete module=repo status=ok org_id={} {}",
            cmd.org_id, cmd.lookup
        );
        Ok(())
    }
}

fn query_one(
    conn: &Connection,
    org_id: OrgId,
    lookup: &DataSourceLookup,
) -> RepoResult<Option<DataSource>> {
    let (column, value) = lookup_binding(lookup);
    let mut stmt = conn.prepare(&format!(
        "{DATA_SOURCE_SELECT_SQL}
         WHERE org_id = ?1
           AND {column} = ?2;"
    ))?;

    let mut rows = stmt.query(params![org_id.0, value])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_data_source_row(row)?));
    }

    Ok(None)
}

fn lookup_binding(lookup: &DataSourceLookup) -> (&'static str, Value) {
    match lookup {
        DataSourceLookup::Id(id) => ("id", Value::Integer(*id)),
        DataSourceLookup::Uid(uid) => ("uid", Value::Text(uid.clone())),
        DataSourceLookup::Name(name) => ("name", Value::Text(name.clone())),
    }
}

fn ensure_name_free(
    conn: &Connection,
    org_id: OrgId,
    name: &str,
    except_id: Option<i64>,
) -> RepoResult<()> {
    let owner = query_one(conn, org_id, &DataSourceLookup::Name(name.to_string()))?;
    match owner {
        Some(existing) if Some(existing.id) != except_id => Err(RepoError::DuplicateName {
            org_id,
            name: name.to_string(),
        }),
        _ => Ok(()),
    }
}

fn clear_other_defaults(conn: &Connection, org_id: OrgId, keep_id: i64) -> RepoResult<()> {
    let cleared = conn.execute(
        &format!(
            "UPDATE data_source
             SET
                is_default = 0,
                version = version + 1,
                updated = {NOW_MS_SQL}
             WHERE org_id = ?1
               AND id != ?2
               AND is_default = 1;"
        ),
        params![org_id.0, keep_id],
    )?;
    if cleared > 0 {
        debug!(
            "event=legacy_default_cleared module=repo status=ok org_id={} cleared={}",
            org_id, cleared
        );
    }
    Ok(())
}

fn parse_data_source_row(row: &Row<'_>) -> RepoResult<DataSource> {
    let access_text: String = row.get("access")?;
    let access = access_text.parse::<DsAccess>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid access `{access_text}` in data_source.access"
        ))
    })?;

    let json_data = match row.get::<_, Option<String>>("json_data")? {
        Some(text) => parse_json_data(&text)?,
        None => SettingsMap::new(),
    };

    Ok(DataSource {
        id: row.get("id")?,
        org_id: OrgId(row.get("org_id")?),
        uid: row.get("uid")?,
        version: row.get("version")?,
        fields: DataSourceFields {
            name: row.get("name")?,
            kind: row.get("type")?,
            access,
            url: row.get("url")?,
            password: row.get("password")?,
            database: row.get("database")?,
            user: row.get("user")?,
            basic_auth: int_to_bool(row.get("basic_auth")?, "basic_auth")?,
            basic_auth_user: row.get("basic_auth_user")?,
            basic_auth_password: row.get("basic_auth_password")?,
            with_credentials: int_to_bool(row.get("with_credentials")?, "with_credentials")?,
            is_default: int_to_bool(row.get("is_default")?, "is_default")?,
            json_data,
        },
        created: row.get("created")?,
        updated: row.get("updated")?,
    })
}

fn parse_json_data(text: &str) -> RepoResult<SettingsMap> {
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(SettingsMap::new()),
        other => Err(RepoError::InvalidData(format!(
            "data_source.json_data must be an object, found `{other}`"
        ))),
    }
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in data_source.{column}"
        ))),
    }
}

fn map_unique_violation(err: rusqlite::Error, org_id: OrgId, uid: &str, name: &str) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            if message.contains("data_source.uid") {
                return RepoError::DuplicateUid {
                    org_id,
                    uid: uid.to_string(),
                };
            }
            if message.contains("data_source.name") {
                return RepoError::DuplicateName {
                    org_id,
                    name: name.to_string(),
                };
            }
        }
    }
    err.into()
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::OperationInterrupted
    )
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::DatabaseBusy
    )
}

fn generate_uid() -> String {
    Uuid::new_v4().simple().to_string()
}
