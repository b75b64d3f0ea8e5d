//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `dsstore_core` linkage end to end.
//! - Drive one insert/get/update/delete cycle through the store contract.
//!
//! Environment:
//! - `DSSTORE_DB`: database file; in-memory when unset.
//! - `DSSTORE_LOG_DIR`: absolute log directory; logging stays off when unset.
//! - `DSSTORE_LOG_LEVEL`: defaults to the build-mode level.

use dsstore_core::db::{open_db, open_db_in_memory};
use dsstore_core::{
    core_version, default_log_level, init_logging, Datasource, DatasourceSpec, DatasourceStore,
    OrgId, SqliteDataSourceRepository, Store,
};
use log::info;
use std::error::Error;

const SMOKE_NAME: &str = "dsstore-smoke";

fn main() -> Result<(), Box<dyn Error>> {
    println!("dsstore_core version={}", core_version());

    if let Ok(log_dir) = std::env::var("DSSTORE_LOG_DIR") {
        let level =
            std::env::var("DSSTORE_LOG_LEVEL").unwrap_or_else(|_| default_log_level().to_string());
        init_logging(&level, &log_dir)?;
    }

    let conn = match std::env::var("DSSTORE_DB") {
        Ok(path) => open_db(path)?,
        Err(_) => open_db_in_memory()?,
    };
    let store = DatasourceStore::new(SqliteDataSourceRepository::new(&conn));
    let scope = OrgId::DEFAULT;

    let mut spec = DatasourceSpec {
        name: "Smoke Prometheus".to_string(),
        kind: "prometheus".to_string(),
        access: "proxy".to_string(),
        url: "http://localhost:9090".to_string(),
        ..DatasourceSpec::default()
    };
    spec.json_data
        .insert("timeInterval".to_string(), serde_json::json!("15s"));
    store.insert(scope, &Datasource::new(SMOKE_NAME, spec))?;

    let mut current = store.get(scope, SMOKE_NAME)?;
    println!(
        "inserted name={} resource_version={}",
        current.name(),
        current.resource_version()
    );

    current.spec.url = "http://localhost:9091".to_string();
    store.update(scope, &current)?;
    let updated = store.get(scope, SMOKE_NAME)?;
    println!(
        "updated name={} resource_version={}",
        updated.name(),
        updated.resource_version()
    );

    store.delete(scope, SMOKE_NAME)?;
    let gone = store.get(scope, SMOKE_NAME).map_err(|err| err.kind());
    println!("deleted name={SMOKE_NAME} lookup={:?}", gone.err());

    info!("event=cli_smoke module=cli status=ok");
    Ok(())
}
