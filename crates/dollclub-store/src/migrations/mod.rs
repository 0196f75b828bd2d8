//! Schema migrations, guarded by SQLite's `user_version` pragma so each one
//! runs exactly once, on every open.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Bump together with a new migration module whenever the schema changes.
const CURRENT_VERSION: u32 = 1;

/// Apply every outstanding migration, in order.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        v001_initial::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    Ok(())
}
