//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

use super::write_transaction;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration to version 1: lists, items, owners and shares
fn migrate_v1(conn: &Connection) -> Result<()> {
    let tx = write_transaction(conn)?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS lists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            list_type TEXT NOT NULL DEFAULT 'general',
            visibility TEXT NOT NULL DEFAULT 'private',
            default_weight INTEGER NOT NULL DEFAULT 1,
            sync_status TEXT NOT NULL DEFAULT 'none',
            sync_provider TEXT,
            sync_reference TEXT,
            last_synced_at INTEGER,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_lists_deleted ON lists(deleted_at);

        CREATE TABLE IF NOT EXISTS list_items (
            id TEXT PRIMARY KEY,
            list_id TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            weight INTEGER,
            last_used_at INTEGER,
            metadata TEXT NOT NULL DEFAULT '{}',
            external_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_list_items_list ON list_items(list_id, created_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_list_items_active_name
            ON list_items(list_id, name COLLATE NOCASE) WHERE deleted_at IS NULL;

        CREATE TABLE IF NOT EXISTS list_owners (
            id TEXT PRIMARY KEY,
            list_id TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
            owner_type TEXT NOT NULL CHECK (owner_type IN ('user', 'tribe')),
            owner_id TEXT NOT NULL,
            granted_by_share INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_list_owners_active
            ON list_owners(list_id, owner_type, owner_id) WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_list_owners_owner ON list_owners(owner_type, owner_id);

        CREATE TABLE IF NOT EXISTS list_sharing (
            id TEXT PRIMARY KEY,
            list_id TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
            tribe_id TEXT NOT NULL,
            shared_by TEXT NOT NULL,
            expires_at INTEGER,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_list_sharing_active
            ON list_sharing(list_id, tribe_id) WHERE deleted_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_list_sharing_tribe ON list_sharing(tribe_id);
        CREATE INDEX IF NOT EXISTS idx_list_sharing_expiry
            ON list_sharing(expires_at) WHERE deleted_at IS NULL;

        INSERT INTO schema_version (version) VALUES (1);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: external sync support
fn migrate_v2(conn: &Connection) -> Result<()> {
    let tx = write_transaction(conn)?;

    tx.execute_batch(
        "ALTER TABLE lists ADD COLUMN sync_base TEXT;
        ALTER TABLE list_items ADD COLUMN sync_base TEXT;
        CREATE INDEX IF NOT EXISTS idx_list_items_external ON list_items(list_id, external_id);

        CREATE TABLE IF NOT EXISTS list_conflicts (
            id TEXT PRIMARY KEY,
            list_id TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
            item_id TEXT REFERENCES list_items(id) ON DELETE CASCADE,
            conflict_type TEXT NOT NULL,
            local_data TEXT NOT NULL,
            remote_data TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            resolved_at INTEGER,
            resolution TEXT,
            resolved_by TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_list_conflicts_list ON list_conflicts(list_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_list_conflicts_open
            ON list_conflicts(list_id) WHERE resolved_at IS NULL;

        INSERT INTO schema_version (version) VALUES (2);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
