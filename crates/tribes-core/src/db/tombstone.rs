//! Upsert-with-tombstone primitive for soft-deleted, versioned rows
//!
//! Tables using it carry `id`, `version`, `created_at`, `updated_at` and a
//! nullable `deleted_at`, plus a partial unique index over their natural key
//! restricted to active rows. Rows are revived instead of re-inserted so the
//! table keeps one row per natural key and its audit history.

use rusqlite::{params_from_iter, Connection, OptionalExtension, ToSql};

use crate::error::{Error, Result};

/// What to do when an active row already exists for the key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnActive {
    /// Leave the row untouched (idempotent add)
    Keep,
    /// Overwrite the fields and bump the version
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpsertOutcome {
    Inserted,
    Reactivated,
    Updated,
    Unchanged,
}

/// Look up `key` including tombstoned rows; revive or update the match, else insert
///
/// `table` and column names must be static identifiers. Must run inside the
/// caller's transaction. Returns the row id and the outcome.
pub(crate) fn upsert_with_tombstone(
    conn: &Connection,
    table: &'static str,
    key: &[(&'static str, &dyn ToSql)],
    fields: &[(&'static str, &dyn ToSql)],
    on_active: OnActive,
    new_id: &str,
    now: i64,
) -> Result<(String, UpsertOutcome)> {
    let key_clause = key
        .iter()
        .map(|(column, _)| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ");

    // Prefer the active row, then the most recently touched tombstone
    let existing: Option<(String, Option<i64>)> = conn
        .query_row(
            &format!(
                "SELECT id, deleted_at FROM {table}
                 WHERE {key_clause}
                 ORDER BY deleted_at IS NOT NULL, updated_at DESC
                 LIMIT 1"
            ),
            params_from_iter(key.iter().map(|(_, value)| *value)),
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let set_clause = fields
        .iter()
        .map(|(column, _)| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let set_prefix = if set_clause.is_empty() {
        String::new()
    } else {
        format!("{set_clause}, ")
    };

    match existing {
        Some((id, None)) if on_active == OnActive::Keep => Ok((id, UpsertOutcome::Unchanged)),
        Some((id, deleted_at)) => {
            let outcome = if deleted_at.is_some() {
                UpsertOutcome::Reactivated
            } else {
                UpsertOutcome::Updated
            };
            let mut values: Vec<&dyn ToSql> = fields.iter().map(|(_, value)| *value).collect();
            values.push(&now);
            values.push(&id);
            conn.execute(
                &format!(
                    "UPDATE {table}
                     SET {set_prefix}deleted_at = NULL, version = version + 1, updated_at = ?
                     WHERE id = ?"
                ),
                params_from_iter(values),
            )?;
            Ok((id, outcome))
        }
        None => {
            let columns: Vec<&str> = std::iter::once("id")
                .chain(key.iter().map(|(column, _)| *column))
                .chain(fields.iter().map(|(column, _)| *column))
                .chain(["version", "created_at", "updated_at"])
                .collect();
            let initial_version: i64 = 1;
            let mut values: Vec<&dyn ToSql> = Vec::with_capacity(columns.len());
            values.push(&new_id);
            values.extend(key.iter().map(|(_, value)| *value));
            values.extend(fields.iter().map(|(_, value)| *value));
            values.push(&initial_version);
            values.push(&now);
            values.push(&now);
            conn.execute(
                &format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    columns.join(", "),
                    super::placeholders(columns.len())
                ),
                params_from_iter(values),
            )?;
            Ok((new_id.to_string(), UpsertOutcome::Inserted))
        }
    }
}

/// Tombstone an active row, optionally guarded by an expected version
///
/// Returns `false` when no active row with that id exists.
pub(crate) fn soft_delete(
    conn: &Connection,
    table: &'static str,
    entity: &'static str,
    id: &str,
    expected_version: Option<i64>,
    now: i64,
) -> Result<bool> {
    if let Some(expected) = expected_version {
        let actual: Option<i64> = conn
            .query_row(
                &format!("SELECT version FROM {table} WHERE id = ? AND deleted_at IS NULL"),
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match actual {
            None => return Ok(false),
            Some(actual) if actual != expected => {
                return Err(Error::VersionConflict {
                    entity,
                    id: id.to_string(),
                    expected,
                    actual,
                })
            }
            Some(_) => {}
        }
    }

    let rows = conn.execute(
        &format!(
            "UPDATE {table}
             SET deleted_at = ?1, updated_at = ?1, version = version + 1
             WHERE id = ?2 AND deleted_at IS NULL"
        ),
        rusqlite::params![now, id],
    )?;
    Ok(rows > 0)
}
