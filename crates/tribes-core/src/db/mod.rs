//! Database layer for Tribes

mod connection;
mod conflict_repository;
mod item_repository;
mod list_repository;
mod migrations;
mod owner_repository;
mod share_repository;
mod tombstone;

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};

pub use connection::{Database, SharedDatabase, DEFAULT_STORAGE_TIMEOUT};
pub use conflict_repository::{ConflictRepository, NewConflict};
pub use item_repository::{ItemRepository, MenuCandidate};
pub use list_repository::ListRepository;
pub use owner_repository::OwnerRepository;
pub use share_repository::ShareRepository;

pub(crate) use item_repository::SyncedItemRow;
pub(crate) use tombstone::{soft_delete, upsert_with_tombstone, OnActive, UpsertOutcome};

use crate::error::Result;

/// Begin an IMMEDIATE transaction; dropping it without commit rolls back
pub(crate) fn write_transaction(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(
        conn,
        TransactionBehavior::Immediate,
    )?)
}

/// `?, ?, ?` for an `IN (...)` clause of `count` values
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Parse a TEXT column into a typed value (ids, enums)
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(error)))
}

/// Parse a nullable TEXT column into a typed value
pub(crate) fn parse_optional_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        value.parse().map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(error))
        })
    })
    .transpose()
}
