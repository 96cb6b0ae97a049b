//! List repository implementation

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::owner_repository::upsert_owner;
use super::{
    parse_column, placeholders, soft_delete, write_transaction, ItemRepository, OwnerRepository,
    ShareRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    List, ListDetails, ListId, ListUpdate, NewList, Owner, OwnerRecord, SyncSource, SyncStatus,
    UserId,
};
use crate::sync::ListFields;

const LIST_COLUMNS: &str = "id, name, description, list_type, visibility, default_weight, \
                            sync_status, sync_provider, sync_reference, last_synced_at, version, \
                            created_at, updated_at, deleted_at";

/// `SQLite` repository for lists
pub struct ListRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ListRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a list from a database row
    fn parse_list(row: &rusqlite::Row<'_>) -> rusqlite::Result<List> {
        let provider: Option<String> = row.get(7)?;
        let reference: Option<String> = row.get(8)?;
        let sync_source = match (provider, reference) {
            (Some(provider), Some(reference)) => Some(SyncSource {
                provider,
                reference,
            }),
            _ => None,
        };

        Ok(List {
            id: parse_column(row, 0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            list_type: parse_column(row, 3)?,
            visibility: parse_column(row, 4)?,
            default_weight: row.get(5)?,
            sync_status: parse_column(row, 6)?,
            sync_source,
            last_synced_at: row.get(9)?,
            version: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
            deleted_at: row.get(13)?,
        })
    }

    /// Create a list and record its creator as the first owner, atomically
    pub fn create_with_owner(
        &self,
        list: NewList,
        creator: &UserId,
        now: i64,
    ) -> Result<(List, OwnerRecord)> {
        let list = list.normalized()?;
        let id = ListId::new();
        let (provider, reference) = list
            .sync_source
            .as_ref()
            .map(|source| (source.provider.as_str(), source.reference.as_str()))
            .unzip();

        let tx = write_transaction(self.conn)?;
        tx.execute(
            "INSERT INTO lists (id, name, description, list_type, visibility, default_weight,
                                sync_status, sync_provider, sync_reference, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
            params![
                id.as_str(),
                list.name,
                list.description,
                list.list_type.as_str(),
                list.visibility.as_str(),
                list.default_weight,
                SyncStatus::None.as_str(),
                provider,
                reference,
                now,
                now
            ],
        )?;
        let (owner, _) = upsert_owner(&tx, &id, &Owner::User(*creator), false, now)?;
        let created = Self::fetch(&tx, &id, false)?.ok_or_else(|| Error::not_found("list", id))?;
        tx.commit()?;

        tracing::debug!(list_id = %id, "Created list");
        Ok((created, owner))
    }

    fn fetch(conn: &Connection, id: &ListId, include_deleted: bool) -> Result<Option<List>> {
        let filter = if include_deleted {
            ""
        } else {
            " AND deleted_at IS NULL"
        };
        let list = conn
            .query_row(
                &format!("SELECT {LIST_COLUMNS} FROM lists WHERE id = ?{filter}"),
                [id.as_str()],
                Self::parse_list,
            )
            .optional()?;
        Ok(list)
    }

    /// Get an active list by ID
    pub fn get(&self, id: &ListId) -> Result<Option<List>> {
        Self::fetch(self.conn, id, false)
    }

    /// Get an active list, failing with `NotFound`
    pub fn require(&self, id: &ListId) -> Result<List> {
        self.get(id)?.ok_or_else(|| Error::not_found("list", id))
    }

    /// Active lists among `ids`, oldest first
    pub fn get_many(&self, ids: &[ListId]) -> Result<Vec<List>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LIST_COLUMNS} FROM lists
             WHERE id IN ({}) AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC",
            placeholders(ids.len())
        ))?;
        let lists = stmt
            .query_map(
                params_from_iter(ids.iter().map(ListId::as_str)),
                Self::parse_list,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lists)
    }

    fn check_version(&self, id: &ListId, expected: i64) -> Result<()> {
        let current = self.require(id)?;
        if current.version == expected {
            Ok(())
        } else {
            Err(Error::VersionConflict {
                entity: "list",
                id: id.as_str(),
                expected,
                actual: current.version,
            })
        }
    }

    /// Apply a partial update
    ///
    /// With `expected_version` the write only lands if nobody changed the
    /// list in between.
    pub fn update(
        &self,
        id: &ListId,
        expected_version: Option<i64>,
        update: &ListUpdate,
        now: i64,
    ) -> Result<List> {
        let current = self.require(id)?;
        let expected = expected_version.unwrap_or(current.version);
        if current.version != expected {
            return Err(Error::VersionConflict {
                entity: "list",
                id: id.as_str(),
                expected,
                actual: current.version,
            });
        }

        let updated = update.apply_to(&current)?;
        let (provider, reference) = updated
            .sync_source
            .as_ref()
            .map(|source| (source.provider.as_str(), source.reference.as_str()))
            .unzip();

        let rows = self.conn.execute(
            "UPDATE lists
             SET name = ?, description = ?, list_type = ?, visibility = ?, default_weight = ?,
                 sync_status = ?, sync_provider = ?, sync_reference = ?,
                 version = version + 1, updated_at = ?
             WHERE id = ? AND version = ? AND deleted_at IS NULL",
            params![
                updated.name,
                updated.description,
                updated.list_type.as_str(),
                updated.visibility.as_str(),
                updated.default_weight,
                updated.sync_status.as_str(),
                provider,
                reference,
                now,
                id.as_str(),
                expected
            ],
        )?;
        if rows == 0 {
            // Lost a race against another writer
            self.check_version(id, expected)?;
        }

        self.require(id)
    }

    /// Soft delete a list; its items, owners and shares stay for audit
    pub fn soft_delete(&self, id: &ListId, expected_version: Option<i64>, now: i64) -> Result<()> {
        if soft_delete(self.conn, "lists", "list", &id.as_str(), expected_version, now)? {
            Ok(())
        } else {
            Err(Error::not_found("list", id))
        }
    }

    /// Set the sync status, returning the status it replaced
    ///
    /// Status markers leave the version alone; only the committed outcome of
    /// a pass (`mark_synced`) counts as a change to the list.
    pub fn set_sync_status(&self, id: &ListId, status: SyncStatus, now: i64) -> Result<SyncStatus> {
        let previous = self.require(id)?.sync_status;
        self.conn.execute(
            "UPDATE lists SET sync_status = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![status.as_str(), now, id.as_str()],
        )?;
        Ok(previous)
    }

    /// Put a `pending` list back to `status`
    ///
    /// Returns false when the list is no longer pending, i.e. another pass
    /// already recorded its outcome.
    pub fn revert_pending(&self, id: &ListId, status: SyncStatus, now: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE lists SET sync_status = ?, updated_at = ?
             WHERE id = ? AND sync_status = ? AND deleted_at IS NULL",
            params![
                status.as_str(),
                now,
                id.as_str(),
                SyncStatus::Pending.as_str()
            ],
        )?;
        Ok(rows > 0)
    }

    /// Record the outcome of a completed sync pass
    pub fn mark_synced(
        &self,
        id: &ListId,
        status: SyncStatus,
        synced_at: Option<i64>,
        now: i64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE lists
             SET sync_status = ?, last_synced_at = COALESCE(?, last_synced_at),
                 version = version + 1, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![status.as_str(), synced_at, now, id.as_str()],
        )?;
        Ok(())
    }

    /// The list metadata as of the last successful sync
    pub(crate) fn sync_base(&self, id: &ListId) -> Result<Option<ListFields>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT sync_base FROM lists WHERE id = ?",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    pub(crate) fn set_sync_base(&self, id: &ListId, base: &ListFields) -> Result<()> {
        let base = serde_json::to_string(base)?;
        self.conn.execute(
            "UPDATE lists SET sync_base = ? WHERE id = ?",
            params![base, id.as_str()],
        )?;
        Ok(())
    }

    /// Overwrite name and description with the source's values
    ///
    /// Runs inside a sync or resolve transaction that bumps the version once
    /// through `mark_synced`.
    pub(crate) fn apply_remote_metadata(
        &self,
        id: &ListId,
        fields: &ListFields,
        now: i64,
    ) -> Result<()> {
        let base = serde_json::to_string(fields)?;
        self.conn.execute(
            "UPDATE lists
             SET name = ?, description = ?, sync_base = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
            params![fields.name, fields.description, base, now, id.as_str()],
        )?;
        Ok(())
    }

    /// Load lists with their items, owners and live shares
    ///
    /// Issues a fixed number of queries no matter how many lists are asked
    /// for. Missing or deleted lists are skipped.
    pub fn load_details(&self, ids: &[ListId], now: i64) -> Result<Vec<ListDetails>> {
        let lists = self.get_many(ids)?;
        if lists.is_empty() {
            return Ok(Vec::new());
        }
        let found: Vec<ListId> = lists.iter().map(|list| list.id).collect();

        let mut items: HashMap<ListId, Vec<_>> = HashMap::new();
        for item in ItemRepository::new(self.conn).list_for_lists(&found)? {
            items.entry(item.list_id).or_default().push(item);
        }
        let mut owners = OwnerRepository::new(self.conn).owners_for_lists(&found)?;
        let mut shares = ShareRepository::new(self.conn).live_shares_for_lists(&found, now)?;

        Ok(lists
            .into_iter()
            .map(|list| {
                let id = list.id;
                ListDetails {
                    list,
                    items: items.remove(&id).unwrap_or_default(),
                    owners: owners.remove(&id).unwrap_or_default(),
                    shares: shares.remove(&id).unwrap_or_default(),
                }
            })
            .collect())
    }
}
