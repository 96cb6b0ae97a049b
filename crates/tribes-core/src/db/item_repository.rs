//! List item repository implementation

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};

use super::{parse_column, placeholders};
use crate::error::{is_unique_violation, Error, Result};
use crate::models::{ItemId, ItemUpdate, ListId, ListItem, NewItem};
use crate::sync::ItemFields;

const ITEM_COLUMNS: &str = "i.id, i.list_id, i.name, i.description, i.weight, i.last_used_at, \
                            i.metadata, i.external_id, i.created_at, i.updated_at, i.deleted_at";

/// An item eligible for a menu, with the weight default of its list
#[derive(Debug, Clone, PartialEq)]
pub struct MenuCandidate {
    pub item: ListItem,
    pub list_default_weight: u32,
}

impl MenuCandidate {
    pub fn weight(&self) -> u32 {
        self.item.effective_weight(self.list_default_weight)
    }
}

/// A mirrored item together with the remote state it was last synced to
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyncedItemRow {
    pub item: ListItem,
    pub base: Option<ItemFields>,
}

/// `SQLite` repository for list items
pub struct ItemRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ItemRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an item from a row selected with `ITEM_COLUMNS`
    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListItem> {
        Ok(ListItem {
            id: parse_column(row, 0)?,
            list_id: parse_column(row, 1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            weight: row.get(4)?,
            last_used_at: row.get(5)?,
            metadata: row.get(6)?,
            external_id: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            deleted_at: row.get(10)?,
        })
    }

    /// Turn a UNIQUE violation on the active-name index into `Duplicate`
    fn translate_unique(&self, error: rusqlite::Error, list_id: &ListId, name: &str) -> Error {
        if !is_unique_violation(&error) {
            return error.into();
        }
        match self.find_active_by_name(list_id, name) {
            Ok(Some(existing)) => Error::Duplicate(Box::new(existing)),
            Ok(None) => error.into(),
            Err(lookup) => lookup,
        }
    }

    fn find_active_by_name(&self, list_id: &ListId, name: &str) -> Result<Option<ListItem>> {
        let item = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM list_items i
                     WHERE i.list_id = ? AND i.name = ? COLLATE NOCASE AND i.deleted_at IS NULL"
                ),
                params![list_id.as_str(), name],
                Self::parse_item,
            )
            .optional()?;
        Ok(item)
    }

    fn ensure_list_active(&self, list_id: &ListId) -> Result<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM lists WHERE id = ? AND deleted_at IS NULL)",
            params![list_id.as_str()],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(Error::not_found("list", list_id))
        }
    }

    /// Add an item to an active list
    pub fn add(&self, list_id: &ListId, item: NewItem, now: i64) -> Result<ListItem> {
        self.ensure_list_active(list_id)?;
        let item = item.normalized()?;
        let id = ItemId::new();

        self.conn
            .execute(
                "INSERT INTO list_items
                 (id, list_id, name, description, weight, metadata, external_id, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id.as_str(),
                    list_id.as_str(),
                    item.name,
                    item.description,
                    item.weight,
                    item.metadata,
                    item.external_id,
                    now,
                    now
                ],
            )
            .map_err(|error| self.translate_unique(error, list_id, &item.name))?;

        self.get(&id)?.ok_or_else(|| Error::not_found("item", id))
    }

    /// Get an active item by ID
    pub fn get(&self, id: &ItemId) -> Result<Option<ListItem>> {
        let item = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM list_items i WHERE i.id = ? AND i.deleted_at IS NULL"
                ),
                params![id.as_str()],
                Self::parse_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Update an active item's fields
    pub fn update(&self, id: &ItemId, update: &ItemUpdate, now: i64) -> Result<ListItem> {
        let current = self.get(id)?.ok_or_else(|| Error::not_found("item", id))?;
        let updated = update.apply_to(&current)?;

        self.conn
            .execute(
                "UPDATE list_items
                 SET name = ?, description = ?, weight = ?, metadata = ?, updated_at = ?
                 WHERE id = ? AND deleted_at IS NULL",
                params![
                    updated.name,
                    updated.description,
                    updated.weight,
                    updated.metadata,
                    now,
                    id.as_str()
                ],
            )
            .map_err(|error| self.translate_unique(error, &current.list_id, &updated.name))?;

        self.get(id)?.ok_or_else(|| Error::not_found("item", id))
    }

    /// Soft delete an item
    pub fn remove(&self, id: &ItemId, now: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE list_items SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::not_found("item", id));
        }
        Ok(())
    }

    /// Active items of a list, oldest first
    pub fn list(&self, list_id: &ListId) -> Result<Vec<ListItem>> {
        self.list_for_lists(std::slice::from_ref(list_id))
    }

    /// Active items of many lists in a single query
    pub fn list_for_lists(&self, list_ids: &[ListId]) -> Result<Vec<ListItem>> {
        if list_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM list_items i
             WHERE i.list_id IN ({}) AND i.deleted_at IS NULL
             ORDER BY i.created_at ASC, i.id ASC",
            placeholders(list_ids.len())
        ))?;

        let items = stmt
            .query_map(
                params_from_iter(list_ids.iter().map(ListId::as_str)),
                Self::parse_item,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Record that an item was actually used at `used_at`
    pub fn mark_used(&self, id: &ItemId, used_at: i64, now: i64) -> Result<ListItem> {
        let rows = self.conn.execute(
            "UPDATE list_items SET last_used_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            params![used_at, now, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::not_found("item", id));
        }
        self.get(id)?.ok_or_else(|| Error::not_found("item", id))
    }

    /// Items of active lists that are past their cooldown at `cutoff`
    ///
    /// One query regardless of how many lists are requested.
    pub fn menu_candidates(&self, list_ids: &[ListId], cutoff: i64) -> Result<Vec<MenuCandidate>> {
        if list_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS}, l.default_weight
             FROM list_items i
             JOIN lists l ON l.id = i.list_id
             WHERE i.list_id IN ({})
               AND i.deleted_at IS NULL
               AND l.deleted_at IS NULL
               AND (i.last_used_at IS NULL OR i.last_used_at < ?)
             ORDER BY i.created_at ASC, i.id ASC",
            placeholders(list_ids.len())
        ))?;

        let ids: Vec<String> = list_ids.iter().map(ListId::as_str).collect();
        let mut values: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
        values.push(&cutoff);

        let candidates = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(MenuCandidate {
                    item: Self::parse_item(row)?,
                    list_default_weight: row.get(11)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    /// Items of a list that mirror a remote record, tombstoned ones included
    pub(crate) fn synced_rows(&self, list_id: &ListId) -> Result<Vec<SyncedItemRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS}, i.sync_base FROM list_items i
             WHERE i.list_id = ? AND i.external_id IS NOT NULL
             ORDER BY i.deleted_at IS NOT NULL, i.updated_at DESC"
        ))?;

        let rows = stmt
            .query_map(params![list_id.as_str()], |row| {
                Ok((Self::parse_item(row)?, row.get::<_, Option<String>>(11)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(item, base)| {
                let base = base.map(|raw| serde_json::from_str(&raw)).transpose()?;
                Ok(SyncedItemRow { item, base })
            })
            .collect()
    }

    /// Any item (tombstoned ones included) by id
    pub(crate) fn get_any(&self, id: &ItemId) -> Result<Option<ListItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM list_items i WHERE i.id = ?"),
                params![id.as_str()],
                Self::parse_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Active local-only item with the given name, if any
    pub(crate) fn find_unlinked_by_name(
        &self,
        list_id: &ListId,
        name: &str,
    ) -> Result<Option<ListItem>> {
        Ok(self
            .find_active_by_name(list_id, name)?
            .filter(|item| item.external_id.is_none()))
    }

    /// Insert an item received from the sync source
    pub(crate) fn insert_synced(
        &self,
        list_id: &ListId,
        external_id: &str,
        fields: &ItemFields,
        now: i64,
    ) -> Result<ListItem> {
        let id = ItemId::new();
        let base = serde_json::to_string(fields)?;
        self.conn
            .execute(
                "INSERT INTO list_items
                 (id, list_id, name, description, weight, metadata, external_id, sync_base, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id.as_str(),
                    list_id.as_str(),
                    fields.name,
                    fields.description,
                    fields.weight,
                    fields.metadata,
                    external_id,
                    base,
                    now,
                    now
                ],
            )
            .map_err(|error| self.translate_unique(error, list_id, &fields.name))?;

        self.get(&id)?.ok_or_else(|| Error::not_found("item", id))
    }

    /// Replace an item's content with remote fields, reviving it if tombstoned
    pub(crate) fn overwrite_synced(
        &self,
        item: &ListItem,
        fields: &ItemFields,
        now: i64,
    ) -> Result<()> {
        let base = serde_json::to_string(fields)?;
        self.conn
            .execute(
                "UPDATE list_items
                 SET name = ?, description = ?, weight = ?, metadata = ?, sync_base = ?,
                     deleted_at = NULL, updated_at = ?
                 WHERE id = ?",
                params![
                    fields.name,
                    fields.description,
                    fields.weight,
                    fields.metadata,
                    base,
                    now,
                    item.id.as_str()
                ],
            )
            .map_err(|error| self.translate_unique(error, &item.list_id, &fields.name))?;
        Ok(())
    }

    /// Link an item to a remote record and record the synced base
    ///
    /// A `None` base links the item without claiming the two sides agree.
    pub(crate) fn set_sync_base(
        &self,
        id: &ItemId,
        external_id: &str,
        base: Option<&ItemFields>,
    ) -> Result<()> {
        let base = base.map(serde_json::to_string).transpose()?;
        self.conn.execute(
            "UPDATE list_items SET external_id = ?, sync_base = ? WHERE id = ?",
            params![external_id, base, id.as_str()],
        )?;
        Ok(())
    }

    /// Turn a mirrored item back into a local-only one
    pub(crate) fn unlink(&self, id: &ItemId, now: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE list_items SET external_id = NULL, sync_base = NULL, updated_at = ? WHERE id = ?",
            params![now, id.as_str()],
        )?;
        Ok(())
    }

    /// Tombstone an item removed at the source; keeps the link for later passes
    pub(crate) fn delete_synced(&self, id: &ItemId, now: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE list_items SET deleted_at = ?1, updated_at = ?1, sync_base = NULL
             WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id.as_str()],
        )?;
        Ok(())
    }
}
