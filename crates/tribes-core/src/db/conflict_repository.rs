//! Sync conflict repository

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{parse_column, parse_optional_column};
use crate::error::{Error, Result};
use crate::models::{ConflictId, ConflictType, ItemId, ListId, Resolution, SyncConflict, UserId};

const CONFLICT_COLUMNS: &str = "id, list_id, item_id, conflict_type, local_data, remote_data, \
                                created_at, resolved_at, resolution, resolved_by";

/// A conflict detected during a sync pass, before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewConflict {
    pub list_id: ListId,
    pub item_id: Option<ItemId>,
    pub conflict_type: ConflictType,
    pub local_data: Value,
    pub remote_data: Value,
}

/// `SQLite` repository for sync conflicts
pub struct ConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ConflictRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncConflict> {
        Ok(SyncConflict {
            id: parse_column(row, 0)?,
            list_id: parse_column(row, 1)?,
            item_id: parse_optional_column(row, 2)?,
            conflict_type: parse_column(row, 3)?,
            local_data: row.get(4)?,
            remote_data: row.get(5)?,
            created_at: row.get(6)?,
            resolved_at: row.get(7)?,
            resolution: parse_optional_column(row, 8)?,
            resolved_by: parse_optional_column(row, 9)?,
        })
    }

    /// Record a conflict, or refresh the open one for the same target
    ///
    /// Repeated sync passes over the same divergence keep a single open
    /// conflict whose snapshots track the latest state.
    pub fn record(&self, conflict: &NewConflict, now: i64) -> Result<SyncConflict> {
        if let Some(open) = self.open_for(&conflict.list_id, conflict.item_id.as_ref())? {
            self.conn.execute(
                "UPDATE list_conflicts SET conflict_type = ?, local_data = ?, remote_data = ?
                 WHERE id = ?",
                params![
                    conflict.conflict_type.as_str(),
                    conflict.local_data,
                    conflict.remote_data,
                    open.id.as_str()
                ],
            )?;
            return self.require(&open.id);
        }

        let id = ConflictId::new();
        self.conn.execute(
            "INSERT INTO list_conflicts
             (id, list_id, item_id, conflict_type, local_data, remote_data, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id.as_str(),
                conflict.list_id.as_str(),
                conflict.item_id.as_ref().map(ItemId::as_str),
                conflict.conflict_type.as_str(),
                conflict.local_data,
                conflict.remote_data,
                now
            ],
        )?;
        self.require(&id)
    }

    /// The open conflict for an item, or for the list metadata when `item_id` is `None`
    pub fn open_for(
        &self,
        list_id: &ListId,
        item_id: Option<&ItemId>,
    ) -> Result<Option<SyncConflict>> {
        let conflict = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM list_conflicts
                     WHERE list_id = ? AND item_id IS ? AND resolved_at IS NULL
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![list_id.as_str(), item_id.map(ItemId::as_str)],
                Self::parse_conflict,
            )
            .optional()?;
        Ok(conflict)
    }

    pub fn get(&self, id: &ConflictId) -> Result<Option<SyncConflict>> {
        let conflict = self
            .conn
            .query_row(
                &format!("SELECT {CONFLICT_COLUMNS} FROM list_conflicts WHERE id = ?"),
                [id.as_str()],
                Self::parse_conflict,
            )
            .optional()?;
        Ok(conflict)
    }

    fn require(&self, id: &ConflictId) -> Result<SyncConflict> {
        self.get(id)?
            .ok_or_else(|| Error::ConflictNotFound(*id))
    }

    /// Conflicts of a list, oldest first
    pub fn list(&self, list_id: &ListId, include_resolved: bool) -> Result<Vec<SyncConflict>> {
        let filter = if include_resolved {
            ""
        } else {
            " AND resolved_at IS NULL"
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM list_conflicts
             WHERE list_id = ?{filter}
             ORDER BY created_at ASC, id ASC"
        ))?;
        let conflicts = stmt
            .query_map([list_id.as_str()], Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }

    pub fn count_open(&self, list_id: &ListId) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM list_conflicts WHERE list_id = ? AND resolved_at IS NULL",
            [list_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Close an open conflict; returns `false` if it was already resolved
    pub fn mark_resolved(
        &self,
        id: &ConflictId,
        resolution: Resolution,
        resolved_by: &UserId,
        now: i64,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE list_conflicts SET resolved_at = ?, resolution = ?, resolved_by = ?
             WHERE id = ? AND resolved_at IS NULL",
            params![now, resolution.as_str(), resolved_by.as_str(), id.as_str()],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, ItemRepository, ListRepository};
    use crate::models::{NewItem, NewList};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> (Database, ListId, ItemId) {
        let db = Database::open_in_memory().unwrap();
        let (list, _) = ListRepository::new(db.connection())
            .create_with_owner(NewList::new("Synced"), &UserId::new(), 1)
            .unwrap();
        let item = ItemRepository::new(db.connection())
            .add(&list.id, NewItem::new("Cafe"), 1)
            .unwrap();
        (db, list.id, item.id)
    }

    fn modified(list_id: ListId, item_id: Option<ItemId>, remote: &str) -> NewConflict {
        NewConflict {
            list_id,
            item_id,
            conflict_type: ConflictType::Modified,
            local_data: json!({"name": "Cafe"}),
            remote_data: json!({"name": remote}),
        }
    }

    #[test]
    fn test_record_refreshes_open_conflict() {
        let (db, list_id, item_id) = setup();
        let repo = ConflictRepository::new(db.connection());

        let first = repo.record(&modified(list_id, Some(item_id), "Café"), 5).unwrap();
        let second = repo
            .record(&modified(list_id, Some(item_id), "Cafe Nero"), 6)
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.remote_data["name"], "Cafe Nero");
        assert_eq!(second.created_at, 5);
        assert_eq!(repo.count_open(&list_id).unwrap(), 1);
    }

    #[test]
    fn test_list_level_and_item_level_are_separate() {
        let (db, list_id, item_id) = setup();
        let repo = ConflictRepository::new(db.connection());

        repo.record(&modified(list_id, Some(item_id), "X"), 5).unwrap();
        let mut list_level = modified(list_id, None, "Y");
        list_level.conflict_type = ConflictType::ListMetadata;
        let stored = repo.record(&list_level, 6).unwrap();

        assert!(stored.is_list_level());
        assert_eq!(repo.count_open(&list_id).unwrap(), 2);
        assert_eq!(
            repo.open_for(&list_id, None).unwrap().map(|c| c.id),
            Some(stored.id)
        );
    }

    #[test]
    fn test_mark_resolved_once() {
        let (db, list_id, item_id) = setup();
        let repo = ConflictRepository::new(db.connection());
        let conflict = repo.record(&modified(list_id, Some(item_id), "X"), 5).unwrap();
        let user = UserId::new();

        assert!(repo
            .mark_resolved(&conflict.id, Resolution::AcceptRemote, &user, 9)
            .unwrap());
        assert!(!repo
            .mark_resolved(&conflict.id, Resolution::AcceptLocal, &user, 10)
            .unwrap());

        let resolved = repo.get(&conflict.id).unwrap().unwrap();
        assert_eq!(resolved.resolution, Some(Resolution::AcceptRemote));
        assert_eq!(resolved.resolved_by, Some(user));
        assert_eq!(resolved.resolved_at, Some(9));
        assert!(repo.list(&list_id, false).unwrap().is_empty());
        assert_eq!(repo.list(&list_id, true).unwrap().len(), 1);
    }
}
