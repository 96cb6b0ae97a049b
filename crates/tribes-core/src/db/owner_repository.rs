//! List ownership repository

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, ToSql};

use super::{
    parse_column, placeholders, upsert_with_tombstone, write_transaction, OnActive, UpsertOutcome,
};
use crate::error::{Error, Result};
use crate::models::{ListId, Owner, OwnerRecord, OwnerRecordId, TribeId, UserId};

const OWNER_COLUMNS: &str = "id, list_id, owner_type, owner_id, granted_by_share, version, \
                             created_at, updated_at, deleted_at";

/// `SQLite` repository for list owners
pub struct OwnerRepository<'a> {
    conn: &'a Connection,
}

impl<'a> OwnerRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_owner(row: &rusqlite::Row<'_>) -> rusqlite::Result<OwnerRecord> {
        let owner_type: String = row.get(2)?;
        let owner_id: String = row.get(3)?;
        let owner = Owner::from_parts(&owner_type, &owner_id).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;

        Ok(OwnerRecord {
            id: parse_column(row, 0)?,
            list_id: parse_column(row, 1)?,
            owner,
            granted_by_share: row.get(4)?,
            version: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            deleted_at: row.get(8)?,
        })
    }

    /// Grant ownership of an active list
    ///
    /// Adding an existing owner is a no-op that returns the current record.
    pub fn add_owner(&self, list_id: &ListId, owner: &Owner, now: i64) -> Result<OwnerRecord> {
        let tx = write_transaction(self.conn)?;
        ensure_list_active(&tx, list_id)?;
        let (record, _) = upsert_owner(&tx, list_id, owner, false, now)?;
        tx.commit()?;
        Ok(record)
    }

    /// Revoke an ownership
    ///
    /// A list always keeps at least one owner that no share granted, so
    /// expiring or withdrawing a share can always revoke what it handed out.
    pub fn remove_owner(&self, list_id: &ListId, owner: &Owner, now: i64) -> Result<()> {
        let tx = write_transaction(self.conn)?;
        let record = find_active(&tx, list_id, owner)?
            .ok_or_else(|| Error::NotFound(format!("owner {owner} of list {list_id}")))?;

        if count_active(&tx, list_id)? <= 1 {
            return Err(Error::InvalidInput(format!(
                "cannot remove {owner}: a list must keep at least one owner"
            )));
        }
        if !record.granted_by_share && count_explicit(&tx, list_id)? <= 1 {
            return Err(Error::InvalidInput(format!(
                "cannot remove {owner}: the remaining owners only hold the list through shares"
            )));
        }

        super::soft_delete(&tx, "list_owners", "owner", &record.id.as_str(), None, now)?;
        tx.commit()?;
        Ok(())
    }

    /// Active owners of a list, oldest grant first
    pub fn get_owners(&self, list_id: &ListId) -> Result<Vec<OwnerRecord>> {
        let mut grouped = self.owners_for_lists(std::slice::from_ref(list_id))?;
        Ok(grouped.remove(list_id).unwrap_or_default())
    }

    /// Active owners of many lists in one query, keyed by list
    pub fn owners_for_lists(
        &self,
        list_ids: &[ListId],
    ) -> Result<HashMap<ListId, Vec<OwnerRecord>>> {
        let mut grouped: HashMap<ListId, Vec<OwnerRecord>> = HashMap::new();
        if list_ids.is_empty() {
            return Ok(grouped);
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OWNER_COLUMNS} FROM list_owners
             WHERE list_id IN ({}) AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC",
            placeholders(list_ids.len())
        ))?;
        let rows = stmt.query_map(
            params_from_iter(list_ids.iter().map(ListId::as_str)),
            Self::parse_owner,
        )?;
        for record in rows {
            let record = record?;
            grouped.entry(record.list_id).or_default().push(record);
        }
        Ok(grouped)
    }

    /// Whether `owner` holds an active ownership of the list
    pub fn is_owner(&self, list_id: &ListId, owner: &Owner) -> Result<bool> {
        Ok(find_active(self.conn, list_id, owner)?.is_some())
    }

    /// Whether the user owns the list directly or through one of their tribes
    pub fn is_owned_by(&self, list_id: &ListId, user: &UserId, tribes: &[TribeId]) -> Result<bool> {
        Ok(self
            .get_owners(list_id)?
            .iter()
            .any(|record| record.owner.covers(user, tribes)))
    }

    /// Active lists owned by the user or any of the given tribes
    pub fn list_ids_for(&self, user: &UserId, tribes: &[TribeId]) -> Result<Vec<ListId>> {
        let user_id = user.as_str();
        let tribe_ids: Vec<String> = tribes.iter().map(TribeId::as_str).collect();

        let tribe_clause = if tribe_ids.is_empty() {
            String::new()
        } else {
            format!(
                " OR (o.owner_type = 'tribe' AND o.owner_id IN ({}))",
                placeholders(tribe_ids.len())
            )
        };
        let mut values: Vec<&dyn ToSql> = Vec::with_capacity(tribe_ids.len() + 1);
        values.push(&user_id);
        values.extend(tribe_ids.iter().map(|id| id as &dyn ToSql));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT o.list_id, l.created_at FROM list_owners o
             JOIN lists l ON l.id = o.list_id
             WHERE o.deleted_at IS NULL AND l.deleted_at IS NULL
               AND ((o.owner_type = 'user' AND o.owner_id = ?){tribe_clause})
             ORDER BY l.created_at ASC, o.list_id ASC"
        ))?;
        let ids = stmt
            .query_map(params_from_iter(values), |row| parse_column(row, 0))?
            .collect::<rusqlite::Result<Vec<ListId>>>()?;
        Ok(ids)
    }
}

/// Insert or revive an owner inside the caller's transaction
///
/// An already active owner is left as is, except that an explicit grant
/// (`granted_by_share = false`) pins a share-granted ownership so that
/// unsharing no longer revokes it.
pub(crate) fn upsert_owner(
    conn: &Connection,
    list_id: &ListId,
    owner: &Owner,
    granted_by_share: bool,
    now: i64,
) -> Result<(OwnerRecord, UpsertOutcome)> {
    let list = list_id.as_str();
    let owner_type = owner.owner_type().as_str();
    let owner_id = owner.id_string();
    let key: [(&'static str, &dyn ToSql); 3] = [
        ("list_id", &list),
        ("owner_type", &owner_type),
        ("owner_id", &owner_id),
    ];
    let fields: [(&'static str, &dyn ToSql); 1] = [("granted_by_share", &granted_by_share)];

    let (id, outcome) = upsert_with_tombstone(
        conn,
        "list_owners",
        &key,
        &fields,
        OnActive::Keep,
        &OwnerRecordId::new().as_str(),
        now,
    )?;

    if outcome == UpsertOutcome::Unchanged && !granted_by_share {
        conn.execute(
            "UPDATE list_owners
             SET granted_by_share = 0, version = version + 1, updated_at = ?
             WHERE id = ? AND granted_by_share = 1",
            params![now, id],
        )?;
    }

    let record = conn.query_row(
        &format!("SELECT {OWNER_COLUMNS} FROM list_owners WHERE id = ?"),
        [&id],
        OwnerRepository::parse_owner,
    )?;
    Ok((record, outcome))
}

pub(crate) fn find_active(
    conn: &Connection,
    list_id: &ListId,
    owner: &Owner,
) -> Result<Option<OwnerRecord>> {
    use rusqlite::OptionalExtension;

    let record = conn
        .query_row(
            &format!(
                "SELECT {OWNER_COLUMNS} FROM list_owners
                 WHERE list_id = ? AND owner_type = ? AND owner_id = ? AND deleted_at IS NULL"
            ),
            params![
                list_id.as_str(),
                owner.owner_type().as_str(),
                owner.id_string()
            ],
            OwnerRepository::parse_owner,
        )
        .optional()?;
    Ok(record)
}

pub(crate) fn count_active(conn: &Connection, list_id: &ListId) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM list_owners WHERE list_id = ? AND deleted_at IS NULL",
        [list_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Active owners granted directly rather than through a share
fn count_explicit(conn: &Connection, list_id: &ListId) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM list_owners
         WHERE list_id = ? AND deleted_at IS NULL AND granted_by_share = 0",
        [list_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Revoke the ownership a share handed to a tribe, if there is one
///
/// Returns `Ok(false)` when there is nothing to revoke. Refuses to strip a
/// list of its last owner.
pub(crate) fn revoke_share_granted(
    conn: &Connection,
    list_id: &ListId,
    tribe_id: &TribeId,
    now: i64,
) -> Result<bool> {
    let owner = Owner::Tribe(*tribe_id);
    let Some(record) = find_active(conn, list_id, &owner)? else {
        return Ok(false);
    };
    if !record.granted_by_share {
        return Ok(false);
    }
    if count_active(conn, list_id)? <= 1 {
        return Err(Error::InvalidInput(format!(
            "cannot revoke {owner}: it is the last owner of list {list_id}"
        )));
    }
    super::soft_delete(conn, "list_owners", "owner", &record.id.as_str(), None, now)
}

pub(crate) fn ensure_list_active(conn: &Connection, list_id: &ListId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM lists WHERE id = ? AND deleted_at IS NULL)",
        [list_id.as_str()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(Error::not_found("list", list_id))
    }
}
