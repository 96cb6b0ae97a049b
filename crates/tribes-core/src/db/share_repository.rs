//! List sharing repository

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use tokio_util::sync::CancellationToken;

use super::owner_repository::{ensure_list_active, revoke_share_granted, upsert_owner};
use super::{
    parse_column, placeholders, soft_delete, upsert_with_tombstone, write_transaction,
    ListRepository, OnActive,
};
use crate::error::{Error, Result};
use crate::models::{ListId, Owner, ShareId, ShareRecord, SharedList, TribeId, UserId};

const SHARE_COLUMNS: &str = "s.id, s.list_id, s.tribe_id, s.shared_by, s.expires_at, s.version, \
                             s.created_at, s.updated_at, s.deleted_at";

/// `SQLite` repository for list shares
pub struct ShareRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ShareRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_share(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShareRecord> {
        Ok(ShareRecord {
            id: parse_column(row, 0)?,
            list_id: parse_column(row, 1)?,
            tribe_id: parse_column(row, 2)?,
            shared_by: parse_column(row, 3)?,
            expires_at: row.get(4)?,
            version: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            deleted_at: row.get(8)?,
        })
    }

    fn get_by_id(conn: &Connection, id: &str) -> Result<ShareRecord> {
        let share = conn.query_row(
            &format!("SELECT {SHARE_COLUMNS} FROM list_sharing s WHERE s.id = ?"),
            [id],
            Self::parse_share,
        )?;
        Ok(share)
    }

    /// Share a list with a tribe, or refresh the expiry of an existing share
    ///
    /// Concurrent calls for the same pair converge on a single active row.
    pub fn share_with_tribe(
        &self,
        list_id: &ListId,
        tribe_id: &TribeId,
        shared_by: &UserId,
        expires_at: Option<i64>,
        now: i64,
    ) -> Result<ShareRecord> {
        let tx = write_transaction(self.conn)?;
        let share = upsert_share(&tx, list_id, tribe_id, shared_by, expires_at, now)?;
        tx.commit()?;
        Ok(share)
    }

    /// Share a list and make the tribe a co-owner for as long as the share lives
    pub fn share_with_tribe_as_owner(
        &self,
        list_id: &ListId,
        tribe_id: &TribeId,
        shared_by: &UserId,
        expires_at: Option<i64>,
        now: i64,
    ) -> Result<ShareRecord> {
        let tx = write_transaction(self.conn)?;
        let share = upsert_share(&tx, list_id, tribe_id, shared_by, expires_at, now)?;
        upsert_owner(&tx, list_id, &Owner::Tribe(*tribe_id), true, now)?;
        tx.commit()?;
        Ok(share)
    }

    /// Change the expiry of the active share for `(list, tribe)`, guarded by its version
    pub fn update_expiry(
        &self,
        list_id: &ListId,
        tribe_id: &TribeId,
        expected_version: i64,
        expires_at: Option<i64>,
        now: i64,
    ) -> Result<ShareRecord> {
        validate_expiry(expires_at, now)?;
        let tx = write_transaction(self.conn)?;
        let share = find_active(&tx, list_id, tribe_id)?.ok_or_else(|| {
            Error::NotFound(format!("share of list {list_id} with tribe {tribe_id}"))
        })?;
        if share.version != expected_version {
            return Err(Error::VersionConflict {
                entity: "share",
                id: share.id.as_str(),
                expected: expected_version,
                actual: share.version,
            });
        }

        let id = share.id.as_str();
        tx.execute(
            "UPDATE list_sharing SET expires_at = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
            params![expires_at, now, id, expected_version],
        )?;
        let share = Self::get_by_id(&tx, &id)?;
        tx.commit()?;
        Ok(share)
    }

    /// Withdraw a share, revoking any ownership it granted
    pub fn unshare_with_tribe(
        &self,
        list_id: &ListId,
        tribe_id: &TribeId,
        by_user: &UserId,
        now: i64,
    ) -> Result<()> {
        let tx = write_transaction(self.conn)?;
        let share = find_active(&tx, list_id, tribe_id)?.ok_or_else(|| {
            Error::NotFound(format!("share of list {list_id} with tribe {tribe_id}"))
        })?;

        soft_delete(&tx, "list_sharing", "share", &share.id.as_str(), None, now)?;
        revoke_share_granted(&tx, list_id, tribe_id, now)?;
        tx.commit()?;

        tracing::info!(
            list_id = %list_id,
            tribe_id = %tribe_id,
            unshared_by = %by_user,
            "List unshared"
        );
        Ok(())
    }

    /// Live shares of a list (active and not yet expired at `now`)
    pub fn get_list_shares(&self, list_id: &ListId, now: i64) -> Result<Vec<ShareRecord>> {
        let mut grouped = self.live_shares_for_lists(std::slice::from_ref(list_id), now)?;
        Ok(grouped.remove(list_id).unwrap_or_default())
    }

    /// Live shares of many lists in one query, keyed by list
    pub fn live_shares_for_lists(
        &self,
        list_ids: &[ListId],
        now: i64,
    ) -> Result<HashMap<ListId, Vec<ShareRecord>>> {
        let mut grouped: HashMap<ListId, Vec<ShareRecord>> = HashMap::new();
        if list_ids.is_empty() {
            return Ok(grouped);
        }

        let ids: Vec<String> = list_ids.iter().map(ListId::as_str).collect();
        let mut values: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
        values.push(&now);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SHARE_COLUMNS} FROM list_sharing s
             WHERE s.list_id IN ({}) AND s.deleted_at IS NULL
               AND (s.expires_at IS NULL OR s.expires_at >= ?)
             ORDER BY s.created_at ASC, s.id ASC",
            placeholders(ids.len())
        ))?;
        let rows = stmt.query_map(params_from_iter(values), Self::parse_share)?;
        for share in rows {
            let share = share?;
            grouped.entry(share.list_id).or_default().push(share);
        }
        Ok(grouped)
    }

    /// Active lists with a live share to any of `tribes`
    pub fn list_ids_shared_with(&self, tribes: &[TribeId], now: i64) -> Result<Vec<ListId>> {
        if tribes.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = tribes.iter().map(TribeId::as_str).collect();
        let mut values: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
        values.push(&now);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT s.list_id, l.created_at FROM list_sharing s
             JOIN lists l ON l.id = s.list_id
             WHERE s.tribe_id IN ({}) AND s.deleted_at IS NULL AND l.deleted_at IS NULL
               AND (s.expires_at IS NULL OR s.expires_at >= ?)
             ORDER BY l.created_at ASC, s.list_id ASC",
            placeholders(ids.len())
        ))?;
        let list_ids = stmt
            .query_map(params_from_iter(values), |row| parse_column(row, 0))?
            .collect::<rusqlite::Result<Vec<ListId>>>()?;
        Ok(list_ids)
    }

    /// Lists currently shared with a tribe
    ///
    /// Expired shares are swept first so callers never observe them.
    pub fn get_shared_lists(&self, tribe_id: &TribeId, now: i64) -> Result<Vec<SharedList>> {
        self.cleanup_expired(now, &CancellationToken::new())?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SHARE_COLUMNS} FROM list_sharing s
             JOIN lists l ON l.id = s.list_id
             WHERE s.tribe_id = ? AND s.deleted_at IS NULL AND l.deleted_at IS NULL
               AND (s.expires_at IS NULL OR s.expires_at >= ?)
             ORDER BY s.created_at ASC, s.id ASC"
        ))?;
        let shares = stmt
            .query_map(params![tribe_id.as_str(), now], Self::parse_share)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let list_ids: Vec<ListId> = shares.iter().map(|share| share.list_id).collect();
        let mut lists: HashMap<ListId, _> = ListRepository::new(self.conn)
            .get_many(&list_ids)?
            .into_iter()
            .map(|list| (list.id, list))
            .collect();

        Ok(shares
            .into_iter()
            .filter_map(|share| {
                lists
                    .remove(&share.list_id)
                    .map(|list| SharedList { list, share })
            })
            .collect())
    }

    /// Tombstone every share whose expiry lies strictly before `now`
    ///
    /// Runs as one transaction; cancellation before commit leaves nothing
    /// applied. Returns the number of shares expired.
    pub fn cleanup_expired(&self, now: i64, cancel: &CancellationToken) -> Result<usize> {
        let tx = write_transaction(self.conn)?;

        let expired: Vec<(ListId, TribeId)> = {
            let mut stmt = tx.prepare(
                "SELECT list_id, tribe_id FROM list_sharing
                 WHERE deleted_at IS NULL AND expires_at IS NOT NULL AND expires_at < ?",
            )?;
            let rows = stmt
                .query_map([now], |row| Ok((parse_column(row, 0)?, parse_column(row, 1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        if expired.is_empty() {
            return Ok(0);
        }

        let count = tx.execute(
            "UPDATE list_sharing SET deleted_at = ?1, updated_at = ?1, version = version + 1
             WHERE deleted_at IS NULL AND expires_at IS NOT NULL AND expires_at < ?1",
            [now],
        )?;

        for (list_id, tribe_id) in &expired {
            if revoke_share_granted(&tx, list_id, tribe_id, now)? {
                tracing::debug!(list_id = %list_id, tribe_id = %tribe_id, "Revoked ownership of expired share");
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tx.commit()?;
        Ok(count)
    }
}

fn validate_expiry(expires_at: Option<i64>, now: i64) -> Result<()> {
    match expires_at {
        Some(at) if at < now => Err(Error::InvalidInput(format!(
            "share expiry {at} is already in the past"
        ))),
        _ => Ok(()),
    }
}

fn find_active(
    conn: &Connection,
    list_id: &ListId,
    tribe_id: &TribeId,
) -> Result<Option<ShareRecord>> {
    let share = conn
        .query_row(
            &format!(
                "SELECT {SHARE_COLUMNS} FROM list_sharing s
                 WHERE s.list_id = ? AND s.tribe_id = ? AND s.deleted_at IS NULL"
            ),
            params![list_id.as_str(), tribe_id.as_str()],
            ShareRepository::parse_share,
        )
        .optional()?;
    Ok(share)
}

/// Insert, revive or refresh the share for `(list, tribe)` inside the caller's transaction
fn upsert_share(
    conn: &Connection,
    list_id: &ListId,
    tribe_id: &TribeId,
    shared_by: &UserId,
    expires_at: Option<i64>,
    now: i64,
) -> Result<ShareRecord> {
    validate_expiry(expires_at, now)?;
    ensure_list_active(conn, list_id)?;

    let list = list_id.as_str();
    let tribe = tribe_id.as_str();
    let by = shared_by.as_str();
    let key: [(&'static str, &dyn ToSql); 2] = [("list_id", &list), ("tribe_id", &tribe)];
    let fields: [(&'static str, &dyn ToSql); 2] = [("shared_by", &by), ("expires_at", &expires_at)];

    let (id, outcome) = upsert_with_tombstone(
        conn,
        "list_sharing",
        &key,
        &fields,
        OnActive::Update,
        &ShareId::new().as_str(),
        now,
    )?;
    tracing::debug!(list_id = %list_id, tribe_id = %tribe_id, ?outcome, "Upserted share");

    ShareRepository::get_by_id(conn, &id)
}
