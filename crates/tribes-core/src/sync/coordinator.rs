//! Drives sync passes and conflict resolution for lists

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::reconcile::{self, ItemAction, ListAction, ReconcileInput, SyncPlan};
use super::{AdapterRegistry, ItemFields, ListFields, RemoteSnapshot, SyncRequest};
use crate::clock::Clock;
use crate::context::RequestContext;
use crate::db::{
    write_transaction, ConflictRepository, ItemRepository, ListRepository, SharedDatabase,
};
use crate::error::{Error, Result};
use crate::models::{
    ConflictId, ConflictType, ListId, Resolution, SyncConflict, SyncStatus,
};

/// Default bound on a single adapter call
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of a completed sync pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Conflicts raised or refreshed by this pass
    pub conflicts: Vec<SyncConflict>,
}

/// Number of passes running per list
#[derive(Default)]
struct InFlight(Mutex<HashMap<ListId, usize>>);

impl InFlight {
    fn enter(&self, list_id: ListId) -> PassGuard<'_> {
        *self.counts().entry(list_id).or_default() += 1;
        PassGuard {
            in_flight: self,
            list_id,
        }
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<ListId, usize>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks one running pass; leaving scope ends it
struct PassGuard<'a> {
    in_flight: &'a InFlight,
    list_id: ListId,
}

impl PassGuard<'_> {
    fn is_alone(&self) -> bool {
        self.in_flight.counts().get(&self.list_id).copied() == Some(1)
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut counts = self.in_flight.counts();
        if let Some(count) = counts.get_mut(&self.list_id) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.list_id);
            }
        }
    }
}

/// Runs sync passes against registered adapters
#[derive(Clone)]
pub struct SyncCoordinator {
    db: SharedDatabase,
    adapters: Arc<AdapterRegistry>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    in_flight: Arc<InFlight>,
}

impl SyncCoordinator {
    pub fn new(
        db: SharedDatabase,
        adapters: Arc<AdapterRegistry>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            adapters,
            clock,
            timeout,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Reconcile a list with its sync source
    ///
    /// The adapter is called without holding the database. On any failure
    /// the list's sync status is put back to what it was before the pass,
    /// unless another pass on the same list is still running or has already
    /// recorded its outcome.
    pub async fn sync_list(&self, ctx: &RequestContext, list_id: &ListId) -> Result<SyncOutcome> {
        let pass = self.in_flight.enter(*list_id);
        let (request, previous) = {
            let db = self.db.lock().await?;
            let lists = ListRepository::new(db.connection());
            let list = lists.require(list_id)?;
            let Some(source) = list.sync_source.clone() else {
                return Err(Error::SyncDisabled(*list_id));
            };
            let previous =
                lists.set_sync_status(list_id, SyncStatus::Pending, self.clock.now_millis())?;
            let request = SyncRequest {
                list_id: *list_id,
                source,
                last_synced_at: list.last_synced_at,
            };
            (request, previous)
        };
        tracing::info!(
            list_id = %list_id,
            provider = %request.source.provider,
            "Sync started"
        );

        let result = match self.fetch(ctx, &request).await {
            Ok(snapshot) => self.apply(ctx, list_id, snapshot).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(outcome) => {
                tracing::info!(
                    list_id = %list_id,
                    status = %outcome.status,
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    deleted = outcome.deleted,
                    conflicts = outcome.conflicts.len(),
                    "Sync finished"
                );
                Ok(outcome)
            }
            Err(error) => {
                tracing::warn!(list_id = %list_id, %error, "Sync failed, reverting status");
                self.revert_status(&pass, previous).await;
                Err(error)
            }
        }
    }

    async fn fetch(&self, ctx: &RequestContext, request: &SyncRequest) -> Result<RemoteSnapshot> {
        let provider = &request.source.provider;
        let adapter = self.adapters.get(provider).ok_or_else(|| {
            Error::ExternalSourceUnavailable(format!("no adapter registered for '{provider}'"))
        })?;
        let timeout = ctx.budget(self.timeout);

        tokio::select! {
            () = ctx.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(timeout, adapter.fetch(request)) => match result {
                Err(_) => Err(Error::ExternalSourceTimeout(timeout)),
                Ok(Err(error)) => Err(error.into_error(timeout)),
                Ok(Ok(snapshot)) => Ok(snapshot),
            },
        }
    }

    async fn apply(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        snapshot: RemoteSnapshot,
    ) -> Result<SyncOutcome> {
        let remote = snapshot.validated()?;

        let db = self.db.lock().await?;
        let tx = write_transaction(db.connection())?;
        let now = self.clock.now_millis();

        let lists = ListRepository::new(&tx);
        let items = ItemRepository::new(&tx);
        let list = lists.require(list_id)?;
        let plan = reconcile::plan(ReconcileInput {
            list_id: *list_id,
            local_list: ListFields::from_list(&list),
            list_base: lists.sync_base(list_id)?,
            synced: items.synced_rows(list_id)?,
            unlinked: items
                .list(list_id)?
                .into_iter()
                .filter(|item| item.external_id.is_none())
                .collect(),
            remote,
        })?;

        let mut outcome = apply_plan(&tx, list_id, plan, now)?;

        let open = ConflictRepository::new(&tx).count_open(list_id)?;
        outcome.status = if open > 0 {
            SyncStatus::Conflict
        } else {
            SyncStatus::Synced
        };
        let synced_at = (outcome.status == SyncStatus::Synced).then_some(now);
        lists.mark_synced(list_id, outcome.status, synced_at, now)?;

        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tx.commit()?;
        Ok(outcome)
    }

    async fn revert_status(&self, pass: &PassGuard<'_>, previous: SyncStatus) {
        let list_id = &pass.list_id;
        let result = match self.db.lock().await {
            Ok(db) => self.revert_locked(db.connection(), pass, previous),
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            tracing::error!(list_id = %list_id, %error, "Failed to revert sync status");
        }
    }

    /// Must run with the database held so no new pass can slip in between
    /// the in-flight check and the write
    fn revert_locked(
        &self,
        conn: &Connection,
        pass: &PassGuard<'_>,
        previous: SyncStatus,
    ) -> Result<()> {
        let list_id = &pass.list_id;
        if !pass.is_alone() {
            tracing::debug!(list_id = %list_id, "Another sync pass is running, leaving status");
            return Ok(());
        }
        // A pass that started while another was running saw `pending`
        let target = if previous == SyncStatus::Pending {
            settled_status(conn, list_id)?
        } else {
            previous
        };
        if ListRepository::new(conn).revert_pending(list_id, target, self.clock.now_millis())? {
            tracing::debug!(list_id = %list_id, status = %target, "Reverted sync status");
        }
        Ok(())
    }

    /// Settle an open conflict by taking one side
    ///
    /// `resolution` must be `accept_local` or `accept_remote`. When the last
    /// open conflict of the list closes, the list becomes `synced`.
    pub async fn resolve_conflict(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        conflict_id: &ConflictId,
        resolution: &str,
    ) -> Result<SyncConflict> {
        let resolution: Resolution = resolution.parse()?;

        let db = self.db.lock().await?;
        let tx = write_transaction(db.connection())?;
        let now = self.clock.now_millis();
        let conflicts = ConflictRepository::new(&tx);

        let conflict = conflicts
            .get(conflict_id)?
            .filter(|conflict| conflict.list_id == *list_id)
            .ok_or(Error::ConflictNotFound(*conflict_id))?;
        if conflict.is_resolved() {
            return Err(Error::ConflictAlreadyResolved(*conflict_id));
        }
        let lists = ListRepository::new(&tx);
        lists.require(list_id)?;

        apply_resolution(&tx, &conflict, resolution, now)?;
        if !conflicts.mark_resolved(conflict_id, resolution, &ctx.actor, now)? {
            return Err(Error::ConflictAlreadyResolved(*conflict_id));
        }
        if conflicts.count_open(list_id)? == 0 {
            lists.mark_synced(list_id, SyncStatus::Synced, Some(now), now)?;
        } else {
            lists.mark_synced(list_id, SyncStatus::Conflict, None, now)?;
        }
        let resolved = conflicts
            .get(conflict_id)?
            .ok_or(Error::ConflictNotFound(*conflict_id))?;

        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tx.commit()?;

        tracing::info!(
            list_id = %list_id,
            conflict_id = %conflict_id,
            resolution = %resolution,
            resolved_by = %ctx.actor,
            "Conflict resolved"
        );
        Ok(resolved)
    }
}

/// Status implied by stored state, for lists whose recorded status is stale
fn settled_status(conn: &Connection, list_id: &ListId) -> Result<SyncStatus> {
    if ConflictRepository::new(conn).count_open(list_id)? > 0 {
        return Ok(SyncStatus::Conflict);
    }
    let list = ListRepository::new(conn).require(list_id)?;
    Ok(if list.last_synced_at.is_some() {
        SyncStatus::Synced
    } else {
        SyncStatus::None
    })
}

fn apply_plan(conn: &Connection, list_id: &ListId, plan: SyncPlan, now: i64) -> Result<SyncOutcome> {
    let lists = ListRepository::new(conn);
    let items = ItemRepository::new(conn);
    let conflicts = ConflictRepository::new(conn);
    let mut outcome = SyncOutcome::default();

    match plan.list {
        Some(ListAction::Overwrite(fields)) => {
            lists.apply_remote_metadata(list_id, &fields, now)?;
            outcome.updated += 1;
        }
        Some(ListAction::SetBase(fields)) => lists.set_sync_base(list_id, &fields)?,
        None => {}
    }

    for action in plan.items {
        match action {
            ItemAction::Insert {
                external_id,
                fields,
            } => {
                items
                    .insert_synced(list_id, &external_id, &fields, now)
                    .map_err(collision)?;
                outcome.inserted += 1;
            }
            ItemAction::Overwrite { item, fields } => {
                items
                    .overwrite_synced(&item, &fields, now)
                    .map_err(collision)?;
                outcome.updated += 1;
            }
            ItemAction::SetBase {
                item_id,
                external_id,
                base,
            } => items.set_sync_base(&item_id, &external_id, base.as_ref())?,
            ItemAction::Delete { item_id } => {
                items.delete_synced(&item_id, now)?;
                outcome.deleted += 1;
            }
        }
    }

    for conflict in &plan.conflicts {
        outcome.conflicts.push(conflicts.record(conflict, now)?);
    }
    Ok(outcome)
}

/// A remote name that clashes with an unrelated local item
fn collision(error: Error) -> Error {
    match error {
        Error::Duplicate(existing) => Error::ExternalSourceError(format!(
            "remote item collides with existing item '{}'",
            existing.name
        )),
        other => other,
    }
}

fn apply_resolution(
    conn: &Connection,
    conflict: &SyncConflict,
    resolution: Resolution,
    now: i64,
) -> Result<()> {
    let lists = ListRepository::new(conn);
    let items = ItemRepository::new(conn);

    let Some(item_id) = conflict.item_id else {
        // List metadata
        let remote: ListFields = serde_json::from_value(conflict.remote_data.clone())?;
        return match resolution {
            Resolution::AcceptRemote => lists.apply_remote_metadata(&conflict.list_id, &remote, now),
            Resolution::AcceptLocal => lists.set_sync_base(&conflict.list_id, &remote),
        };
    };

    let item = items
        .get_any(&item_id)?
        .ok_or_else(|| Error::not_found("item", item_id))?;
    let external_id = item.external_id.clone().ok_or_else(|| {
        Error::InvalidInput(format!("item {item_id} is no longer linked to the source"))
    })?;

    match (conflict.conflict_type, resolution) {
        (ConflictType::DeletedRemotely, Resolution::AcceptRemote) => {
            items.delete_synced(&item_id, now)
        }
        // Keep the local row as a local-only item
        (ConflictType::DeletedRemotely, Resolution::AcceptLocal) => items.unlink(&item_id, now),
        (_, Resolution::AcceptRemote) => {
            let remote: ItemFields = serde_json::from_value(conflict.remote_data.clone())?;
            items.overwrite_synced(&item, &remote, now)
        }
        (_, Resolution::AcceptLocal) => {
            let remote: ItemFields = serde_json::from_value(conflict.remote_data.clone())?;
            items.set_sync_base(&item_id, &external_id, Some(&remote))
        }
    }
}
