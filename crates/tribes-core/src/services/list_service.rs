//! Authorized entry point for list operations
//!
//! `ListService` owns the shared database handle and wires the registries,
//! the sweeper, the sync coordinator and the menu generator together. Every
//! call names its actor through a [`RequestContext`]; authorization happens
//! here, the repositories below only enforce data invariants.

use std::collections::HashSet;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;

use super::MembershipProvider;
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::context::RequestContext;
use crate::db::{
    ConflictRepository, Database, ItemRepository, ListRepository, OwnerRepository,
    ShareRepository, SharedDatabase,
};
use crate::error::{Error, Result};
use crate::menu::MenuGenerator;
use crate::models::{
    ConflictId, ItemId, ItemUpdate, List, ListDetails, ListId, ListItem, ListUpdate, MenuItem,
    MenuOptions, NewItem, NewList, Owner, OwnerRecord, ShareRecord, SharedList, SyncConflict,
    TribeId, Visibility,
};
use crate::sweeper::ExpirationSweeper;
use crate::sync::{AdapterRegistry, SyncCoordinator, SyncOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Owners, members of tribes the list is shared with, anyone for public lists
    View,
    /// Active owners only
    Own,
}

/// Thread-safe facade over the list engine
#[derive(Clone)]
pub struct ListService {
    db: SharedDatabase,
    clock: Arc<dyn Clock>,
    membership: Arc<dyn MembershipProvider>,
    sync: SyncCoordinator,
    menus: MenuGenerator,
    sweeper: ExpirationSweeper,
    config: CoreConfig,
}

impl ListService {
    pub fn new(
        db: SharedDatabase,
        membership: Arc<dyn MembershipProvider>,
        adapters: AdapterRegistry,
        config: CoreConfig,
    ) -> Self {
        Self::with_clock(db, membership, adapters, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: SharedDatabase,
        membership: Arc<dyn MembershipProvider>,
        adapters: AdapterRegistry,
        config: CoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sync = SyncCoordinator::new(
            db.clone(),
            Arc::new(adapters),
            clock.clone(),
            config.sync_timeout,
        );
        let menus = MenuGenerator::new(db.clone(), clock.clone());
        let sweeper = ExpirationSweeper::new(db.clone(), clock.clone(), config.share_sweep_interval);
        Self {
            db,
            clock,
            membership,
            sync,
            menus,
            sweeper,
            config,
        }
    }

    /// Open (or create) the database at `path` and build a service on it
    pub fn open_path(
        path: impl AsRef<Path>,
        membership: Arc<dyn MembershipProvider>,
        adapters: AdapterRegistry,
        config: CoreConfig,
    ) -> Result<Self> {
        let db = Database::open(path, config.storage_timeout)?;
        let db = SharedDatabase::new(db, config.storage_timeout);
        Ok(Self::new(db, membership, adapters, config))
    }

    /// Service over a private in-memory database (primarily for tests)
    pub fn open_in_memory(
        membership: Arc<dyn MembershipProvider>,
        adapters: AdapterRegistry,
        config: CoreConfig,
    ) -> Result<Self> {
        let db = SharedDatabase::new(Database::open_in_memory()?, config.storage_timeout);
        Ok(Self::new(db, membership, adapters, config))
    }

    pub const fn database(&self) -> &SharedDatabase {
        &self.db
    }

    pub const fn sweeper(&self) -> &ExpirationSweeper {
        &self.sweeper
    }

    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Menu options with the configured cooldown and `max_items` picks
    pub const fn menu_options(&self, max_items: usize) -> MenuOptions {
        MenuOptions {
            cooldown_days: self.config.menu_default_cooldown_days,
            max_items,
        }
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    /// Create a list owned by the calling user
    pub async fn create_list(&self, ctx: &RequestContext, list: NewList) -> Result<List> {
        let actor = ctx.actor;
        self.run("create_list", actor, |conn, now| {
            let (list, _) = ListRepository::new(conn).create_with_owner(list, &actor, now)?;
            tracing::info!(list_id = %list.id, created_by = %actor, "List created");
            Ok(list)
        })
        .await
    }

    pub async fn get_list(&self, ctx: &RequestContext, list_id: &ListId) -> Result<List> {
        let tribes = self.tribes(ctx).await?;
        self.run("get_list", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::View, now)
        })
        .await
    }

    /// Update list fields; `expected_version` guards against lost updates
    pub async fn update_list(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        expected_version: Option<i64>,
        update: &ListUpdate,
    ) -> Result<List> {
        let tribes = self.tribes(ctx).await?;
        self.run("update_list", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now)?;
            ListRepository::new(conn).update(list_id, expected_version, update, now)
        })
        .await
    }

    pub async fn delete_list(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        expected_version: Option<i64>,
    ) -> Result<()> {
        let tribes = self.tribes(ctx).await?;
        self.run("delete_list", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now)?;
            ListRepository::new(conn).soft_delete(list_id, expected_version, now)?;
            tracing::info!(list_id = %list_id, deleted_by = %ctx.actor, "List deleted");
            Ok(())
        })
        .await
    }

    /// Every list the caller owns or can see through a tribe share, with details
    pub async fn lists_for_user(&self, ctx: &RequestContext) -> Result<Vec<ListDetails>> {
        let tribes = self.tribes(ctx).await?;
        self.run("lists_for_user", ctx.actor, |conn, now| {
            let mut ids = OwnerRepository::new(conn).list_ids_for(&ctx.actor, &tribes)?;
            let mut seen: HashSet<ListId> = ids.iter().copied().collect();
            for id in ShareRepository::new(conn).list_ids_shared_with(&tribes, now)? {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
            ListRepository::new(conn).load_details(&ids, now)
        })
        .await
    }

    /// Batch-load lists with their items, owners and live shares
    ///
    /// Lists the caller may not see are left out, as are missing ones.
    pub async fn load_list_details(
        &self,
        ctx: &RequestContext,
        list_ids: &[ListId],
    ) -> Result<Vec<ListDetails>> {
        let tribes = self.tribes(ctx).await?;
        self.run("load_list_details", ctx.actor, |conn, now| {
            let details = ListRepository::new(conn).load_details(list_ids, now)?;
            Ok(details
                .into_iter()
                .filter(|details| can_view_details(details, ctx, &tribes))
                .collect())
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    pub async fn add_item(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        item: NewItem,
    ) -> Result<ListItem> {
        let tribes = self.tribes(ctx).await?;
        self.run("add_item", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now)?;
            ItemRepository::new(conn).add(list_id, item, now)
        })
        .await
    }

    pub async fn update_item(
        &self,
        ctx: &RequestContext,
        item_id: &ItemId,
        update: &ItemUpdate,
    ) -> Result<ListItem> {
        let tribes = self.tribes(ctx).await?;
        self.run("update_item", item_id, |conn, now| {
            let items = ItemRepository::new(conn);
            let item = items.get(item_id)?.ok_or_else(|| Error::not_found("item", item_id))?;
            authorize(conn, ctx, &tribes, &item.list_id, Access::Own, now)?;
            items.update(item_id, update, now)
        })
        .await
    }

    pub async fn remove_item(&self, ctx: &RequestContext, item_id: &ItemId) -> Result<()> {
        let tribes = self.tribes(ctx).await?;
        self.run("remove_item", item_id, |conn, now| {
            let items = ItemRepository::new(conn);
            let item = items.get(item_id)?.ok_or_else(|| Error::not_found("item", item_id))?;
            authorize(conn, ctx, &tribes, &item.list_id, Access::Own, now)?;
            items.remove(item_id, now)
        })
        .await
    }

    pub async fn list_items(&self, ctx: &RequestContext, list_id: &ListId) -> Result<Vec<ListItem>> {
        let tribes = self.tribes(ctx).await?;
        self.run("list_items", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::View, now)?;
            ItemRepository::new(conn).list(list_id)
        })
        .await
    }

    /// Record that an item was actually used; `None` means now
    pub async fn mark_item_used(
        &self,
        ctx: &RequestContext,
        item_id: &ItemId,
        used_at: Option<i64>,
    ) -> Result<ListItem> {
        let tribes = self.tribes(ctx).await?;
        self.run("mark_item_used", item_id, |conn, now| {
            let items = ItemRepository::new(conn);
            let item = items.get(item_id)?.ok_or_else(|| Error::not_found("item", item_id))?;
            authorize(conn, ctx, &tribes, &item.list_id, Access::View, now)?;
            items.mark_used(item_id, used_at.unwrap_or(now), now)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    pub async fn add_owner(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        owner: &Owner,
    ) -> Result<OwnerRecord> {
        let tribes = self.tribes(ctx).await?;
        self.run("add_owner", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now)?;
            let record = OwnerRepository::new(conn).add_owner(list_id, owner, now)?;
            tracing::info!(list_id = %list_id, %owner, granted_by = %ctx.actor, "Owner added");
            Ok(record)
        })
        .await
    }

    pub async fn remove_owner(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        owner: &Owner,
    ) -> Result<()> {
        let tribes = self.tribes(ctx).await?;
        self.run("remove_owner", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now)?;
            OwnerRepository::new(conn).remove_owner(list_id, owner, now)?;
            tracing::info!(list_id = %list_id, %owner, removed_by = %ctx.actor, "Owner removed");
            Ok(())
        })
        .await
    }

    pub async fn get_owners(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
    ) -> Result<Vec<OwnerRecord>> {
        let tribes = self.tribes(ctx).await?;
        self.run("get_owners", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::View, now)?;
            OwnerRepository::new(conn).get_owners(list_id)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Sharing
    // -----------------------------------------------------------------------

    /// Share a list with one of the caller's tribes
    pub async fn share_list(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        tribe_id: &TribeId,
        expires_at: Option<i64>,
    ) -> Result<ShareRecord> {
        let tribes = self.tribes(ctx).await?;
        self.run("share_list", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now)?;
            require_member(ctx, &tribes, tribe_id)?;
            ShareRepository::new(conn).share_with_tribe(list_id, tribe_id, &ctx.actor, expires_at, now)
        })
        .await
    }

    /// Share a list and make the tribe a co-owner while the share lasts
    pub async fn share_list_as_owner(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        tribe_id: &TribeId,
        expires_at: Option<i64>,
    ) -> Result<ShareRecord> {
        let tribes = self.tribes(ctx).await?;
        self.run("share_list_as_owner", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now)?;
            require_member(ctx, &tribes, tribe_id)?;
            ShareRepository::new(conn)
                .share_with_tribe_as_owner(list_id, tribe_id, &ctx.actor, expires_at, now)
        })
        .await
    }

    pub async fn update_share_expiry(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        tribe_id: &TribeId,
        expected_version: i64,
        expires_at: Option<i64>,
    ) -> Result<ShareRecord> {
        let tribes = self.tribes(ctx).await?;
        self.run("update_share_expiry", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now)?;
            ShareRepository::new(conn).update_expiry(
                list_id,
                tribe_id,
                expected_version,
                expires_at,
                now,
            )
        })
        .await
    }

    pub async fn unshare_list(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        tribe_id: &TribeId,
    ) -> Result<()> {
        let tribes = self.tribes(ctx).await?;
        self.run("unshare_list", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now)?;
            ShareRepository::new(conn).unshare_with_tribe(list_id, tribe_id, &ctx.actor, now)
        })
        .await
    }

    pub async fn get_list_shares(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
    ) -> Result<Vec<ShareRecord>> {
        let tribes = self.tribes(ctx).await?;
        self.run("get_list_shares", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::View, now)?;
            ShareRepository::new(conn).get_list_shares(list_id, now)
        })
        .await
    }

    /// Lists shared with a tribe the caller belongs to
    pub async fn get_shared_lists(
        &self,
        ctx: &RequestContext,
        tribe_id: &TribeId,
    ) -> Result<Vec<SharedList>> {
        let tribes = self.tribes(ctx).await?;
        self.run("get_shared_lists", tribe_id, |conn, now| {
            require_member(ctx, &tribes, tribe_id)?;
            ShareRepository::new(conn).get_shared_lists(tribe_id, now)
        })
        .await
    }

    /// Expire overdue shares now instead of waiting for the next sweep
    pub async fn cleanup_expired_shares(&self, ctx: &RequestContext) -> Result<usize> {
        let expired = self
            .sweeper
            .sweep_once(ctx.cancellation())
            .await
            .inspect_err(|error| log_failure("cleanup_expired_shares", ctx.actor, error))?;
        tracing::info!(expired, requested_by = %ctx.actor, "Expired shares cleaned up");
        Ok(expired)
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    pub async fn sync_list(&self, ctx: &RequestContext, list_id: &ListId) -> Result<SyncOutcome> {
        let tribes = self.tribes(ctx).await?;
        self.run("sync_list", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now).map(|_| ())
        })
        .await?;
        self.sync
            .sync_list(ctx, list_id)
            .await
            .inspect_err(|error| log_failure("sync_list", list_id, error))
    }

    /// Close a sync conflict with `accept_local` or `accept_remote`
    pub async fn resolve_list_conflict(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        conflict_id: &ConflictId,
        resolution: &str,
    ) -> Result<SyncConflict> {
        let tribes = self.tribes(ctx).await?;
        self.run("resolve_list_conflict", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::Own, now).map(|_| ())
        })
        .await?;
        self.sync
            .resolve_conflict(ctx, list_id, conflict_id, resolution)
            .await
            .inspect_err(|error| log_failure("resolve_list_conflict", conflict_id, error))
    }

    pub async fn list_conflicts(
        &self,
        ctx: &RequestContext,
        list_id: &ListId,
        include_resolved: bool,
    ) -> Result<Vec<SyncConflict>> {
        let tribes = self.tribes(ctx).await?;
        self.run("list_conflicts", list_id, |conn, now| {
            authorize(conn, ctx, &tribes, list_id, Access::View, now)?;
            ConflictRepository::new(conn).list(list_id, include_resolved)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Menus
    // -----------------------------------------------------------------------

    /// Weighted picks across lists the caller can see
    pub async fn generate_menu(
        &self,
        ctx: &RequestContext,
        list_ids: &[ListId],
        options: MenuOptions,
    ) -> Result<Vec<MenuItem>> {
        let tribes = self.tribes(ctx).await?;
        self.run("generate_menu", ctx.actor, |conn, now| {
            authorize_all(conn, ctx, &tribes, list_ids, Access::View, now).map(|_| ())
        })
        .await?;
        self.menus
            .generate(list_ids, options)
            .await
            .inspect_err(|error| log_failure("generate_menu", ctx.actor, error))
    }

    // -----------------------------------------------------------------------
    // Private
    // -----------------------------------------------------------------------

    async fn tribes(&self, ctx: &RequestContext) -> Result<Vec<TribeId>> {
        self.membership
            .tribes_for_user(&ctx.actor)
            .await
            .inspect_err(|error| log_failure("tribes_for_user", ctx.actor, error))
    }

    /// Run synchronous repository work under the database lock
    async fn run<T>(
        &self,
        operation: &'static str,
        entity: impl Display,
        work: impl FnOnce(&Connection, i64) -> Result<T>,
    ) -> Result<T> {
        let db = self
            .db
            .lock()
            .await
            .inspect_err(|error| log_failure(operation, &entity, error))?;
        work(db.connection(), self.clock.now_millis())
            .inspect_err(|error| log_failure(operation, &entity, error))
    }
}

fn log_failure(operation: &'static str, entity: impl Display, error: &Error) {
    if error.is_internal() {
        tracing::error!(operation, entity = %entity, %error, "List operation failed");
    } else {
        tracing::debug!(operation, entity = %entity, %error, "List operation rejected");
    }
}

/// Load the list and check that the caller has `access` to it
fn authorize(
    conn: &Connection,
    ctx: &RequestContext,
    tribes: &[TribeId],
    list_id: &ListId,
    access: Access,
    now: i64,
) -> Result<List> {
    authorize_all(conn, ctx, tribes, std::slice::from_ref(list_id), access, now)?
        .pop()
        .ok_or_else(|| Error::not_found("list", list_id))
}

/// Load every list in `list_ids` and check `access` to each
///
/// Runs a fixed number of queries however many ids are passed. The first
/// missing list fails with `NotFound`, the first inaccessible one with
/// `Forbidden`.
fn authorize_all(
    conn: &Connection,
    ctx: &RequestContext,
    tribes: &[TribeId],
    list_ids: &[ListId],
    access: Access,
    now: i64,
) -> Result<Vec<List>> {
    let lists = ListRepository::new(conn).get_many(list_ids)?;
    let found: HashSet<ListId> = lists.iter().map(|list| list.id).collect();
    if let Some(missing) = list_ids.iter().find(|id| !found.contains(*id)) {
        return Err(Error::not_found("list", missing));
    }

    let ids: Vec<ListId> = found.into_iter().collect();
    let owners = OwnerRepository::new(conn).owners_for_lists(&ids)?;
    let shares = ShareRepository::new(conn).live_shares_for_lists(&ids, now)?;
    for list in &lists {
        let owners = owners.get(&list.id).map_or(&[][..], Vec::as_slice);
        let shares = shares.get(&list.id).map_or(&[][..], Vec::as_slice);
        if !permits(access, list, owners, shares, ctx, tribes) {
            return Err(Error::Forbidden(match access {
                Access::View => format!("user {} cannot view list {}", ctx.actor, list.id),
                Access::Own => format!("user {} does not own list {}", ctx.actor, list.id),
            }));
        }
    }
    Ok(lists)
}

fn permits(
    access: Access,
    list: &List,
    owners: &[OwnerRecord],
    shares: &[ShareRecord],
    ctx: &RequestContext,
    tribes: &[TribeId],
) -> bool {
    if owners
        .iter()
        .any(|record| record.owner.covers(&ctx.actor, tribes))
    {
        return true;
    }
    access == Access::View
        && (list.visibility == Visibility::Public
            || shares.iter().any(|share| tribes.contains(&share.tribe_id)))
}

fn require_member(ctx: &RequestContext, tribes: &[TribeId], tribe_id: &TribeId) -> Result<()> {
    if tribes.contains(tribe_id) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!(
            "user {} is not a member of tribe {tribe_id}",
            ctx.actor
        )))
    }
}

fn can_view_details(details: &ListDetails, ctx: &RequestContext, tribes: &[TribeId]) -> bool {
    permits(
        Access::View,
        &details.list,
        &details.owners,
        &details.shares,
        ctx,
        tribes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::{statement_count, DEFAULT_STORAGE_TIMEOUT};
    use crate::models::{SyncSource, SyncStatus, UserId};
    use crate::services::StaticMembership;
    use crate::sync::{JsonFileAdapter, FILE_PROVIDER};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const HOUR: i64 = 60 * 60 * 1000;
    const START: i64 = 1_700_000_000_000;

    struct Harness {
        service: ListService,
        clock: Arc<ManualClock>,
        membership: Arc<StaticMembership>,
    }

    impl Harness {
        fn new() -> Self {
            let db = SharedDatabase::new(Database::open_in_memory().unwrap(), DEFAULT_STORAGE_TIMEOUT);
            let clock = Arc::new(ManualClock::new(START));
            let membership = Arc::new(StaticMembership::new());
            let service = ListService::with_clock(
                db,
                membership.clone(),
                AdapterRegistry::new().with(Arc::new(JsonFileAdapter::new())),
                CoreConfig::default(),
                clock.clone(),
            );
            Self {
                service,
                clock,
                membership,
            }
        }

        fn user_in(&self, tribe: TribeId) -> RequestContext {
            let user = UserId::new();
            self.membership.add_member(user, tribe);
            RequestContext::new(user)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn creator_owns_new_list() {
        let h = Harness::new();
        let ctx = RequestContext::new(UserId::new());
        let list = h
            .service
            .create_list(&ctx, NewList::new("Date Night Spots"))
            .await
            .unwrap();

        let owners = h.service.get_owners(&ctx, &list.id).await.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].owner, Owner::User(ctx.actor));
        assert_eq!(h.service.get_list(&ctx, &list.id).await.unwrap(), list);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn strangers_are_forbidden() {
        let h = Harness::new();
        let owner = RequestContext::new(UserId::new());
        let stranger = RequestContext::new(UserId::new());
        let list = h
            .service
            .create_list(&owner, NewList::new("Brunch"))
            .await
            .unwrap();

        assert!(matches!(
            h.service.get_list(&stranger, &list.id).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            h.service
                .add_item(&stranger, &list.id, NewItem::new("Tartine"))
                .await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            h.service.get_list(&stranger, &ListId::new()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn public_lists_are_readable_by_anyone() {
        let h = Harness::new();
        let owner = RequestContext::new(UserId::new());
        let stranger = RequestContext::new(UserId::new());
        let list = h
            .service
            .create_list(
                &owner,
                NewList::new("City Parks").with_visibility(Visibility::Public),
            )
            .await
            .unwrap();

        assert_eq!(h.service.get_list(&stranger, &list.id).await.unwrap().id, list.id);
        assert!(matches!(
            h.service.delete_list(&stranger, &list.id, None).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn share_requires_membership_of_target_tribe() {
        let h = Harness::new();
        let tribe = TribeId::new();
        let owner = RequestContext::new(UserId::new());
        let list = h
            .service
            .create_list(&owner, NewList::new("Hikes"))
            .await
            .unwrap();

        assert!(matches!(
            h.service.share_list(&owner, &list.id, &tribe, None).await,
            Err(Error::Forbidden(_))
        ));

        h.membership.add_member(owner.actor, tribe);
        let share = h
            .service
            .share_list(&owner, &list.id, &tribe, None)
            .await
            .unwrap();
        assert_eq!(share.tribe_id, tribe);
        assert_eq!(share.shared_by, owner.actor);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shared_members_can_view_but_not_edit() {
        let h = Harness::new();
        let tribe = TribeId::new();
        let owner = h.user_in(tribe);
        let member = h.user_in(tribe);
        let list = h
            .service
            .create_list(&owner, NewList::new("Museums"))
            .await
            .unwrap();
        h.service
            .add_item(&owner, &list.id, NewItem::new("SFMOMA"))
            .await
            .unwrap();
        h.service
            .share_list(&owner, &list.id, &tribe, None)
            .await
            .unwrap();

        let items = h.service.list_items(&member, &list.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(
            h.service
                .add_item(&member, &list.id, NewItem::new("de Young"))
                .await,
            Err(Error::Forbidden(_))
        ));

        h.service.unshare_list(&owner, &list.id, &tribe).await.unwrap();
        assert!(matches!(
            h.service.list_items(&member, &list.id).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tribe_owners_can_edit() {
        let h = Harness::new();
        let tribe = TribeId::new();
        let owner = h.user_in(tribe);
        let member = h.user_in(tribe);
        let list = h
            .service
            .create_list(&owner, NewList::new("Climbing gyms"))
            .await
            .unwrap();

        h.service
            .share_list_as_owner(&owner, &list.id, &tribe, None)
            .await
            .unwrap();
        h.service
            .add_item(&member, &list.id, NewItem::new("Mission Cliffs"))
            .await
            .unwrap();

        h.service.unshare_list(&owner, &list.id, &tribe).await.unwrap();
        assert!(matches!(
            h.service
                .add_item(&member, &list.id, NewItem::new("Dogpatch"))
                .await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn date_night_share_expires_after_a_day() {
        let h = Harness::new();
        let tribe = TribeId::new();
        let owner = h.user_in(tribe);
        let member = h.user_in(tribe);
        let list = h
            .service
            .create_list(&owner, NewList::new("Date Night Spots"))
            .await
            .unwrap();
        h.service
            .share_list(&owner, &list.id, &tribe, Some(START + 24 * HOUR))
            .await
            .unwrap();

        let shared = h.service.get_shared_lists(&member, &tribe).await.unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].list.name, "Date Night Spots");

        h.clock.advance(Duration::from_secs(25 * 60 * 60));
        assert_eq!(h.service.cleanup_expired_shares(&owner).await.unwrap(), 1);
        assert!(h
            .service
            .get_shared_lists(&member, &tribe)
            .await
            .unwrap()
            .is_empty());
        assert!(h
            .service
            .get_list_shares(&owner, &list.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(h.service.cleanup_expired_shares(&owner).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shared_lists_need_membership() {
        let h = Harness::new();
        let outsider = RequestContext::new(UserId::new());
        assert!(matches!(
            h.service.get_shared_lists(&outsider, &TribeId::new()).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_shares_converge_on_one_row() {
        let h = Harness::new();
        let tribe = TribeId::new();
        let owner = h.user_in(tribe);
        let list = h
            .service
            .create_list(&owner, NewList::new("Bars"))
            .await
            .unwrap();
        let list_id = list.id;

        let first = {
            let service = h.service.clone();
            let ctx = owner.clone();
            tokio::spawn(async move {
                service
                    .share_list(&ctx, &list_id, &tribe, Some(START + HOUR))
                    .await
            })
        };
        let second = {
            let service = h.service.clone();
            let ctx = owner.clone();
            tokio::spawn(async move {
                service
                    .share_list(&ctx, &list_id, &tribe, Some(START + 2 * HOUR))
                    .await
            })
        };
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.id, second.id);

        let shares = h.service.get_list_shares(&owner, &list_id).await.unwrap();
        assert_eq!(shares.len(), 1);
        let later = if first.version > second.version {
            first
        } else {
            second
        };
        assert_eq!(shares[0].expires_at, later.expires_at);
        assert_eq!(shares[0].version, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lists_for_user_combines_owned_and_shared() {
        let h = Harness::new();
        let tribe = TribeId::new();
        let alice = h.user_in(tribe);
        let bob = h.user_in(tribe);
        let own = h
            .service
            .create_list(&bob, NewList::new("Bob's list"))
            .await
            .unwrap();
        let shared = h
            .service
            .create_list(&alice, NewList::new("Alice's list"))
            .await
            .unwrap();
        h.service
            .create_list(&alice, NewList::new("Private"))
            .await
            .unwrap();
        h.service
            .share_list(&alice, &shared.id, &tribe, None)
            .await
            .unwrap();

        let mut names: Vec<String> = h
            .service
            .lists_for_user(&bob)
            .await
            .unwrap()
            .into_iter()
            .map(|details| details.list.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Alice's list", "Bob's list"]);

        let details = h
            .service
            .load_list_details(&bob, &[own.id, shared.id, ListId::new()])
            .await
            .unwrap();
        assert_eq!(details.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn menu_respects_usage_and_visibility() {
        let h = Harness::new();
        let owner = RequestContext::new(UserId::new());
        let stranger = RequestContext::new(UserId::new());
        let list = h
            .service
            .create_list(&owner, NewList::new("Dinner"))
            .await
            .unwrap();
        let used = h
            .service
            .add_item(&owner, &list.id, NewItem::new("Pizza"))
            .await
            .unwrap();
        h.service
            .add_item(&owner, &list.id, NewItem::new("Ramen"))
            .await
            .unwrap();
        h.service
            .mark_item_used(&owner, &used.id, None)
            .await
            .unwrap();

        let menu = h
            .service
            .generate_menu(&owner, &[list.id], h.service.menu_options(5))
            .await
            .unwrap();
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0].name, "Ramen");

        assert!(matches!(
            h.service
                .generate_menu(&stranger, &[list.id], MenuOptions::default())
                .await,
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn authorization_cost_does_not_grow_with_list_count() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = UserId::new();
        let ids: Vec<ListId> = (0..6)
            .map(|n| {
                ListRepository::new(db.connection())
                    .create_with_owner(NewList::new(format!("List {n}")), &owner, 1)
                    .unwrap()
                    .0
                    .id
            })
            .collect();
        let ctx = RequestContext::new(owner);

        let (one, single) = statement_count::count(&mut db, |conn| {
            authorize_all(conn, &ctx, &[], &ids[..1], Access::View, 10)
        });
        let (all, many) = statement_count::count(&mut db, |conn| {
            authorize_all(conn, &ctx, &[], &ids, Access::View, 10)
        });
        assert_eq!(one.unwrap().len(), 1);
        assert_eq!(all.unwrap().len(), 6);
        assert_eq!(single, many);

        // One hidden or missing list fails the whole batch
        let (other, _) = ListRepository::new(db.connection())
            .create_with_owner(NewList::new("Not yours"), &UserId::new(), 2)
            .unwrap();
        let mut mixed = ids.clone();
        mixed.push(other.id);
        assert!(matches!(
            authorize_all(db.connection(), &ctx, &[], &mixed, Access::View, 10),
            Err(Error::Forbidden(_))
        ));
        mixed.push(ListId::new());
        assert!(matches!(
            authorize_all(db.connection(), &ctx, &[], &mixed, Access::View, 10),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_through_file_adapter() {
        let h = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parks.json");
        std::fs::write(
            &path,
            r#"{"items": [{"external_id": "p1", "name": "Dolores"}, {"external_id": "p2", "name": "Presidio"}]}"#,
        )
        .unwrap();

        let owner = RequestContext::new(UserId::new());
        let source = SyncSource::new(FILE_PROVIDER, path.to_string_lossy()).unwrap();
        let list = h
            .service
            .create_list(&owner, NewList::new("Parks").with_sync_source(source))
            .await
            .unwrap();

        let outcome = h.service.sync_list(&owner, &list.id).await.unwrap();
        assert_eq!(outcome.status, SyncStatus::Synced);
        assert_eq!(outcome.inserted, 2);
        assert!(h
            .service
            .list_conflicts(&owner, &list.id, true)
            .await
            .unwrap()
            .is_empty());

        let stranger = RequestContext::new(UserId::new());
        assert!(matches!(
            h.service.sync_list(&stranger, &list.id).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_list_version_is_rejected() {
        let h = Harness::new();
        let owner = RequestContext::new(UserId::new());
        let list = h
            .service
            .create_list(&owner, NewList::new("Bakeries"))
            .await
            .unwrap();
        let update = ListUpdate {
            name: Some("Best bakeries".into()),
            ..ListUpdate::default()
        };

        let updated = h
            .service
            .update_list(&owner, &list.id, Some(list.version), &update)
            .await
            .unwrap();
        assert_eq!(updated.version, list.version + 1);
        assert!(matches!(
            h.service
                .update_list(&owner, &list.id, Some(list.version), &update)
                .await,
            Err(Error::VersionConflict { .. })
        ));
    }
}
