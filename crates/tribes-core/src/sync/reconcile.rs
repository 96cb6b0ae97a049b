//! Three-way reconciliation of local rows against a remote snapshot
//!
//! For every mirrored record we know three states: the local row, the base
//! (what both sides agreed on at the last sync) and the remote record. A side
//! that still equals the base did not change; when both sides moved away from
//! the base in different directions the record is in conflict.
//!
//! Planning is pure; the coordinator applies the resulting [`SyncPlan`]
//! inside one transaction.

use std::collections::HashMap;

use serde_json::Value;

use super::{ItemFields, ListFields, RemoteItem, ValidSnapshot};
use crate::db::{NewConflict, SyncedItemRow};
use crate::error::Result;
use crate::models::{ConflictType, ItemId, ListId, ListItem};

/// Local state handed to the planner
#[derive(Debug)]
pub(crate) struct ReconcileInput {
    pub list_id: ListId,
    pub local_list: ListFields,
    pub list_base: Option<ListFields>,
    /// Items carrying an external id, tombstoned ones included
    pub synced: Vec<SyncedItemRow>,
    /// Active items that are not linked to the source yet
    pub unlinked: Vec<ListItem>,
    pub remote: ValidSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ItemAction {
    Insert {
        external_id: String,
        fields: ItemFields,
    },
    /// Replace local content with the remote one (revives tombstones)
    Overwrite { item: ListItem, fields: ItemFields },
    /// Record the agreed state without touching content
    SetBase {
        item_id: ItemId,
        external_id: String,
        base: Option<ItemFields>,
    },
    Delete { item_id: ItemId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListAction {
    Overwrite(ListFields),
    SetBase(ListFields),
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct SyncPlan {
    pub list: Option<ListAction>,
    pub items: Vec<ItemAction>,
    pub conflicts: Vec<NewConflict>,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.list.is_none() && self.items.is_empty() && self.conflicts.is_empty()
    }
}

pub(crate) fn plan(input: ReconcileInput) -> Result<SyncPlan> {
    let mut plan = SyncPlan::default();
    let list_id = input.list_id;

    if let Some(remote) = input.remote.list {
        plan.list = plan_list(
            &mut plan.conflicts,
            list_id,
            &input.local_list,
            input.list_base.as_ref(),
            remote,
        )?;
    }

    // Active rows sort first, so a live row wins over an older tombstone
    let mut by_external: HashMap<String, SyncedItemRow> = HashMap::new();
    for row in input.synced {
        if let Some(external_id) = row.item.external_id.clone() {
            by_external.entry(external_id).or_insert(row);
        }
    }
    // SQLite NOCASE only folds ASCII
    let mut unlinked: HashMap<String, ListItem> = input
        .unlinked
        .into_iter()
        .map(|item| (item.name.to_ascii_lowercase(), item))
        .collect();

    for remote in input.remote.items {
        if let Some(row) = by_external.remove(&remote.external_id) {
            plan_matched(&mut plan, list_id, row, remote)?;
        } else if let Some(local) = unlinked.remove(&remote.fields.name.to_ascii_lowercase()) {
            plan_link(&mut plan, list_id, local, remote)?;
        } else {
            plan.items.push(ItemAction::Insert {
                external_id: remote.external_id,
                fields: remote.fields,
            });
        }
    }

    let mut missing: Vec<SyncedItemRow> = by_external.into_values().collect();
    missing.sort_by_key(|row| (row.item.created_at, row.item.id));
    for row in missing {
        plan_missing(&mut plan, list_id, row)?;
    }

    Ok(plan)
}

fn plan_list(
    conflicts: &mut Vec<NewConflict>,
    list_id: ListId,
    local: &ListFields,
    base: Option<&ListFields>,
    remote: ListFields,
) -> Result<Option<ListAction>> {
    if *local == remote {
        let advance = base != Some(&remote);
        return Ok(advance.then_some(ListAction::SetBase(remote)));
    }
    if base == Some(local) {
        return Ok(Some(ListAction::Overwrite(remote)));
    }
    if base == Some(&remote) {
        return Ok(None);
    }

    conflicts.push(NewConflict {
        list_id,
        item_id: None,
        conflict_type: ConflictType::ListMetadata,
        local_data: serde_json::to_value(local)?,
        remote_data: serde_json::to_value(&remote)?,
    });
    Ok(None)
}

fn plan_matched(
    plan: &mut SyncPlan,
    list_id: ListId,
    row: SyncedItemRow,
    remote: RemoteItem,
) -> Result<()> {
    let local = ItemFields::from_item(&row.item);
    let base = row.base.as_ref();

    if row.item.is_deleted() {
        // Deleted here; only a remote edit makes that a conflict
        if base != Some(&remote.fields) {
            plan.conflicts.push(NewConflict {
                list_id,
                item_id: Some(row.item.id),
                conflict_type: ConflictType::DeletedLocally,
                local_data: item_snapshot(&local, row.item.deleted_at)?,
                remote_data: serde_json::to_value(&remote.fields)?,
            });
        }
        return Ok(());
    }

    if local == remote.fields {
        if base != Some(&remote.fields) {
            plan.items.push(ItemAction::SetBase {
                item_id: row.item.id,
                external_id: remote.external_id,
                base: Some(remote.fields),
            });
        }
    } else if base == Some(&local) {
        plan.items.push(ItemAction::Overwrite {
            item: row.item,
            fields: remote.fields,
        });
    } else if base != Some(&remote.fields) {
        plan.conflicts.push(NewConflict {
            list_id,
            item_id: Some(row.item.id),
            conflict_type: ConflictType::Modified,
            local_data: item_snapshot(&local, None)?,
            remote_data: serde_json::to_value(&remote.fields)?,
        });
    }
    Ok(())
}

/// A remote item whose name matches a local-only item: adopt the local row
fn plan_link(
    plan: &mut SyncPlan,
    list_id: ListId,
    local: ListItem,
    remote: RemoteItem,
) -> Result<()> {
    let local_fields = ItemFields::from_item(&local);
    if local_fields == remote.fields {
        plan.items.push(ItemAction::SetBase {
            item_id: local.id,
            external_id: remote.external_id,
            base: Some(remote.fields),
        });
        return Ok(());
    }

    plan.items.push(ItemAction::SetBase {
        item_id: local.id,
        external_id: remote.external_id,
        base: None,
    });
    plan.conflicts.push(NewConflict {
        list_id,
        item_id: Some(local.id),
        conflict_type: ConflictType::Modified,
        local_data: item_snapshot(&local_fields, None)?,
        remote_data: serde_json::to_value(&remote.fields)?,
    });
    Ok(())
}

/// A mirrored item the source no longer publishes
fn plan_missing(plan: &mut SyncPlan, list_id: ListId, row: SyncedItemRow) -> Result<()> {
    if row.item.is_deleted() {
        return Ok(());
    }

    let local = ItemFields::from_item(&row.item);
    if row.base.as_ref() == Some(&local) {
        plan.items.push(ItemAction::Delete {
            item_id: row.item.id,
        });
    } else {
        plan.conflicts.push(NewConflict {
            list_id,
            item_id: Some(row.item.id),
            conflict_type: ConflictType::DeletedRemotely,
            local_data: item_snapshot(&local, None)?,
            remote_data: Value::Null,
        });
    }
    Ok(())
}

fn item_snapshot(fields: &ItemFields, deleted_at: Option<i64>) -> Result<Value> {
    let mut value = serde_json::to_value(fields)?;
    if let (Some(deleted_at), Value::Object(map)) = (deleted_at, &mut value) {
        map.insert("deleted_at".to_string(), Value::from(deleted_at));
    }
    Ok(value)
}
