use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tribes_core::models::{
    ListDetails, MenuItem, Owner, ShareRecord, SyncConflict, TribeId, UserId,
};
use tribes_core::sync::{AdapterRegistry, JsonFileAdapter};
use tribes_core::{CoreConfig, ListService, RequestContext, StaticMembership};

use crate::error::CliError;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Resolved global options shared by every command
pub struct Session {
    pub db_path: PathBuf,
    pub config: CoreConfig,
    pub actor: Option<UserId>,
    pub tribes: Vec<TribeId>,
}

impl Session {
    /// Open the service with the acting user's tribes as the membership table
    pub fn open_service(&self) -> Result<ListService, CliError> {
        let membership = Arc::new(StaticMembership::new());
        if let Some(actor) = self.actor {
            for tribe in &self.tribes {
                membership.add_member(actor, *tribe);
            }
        }
        let adapters = AdapterRegistry::new().with(Arc::new(JsonFileAdapter::new()));

        Ok(ListService::open_path(
            &self.db_path,
            membership,
            adapters,
            self.config.clone(),
        )?)
    }

    pub fn context(&self) -> Result<RequestContext, CliError> {
        self.actor
            .map(RequestContext::new)
            .ok_or(CliError::MissingActor)
    }

    /// Context that is cancelled when the user presses Ctrl-C
    pub fn interruptible_context(&self) -> Result<RequestContext, CliError> {
        let cancel = CancellationToken::new();
        let guard = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                guard.cancel();
            }
        });
        Ok(self.context()?.with_cancel(cancel))
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>, config: &CoreConfig) -> PathBuf {
    cli_db_path
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tribes")
        .join("tribes.db")
}

pub fn sync_reference(path: &Path) -> Result<String, CliError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| CliError::InvalidSyncPath(path.to_string_lossy().into_owned()))
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn expiry_from_hours(hours: Option<u32>, now_ms: i64) -> Option<i64> {
    hours.map(|hours| now_ms.saturating_add(i64::from(hours) * HOUR_MS))
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_expiry(expires_at: Option<i64>, now_ms: i64) -> String {
    match expires_at {
        None => "never expires".to_string(),
        Some(at) if at < now_ms => "expired".to_string(),
        Some(at) => {
            let remaining = at - now_ms;
            if remaining < HOUR_MS {
                format!("expires in {}m", remaining / 60_000)
            } else if remaining < 48 * HOUR_MS {
                format!("expires in {}h", remaining / HOUR_MS)
            } else {
                format!("expires in {}d", remaining / (24 * HOUR_MS))
            }
        }
    }
}

pub fn format_share_line(share: &ShareRecord, now_ms: i64) -> String {
    format!(
        "tribe {} (v{}, {})",
        share.tribe_id,
        share.version,
        format_expiry(share.expires_at, now_ms)
    )
}

pub fn format_owner(owner: &Owner, granted_by_share: bool) -> String {
    if granted_by_share {
        format!("{owner} (via share)")
    } else {
        owner.to_string()
    }
}

pub fn format_list_lines(lists: &[ListDetails]) -> Vec<String> {
    lists
        .iter()
        .map(|details| {
            format!(
                "{} {} [{}, {}] {} items, {} owners, {} shares, sync: {}",
                details.list.id,
                details.list.name,
                details.list.list_type,
                details.list.visibility,
                details.items.len(),
                details.owners.len(),
                details.shares.len(),
                details.list.sync_status
            )
        })
        .collect()
}

pub fn format_details_lines(details: &ListDetails, now_ms: i64) -> Vec<String> {
    let list = &details.list;
    let mut lines = vec![
        format!("{} ({})", list.name, list.id),
        format!(
            "type: {}  visibility: {}  default weight: {}  version: {}",
            list.list_type, list.visibility, list.default_weight, list.version
        ),
    ];
    if let Some(description) = &list.description {
        lines.push(description.clone());
    }
    if let Some(source) = &list.sync_source {
        let last = list
            .last_synced_at
            .map_or_else(|| "never".to_string(), format_timestamp);
        lines.push(format!(
            "sync: {} {} ({}, last synced {last})",
            source.provider, source.reference, list.sync_status
        ));
    }

    lines.push("owners:".to_string());
    lines.extend(
        details
            .owners
            .iter()
            .map(|record| format!("  {}", format_owner(&record.owner, record.granted_by_share))),
    );
    if !details.shares.is_empty() {
        lines.push("shared with:".to_string());
        lines.extend(
            details
                .shares
                .iter()
                .map(|share| format!("  {}", format_share_line(share, now_ms))),
        );
    }
    lines.push(format!("items ({}):", details.items.len()));
    lines.extend(details.items.iter().map(|item| {
        let weight = item.effective_weight(list.default_weight);
        let used = item
            .last_used_at
            .map_or_else(String::new, |at| format!(", used {}", format_timestamp(at)));
        format!("  {} {} (weight {weight}{used})", item.id, item.name)
    }));
    lines
}

pub fn format_menu_lines(menu: &[MenuItem]) -> Vec<String> {
    menu.iter()
        .enumerate()
        .map(|(index, pick)| format!("{}. {} ({})", index + 1, pick.name, pick.item_id))
        .collect()
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let target = conflict
                .item_id
                .map_or_else(|| "list".to_string(), |item| format!("item {item}"));
            let state = match (conflict.resolution, conflict.resolved_at) {
                (Some(resolution), Some(at)) => {
                    format!("{resolution} at {}", format_timestamp(at))
                }
                _ => "open".to_string(),
            };
            format!(
                "{} {} on {target}, raised {} [{state}]",
                conflict.id,
                conflict.conflict_type,
                format_timestamp(conflict.created_at)
            )
        })
        .collect()
}
