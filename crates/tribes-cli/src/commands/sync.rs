use tribes_core::models::{ConflictId, ListId};

use crate::commands::common::{format_conflict_lines, Session};
use crate::error::CliError;

pub async fn run_sync(session: &Session, list_id: ListId, as_json: bool) -> Result<(), CliError> {
    let service = session.open_service()?;
    let ctx = session.interruptible_context()?;
    let outcome = service.sync_list(&ctx, &list_id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!(
        "Sync {}: {} inserted, {} updated, {} deleted",
        outcome.status, outcome.inserted, outcome.updated, outcome.deleted
    );
    if !outcome.conflicts.is_empty() {
        println!("{} conflict(s) need a decision:", outcome.conflicts.len());
        for line in format_conflict_lines(&outcome.conflicts) {
            println!("  {line}");
        }
    }
    Ok(())
}

pub async fn run_conflicts(
    session: &Session,
    list_id: ListId,
    include_resolved: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let service = session.open_service()?;
    let conflicts = service
        .list_conflicts(&session.context()?, &list_id, include_resolved)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_resolve(
    session: &Session,
    list_id: ListId,
    conflict_id: ConflictId,
    resolution: &str,
) -> Result<(), CliError> {
    let service = session.open_service()?;
    let conflict = service
        .resolve_list_conflict(&session.context()?, &list_id, &conflict_id, resolution)
        .await?;
    println!(
        "Resolved conflict {} with {}",
        conflict.id,
        conflict
            .resolution
            .map_or_else(|| resolution.to_string(), |value| value.to_string())
    );
    Ok(())
}
