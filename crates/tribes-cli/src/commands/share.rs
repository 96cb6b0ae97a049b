use tokio_util::sync::CancellationToken;
use tribes_core::models::{ListId, TribeId};

use crate::commands::common::{expiry_from_hours, format_share_line, now_millis, Session};
use crate::error::CliError;

pub async fn run_share(
    session: &Session,
    list_id: ListId,
    tribe_id: TribeId,
    hours: Option<u32>,
    as_owner: bool,
) -> Result<(), CliError> {
    let service = session.open_service()?;
    let ctx = session.context()?;
    let now = now_millis();
    let expires_at = expiry_from_hours(hours, now);

    let share = if as_owner {
        service
            .share_list_as_owner(&ctx, &list_id, &tribe_id, expires_at)
            .await?
    } else {
        service
            .share_list(&ctx, &list_id, &tribe_id, expires_at)
            .await?
    };
    println!("Shared with {}", format_share_line(&share, now));
    Ok(())
}

pub async fn run_unshare(
    session: &Session,
    list_id: ListId,
    tribe_id: TribeId,
) -> Result<(), CliError> {
    let service = session.open_service()?;
    service
        .unshare_list(&session.context()?, &list_id, &tribe_id)
        .await?;
    println!("Unshared list {list_id} from tribe {tribe_id}");
    Ok(())
}

pub async fn run_cleanup_shares(session: &Session) -> Result<(), CliError> {
    let service = session.open_service()?;
    let expired = service.sweeper().trigger().await?;
    println!("Expired {expired} share(s)");
    Ok(())
}

pub async fn run_sweep(session: &Session) -> Result<(), CliError> {
    let service = session.open_service()?;
    let cancel = CancellationToken::new();
    let handle = service.sweeper().clone().spawn(cancel.clone());

    println!(
        "Sweeping expired shares every {:?}; press Ctrl-C to stop",
        service.sweeper().interval()
    );
    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    handle
        .await
        .map_err(|error| CliError::Task(error.to_string()))?;
    Ok(())
}
