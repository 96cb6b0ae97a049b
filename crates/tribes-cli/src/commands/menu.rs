use tribes_core::models::{ItemId, ListId, MenuOptions};

use crate::commands::common::{format_menu_lines, format_timestamp, Session};
use crate::error::CliError;

pub async fn run_menu(
    session: &Session,
    list_ids: &[ListId],
    max_items: usize,
    cooldown_days: Option<i64>,
    as_json: bool,
) -> Result<(), CliError> {
    let service = session.open_service()?;
    let defaults = service.menu_options(max_items);
    let options = MenuOptions {
        cooldown_days: cooldown_days.unwrap_or(defaults.cooldown_days),
        ..defaults
    };
    let menu = service
        .generate_menu(&session.context()?, list_ids, options)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&menu)?);
    } else if menu.is_empty() {
        println!("Nothing to suggest: every item was used recently.");
    } else {
        for line in format_menu_lines(&menu) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_used(session: &Session, item_id: ItemId) -> Result<(), CliError> {
    let service = session.open_service()?;
    let item = service
        .mark_item_used(&session.context()?, &item_id, None)
        .await?;
    let used_at = item.last_used_at.map_or_else(String::new, format_timestamp);
    println!("Marked {} as used at {used_at}", item.name);
    Ok(())
}
