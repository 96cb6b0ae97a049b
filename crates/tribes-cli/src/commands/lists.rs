use std::path::PathBuf;

use tribes_core::models::{ListId, ListType, NewItem, NewList, SyncSource, Visibility};
use tribes_core::sync::FILE_PROVIDER;
use tribes_core::Error;

use crate::commands::common::{
    format_details_lines, format_list_lines, now_millis, sync_reference, Session,
};
use crate::error::CliError;

pub async fn run_lists(session: &Session, as_json: bool) -> Result<(), CliError> {
    let service = session.open_service()?;
    let lists = service.lists_for_user(&session.context()?).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&lists)?);
    } else if lists.is_empty() {
        println!("No lists.");
    } else {
        for line in format_list_lines(&lists) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_show(session: &Session, list_id: ListId, as_json: bool) -> Result<(), CliError> {
    let service = session.open_service()?;
    let details = service
        .load_list_details(&session.context()?, &[list_id])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("list", list_id))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&details)?);
    } else {
        for line in format_details_lines(&details, now_millis()) {
            println!("{line}");
        }
    }
    Ok(())
}

pub struct CreateArgs {
    pub name: String,
    pub description: Option<String>,
    pub list_type: ListType,
    pub visibility: Visibility,
    pub sync_file: Option<PathBuf>,
}

pub fn new_list(args: CreateArgs) -> Result<NewList, CliError> {
    let mut list = NewList::new(args.name)
        .with_type(args.list_type)
        .with_visibility(args.visibility);
    if let Some(description) = args.description {
        list = list.with_description(description);
    }
    if let Some(path) = args.sync_file {
        list = list.with_sync_source(SyncSource::new(FILE_PROVIDER, sync_reference(&path)?)?);
    }
    Ok(list)
}

pub async fn run_create(session: &Session, args: CreateArgs) -> Result<(), CliError> {
    let service = session.open_service()?;
    let list = service
        .create_list(&session.context()?, new_list(args)?)
        .await?;
    println!("Created list {} ({})", list.name, list.id);
    Ok(())
}

pub async fn run_add_item(
    session: &Session,
    list_id: ListId,
    name: String,
    description: Option<String>,
    weight: Option<u32>,
) -> Result<(), CliError> {
    let mut item = NewItem::new(name);
    if let Some(description) = description {
        item = item.with_description(description);
    }
    if let Some(weight) = weight {
        item = item.with_weight(weight);
    }

    let service = session.open_service()?;
    let item = service.add_item(&session.context()?, &list_id, item).await?;
    println!("Added {} ({})", item.name, item.id);
    Ok(())
}
