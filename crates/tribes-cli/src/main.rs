//! Tribes CLI - administrative command line for shared lists
//!
//! Runs the share expiration sweeper, inspects lists, generates menus and
//! drives sync and conflict resolution against the local database.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tribes_core::CoreConfig;

use crate::cli::{Cli, Commands, ConflictCommands};
use crate::commands::common::{resolve_db_path, Session};
use crate::commands::lists::{run_add_item, run_create, run_lists, run_show, CreateArgs};
use crate::commands::menu::{run_menu, run_used};
use crate::commands::share::{run_cleanup_shares, run_share, run_sweep, run_unshare};
use crate::commands::sync::{run_conflicts, run_resolve, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {}", error.user_message());
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tribes=info,tribes_core=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = CoreConfig::from_env()?;
    let session = Session {
        db_path: resolve_db_path(cli.db_path, &config),
        config,
        actor: cli.actor,
        tribes: cli.tribes,
    };
    tracing::debug!(db_path = %session.db_path.display(), "Using database");

    match cli.command {
        Commands::Sweep => run_sweep(&session).await?,
        Commands::CleanupShares => run_cleanup_shares(&session).await?,
        Commands::Lists { json } => run_lists(&session, json).await?,
        Commands::Show { list_id, json } => run_show(&session, list_id, json).await?,
        Commands::Create {
            name,
            description,
            list_type,
            visibility,
            sync_file,
        } => {
            let args = CreateArgs {
                name,
                description,
                list_type: list_type.into(),
                visibility: visibility.into(),
                sync_file,
            };
            run_create(&session, args).await?;
        }
        Commands::AddItem {
            list_id,
            name,
            description,
            weight,
        } => run_add_item(&session, list_id, name, description, weight).await?,
        Commands::Share {
            list_id,
            tribe_id,
            hours,
            as_owner,
        } => run_share(&session, list_id, tribe_id, hours, as_owner).await?,
        Commands::Unshare { list_id, tribe_id } => {
            run_unshare(&session, list_id, tribe_id).await?;
        }
        Commands::Menu {
            list_ids,
            max,
            cooldown_days,
            json,
        } => run_menu(&session, &list_ids, max, cooldown_days, json).await?,
        Commands::Used { item_id } => run_used(&session, item_id).await?,
        Commands::Sync { list_id, json } => run_sync(&session, list_id, json).await?,
        Commands::Conflicts { command } => match command {
            ConflictCommands::List { list_id, all, json } => {
                run_conflicts(&session, list_id, all, json).await?;
            }
            ConflictCommands::Resolve {
                list_id,
                conflict_id,
                resolution,
            } => run_resolve(&session, list_id, conflict_id, &resolution).await?,
        },
    }

    Ok(())
}
