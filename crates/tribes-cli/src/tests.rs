use std::path::PathBuf;

use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::json;
use tribes_core::models::{
    ConflictId, ConflictType, ItemId, ListId, ListType, MenuItem, NewItem, Owner, Resolution,
    SyncConflict, TribeId, UserId, Visibility,
};
use tribes_core::CoreConfig;

use crate::cli::{Cli, Commands, ConflictCommands};
use crate::commands::common::{
    expiry_from_hours, format_conflict_lines, format_details_lines, format_expiry,
    format_menu_lines, format_owner, format_timestamp, resolve_db_path, Session,
};
use crate::commands::lists::{new_list, CreateArgs};
use crate::error::CliError;

const HOUR: i64 = 60 * 60 * 1000;

fn session(dir: &tempfile::TempDir, actor: Option<UserId>, tribes: Vec<TribeId>) -> Session {
    Session {
        db_path: dir.path().join("tribes.db"),
        config: CoreConfig::default(),
        actor,
        tribes,
    }
}

#[test]
fn parses_share_command_with_global_identity() {
    let list = ListId::new();
    let tribe = TribeId::new();
    let user = UserId::new();
    let cli = Cli::try_parse_from([
        "tribes",
        "share",
        list.to_string().as_str(),
        tribe.to_string().as_str(),
        "--hours",
        "24",
        "--as",
        user.to_string().as_str(),
        "--tribe",
        tribe.to_string().as_str(),
    ])
    .unwrap();

    assert_eq!(cli.actor, Some(user));
    assert_eq!(cli.tribes, vec![tribe]);
    match cli.command {
        Commands::Share {
            list_id,
            tribe_id,
            hours,
            as_owner,
        } => {
            assert_eq!(list_id, list);
            assert_eq!(tribe_id, tribe);
            assert_eq!(hours, Some(24));
            assert!(!as_owner);
        }
        _ => panic!("expected share command"),
    }
}

#[test]
fn parses_conflict_resolution() {
    let list = ListId::new();
    let conflict = ConflictId::new();
    let cli = Cli::try_parse_from([
        "tribes",
        "conflicts",
        "resolve",
        list.to_string().as_str(),
        conflict.to_string().as_str(),
        "accept_remote",
    ])
    .unwrap();

    match cli.command {
        Commands::Conflicts {
            command:
                ConflictCommands::Resolve {
                    conflict_id,
                    resolution,
                    ..
                },
        } => {
            assert_eq!(conflict_id, conflict);
            assert_eq!(resolution, "accept_remote");
        }
        _ => panic!("expected conflicts resolve command"),
    }
}

#[test]
fn rejects_malformed_ids() {
    assert!(Cli::try_parse_from(["tribes", "show", "not-a-uuid"]).is_err());
    assert!(Cli::try_parse_from(["tribes", "menu"]).is_err());
}

#[test]
fn db_path_prefers_flag_then_config() {
    let config = CoreConfig {
        db_path: Some(PathBuf::from("/var/lib/tribes/config.db")),
        ..CoreConfig::default()
    };
    assert_eq!(
        resolve_db_path(Some(PathBuf::from("/tmp/flag.db")), &config),
        PathBuf::from("/tmp/flag.db")
    );
    assert_eq!(
        resolve_db_path(None, &config),
        PathBuf::from("/var/lib/tribes/config.db")
    );
    assert!(resolve_db_path(None, &CoreConfig::default()).ends_with("tribes/tribes.db"));
}

#[test]
fn expiry_helpers() {
    assert_eq!(expiry_from_hours(None, 1_000), None);
    assert_eq!(expiry_from_hours(Some(24), 1_000), Some(1_000 + 24 * HOUR));

    assert_eq!(format_expiry(None, 0), "never expires");
    assert_eq!(format_expiry(Some(10), 20), "expired");
    assert_eq!(format_expiry(Some(30 * 60_000), 0), "expires in 30m");
    assert_eq!(format_expiry(Some(24 * HOUR), 0), "expires in 24h");
    assert_eq!(format_expiry(Some(72 * HOUR), 0), "expires in 3d");
}

#[test]
fn formats_timestamps_in_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn formats_owners_and_menu() {
    let tribe = TribeId::new();
    assert_eq!(
        format_owner(&Owner::Tribe(tribe), true),
        format!("tribe:{tribe} (via share)")
    );

    let item_id = ItemId::new();
    let lines = format_menu_lines(&[MenuItem {
        item_id,
        list_id: ListId::new(),
        name: "Ramen".to_string(),
        weight: 2,
        last_used_at: None,
    }]);
    assert_eq!(lines, vec![format!("1. Ramen ({item_id})")]);
}

#[test]
fn formats_open_and_resolved_conflicts() {
    let open = SyncConflict {
        id: ConflictId::new(),
        list_id: ListId::new(),
        item_id: None,
        conflict_type: ConflictType::ListMetadata,
        local_data: json!({"name": "Parks"}),
        remote_data: json!({"name": "City Parks"}),
        created_at: 0,
        resolved_at: None,
        resolution: None,
        resolved_by: None,
    };
    let resolved = SyncConflict {
        resolved_at: Some(0),
        resolution: Some(Resolution::AcceptLocal),
        resolved_by: Some(UserId::new()),
        ..open.clone()
    };

    let lines = format_conflict_lines(&[open, resolved]);
    assert!(lines[0].contains("list_metadata on list"));
    assert!(lines[0].ends_with("[open]"));
    assert!(lines[1].contains("[accept_local at 1970-01-01 00:00:00 UTC]"));
}

#[test]
fn create_args_build_new_list() {
    let list = new_list(CreateArgs {
        name: "Date Night Spots".to_string(),
        description: Some("Places to try".to_string()),
        list_type: ListType::Places,
        visibility: Visibility::Shared,
        sync_file: Some(PathBuf::from("/srv/spots.json")),
    })
    .unwrap();

    assert_eq!(list.list_type, ListType::Places);
    assert_eq!(list.visibility, Visibility::Shared);
    let source = list.sync_source.unwrap();
    assert_eq!(source.provider, "file");
    assert_eq!(source.reference, "/srv/spots.json");
}

#[test]
fn commands_need_an_actor() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(&dir, None, Vec::new());
    assert!(matches!(session.context(), Err(CliError::MissingActor)));
}

#[tokio::test]
async fn session_service_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let tribe = TribeId::new();
    let actor = UserId::new();
    let session = session(&dir, Some(actor), vec![tribe]);

    let service = session.open_service().unwrap();
    let ctx = session.context().unwrap();
    let list = service
        .create_list(
            &ctx,
            new_list(CreateArgs {
                name: "Hikes".to_string(),
                description: None,
                list_type: ListType::Activities,
                visibility: Visibility::Private,
                sync_file: None,
            })
            .unwrap(),
        )
        .await
        .unwrap();
    service
        .add_item(&ctx, &list.id, NewItem::new("Mount Tam"))
        .await
        .unwrap();
    service
        .share_list(&ctx, &list.id, &tribe, Some(chrono::Utc::now().timestamp_millis() + HOUR))
        .await
        .unwrap();

    let details = service
        .load_list_details(&ctx, &[list.id])
        .await
        .unwrap()
        .remove(0);
    let lines = format_details_lines(&details, chrono::Utc::now().timestamp_millis());
    assert_eq!(lines[0], format!("Hikes ({})", list.id));
    assert!(lines.iter().any(|line| line.contains("Mount Tam")));
    assert!(lines.iter().any(|line| line.contains(&format!("tribe {tribe}"))));

    // A second open sees the same file
    let reopened = session.open_service().unwrap();
    assert_eq!(reopened.lists_for_user(&ctx).await.unwrap().len(), 1);
}
