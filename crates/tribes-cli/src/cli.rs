use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tribes_core::models::{ConflictId, ItemId, ListId, ListType, TribeId, UserId, Visibility};

#[derive(Parser)]
#[command(name = "tribes")]
#[command(about = "Administer shared Tribes lists from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Act as this user
    #[arg(long = "as", global = true, env = "TRIBES_USER", value_name = "USER_ID")]
    pub actor: Option<UserId>,

    /// Tribes the acting user belongs to (repeat or comma-separate)
    #[arg(
        long = "tribe",
        global = true,
        env = "TRIBES_USER_TRIBES",
        value_delimiter = ',',
        value_name = "TRIBE_ID"
    )]
    pub tribes: Vec<TribeId>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the share expiration sweeper until interrupted
    Sweep,
    /// Expire overdue shares once and report how many were removed
    CleanupShares,
    /// Show the lists visible to the acting user
    Lists {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one list with its items, owners and shares
    Show {
        list_id: ListId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a list owned by the acting user
    Create {
        /// List name
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "type", value_enum, default_value_t = ListTypeArg::General)]
        list_type: ListTypeArg,
        #[arg(long, value_enum, default_value_t = VisibilityArg::Private)]
        visibility: VisibilityArg,
        /// Mirror the list from a JSON snapshot file
        #[arg(long, value_name = "PATH")]
        sync_file: Option<PathBuf>,
    },
    /// Add an item to a list
    AddItem {
        list_id: ListId,
        /// Item name
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Selection weight (defaults to the list's weight)
        #[arg(long)]
        weight: Option<u32>,
    },
    /// Share a list with a tribe
    Share {
        list_id: ListId,
        tribe_id: TribeId,
        /// Expire the share after this many hours
        #[arg(long)]
        hours: Option<u32>,
        /// Also make the tribe a co-owner while the share lasts
        #[arg(long)]
        as_owner: bool,
    },
    /// Withdraw a share
    Unshare { list_id: ListId, tribe_id: TribeId },
    /// Suggest items from one or more lists
    Menu {
        #[arg(required = true)]
        list_ids: Vec<ListId>,
        /// Maximum number of picks
        #[arg(short, long, default_value = "5")]
        max: usize,
        /// Skip items used within this many days (configured default when omitted)
        #[arg(long)]
        cooldown_days: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record that an item was used
    Used { item_id: ItemId },
    /// Reconcile a list with its sync source
    Sync {
        list_id: ListId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List conflicts of a list
    List {
        list_id: ListId,
        /// Include resolved conflicts
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict with accept_local or accept_remote
    Resolve {
        list_id: ListId,
        conflict_id: ConflictId,
        resolution: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ListTypeArg {
    General,
    Places,
    Activities,
}

impl From<ListTypeArg> for ListType {
    fn from(value: ListTypeArg) -> Self {
        match value {
            ListTypeArg::General => Self::General,
            ListTypeArg::Places => Self::Places,
            ListTypeArg::Activities => Self::Activities,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum VisibilityArg {
    Private,
    Shared,
    Public,
}

impl From<VisibilityArg> for Visibility {
    fn from(value: VisibilityArg) -> Self {
        match value {
            VisibilityArg::Private => Self::Private,
            VisibilityArg::Shared => Self::Shared,
            VisibilityArg::Public => Self::Public,
        }
    }
}
