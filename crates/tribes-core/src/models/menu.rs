//! Menu generation inputs and outputs

use serde::{Deserialize, Serialize};

use super::{ItemId, ListId};

/// Default cooldown before an item can be suggested again
pub const DEFAULT_COOLDOWN_DAYS: i64 = 90;

/// Constraints for a generated menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOptions {
    /// Items used within this many days are left out
    pub cooldown_days: i64,
    /// Upper bound on the number of picks; must be positive
    pub max_items: usize,
}

impl Default for MenuOptions {
    fn default() -> Self {
        Self {
            cooldown_days: DEFAULT_COOLDOWN_DAYS,
            max_items: 5,
        }
    }
}

/// One pick of a generated menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub item_id: ItemId,
    pub list_id: ListId,
    pub name: String,
    /// Weight the pick was drawn with
    pub weight: u32,
    pub last_used_at: Option<i64>,
}
