//! Data models for Tribes

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum stored as text.
macro_rules! text_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stable text form used in storage and on the wire
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::Error::InvalidInput(format!(
                        "unknown {}: '{}'",
                        $label, other
                    ))),
                }
            }
        }
    };
}

mod ids;
mod item;
mod list;
mod menu;
mod owner;
mod share;
mod sync_conflict;

pub use ids::{ConflictId, ItemId, ListId, OwnerRecordId, ShareId, TribeId, UserId};
pub use item::{ItemUpdate, ListItem, NewItem, MAX_ITEM_NAME_LEN};
pub use list::{
    List, ListDetails, ListType, ListUpdate, NewList, SyncSource, SyncStatus, Visibility,
    DEFAULT_LIST_WEIGHT, MAX_LIST_NAME_LEN,
};
pub use menu::{MenuItem, MenuOptions, DEFAULT_COOLDOWN_DAYS};
pub use owner::{Owner, OwnerRecord, OwnerType};
pub use share::{ShareRecord, SharedList};
pub use sync_conflict::{ConflictType, Resolution, SyncConflict};

#[cfg(test)]
mod tests {
    // Expansion sites usually have the crate's one-argument `Result` in scope
    use crate::error::{Error, Result};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Pace {
        Slow,
        Brisk,
    }

    text_enum!(Pace, "pace", {
        Slow => "slow",
        Brisk => "brisk",
    });

    #[test]
    fn text_enum_expands_next_to_crate_result() {
        let parsed: Result<Pace> = " brisk ".parse();
        assert_eq!(parsed.unwrap(), Pace::Brisk);
        assert_eq!(Pace::Slow.to_string(), "slow");
        assert!(matches!("sprint".parse::<Pace>(), Err(Error::InvalidInput(_))));
    }
}
