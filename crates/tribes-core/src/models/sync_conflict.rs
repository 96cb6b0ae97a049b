//! Sync conflict model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::{ConflictId, ItemId, ListId, UserId};
use crate::error::Error;

/// Kind of divergence found during a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both sides changed the same item differently
    Modified,
    /// Deleted here, changed remotely
    DeletedLocally,
    /// Changed here, deleted remotely
    DeletedRemotely,
    /// Both sides changed the list's own name/description
    ListMetadata,
}

text_enum!(ConflictType, "conflict type", {
    Modified => "modified",
    DeletedLocally => "deleted_locally",
    DeletedRemotely => "deleted_remotely",
    ListMetadata => "list_metadata",
});

/// Decision applied to a conflict. The vocabulary is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    AcceptLocal,
    AcceptRemote,
}

impl Resolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AcceptLocal => "accept_local",
            Self::AcceptRemote => "accept_remote",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "accept_local" => Ok(Self::AcceptLocal),
            "accept_remote" => Ok(Self::AcceptRemote),
            other => Err(Error::InvalidResolution(other.to_string())),
        }
    }
}

/// A detected divergence between local and remote data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: ConflictId,
    pub list_id: ListId,
    /// `None` for list-level conflicts
    pub item_id: Option<ItemId>,
    pub conflict_type: ConflictType,
    pub local_data: Value,
    pub remote_data: Value,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
    pub resolution: Option<Resolution>,
    pub resolved_by: Option<UserId>,
}

impl SyncConflict {
    pub const fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    pub const fn is_list_level(&self) -> bool {
        self.item_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_vocabulary_is_closed() {
        assert_eq!(
            "accept_local".parse::<Resolution>().unwrap(),
            Resolution::AcceptLocal
        );
        assert_eq!(
            " accept_remote ".parse::<Resolution>().unwrap(),
            Resolution::AcceptRemote
        );
        assert!(matches!(
            "merge".parse::<Resolution>(),
            Err(Error::InvalidResolution(value)) if value == "merge"
        ));
    }

    #[test]
    fn test_conflict_type_roundtrip_text() {
        for kind in [
            ConflictType::Modified,
            ConflictType::DeletedLocally,
            ConflictType::DeletedRemotely,
            ConflictType::ListMetadata,
        ] {
            assert_eq!(kind.as_str().parse::<ConflictType>().unwrap(), kind);
        }
    }
}
