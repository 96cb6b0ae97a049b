//! Ownership model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ListId, OwnerRecordId, TribeId, UserId};
use crate::error::{Error, Result};

/// Discriminant of [`Owner`] as stored in `list_owners.owner_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    User,
    Tribe,
}

text_enum!(OwnerType, "owner type", {
    User => "user",
    Tribe => "tribe",
});

/// An owner of a list: either a single user or a whole tribe
///
/// A tribe owner makes the list visible to, and editable by, every member of
/// that tribe; a user owner only covers that user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Owner {
    User(UserId),
    Tribe(TribeId),
}

impl Owner {
    /// Build an owner from its stored `(owner_type, owner_id)` pair
    pub fn from_parts(owner_type: &str, owner_id: &str) -> Result<Self> {
        let owner_type: OwnerType = owner_type.parse()?;
        let invalid_id = |_| Error::InvalidInput(format!("invalid owner id: '{owner_id}'"));
        Ok(match owner_type {
            OwnerType::User => Self::User(owner_id.parse().map_err(invalid_id)?),
            OwnerType::Tribe => Self::Tribe(owner_id.parse().map_err(invalid_id)?),
        })
    }

    pub const fn owner_type(&self) -> OwnerType {
        match self {
            Self::User(_) => OwnerType::User,
            Self::Tribe(_) => OwnerType::Tribe,
        }
    }

    /// Owner id as stored in `list_owners.owner_id`
    pub fn id_string(&self) -> String {
        match self {
            Self::User(id) => id.as_str(),
            Self::Tribe(id) => id.as_str(),
        }
    }

    /// Whether this owner covers `user`, given the tribes the user belongs to
    pub fn covers(&self, user: &UserId, user_tribes: &[TribeId]) -> bool {
        match self {
            Self::User(id) => id == user,
            Self::Tribe(id) => user_tribes.contains(id),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Tribe(id) => write!(f, "tribe:{id}"),
        }
    }
}

/// A row of the ownership registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub id: OwnerRecordId,
    pub list_id: ListId,
    pub owner: Owner,
    /// Set when the ownership came with a share and must go when it is revoked
    pub granted_by_share: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl OwnerRecord {
    pub const fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_from_parts() {
        let user = UserId::new();
        let owner = Owner::from_parts("user", &user.as_str()).unwrap();
        assert_eq!(owner, Owner::User(user));
        assert_eq!(owner.owner_type(), OwnerType::User);
        assert_eq!(owner.id_string(), user.as_str());
    }

    #[test]
    fn test_owner_from_parts_rejects_unknown_type() {
        let err = Owner::from_parts("group", &TribeId::new().as_str()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("owner type")));
    }

    #[test]
    fn test_owner_from_parts_rejects_bad_id() {
        assert!(matches!(
            Owner::from_parts("tribe", "nope"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_tribe_owner_covers_members() {
        let tribe = TribeId::new();
        let user = UserId::new();
        let owner = Owner::Tribe(tribe);
        assert!(owner.covers(&user, &[tribe]));
        assert!(!owner.covers(&user, &[TribeId::new()]));
        assert!(!Owner::User(UserId::new()).covers(&user, &[tribe]));
        assert!(Owner::User(user).covers(&user, &[]));
    }

    #[test]
    fn test_owner_serializes_as_tagged_variant() {
        let tribe = TribeId::new();
        let json = serde_json::to_value(Owner::Tribe(tribe)).unwrap();
        assert_eq!(json["type"], "tribe");
        assert_eq!(json["id"], tribe.as_str());
    }
}
