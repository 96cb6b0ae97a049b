//! Tribe membership collaborator

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{TribeId, UserId};

/// Answers which tribes a user belongs to
///
/// Membership itself is managed elsewhere; the engine only reads it to
/// authorize tribe-scoped operations.
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    async fn tribes_for_user(&self, user: &UserId) -> Result<Vec<TribeId>>;

    async fn is_member(&self, user: &UserId, tribe: &TribeId) -> Result<bool> {
        Ok(self.tribes_for_user(user).await?.contains(tribe))
    }
}

/// In-memory membership table
#[derive(Debug, Default)]
pub struct StaticMembership {
    members: RwLock<HashMap<UserId, HashSet<TribeId>>>,
}

impl StaticMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, user: UserId, tribe: TribeId) {
        if let Ok(mut members) = self.members.write() {
            members.entry(user).or_default().insert(tribe);
        }
    }

    pub fn remove_member(&self, user: &UserId, tribe: &TribeId) {
        if let Ok(mut members) = self.members.write() {
            if let Some(tribes) = members.get_mut(user) {
                tribes.remove(tribe);
            }
        }
    }
}

#[async_trait]
impl MembershipProvider for StaticMembership {
    async fn tribes_for_user(&self, user: &UserId) -> Result<Vec<TribeId>> {
        let members = self
            .members
            .read()
            .map_err(|_| Error::Database("membership table poisoned".to_string()))?;
        let mut tribes: Vec<TribeId> = members
            .get(user)
            .map(|tribes| tribes.iter().copied().collect())
            .unwrap_or_default();
        tribes.sort_unstable();
        Ok(tribes)
    }
}
