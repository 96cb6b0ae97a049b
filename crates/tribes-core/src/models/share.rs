//! Share model

use serde::{Deserialize, Serialize};

use super::{List, ListId, ShareId, TribeId, UserId};

/// A time-bounded grant of list visibility to a tribe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    pub id: ShareId,
    pub list_id: ListId,
    pub tribe_id: TribeId,
    pub shared_by: UserId,
    /// Grant end (Unix ms); `None` never expires
    pub expires_at: Option<i64>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl ShareRecord {
    /// Active (not tombstoned) and not yet past its expiry at `now`
    pub fn is_live(&self, now: i64) -> bool {
        self.deleted_at.is_none() && self.expires_at.map_or(true, |expires| expires >= now)
    }
}

/// A list visible to a tribe together with the grant that makes it visible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedList {
    pub list: List,
    pub share: ShareRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(expires_at: Option<i64>, deleted_at: Option<i64>) -> ShareRecord {
        ShareRecord {
            id: ShareId::new(),
            list_id: ListId::new(),
            tribe_id: TribeId::new(),
            shared_by: UserId::new(),
            expires_at,
            version: 1,
            created_at: 0,
            updated_at: 0,
            deleted_at,
        }
    }

    #[test]
    fn test_share_liveness() {
        assert!(share(None, None).is_live(100));
        assert!(share(Some(200), None).is_live(100));
        assert!(share(Some(100), None).is_live(100));
        assert!(!share(Some(99), None).is_live(100));
        assert!(!share(None, Some(50)).is_live(100));
    }
}
