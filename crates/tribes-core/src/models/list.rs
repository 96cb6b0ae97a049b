//! List model

use serde::{Deserialize, Serialize};

use super::{ListId, ListItem, OwnerRecord, ShareRecord};
use crate::error::{Error, Result};
use crate::util::{normalize_name, normalize_text_option};

/// Maximum list name length in characters
pub const MAX_LIST_NAME_LEN: usize = 100;

/// Weight given to items that do not carry their own
pub const DEFAULT_LIST_WEIGHT: u32 = 1;

/// What kind of things a list collects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListType {
    #[default]
    General,
    Places,
    Activities,
}

text_enum!(ListType, "list type", {
    General => "general",
    Places => "places",
    Activities => "activities",
});

/// Who can discover a list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Shared,
    Public,
}

text_enum!(Visibility, "visibility", {
    Private => "private",
    Shared => "shared",
    Public => "public",
});

/// Position of a list in the sync state machine
///
/// `none` → `pending` → `synced` | `conflict`, and `conflict` → `synced` once
/// every open conflict has been resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    None,
    Pending,
    Synced,
    Conflict,
}

text_enum!(SyncStatus, "sync status", {
    None => "none",
    Pending => "pending",
    Synced => "synced",
    Conflict => "conflict",
});

/// External system of record a list is mirrored from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncSource {
    /// Adapter name the source is bound to (e.g. `google_places`)
    pub provider: String,
    /// Provider-specific reference to the remote collection
    pub reference: String,
}

impl SyncSource {
    pub fn new(provider: impl Into<String>, reference: impl Into<String>) -> Result<Self> {
        let provider = normalize_text_option(Some(provider.into()))
            .ok_or_else(|| Error::InvalidInput("sync provider cannot be empty".into()))?;
        let reference = normalize_text_option(Some(reference.into()))
            .ok_or_else(|| Error::InvalidInput("sync reference cannot be empty".into()))?;
        Ok(Self {
            provider,
            reference,
        })
    }
}

/// A named, typed collection of items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    pub id: ListId,
    pub name: String,
    pub description: Option<String>,
    pub list_type: ListType,
    pub visibility: Visibility,
    pub default_weight: u32,
    pub sync_status: SyncStatus,
    pub sync_source: Option<SyncSource>,
    /// Last successful sync (Unix ms)
    pub last_synced_at: Option<i64>,
    /// Optimistic concurrency counter, bumped once per successful write
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl List {
    /// Whether the list has a sync source configured
    pub const fn is_sync_enabled(&self) -> bool {
        self.sync_source.is_some()
    }

    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for creating a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewList {
    pub name: String,
    pub description: Option<String>,
    pub list_type: ListType,
    pub visibility: Visibility,
    pub default_weight: u32,
    pub sync_source: Option<SyncSource>,
}

impl NewList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            list_type: ListType::default(),
            visibility: Visibility::default(),
            default_weight: DEFAULT_LIST_WEIGHT,
            sync_source: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn with_type(mut self, list_type: ListType) -> Self {
        self.list_type = list_type;
        self
    }

    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub const fn with_default_weight(mut self, weight: u32) -> Self {
        self.default_weight = weight;
        self
    }

    #[must_use]
    pub fn with_sync_source(mut self, source: SyncSource) -> Self {
        self.sync_source = Some(source);
        self
    }

    /// Trim and validate user-supplied fields
    pub(crate) fn normalized(self) -> Result<Self> {
        Ok(Self {
            name: normalize_name(&self.name, "list name", MAX_LIST_NAME_LEN)?,
            description: normalize_text_option(self.description),
            ..self
        })
    }
}

/// Partial update of list fields; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub list_type: Option<ListType>,
    pub visibility: Option<Visibility>,
    pub default_weight: Option<u32>,
    pub sync_source: Option<Option<SyncSource>>,
}

impl ListUpdate {
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.list_type.is_none()
            && self.visibility.is_none()
            && self.default_weight.is_none()
            && self.sync_source.is_none()
    }

    /// Apply the update to a copy of `list`, validating the new values
    pub(crate) fn apply_to(&self, list: &List) -> Result<List> {
        let mut updated = list.clone();
        if let Some(name) = &self.name {
            updated.name = normalize_name(name, "list name", MAX_LIST_NAME_LEN)?;
        }
        if let Some(description) = &self.description {
            updated.description = normalize_text_option(description.clone());
        }
        if let Some(list_type) = self.list_type {
            updated.list_type = list_type;
        }
        if let Some(visibility) = self.visibility {
            updated.visibility = visibility;
        }
        if let Some(weight) = self.default_weight {
            updated.default_weight = weight;
        }
        if let Some(source) = &self.sync_source {
            updated.sync_source.clone_from(source);
            if source.is_none() {
                updated.sync_status = SyncStatus::None;
            }
        }
        Ok(updated)
    }
}

/// A list with its related rows, assembled by batch loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListDetails {
    pub list: List,
    pub items: Vec<ListItem>,
    pub owners: Vec<OwnerRecord>,
    pub shares: Vec<ShareRecord>,
}
