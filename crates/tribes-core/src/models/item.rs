//! List item model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ItemId, ListId};
use crate::error::Result;
use crate::util::{normalize_name, normalize_text_option};

/// Maximum item name length in characters
pub const MAX_ITEM_NAME_LEN: usize = 200;

/// A place or activity on a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: ItemId,
    pub list_id: ListId,
    pub name: String,
    pub description: Option<String>,
    /// Selection weight; falls back to the list's default weight when unset
    pub weight: Option<u32>,
    /// When the item was last actually used (Unix ms)
    pub last_used_at: Option<i64>,
    /// Free-form attributes (address, url, ...)
    pub metadata: Value,
    /// Identifier of the mirrored record in the list's sync source
    pub external_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl ListItem {
    /// Weight used for selection, given the owning list's default
    pub fn effective_weight(&self, list_default: u32) -> u32 {
        self.weight.unwrap_or(list_default)
    }

    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the item may be picked again at `now` given a cooldown window
    pub const fn is_cooled_down(&self, now: i64, cooldown_ms: i64) -> bool {
        match self.last_used_at {
            None => true,
            Some(used_at) => used_at < now.saturating_sub(cooldown_ms),
        }
    }
}

/// Input for adding an item to a list
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub description: Option<String>,
    pub weight: Option<u32>,
    pub metadata: Value,
    pub external_id: Option<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            weight: None,
            metadata: Value::Object(serde_json::Map::new()),
            external_id: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub(crate) fn normalized(self) -> Result<Self> {
        Ok(Self {
            name: normalize_name(&self.name, "item name", MAX_ITEM_NAME_LEN)?,
            description: normalize_text_option(self.description),
            external_id: normalize_text_option(self.external_id),
            ..self
        })
    }
}

/// Partial update of an item; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub weight: Option<Option<u32>>,
    pub metadata: Option<Value>,
}

impl ItemUpdate {
    pub(crate) fn apply_to(&self, item: &ListItem) -> Result<ListItem> {
        let mut updated = item.clone();
        if let Some(name) = &self.name {
            updated.name = normalize_name(name, "item name", MAX_ITEM_NAME_LEN)?;
        }
        if let Some(description) = &self.description {
            updated.description = normalize_text_option(description.clone());
        }
        if let Some(weight) = self.weight {
            updated.weight = weight;
        }
        if let Some(metadata) = &self.metadata {
            updated.metadata.clone_from(metadata);
        }
        Ok(updated)
    }
}
