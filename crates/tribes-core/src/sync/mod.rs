//! Synchronization of lists with external sources of record
//!
//! A list with a [`SyncSource`] mirrors the items published by that source.
//! Sources are reached through a [`SyncAdapter`] registered per provider name;
//! the [`SyncCoordinator`] fetches a snapshot, reconciles it three ways
//! against the local rows and the state recorded at the previous sync, and
//! raises a [`SyncConflict`](crate::models::SyncConflict) wherever both sides
//! changed.

mod coordinator;
mod file_adapter;
mod reconcile;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::models::{List, ListId, ListItem, SyncSource, MAX_ITEM_NAME_LEN, MAX_LIST_NAME_LEN};
use crate::util::{compact_text, normalize_name, normalize_text_option};

pub use coordinator::{SyncCoordinator, SyncOutcome};
pub use file_adapter::{JsonFileAdapter, FILE_PROVIDER};

/// Synced content of an item, as compared between local, base and remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFields {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ItemFields {
    pub(crate) fn from_item(item: &ListItem) -> Self {
        Self {
            name: item.name.clone(),
            description: item.description.clone(),
            weight: item.weight,
            metadata: item.metadata.clone(),
        }
    }

    fn normalized(self) -> Result<Self> {
        Ok(Self {
            name: normalize_name(&self.name, "item name", MAX_ITEM_NAME_LEN)?,
            description: normalize_text_option(self.description),
            weight: self.weight,
            metadata: if self.metadata.is_null() {
                empty_object()
            } else {
                self.metadata
            },
        })
    }
}

/// Synced metadata of a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFields {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ListFields {
    pub(crate) fn from_list(list: &List) -> Self {
        Self {
            name: list.name.clone(),
            description: list.description.clone(),
        }
    }
}

/// One item as published by the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Stable identifier of the item at the source
    pub external_id: String,
    #[serde(flatten)]
    pub fields: ItemFields,
}

/// Everything the source publishes for one list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// List name at the source; `None` leaves list metadata out of the sync
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<RemoteItem>,
}

impl RemoteSnapshot {
    /// Trim and validate the snapshot before it touches local rows
    pub(crate) fn validated(self) -> Result<ValidSnapshot> {
        let list = match self.name {
            Some(name) => Some(ListFields {
                name: normalize_name(&name, "list name", MAX_LIST_NAME_LEN)
                    .map_err(invalid_remote)?,
                description: normalize_text_option(self.description),
            }),
            None => None,
        };

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(self.items.len());
        for item in self.items {
            let external_id = item.external_id.trim().to_string();
            if external_id.is_empty() {
                return Err(Error::ExternalSourceError(
                    "remote item without external id".to_string(),
                ));
            }
            let fields = item.fields.normalized().map_err(invalid_remote)?;
            if !seen.insert(external_id.clone()) {
                return Err(Error::ExternalSourceError(format!(
                    "duplicate external id '{external_id}' in remote snapshot"
                )));
            }
            items.push(RemoteItem {
                external_id,
                fields,
            });
        }

        Ok(ValidSnapshot { list, items })
    }
}

fn invalid_remote(error: Error) -> Error {
    Error::ExternalSourceError(format!("invalid remote data: {error}"))
}

/// A snapshot whose fields passed local validation
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidSnapshot {
    pub list: Option<ListFields>,
    pub items: Vec<RemoteItem>,
}

/// What the adapter is asked to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub list_id: ListId,
    pub source: SyncSource,
    /// Completion time of the previous successful sync
    pub last_synced_at: Option<i64>,
}

/// Failures reported by a sync adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Unavailable(String),
    #[error("source did not answer in time")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

impl AdapterError {
    /// Map onto the crate error, reporting `timeout` as the exceeded bound
    pub(crate) fn into_error(self, timeout: Duration) -> Error {
        match self {
            Self::Unavailable(message) => Error::ExternalSourceUnavailable(compact_text(&message)),
            Self::Timeout => Error::ExternalSourceTimeout(timeout),
            Self::Other(message) => Error::ExternalSourceError(compact_text(&message)),
        }
    }
}

/// Connection to one kind of external source
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    /// Provider name lists refer to in their sync source
    fn provider(&self) -> &str;

    async fn fetch(&self, request: &SyncRequest) -> std::result::Result<RemoteSnapshot, AdapterError>;
}

/// Adapters keyed by provider name
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn SyncAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its provider name, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn SyncAdapter>) {
        self.adapters.insert(adapter.provider().to_string(), adapter);
    }

    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn SyncAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn SyncAdapter>> {
        self.adapters.get(provider).cloned()
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut providers: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        providers.sort_unstable();
        providers
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn remote(external_id: &str, name: &str) -> RemoteItem {
        RemoteItem {
            external_id: external_id.to_string(),
            fields: ItemFields {
                name: name.to_string(),
                description: None,
                weight: None,
                metadata: Value::Null,
            },
        }
    }

    #[test]
    fn test_remote_item_parses_flattened_fields() {
        let item: RemoteItem =
            serde_json::from_value(json!({"external_id": "p-1", "name": "Pier 39"})).unwrap();
        assert_eq!(item.external_id, "p-1");
        assert_eq!(item.fields.name, "Pier 39");
        assert_eq!(item.fields.metadata, json!({}));
    }

    #[test]
    fn test_snapshot_validation_normalizes() {
        let snapshot = RemoteSnapshot {
            name: Some("  Parks ".into()),
            description: Some("   ".into()),
            items: vec![remote(" a ", " Golden Gate ")],
        };
        let valid = snapshot.validated().unwrap();
        assert_eq!(
            valid.list,
            Some(ListFields {
                name: "Parks".into(),
                description: None
            })
        );
        assert_eq!(valid.items[0].external_id, "a");
        assert_eq!(valid.items[0].fields.name, "Golden Gate");
        assert_eq!(valid.items[0].fields.metadata, json!({}));
    }

    #[test]
    fn test_snapshot_validation_rejects_bad_items() {
        let duplicate = RemoteSnapshot {
            items: vec![remote("a", "One"), remote("a", "Two")],
            ..RemoteSnapshot::default()
        };
        assert!(matches!(
            duplicate.validated(),
            Err(Error::ExternalSourceError(_))
        ));

        let unnamed = RemoteSnapshot {
            items: vec![remote("a", "  ")],
            ..RemoteSnapshot::default()
        };
        assert!(matches!(
            unnamed.validated(),
            Err(Error::ExternalSourceError(_))
        ));
    }

    #[test]
    fn test_adapter_errors_map_to_external_source_errors() {
        let timeout = Duration::from_secs(3);
        assert!(matches!(
            AdapterError::Unavailable("down".into()).into_error(timeout),
            Error::ExternalSourceUnavailable(_)
        ));
        assert!(matches!(
            AdapterError::Timeout.into_error(timeout),
            Error::ExternalSourceTimeout(d) if d == timeout
        ));
        assert!(matches!(
            AdapterError::Other("boom".into()).into_error(timeout),
            Error::ExternalSourceError(_)
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = AdapterRegistry::new().with(Arc::new(JsonFileAdapter::new()));
        assert!(registry.get("file").is_some());
        assert!(registry.get("airtable").is_none());
        assert_eq!(registry.providers(), vec!["file"]);
    }
}
