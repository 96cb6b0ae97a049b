//! Sync adapter backed by a JSON document on disk

use std::io::ErrorKind;

use async_trait::async_trait;

use super::{AdapterError, RemoteSnapshot, SyncAdapter, SyncRequest};

/// Provider name lists use to point at a JSON file
pub const FILE_PROVIDER: &str = "file";

/// Reads a [`RemoteSnapshot`] from the path given as the sync reference
///
/// ```json
/// { "name": "Parks", "items": [{ "external_id": "p1", "name": "Dolores" }] }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFileAdapter;

impl JsonFileAdapter {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SyncAdapter for JsonFileAdapter {
    fn provider(&self) -> &str {
        FILE_PROVIDER
    }

    async fn fetch(&self, request: &SyncRequest) -> Result<RemoteSnapshot, AdapterError> {
        let path = &request.source.reference;
        let payload = tokio::fs::read_to_string(path)
            .await
            .map_err(|error| match error.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    AdapterError::Unavailable(format!("cannot read {path}: {error}"))
                }
                _ => AdapterError::Other(format!("failed to read {path}: {error}")),
            })?;

        serde_json::from_str(&payload)
            .map_err(|error| AdapterError::Other(format!("invalid snapshot in {path}: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListId, SyncSource};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn request(reference: &str) -> SyncRequest {
        SyncRequest {
            list_id: ListId::new(),
            source: SyncSource::new(FILE_PROVIDER, reference).unwrap(),
            last_synced_at: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reads_snapshot_from_disk() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("parks.json");
        std::fs::write(
            &path,
            r#"{"name": "Parks", "items": [{"external_id": "p1", "name": "Dolores", "weight": 2}]}"#,
        )
        .unwrap();

        let snapshot = JsonFileAdapter::new()
            .fetch(&request(path.to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("Parks"));
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].fields.weight, Some(2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_file_is_unavailable() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("absent.json");
        let result = JsonFileAdapter::new()
            .fetch(&request(path.to_str().unwrap()))
            .await;
        assert!(matches!(result, Err(AdapterError::Unavailable(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_file_is_other_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let result = JsonFileAdapter::new()
            .fetch(&request(path.to_str().unwrap()))
            .await;
        assert!(matches!(result, Err(AdapterError::Other(_))));
    }
}
