//! Catalog document store.
//!
//! The catalog front-end reads its collections from a hosted document
//! database. [`DocumentStore`] is the seam this crate talks to; the
//! [`JsonDirStore`] implementation keeps one pretty-printed JSON file per
//! document:
//!
//! ```text
//! store_root/
//! ├── videos/
//! │   ├── first-clip.json
//! │   └── second-clip.json
//! └── categories/
//!     └── music.json
//! ```

use crate::models::Document;
use crate::utils::BoxError;
use serde_json::Value;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub trait DocumentStore {
    /// All documents of a collection, sorted by id. Unknown collections are empty.
    fn list(&self, collection: &str) -> impl Future<Output = Result<Vec<Document>, BoxError>> + Send;

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, BoxError>> + Send;

    /// Insert or replace a document.
    fn put(&self, collection: &str, doc: &Document) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Check a collection name or document id before it becomes a path component.
///
/// # Arguments
///
/// * `name` - The collection name or document id
///
/// # Returns
///
/// `Ok(())` when `name` is non-empty, does not start with `.`, and uses only
/// ASCII alphanumerics, `-`, `_` and `.`. An error naming the value otherwise.
pub fn validate_name(name: &str) -> Result<(), BoxError> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(format!("invalid collection or document name: {name:?}").into())
    }
}

#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, BoxError> {
        validate_name(collection)?;
        Ok(self.root.join(collection))
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf, BoxError> {
        validate_name(id)?;
        Ok(self.collection_dir(collection)?.join(format!("{id}.json")))
    }
}

async fn read_document(path: &Path, id: &str) -> Result<Document, BoxError> {
    let raw = fs::read_to_string(path).await?;
    let data: Value = serde_json::from_str(&raw)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(Document::new(id, data))
}

impl DocumentStore for JsonDirStore {
    #[instrument(level = "debug", skip(self))]
    async fn list(&self, collection: &str) -> Result<Vec<Document>, BoxError> {
        let dir = self.collection_dir(collection)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Collection directory missing; treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_name(id).is_err() {
                warn!(path = %path.display(), "Skipping file with unusable name");
                continue;
            }
            docs.push(read_document(&path, id).await?);
        }
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(count = docs.len(), "Listed collection");
        Ok(docs)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BoxError> {
        let path = self.document_path(collection, id)?;
        match read_document(&path, id).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                let not_found = e
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io| io.kind() == ErrorKind::NotFound);
                if not_found { Ok(None) } else { Err(e) }
            }
        }
    }

    #[instrument(level = "debug", skip(self, doc), fields(id = %doc.id))]
    async fn put(&self, collection: &str, doc: &Document) -> Result<(), BoxError> {
        let path = self.document_path(collection, &doc.id)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(&doc.data)?;
        fs::write(&path, json).await?;
        info!(path = %path.display(), "Wrote document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("videos").is_ok());
        assert!(validate_name("clip-01_v2.final").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("spaced name").is_err());
    }

    #[tokio::test]
    async fn test_put_get_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());

        store
            .put("videos", &Document::new("b", json!({"title": "B"})))
            .await
            .unwrap();
        store
            .put("videos", &Document::new("a", json!({"title": "A"})))
            .await
            .unwrap();

        let got = store.get("videos", "a").await.unwrap().unwrap();
        assert_eq!(got.data["title"], "A");
        assert!(dir.path().join("videos/a.json").is_file());

        let ids: Vec<_> = store
            .list("videos")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        store
            .put("videos", &Document::new("a", json!({"title": "Old"})))
            .await
            .unwrap();
        store
            .put("videos", &Document::new("a", json!({"title": "New"})))
            .await
            .unwrap();
        let docs = store.list("videos").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].data["title"], "New");
    }

    #[tokio::test]
    async fn test_missing_collection_and_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        assert!(store.list("nothing").await.unwrap().is_empty());
        assert!(store.get("nothing", "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_ignores_non_json_and_rejects_corrupt_json() {
        let dir = tempfile::tempdir().unwrap();
        let videos = dir.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        std::fs::write(videos.join("notes.txt"), "hi").unwrap();
        std::fs::write(videos.join("ok.json"), "{}").unwrap();

        let store = JsonDirStore::new(dir.path());
        assert_eq!(store.list("videos").await.unwrap().len(), 1);

        std::fs::write(videos.join("broken.json"), "{").unwrap();
        assert!(store.list("videos").await.is_err());
    }

    #[tokio::test]
    async fn test_put_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::new(dir.path());
        let doc = Document::new("../escape", json!({}));
        assert!(store.put("videos", &doc).await.is_err());
        assert!(store.put("../videos", &Document::new("a", json!({}))).await.is_err());
    }
}
