//! Data models shared by the scraper, the HTTP proxy and the catalog tools.
//!
//! - [`VideoMetadata`]: what the proxy extracts from a video page
//! - [`Document`]: one record of a catalog collection
//! - [`SeedFile`]: the YAML layout consumed by the seed loader
//!
//! Field names serialize in camelCase because the web front-end reads these
//! payloads directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Metadata scraped from a single video page.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// The page the metadata was scraped from.
    pub url: String,
    /// Page title with any trailing site-name segment removed.
    pub title: String,
    /// Absolute thumbnail URL, or the configured placeholder.
    pub thumbnail: String,
    pub categories: Vec<String>,
    pub actors: Vec<String>,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    /// RFC 3339 UTC timestamp of the scrape.
    pub scraped_at: String,
}

impl VideoMetadata {
    /// Fields that the seed enricher copies into a catalog document.
    ///
    /// Returns `(field, value)` pairs in a stable order.
    pub fn document_fields(&self) -> Vec<(&'static str, Value)> {
        let mut fields = vec![
            ("title", Value::from(self.title.clone())),
            ("thumbnail", Value::from(self.thumbnail.clone())),
            ("categories", Value::from(self.categories.clone())),
            ("actors", Value::from(self.actors.clone())),
            ("tags", Value::from(self.tags.clone())),
        ];
        if let Some(secs) = self.duration_seconds {
            fields.push(("durationSeconds", Value::from(secs)));
        }
        fields
    }
}

/// A catalog document: an id plus its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self { id: id.into(), data }
    }
}

/// Seed data, keyed by collection name.
///
/// ```yaml
/// collections:
///   videos:
///     - id: first-clip
///       title: First clip
///       sourceUrl: https://videos.example.com/watch/123
///   categories:
///     - id: music
///       name: Music
/// ```
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SeedFile {
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<Value>>,
}
