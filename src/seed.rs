//! Seed data loader.
//!
//! Reads a YAML [`SeedFile`] and writes every document into a
//! [`DocumentStore`]. Optionally fills in missing video fields by scraping
//! each document's `sourceUrl` first.

use crate::config::ScraperConfig;
use crate::fetch::PageFetcher;
use crate::models::{Document, SeedFile, VideoMetadata};
use crate::scrapers::scrape_url;
use crate::store::{DocumentStore, validate_name};
use crate::utils::{BoxError, slugify};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::path::Path;
use tracing::{error, info, instrument, warn};
use url::Url;

const PARALLEL_SCRAPES: usize = 8;

/// Field holding the page a catalog entry was taken from.
pub const SOURCE_URL_FIELD: &str = "sourceUrl";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub written: usize,
    pub skipped: usize,
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_seed_file(path: &Path) -> Result<SeedFile, BoxError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let seed: SeedFile = serde_yaml::from_str(&raw)?;
    info!(collections = seed.collections.len(), "Loaded seed file");
    Ok(seed)
}

/// The `id` field (string or integer), else the slugified `title`.
pub fn document_id(value: &Value) -> Option<String> {
    match value.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => return Some(n.to_string()),
        _ => {}
    }
    value
        .get("title")
        .and_then(Value::as_str)
        .map(slugify)
        .filter(|slug| !slug.is_empty())
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

fn needs_enrichment(value: &Value) -> bool {
    ["title", "thumbnail", "categories", "actors", "tags"]
        .iter()
        .any(|field| is_blank(value.get(*field)))
}

/// Whether a scraped value carries information worth copying.
///
/// Empty lists and the configured default title or thumbnail do not.
fn is_scraped_value(field: &str, value: &Value, config: &ScraperConfig) -> bool {
    match (field, value) {
        ("title", Value::String(s)) => *s != config.default_title,
        ("thumbnail", Value::String(s)) => *s != config.default_thumbnail,
        _ => !is_blank(Some(value)),
    }
}

/// Copy scraped fields into a document, leaving existing non-blank values alone.
///
/// Returns the number of fields written.
fn fill_missing(value: &mut Value, metadata: &VideoMetadata, config: &ScraperConfig) -> usize {
    let Some(object) = value.as_object_mut() else {
        return 0;
    };
    let mut filled = 0;
    for (field, scraped) in metadata.document_fields() {
        if is_blank(object.get(field)) && is_scraped_value(field, &scraped, config) {
            object.insert(field.to_string(), scraped);
            filled += 1;
        }
    }
    filled
}

/// Scrape `sourceUrl` for documents with blank video fields and fill them in.
///
/// # Arguments
///
/// * `seed` - Seed documents, updated in place
/// * `fetcher` - Used for up to 8 concurrent page fetches
/// * `config` - Scraper defaults; values equal to them are not copied
///
/// # Returns
///
/// The number of documents that received at least one field. Scrape failures
/// are logged and leave the document untouched.
#[instrument(level = "info", skip_all)]
pub async fn enrich_seed<F>(seed: &mut SeedFile, fetcher: &F, config: &ScraperConfig) -> usize
where
    F: PageFetcher + Sync,
{
    let mut targets = Vec::new();
    for (collection, docs) in &seed.collections {
        for (index, doc) in docs.iter().enumerate() {
            let Some(raw) = doc.get(SOURCE_URL_FIELD).and_then(Value::as_str) else {
                continue;
            };
            if !needs_enrichment(doc) {
                continue;
            }
            match Url::parse(raw) {
                Ok(url) => targets.push((collection.clone(), index, url)),
                Err(e) => warn!(%collection, index, url = raw, error = %e, "Unparseable sourceUrl"),
            }
        }
    }
    info!(count = targets.len(), parallel = PARALLEL_SCRAPES, "Scraping seed sources");

    let scraped: Vec<(String, usize, VideoMetadata)> = stream::iter(targets)
        .map(|(collection, index, url)| async move {
            match scrape_url(fetcher, &url, config).await {
                Ok(metadata) => Some((collection, index, metadata)),
                Err(e) => {
                    error!(%url, error = %e, "Scrape failed; keeping seed document as is");
                    None
                }
            }
        })
        .buffer_unordered(PARALLEL_SCRAPES)
        .filter_map(std::future::ready)
        .collect()
        .await;

    let mut enriched = 0;
    for (collection, index, metadata) in scraped {
        if let Some(doc) = seed
            .collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(index))
        {
            if fill_missing(doc, &metadata, config) > 0 {
                enriched += 1;
            }
        }
    }
    info!(enriched, "Enriched seed documents");
    enriched
}

/// Write every seed document into the store.
///
/// # Arguments
///
/// * `store` - Destination store
/// * `seed` - Parsed seed file, consumed
///
/// # Returns
///
/// How many documents were written and skipped. Non-mapping entries and
/// documents without a usable id are skipped with a warning; an invalid
/// collection name or a store failure aborts the run with an error.
#[instrument(level = "info", skip_all)]
pub async fn seed_store<S>(store: &S, seed: SeedFile) -> Result<SeedReport, BoxError>
where
    S: DocumentStore,
{
    let mut report = SeedReport::default();
    for (collection, docs) in seed.collections {
        validate_name(&collection)?;
        for (index, data) in docs.into_iter().enumerate() {
            if !data.is_object() {
                warn!(%collection, index, "Seed entry is not a mapping; skipping");
                report.skipped += 1;
                continue;
            }
            let Some(id) = document_id(&data).filter(|id| validate_name(id).is_ok()) else {
                warn!(%collection, index, "Seed entry has no usable id or title; skipping");
                report.skipped += 1;
                continue;
            };
            store.put(&collection, &Document::new(id, data)).await?;
            report.written += 1;
        }
    }
    info!(written = report.written, skipped = report.skipped, "Seeding complete");
    Ok(report)
}
