//! Sitemap generation.
//!
//! The sitemap lists the configured static routes followed by one URL per
//! document in every configured collection:
//!
//! ```text
//! https://catalog.example.com/
//! https://catalog.example.com/categories
//! https://catalog.example.com/video/first-clip
//! https://catalog.example.com/category/music
//! ```

use crate::config::{CollectionRoute, SitemapConfig};
use crate::models::Document;
use crate::store::DocumentStore;
use crate::utils::{BoxError, ensure_parent_dir};
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde_json::Value;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Fields checked, in order, for a document's last modification date.
const LASTMOD_FIELDS: [&str; 2] = ["updatedAt", "createdAt"];

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<f32>,
}

/// Read a date out of a document field: RFC 3339, `YYYY-MM-DD`, or epoch millis.
fn lastmod_of(doc: &Document) -> Option<String> {
    LASTMOD_FIELDS.iter().find_map(|field| {
        let date = match doc.data.get(*field)? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.date_naive())
                .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
                .ok()?,
            Value::Number(n) => DateTime::<Utc>::from_timestamp_millis(n.as_i64()?)?.date_naive(),
            _ => return None,
        };
        Some(date.format("%Y-%m-%d").to_string())
    })
}

fn static_loc(base: &str, path: &str) -> String {
    format!("{}/{}", base, path.trim_start_matches('/'))
}

fn document_loc(base: &str, collection: &CollectionRoute, id: &str) -> String {
    let route = collection.route.trim_matches('/');
    if route.is_empty() {
        format!("{}/{}", base, urlencoding::encode(id))
    } else {
        format!("{}/{}/{}", base, route, urlencoding::encode(id))
    }
}

/// Gather sitemap entries from config and store, skipping duplicate locations.
#[instrument(level = "info", skip_all)]
pub async fn collect_entries<S>(
    config: &SitemapConfig,
    store: &S,
    today: NaiveDate,
) -> Result<Vec<SitemapEntry>, BoxError>
where
    S: DocumentStore,
{
    let base = config.base_url.trim_end_matches('/');
    let today = today.format("%Y-%m-%d").to_string();
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for route in &config.static_routes {
        let loc = static_loc(base, &route.path);
        if seen.insert(loc.clone()) {
            entries.push(SitemapEntry {
                loc,
                lastmod: Some(today.clone()),
                changefreq: route.changefreq.clone(),
                priority: route.priority,
            });
        }
    }

    for collection in &config.collections {
        let docs = store.list(&collection.name).await?;
        debug!(collection = %collection.name, count = docs.len(), "Adding collection to sitemap");
        for doc in &docs {
            let loc = document_loc(base, collection, &doc.id);
            if seen.insert(loc.clone()) {
                entries.push(SitemapEntry {
                    loc,
                    lastmod: lastmod_of(doc),
                    changefreq: collection.changefreq.clone(),
                    priority: collection.priority,
                });
            }
        }
    }

    info!(count = entries.len(), "Collected sitemap entries");
    Ok(entries)
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<(), BoxError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Render entries as a sitemap `<urlset>` document.
pub fn render_sitemap(entries: &[SitemapEntry]) -> Result<String, BoxError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("urlset").with_attributes([("xmlns", SITEMAP_NS)]),
    ))?;

    for entry in entries {
        writer.write_event(Event::Start(BytesStart::new("url")))?;
        write_text_element(&mut writer, "loc", &entry.loc)?;
        if let Some(lastmod) = &entry.lastmod {
            write_text_element(&mut writer, "lastmod", lastmod)?;
        }
        if let Some(changefreq) = &entry.changefreq {
            write_text_element(&mut writer, "changefreq", changefreq)?;
        }
        if let Some(priority) = entry.priority {
            let priority = format!("{:.1}", priority.clamp(0.0, 1.0));
            write_text_element(&mut writer, "priority", &priority)?;
        }
        writer.write_event(Event::End(BytesEnd::new("url")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("urlset")))?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}

/// Build the sitemap XML from the configured routes and the store.
///
/// # Arguments
///
/// * `config` - Base URL, static routes and the collections to list
/// * `store` - Source of the collection documents
/// * `today` - `lastmod` of the static routes
///
/// # Returns
///
/// The `<urlset>` document, or the first store or XML error.
pub async fn build_sitemap<S>(
    config: &SitemapConfig,
    store: &S,
    today: NaiveDate,
) -> Result<String, BoxError>
where
    S: DocumentStore,
{
    let entries = collect_entries(config, store, today).await?;
    render_sitemap(&entries)
}

/// Write the sitemap to disk, creating parent directories.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_sitemap(path: &Path, xml: &str) -> Result<(), BoxError> {
    ensure_parent_dir(path).await?;
    fs::write(path, xml).await?;
    info!(bytes = xml.len(), "Wrote sitemap");
    Ok(())
}
