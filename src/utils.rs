//! Small helpers shared across the scraper, store and sitemap code.
//!
//! - A boxed error alias for `?` propagation across async code
//! - String cleanup for scraped text and log previews
//! - Slug generation for document ids
//! - File system preparation for output files

use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

/// Boxed error that can cross `.await` points in `Send` futures.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (moved back to the nearest char
/// boundary) with `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Collapse every run of whitespace into a single space and trim the ends.
///
/// Scraped text nodes carry indentation and newlines from the page markup.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert a title to an ASCII slug usable as a document id.
///
/// Lowercases, keeps ASCII alphanumerics, turns whitespace, `-` and `_` into
/// single hyphens and drops everything else.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("Hello World"), "hello-world");
/// assert_eq!(slugify("  Top 10: Clips!  "), "top-10-clips");
/// ```
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Create the parent directory of `path` if it has one.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> Result<(), BoxError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
            debug!(parent = %parent.display(), "Ensured parent directory");
        }
    }
    Ok(())
}
