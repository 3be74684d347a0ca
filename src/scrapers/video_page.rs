//! Video page metadata extraction.
//!
//! Pulls title, thumbnail, categories, actors, tags, duration and embed URL
//! out of a video page's HTML. Every field is a list of CSS probes tried in
//! order; the first usable value wins for scalar fields and all usable values
//! are gathered for list fields.
//!
//! # Filtering
//!
//! | Field | Length | Other rules |
//! |-------|--------|-------------|
//! | categories | 2..=40 | not numeric, not a navigation word |
//! | actors | 3..=50 | has a letter, at most 5 words, not a navigation word |
//! | tags | 2..=40 | as categories, and not already a category or actor |
//!
//! Lists are deduplicated case-insensitively keeping the first spelling.

use crate::config::ScraperConfig;
use crate::fetch::{FetchError, PageFetcher};
use crate::models::VideoMetadata;
use crate::utils::collapse_whitespace;
use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use url::Url;

const MAX_CATEGORIES: usize = 20;
const MAX_ACTORS: usize = 20;
const MAX_TAGS: usize = 40;
const MAX_SITE_SUFFIX_CHARS: usize = 30;

/// How a probe turns a matched element into a raw value.
#[derive(Clone, Copy)]
enum Pick {
    /// Read one attribute.
    Attr(&'static str),
    /// `content` when present, otherwise the element text.
    ContentOrText,
    /// Comma-separated attribute, one value per item.
    CommaList(&'static str),
}

struct Probe {
    selector: Selector,
    pick: Pick,
}

fn probe(css: &str, pick: Pick) -> Probe {
    Probe {
        selector: Selector::parse(css).expect("static selector"),
        pick,
    }
}

static TITLE_PROBES: Lazy<Vec<Probe>> = Lazy::new(|| {
    vec![
        probe(r#"meta[property="og:title"]"#, Pick::Attr("content")),
        probe(r#"meta[name="twitter:title"]"#, Pick::Attr("content")),
        probe("h1", Pick::ContentOrText),
    ]
});

static DOCUMENT_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("static selector"));

static THUMBNAIL_PROBES: Lazy<Vec<Probe>> = Lazy::new(|| {
    vec![
        probe(r#"meta[property="og:image"]"#, Pick::Attr("content")),
        probe(r#"meta[name="twitter:image"]"#, Pick::Attr("content")),
        probe("video[poster]", Pick::Attr("poster")),
        probe(r#"link[rel="image_src"]"#, Pick::Attr("href")),
        probe(r#"meta[itemprop="thumbnailUrl"]"#, Pick::Attr("content")),
    ]
});

static EMBED_PROBES: Lazy<Vec<Probe>> = Lazy::new(|| {
    vec![
        probe(r#"meta[property="og:video:url"]"#, Pick::Attr("content")),
        probe(r#"meta[property="og:video"]"#, Pick::Attr("content")),
        probe(r#"meta[itemprop="embedUrl"]"#, Pick::Attr("content")),
    ]
});

static CATEGORY_PROBES: Lazy<Vec<Probe>> = Lazy::new(|| {
    vec![
        probe(".categories a", Pick::ContentOrText),
        probe(".video-categories a", Pick::ContentOrText),
        probe(r#"a[href*="/categories/"]"#, Pick::ContentOrText),
        probe(r#"a[href*="/category/"]"#, Pick::ContentOrText),
    ]
});

static ACTOR_PROBES: Lazy<Vec<Probe>> = Lazy::new(|| {
    vec![
        probe(r#"[itemprop="actor"] [itemprop="name"]"#, Pick::ContentOrText),
        probe(r#"meta[property="video:actor"]"#, Pick::Attr("content")),
        probe(".actors a", Pick::ContentOrText),
        probe(".models a", Pick::ContentOrText),
        probe(r#"a[href*="/actors/"]"#, Pick::ContentOrText),
        probe(r#"a[href*="/models/"]"#, Pick::ContentOrText),
        probe(r#"a[href*="/stars/"]"#, Pick::ContentOrText),
    ]
});

static TAG_PROBES: Lazy<Vec<Probe>> = Lazy::new(|| {
    vec![
        probe(r#"meta[property="video:tag"]"#, Pick::Attr("content")),
        probe(r#"meta[name="keywords"]"#, Pick::CommaList("content")),
        probe(".tags a", Pick::ContentOrText),
        probe(".video-tags a", Pick::ContentOrText),
        probe(r#"a[href*="/tags/"]"#, Pick::ContentOrText),
        probe(r#"a[href*="/tag/"]"#, Pick::ContentOrText),
    ]
});

static DURATION_SECONDS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="video:duration"]"#).expect("static selector")
});

static DURATION_ISO: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[itemprop="duration"]"#).expect("static selector"));

/// Link captions that are page navigation, not labels.
static NAV_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(more|all|see all|show more|show all|view all|suggest|edit|\+\s*\d+|\d+\s+more)$")
        .expect("static regex")
});

static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\s.,:]+$").expect("static regex"));

static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$")
        .expect("static regex")
});

fn pick_values(element: ElementRef<'_>, pick: Pick) -> Vec<String> {
    let raw = match pick {
        Pick::Attr(name) => element.value().attr(name).map(str::to_string),
        Pick::ContentOrText => Some(
            element
                .value()
                .attr("content")
                .map(str::to_string)
                .unwrap_or_else(|| element.text().collect::<Vec<_>>().join(" ")),
        ),
        Pick::CommaList(name) => {
            return element
                .value()
                .attr(name)
                .map(|list| list.split(',').map(collapse_whitespace).collect())
                .unwrap_or_default();
        }
    };
    raw.map(|v| vec![collapse_whitespace(&v)]).unwrap_or_default()
}

/// All non-empty values of every probe, in probe then document order.
fn probe_values(document: &Html, probes: &[Probe]) -> Vec<String> {
    probes
        .iter()
        .flat_map(|p| {
            document
                .select(&p.selector)
                .flat_map(move |el| pick_values(el, p.pick))
        })
        .filter(|v| !v.is_empty())
        .collect()
}

fn first_value(document: &Html, probes: &[Probe]) -> Option<String> {
    probe_values(document, probes).into_iter().next()
}

/// Drop a trailing `" - Site"` / `" | Site"` segment from a document title.
fn strip_site_suffix(title: &str) -> String {
    let cut = [" - ", " | "]
        .iter()
        .filter_map(|sep| title.rfind(sep).map(|i| (i, sep.len())))
        .max_by_key(|(i, _)| *i);
    if let Some((i, sep_len)) = cut {
        let head = title[..i].trim();
        let tail = title[i + sep_len..].trim();
        if !head.is_empty() && tail.chars().count() <= MAX_SITE_SUFFIX_CHARS {
            return head.to_string();
        }
    }
    title.to_string()
}

fn extract_title(document: &Html) -> Option<String> {
    if let Some(title) = first_value(document, &TITLE_PROBES) {
        return Some(title);
    }
    document
        .select(&DOCUMENT_TITLE)
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .find(|t| !t.is_empty())
        .map(|t| strip_site_suffix(&t))
}

/// Resolve against the page and keep only http(s) results.
fn resolve_http(page_url: &Url, raw: &str) -> Option<String> {
    let resolved = page_url.join(raw.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn first_resolved(document: &Html, probes: &[Probe], page_url: &Url) -> Option<String> {
    probe_values(document, probes)
        .iter()
        .find_map(|raw| resolve_http(page_url, raw))
}

fn is_label(value: &str, min: usize, max: usize) -> bool {
    let len = value.chars().count();
    (min..=max).contains(&len) && !NUMERIC.is_match(value) && !NAV_WORD.is_match(value)
}

fn is_category(value: &str) -> bool {
    is_label(value, 2, 40)
}

fn is_actor(value: &str) -> bool {
    is_label(value, 3, 50)
        && value.chars().any(char::is_alphabetic)
        && value.split_whitespace().count() <= 5
}

/// Filter, dedupe case-insensitively and cap a list of raw values.
fn clean_list(
    values: Vec<String>,
    keep: impl Fn(&str) -> bool,
    exclude: &HashSet<String>,
    cap: usize,
) -> Vec<String> {
    values
        .into_iter()
        .filter(|v| keep(v.as_str()))
        .filter(|v| !exclude.contains(&v.to_lowercase()))
        .unique_by(|v| v.to_lowercase())
        .take(cap)
        .collect()
}

/// Parse `PT1H2M3S`-style durations into whole seconds.
///
/// `None` when the value is malformed or does not fit in a `u64`.
fn parse_iso_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw == "P" || raw == "PT" {
        return None;
    }
    let caps = ISO_DURATION.captures(raw)?;
    if caps.iter().skip(1).all(|m| m.is_none()) {
        return None;
    }
    let seconds = match caps.get(4) {
        Some(m) => {
            let secs = m.as_str().parse::<f64>().ok()?.floor();
            if secs >= u64::MAX as f64 {
                return None;
            }
            secs as u64
        }
        None => 0,
    };
    [(1, 86_400u64), (2, 3_600), (3, 60)]
        .into_iter()
        .try_fold(seconds, |total, (group, unit)| {
            let count: u64 = match caps.get(group) {
                Some(m) => m.as_str().parse().ok()?,
                None => 0,
            };
            count.checked_mul(unit)?.checked_add(total)
        })
}

fn extract_duration(document: &Html) -> Option<u64> {
    let from_seconds = document
        .select(&DURATION_SECONDS)
        .filter_map(|el| el.value().attr("content"))
        .find_map(|v| v.trim().parse::<u64>().ok());
    from_seconds.or_else(|| {
        document
            .select(&DURATION_ISO)
            .filter_map(|el| el.value().attr("content"))
            .find_map(parse_iso_duration)
    })
}

/// Extract [`VideoMetadata`] from a video page.
///
/// # Arguments
///
/// * `html` - The page body
/// * `page_url` - Where the page came from; relative thumbnail and embed
///   URLs are resolved against it
/// * `config` - Supplies the default title and thumbnail
/// * `scraped_at` - Stamped into [`VideoMetadata::scraped_at`]
///
/// # Returns
///
/// The extracted metadata. Missing title and thumbnail fall back to the
/// configured defaults; list fields are empty when nothing usable is found.
pub fn extract_metadata(
    html: &str,
    page_url: &Url,
    config: &ScraperConfig,
    scraped_at: DateTime<Utc>,
) -> VideoMetadata {
    let document = Html::parse_document(html);

    let title = extract_title(&document).unwrap_or_else(|| config.default_title.clone());
    let thumbnail = first_resolved(&document, &THUMBNAIL_PROBES, page_url)
        .unwrap_or_else(|| config.default_thumbnail.clone());

    let none = HashSet::new();
    let categories = clean_list(
        probe_values(&document, &CATEGORY_PROBES),
        is_category,
        &none,
        MAX_CATEGORIES,
    );
    let actors = clean_list(
        probe_values(&document, &ACTOR_PROBES),
        is_actor,
        &none,
        MAX_ACTORS,
    );
    let taken: HashSet<String> = categories
        .iter()
        .chain(actors.iter())
        .map(|v| v.to_lowercase())
        .collect();
    let tags = clean_list(
        probe_values(&document, &TAG_PROBES),
        is_category,
        &taken,
        MAX_TAGS,
    );

    let metadata = VideoMetadata {
        url: page_url.to_string(),
        title,
        thumbnail,
        categories,
        actors,
        tags,
        duration_seconds: extract_duration(&document),
        embed_url: first_resolved(&document, &EMBED_PROBES, page_url),
        scraped_at: scraped_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    debug!(
        categories = metadata.categories.len(),
        actors = metadata.actors.len(),
        tags = metadata.tags.len(),
        "Extracted metadata"
    );
    metadata
}

/// Fetch a page and extract its metadata, stamped with the current time.
///
/// # Returns
///
/// The metadata, or the [`FetchError`] of the failed fetch. Extraction itself
/// never fails.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn scrape_url<F>(
    fetcher: &F,
    url: &Url,
    config: &ScraperConfig,
) -> Result<VideoMetadata, FetchError>
where
    F: PageFetcher,
{
    let html = fetcher.fetch(url).await?;
    let metadata = extract_metadata(&html, url, config, Utc::now());
    info!(title = %metadata.title, "Scraped video page");
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html>
<head>
  <title>Sunset Timelapse - ClipHub</title>
  <meta property="og:title" content="  Sunset   Timelapse  ">
  <meta property="og:image" content="/thumbs/42.jpg">
  <meta property="og:video:url" content="https://videos.example.com/embed/42">
  <meta property="video:duration" content="754">
  <meta property="video:tag" content="Nature">
  <meta name="keywords" content="sunset, timelapse , 4k, , Nature">
  <meta property="video:actor" content="Jane Roe">
</head>
<body>
  <h1>Ignored because og:title wins</h1>
  <div class="categories">
    <a href="/categories/nature">Nature</a>
    <a href="/categories/travel"> Travel </a>
    <a href="/categories/">More</a>
    <a href="/categories/travel">travel</a>
    <a href="/categories/1080">1080</a>
  </div>
  <div class="models">
    <a href="/models/jane-roe">Jane Roe</a>
    <a href="/models/jd">JD</a>
    <a href="/models/x">An Extremely Long Caption With Far Too Many Words</a>
  </div>
  <ul class="tags">
    <li><a href="/tags/sunset">Sunset</a></li>
    <li><a href="/tags/jane-roe">Jane Roe</a></li>
    <li><a href="/tags/all">See all</a></li>
    <li><a href="/tags/x">x</a></li>
  </ul>
</body>
</html>"#;

    fn page_url() -> Url {
        Url::parse("https://videos.example.com/watch/42").unwrap()
    }

    fn scraped_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T09:30:00.250Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn extract(html: &str) -> VideoMetadata {
        extract_metadata(html, &page_url(), &ScraperConfig::default(), scraped_at())
    }

    #[test]
    fn test_extracts_full_page() {
        let meta = extract(PAGE);

        assert_eq!(meta.url, "https://videos.example.com/watch/42");
        assert_eq!(meta.scraped_at, "2026-10-18T09:30:00Z");
        assert_eq!(meta.title, "Sunset Timelapse");
        assert_eq!(meta.thumbnail, "https://videos.example.com/thumbs/42.jpg");
        assert_eq!(meta.categories, vec!["Nature", "Travel"]);
        assert_eq!(meta.actors, vec!["Jane Roe"]);
        // "Nature" is a category and "Jane Roe" an actor; both drop out of tags
        assert_eq!(meta.tags, vec!["sunset", "timelapse", "4k"]);
        assert_eq!(meta.duration_seconds, Some(754));
        assert_eq!(
            meta.embed_url.as_deref(),
            Some("https://videos.example.com/embed/42")
        );
    }

    #[test]
    fn test_defaults_substituted_for_empty_page() {
        let config = ScraperConfig::default();
        let meta = extract("<html><body></body></html>");

        assert_eq!(meta.title, config.default_title);
        assert_eq!(meta.thumbnail, config.default_thumbnail);
        assert!(meta.categories.is_empty());
        assert!(meta.actors.is_empty());
        assert!(meta.tags.is_empty());
        assert_eq!(meta.duration_seconds, None);
        assert_eq!(meta.embed_url, None);
    }

    #[test]
    fn test_title_falls_back_to_h1_then_document_title() {
        let html = "<html><head><title>T</title></head><body><h1> Heading </h1></body></html>";
        let meta = extract(html);
        assert_eq!(meta.title, "Heading");

        let html = "<html><head><title>Rainy Day | ClipHub</title></head></html>";
        let meta = extract(html);
        assert_eq!(meta.title, "Rainy Day");
    }

    #[test]
    fn test_strip_site_suffix() {
        assert_eq!(strip_site_suffix("Clip - Site"), "Clip");
        assert_eq!(strip_site_suffix("A - B | Site"), "A - B");
        assert_eq!(strip_site_suffix("- Site"), "- Site");
        assert_eq!(strip_site_suffix("No separator"), "No separator");
        let long_tail = format!("Clip - {}", "x".repeat(31));
        assert_eq!(strip_site_suffix(&long_tail), long_tail);
    }

    #[test]
    fn test_thumbnail_skips_unusable_values() {
        let html = r#"<html><head>
            <meta property="og:image" content="javascript:void(0)">
            </head><body><video poster="//cdn.example.com/p.jpg"></video></body></html>"#;
        let meta = extract(html);
        assert_eq!(meta.thumbnail, "https://cdn.example.com/p.jpg");
    }

    #[test]
    fn test_itemprop_actor_names() {
        let html = r#"<html><body>
            <div itemprop="actor" itemscope><span itemprop="name">Sam Poe</span></div>
            <div itemprop="actor" itemscope><meta itemprop="name" content="Ann Lee"></div>
            </body></html>"#;
        let meta = extract(html);
        assert_eq!(meta.actors, vec!["Sam Poe", "Ann Lee"]);
    }

    #[test]
    fn test_lists_are_capped() {
        let links: String = (0..60)
            .map(|i| format!(r#"<a href="/tags/t{i}">tag{i}</a>"#))
            .collect();
        let html = format!("<html><body>{links}</body></html>");
        let meta = extract(&html);
        assert_eq!(meta.tags.len(), MAX_TAGS);
        assert_eq!(meta.tags[0], "tag0");
    }

    #[test]
    fn test_label_filters() {
        assert!(is_category("HD"));
        assert!(!is_category("a"));
        assert!(!is_category("2024"));
        assert!(!is_category("+12"));
        assert!(!is_category("Show more"));
        assert!(!is_category(&"x".repeat(41)));

        assert!(is_actor("Jo Smith"));
        assert!(!is_actor("JD"));
        assert!(!is_actor("123"));
        assert!(!is_actor("one two three four five six"));
        assert!(!is_actor("See all"));
        assert!(!is_actor("Show more"));
        assert!(!is_actor("---"));
        assert!(!is_actor("+ 12"));
    }

    /// Drop the leading sources one at a time; the next one must win each time.
    fn assert_fallback_order(
        sources: &[&str],
        read: impl Fn(&VideoMetadata) -> Option<String>,
        expected: &[&str],
    ) {
        for (skip, want) in expected.iter().enumerate() {
            let html = format!("<html><body>{}</body></html>", sources[skip..].concat());
            let meta = extract(&html);
            assert_eq!(read(&meta).as_deref(), Some(*want), "with {skip} sources removed");
        }
    }

    #[test]
    fn test_title_fallback_order() {
        let sources = [
            r#"<meta property="og:title" content="From OpenGraph">"#,
            r#"<meta name="twitter:title" content="From Twitter">"#,
            "<h1>From Heading</h1>",
        ];
        assert_fallback_order(
            &sources,
            |m| Some(m.title.clone()),
            &["From OpenGraph", "From Twitter", "From Heading"],
        );

        let html = "<html><head><title>From Document - ClipHub</title></head></html>";
        assert_eq!(extract(html).title, "From Document");
    }

    #[test]
    fn test_thumbnail_fallback_order() {
        let sources = [
            r#"<meta property="og:image" content="/og.jpg">"#,
            r#"<meta name="twitter:image" content="/twitter.jpg">"#,
            r#"<video poster="/poster.jpg"></video>"#,
            r#"<link rel="image_src" href="/link.jpg">"#,
            r#"<meta itemprop="thumbnailUrl" content="/itemprop.jpg">"#,
        ];
        assert_fallback_order(
            &sources,
            |m| Some(m.thumbnail.clone()),
            &[
                "https://videos.example.com/og.jpg",
                "https://videos.example.com/twitter.jpg",
                "https://videos.example.com/poster.jpg",
                "https://videos.example.com/link.jpg",
                "https://videos.example.com/itemprop.jpg",
            ],
        );
    }

    #[test]
    fn test_embed_fallback_order() {
        let sources = [
            r#"<meta property="og:video:url" content="/embed/url">"#,
            r#"<meta property="og:video" content="/embed/video">"#,
            r#"<meta itemprop="embedUrl" content="/embed/itemprop">"#,
        ];
        assert_fallback_order(
            &sources,
            |m| m.embed_url.clone(),
            &[
                "https://videos.example.com/embed/url",
                "https://videos.example.com/embed/video",
                "https://videos.example.com/embed/itemprop",
            ],
        );
    }

    #[test]
    fn test_parse_iso_duration() {
        assert_eq!(parse_iso_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso_duration("PT90S"), Some(90));
        assert_eq!(parse_iso_duration("PT12M"), Some(720));
        assert_eq!(parse_iso_duration("PT4.9S"), Some(4));
        assert_eq!(parse_iso_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso_duration("PT"), None);
        assert_eq!(parse_iso_duration("12:00"), None);
    }

    #[test]
    fn test_parse_iso_duration_rejects_overflow() {
        assert_eq!(parse_iso_duration("P999999999999999D"), None);
        assert_eq!(parse_iso_duration("PT99999999999999999H"), None);
        assert_eq!(parse_iso_duration("P99999999999999999999999D"), None);
        assert_eq!(parse_iso_duration("PT1e30S"), None);
        assert_eq!(parse_iso_duration("PT100000000000000000000000S"), None);

        let html = r#"<html><body><meta itemprop="duration" content="P999999999999999D"></body></html>"#;
        assert_eq!(extract(html).duration_seconds, None);
    }

    #[test]
    fn test_duration_from_itemprop() {
        let html = r#"<html><body><meta itemprop="duration" content="PT5M30S"></body></html>"#;
        let meta = extract(html);
        assert_eq!(meta.duration_seconds, Some(330));
    }

    struct StaticPage(&'static str);

    impl PageFetcher for StaticPage {
        async fn fetch(&self, _url: &Url) -> Result<String, FetchError> {
            Ok(self.0.to_string())
        }
    }

    struct Gone;

    impl PageFetcher for Gone {
        async fn fetch(&self, _url: &Url) -> Result<String, FetchError> {
            Err(FetchError::Status(410))
        }
    }

    #[tokio::test]
    async fn test_scrape_url() {
        let meta = scrape_url(&StaticPage(PAGE), &page_url(), &ScraperConfig::default())
            .await
            .unwrap();
        assert_eq!(meta.title, "Sunset Timelapse");

        let err = scrape_url(&Gone, &page_url(), &ScraperConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(410)));
    }
}
