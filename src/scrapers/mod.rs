//! Page scrapers.
//!
//! | Page kind | Module | Method |
//! |-----------|--------|--------|
//! | Video watch page | [`video_page`] | HTML scraping with CSS probe fallbacks |
//!
//! Scrapers take an already-fetched body for extraction so the heuristics
//! stay synchronous and testable; `scrape_url` wraps fetch + extract.

pub mod video_page;

pub use video_page::scrape_url;
