//! # Catalog Scrape
//!
//! Server-side tooling for a video catalog web application.
//!
//! ## Features
//!
//! - HTTP proxy that fetches a third-party video page and returns its title,
//!   thumbnail, categories, actors and tags as JSON
//! - Sitemap generation from static routes plus every catalog document
//! - Seed loader that writes fixed documents into the catalog store,
//!   optionally filling blank metadata by scraping each document's source page
//!
//! ## Usage
//!
//! ```sh
//! catalog_scrape serve
//! catalog_scrape scrape https://videos.example.com/watch/123
//! catalog_scrape sitemap --out public/sitemap.xml
//! catalog_scrape seed seed.yaml --enrich
//! ```

use chrono::Utc;
use clap::Parser;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod fetch;
mod models;
mod scrapers;
mod seed;
mod server;
mod sitemap;
mod store;
mod utils;

use cli::{Cli, Command};
use fetch::{build_fetcher, validate_target};
use server::AppState;
use store::JsonDirStore;
use utils::{BoxError, truncate_for_log};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), BoxError> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut config = config::load_config(args.config.as_deref()).await?;
    args.apply_overrides(&mut config);
    let store = JsonDirStore::new(config.store.root.clone());
    info!(store_root = %store.root().display(), "Using document store");

    let result = match args.command {
        Command::Serve { .. } => {
            let fetcher = build_fetcher(&config.scraper, &config.server.allowed_hosts)?;
            server::serve(AppState {
                fetcher,
                store,
                config,
            })
            .await
        }
        Command::Scrape { url } => run_scrape(&config, &url).await,
        Command::Sitemap { out } => {
            let today = Utc::now().date_naive();
            match sitemap::build_sitemap(&config.sitemap, &store, today).await {
                Ok(xml) => sitemap::write_sitemap(&out, &xml).await,
                Err(e) => Err(e),
            }
        }
        Command::Seed { file, enrich } => {
            run_seed(&config, &store, &file, enrich).await
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), millis = elapsed.subsec_millis(), "Execution complete");
    result
}

async fn run_scrape(config: &config::AppConfig, raw: &str) -> Result<(), BoxError> {
    let url = validate_target(raw, &[])?;
    let fetcher = build_fetcher(&config.scraper, &[])?;
    let metadata = scrapers::scrape_url(&fetcher, &url, &config.scraper).await?;
    let json = serde_json::to_string_pretty(&metadata)?;
    debug!(preview = %truncate_for_log(&json, 300), "Scrape result");
    println!("{json}");
    Ok(())
}

async fn run_seed(
    config: &config::AppConfig,
    store: &JsonDirStore,
    file: &std::path::Path,
    enrich: bool,
) -> Result<(), BoxError> {
    let mut seed_file = seed::load_seed_file(file).await?;
    if enrich {
        let fetcher = build_fetcher(&config.scraper, &[])?;
        seed::enrich_seed(&mut seed_file, &fetcher, &config.scraper).await;
    }
    let report = seed::seed_store(store, seed_file).await?;
    info!(written = report.written, skipped = report.skipped, "Seed finished");
    Ok(())
}
