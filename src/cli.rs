//! Command-line interface definitions.
//!
//! Global options can also be provided through environment variables.

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Metadata proxy, sitemap builder and seed loader for the video catalog.
///
/// # Examples
///
/// ```sh
/// # Run the proxy
/// catalog_scrape --config catalog.yaml serve --port 8787
///
/// # Scrape one page and print the JSON
/// catalog_scrape scrape https://videos.example.com/watch/123
///
/// # Regenerate the sitemap from the local store
/// catalog_scrape --store-dir ./data sitemap --out public/sitemap.xml
///
/// # Load seed documents, scraping sourceUrl fields for missing metadata
/// catalog_scrape seed seed.yaml --enrich
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "CATALOG_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Document store directory (overrides `store.root`)
    #[arg(long, env = "CATALOG_STORE_DIR", global = true)]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP metadata proxy
    Serve {
        /// Listen address (overrides `server.host`)
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides `server.port`)
        #[arg(short, long, env = "CATALOG_PORT")]
        port: Option<u16>,
    },
    /// Scrape one video page and print its metadata as JSON
    Scrape {
        url: String,
    },
    /// Write sitemap.xml from the configured routes and the store
    Sitemap {
        #[arg(short, long, default_value = "public/sitemap.xml")]
        out: PathBuf,
    },
    /// Load a YAML seed file into the store
    Seed {
        file: PathBuf,

        /// Fill blank video fields by scraping each document's sourceUrl
        #[arg(long)]
        enrich: bool,
    },
}

impl Cli {
    /// Apply flag values on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.store_dir {
            config.store.root = dir.clone();
        }
        if let Command::Serve { host, port } = &self.command {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
        }
    }
}
