//! YAML configuration for the proxy, the scraper defaults, the sitemap and
//! the local document store.
//!
//! Every field has a default so an empty (or absent) file is valid. CLI flags
//! override the values loaded here; see [`crate::cli`].
//!
//! ```yaml
//! server:
//!   host: 127.0.0.1
//!   port: 8787
//!   allowed_origins: ["https://catalog.example.com"]
//!   allowed_hosts: ["videos.example.com"]
//! scraper:
//!   timeout_secs: 15
//!   max_retries: 2
//! sitemap:
//!   base_url: https://catalog.example.com
//!   static_routes:
//!     - path: /
//!       priority: 1.0
//!   collections:
//!     - name: videos
//!       route: video
//! store:
//!   root: ./data
//! ```

use crate::utils::BoxError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scraper: ScraperConfig,
    pub sitemap: SitemapConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Hosts the proxy may fetch from. Empty means any host.
    pub allowed_hosts: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            allowed_origins: Vec::new(),
            allowed_hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub base_delay_ms: u64,
    /// Substituted when a page has no usable title.
    pub default_title: String,
    /// Substituted when a page has no usable thumbnail.
    pub default_thumbnail: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("catalog_scrape/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 15,
            max_retries: 2,
            base_delay_ms: 500,
            default_title: "Untitled video".to_string(),
            default_thumbnail: "/images/placeholder.jpg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SitemapConfig {
    pub base_url: String,
    pub static_routes: Vec<StaticRoute>,
    pub collections: Vec<CollectionRoute>,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        let route = |path: &str, changefreq: &str, priority: f32| StaticRoute {
            path: path.to_string(),
            changefreq: Some(changefreq.to_string()),
            priority: Some(priority),
        };
        Self {
            base_url: "http://localhost:3000".to_string(),
            static_routes: vec![
                route("/", "daily", 1.0),
                route("/categories", "weekly", 0.8),
                route("/actors", "weekly", 0.8),
                route("/about", "monthly", 0.3),
            ],
            collections: vec![
                CollectionRoute::new("videos", "video"),
                CollectionRoute::new("categories", "category"),
                CollectionRoute::new("actors", "actor"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticRoute {
    pub path: String,
    #[serde(default)]
    pub changefreq: Option<String>,
    #[serde(default)]
    pub priority: Option<f32>,
}

/// Maps a store collection to the front-end route that renders its documents.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectionRoute {
    pub name: String,
    pub route: String,
    #[serde(default)]
    pub changefreq: Option<String>,
    #[serde(default)]
    pub priority: Option<f32>,
}

impl CollectionRoute {
    pub fn new(name: &str, route: &str) -> Self {
        Self {
            name: name.to_string(),
            route: route.to_string(),
            changefreq: Some("weekly".to_string()),
            priority: Some(0.6),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

/// Load the configuration file, or defaults when `path` is `None`.
#[instrument(level = "info", skip_all)]
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig, BoxError> {
    let Some(path) = path else {
        info!("No config file given; using defaults");
        return Ok(AppConfig::default());
    };
    let raw = tokio::fs::read_to_string(path).await?;
    let config = parse_config(&raw)?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Parse YAML config text. Blank input yields defaults.
pub fn parse_config(raw: &str) -> Result<AppConfig, BoxError> {
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_config_is_default() {
        let config = parse_config("  \n").unwrap();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.scraper.default_title, "Untitled video");
        assert_eq!(config.sitemap.collections.len(), 3);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let yaml = r#"
server:
  port: 9000
  allowed_hosts: ["videos.example.com"]
sitemap:
  base_url: https://catalog.example.com/
  collections:
    - name: videos
      route: watch
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.allowed_hosts, vec!["videos.example.com"]);
        assert_eq!(config.sitemap.base_url, "https://catalog.example.com/");
        assert_eq!(config.sitemap.collections[0].route, "watch");
        assert_eq!(config.sitemap.collections[0].changefreq, None);
        // static_routes not given, so the defaults stay
        assert_eq!(config.sitemap.static_routes.len(), 4);
        assert_eq!(config.scraper.timeout_secs, 15);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(parse_config("server: [unclosed").is_err());
    }

    #[tokio::test]
    async fn test_load_config_without_path() {
        let config = load_config(None).await.unwrap();
        assert_eq!(config.store.root, PathBuf::from("./data"));
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "store:\n  root: /srv/catalog\n").unwrap();
        let config = load_config(Some(&path)).await.unwrap();
        assert_eq!(config.store.root, PathBuf::from("/srv/catalog"));
    }
}
