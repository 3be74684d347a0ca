//! Page fetching with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`PageFetcher`]: core trait, one HTTP GET returning the page body
//! - [`HttpFetcher`]: `reqwest` implementation sharing one client
//! - [`RetryFetch`]: decorator that adds retries to any [`PageFetcher`]
//!
//! # Retry Strategy
//!
//! - Exponential backoff from the configured base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to each wait
//! - Client errors (4xx except 408 and 429) are returned immediately
//!
//! # Redirects
//!
//! [`HttpFetcher`] follows a redirect only when the next hop would itself
//! pass [`validate_target`]. Otherwise the 3xx response is returned as a
//! [`FetchError::Status`].

use crate::config::ScraperConfig;
use crate::utils::BoxError;
use rand::{Rng, rng};
use reqwest::redirect::Policy;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use url::Url;

/// Why a page could not be fetched.
#[derive(Debug)]
pub enum FetchError {
    /// The upstream answered with a non-success status.
    Status(u16),
    /// Connection, TLS, timeout or body decoding failure.
    Transport(reqwest::Error),
}

impl FetchError {
    /// Whether waiting and trying again can help.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            FetchError::Transport(_) => true,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Status(code) => write!(f, "upstream returned HTTP {code}"),
            FetchError::Transport(e) => write!(f, "request failed: {e}"),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FetchError::Status(_) => None,
            FetchError::Transport(e) => Some(e),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::Transport(e),
        }
    }
}

/// Fetches the HTML body of a page.
pub trait PageFetcher {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<String, FetchError>> + Send;
}

const MAX_REDIRECTS: usize = 10;

/// Follow a redirect only to a target the proxy would accept directly.
fn redirect_policy(allowed_hosts: Vec<String>) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            warn!(to = %attempt.url(), "Too many redirects; stopping");
            attempt.stop()
        } else if let Err(e) = check_target(attempt.url(), &allowed_hosts) {
            warn!(to = %attempt.url(), error = %e, "Refusing redirect");
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

/// `reqwest`-backed fetcher. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build the shared HTTP client.
    ///
    /// # Arguments
    ///
    /// * `config` - User agent and request timeout
    /// * `allowed_hosts` - Hosts redirects may lead to; empty allows any
    ///   `http`/`https` host
    ///
    /// # Returns
    ///
    /// The fetcher, or an error if the TLS backend could not be initialized.
    pub fn new(config: &ScraperConfig, allowed_hosts: &[String]) -> Result<Self, BoxError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect_policy(allowed_hosts.to_vec()))
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Upstream returned non-success status");
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        info!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`PageFetcher`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
#[derive(Clone)]
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: PageFetcher,
{
    /// Wrap a fetcher with retry logic.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher doing the actual requests
    /// * `max_retries` - Retries after the first attempt
    /// * `base_delay` - Wait before the first retry; doubles on each further one
    ///
    /// # Example
    ///
    /// ```ignore
    /// let http = HttpFetcher::new(&config.scraper, &[])?;
    /// let fetcher = RetryFetch::new(http, 2, Duration::from_millis(500));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> PageFetcher for RetryFetch<T>
where
    T: PageFetcher + Sync,
{
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let e = match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };
            attempt += 1;
            let elapsed_ms_total = total_t0.elapsed().as_millis() as u64;

            if attempt > self.max_retries || !e.is_retryable() {
                error!(
                    attempt,
                    max = self.max_retries,
                    elapsed_ms_total,
                    error = %e,
                    "fetch() giving up"
                );
                return Err(e);
            }

            let delay = self.backoff(attempt);
            warn!(
                attempt,
                max = self.max_retries,
                elapsed_ms_total,
                ?delay,
                error = %e,
                "fetch() attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}

/// Build the fetcher the proxy, the `scrape` command and the seed enricher use.
///
/// # Arguments
///
/// * `config` - Scraper settings (user agent, timeout, retry count and delay)
/// * `allowed_hosts` - Redirect allow-list passed to [`HttpFetcher::new`]
///
/// # Returns
///
/// An [`HttpFetcher`] wrapped in [`RetryFetch`], or an error if the HTTP
/// client could not be built.
pub fn build_fetcher(
    config: &ScraperConfig,
    allowed_hosts: &[String],
) -> Result<RetryFetch<HttpFetcher>, BoxError> {
    let http = HttpFetcher::new(config, allowed_hosts)?;
    Ok(RetryFetch::new(
        http,
        config.max_retries,
        Duration::from_millis(config.base_delay_ms),
    ))
}

/// Why a requested target URL was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum TargetError {
    Invalid(String),
    HostNotAllowed(String),
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::Invalid(msg) => write!(f, "invalid url: {msg}"),
            TargetError::HostNotAllowed(host) => write!(f, "host not allowed: {host}"),
        }
    }
}

impl Error for TargetError {}

/// Parse and vet a URL the proxy was asked to fetch.
///
/// # Arguments
///
/// * `raw` - The URL as received; surrounding whitespace is ignored
/// * `allowed_hosts` - Host allow-list; empty allows any host
///
/// # Returns
///
/// The parsed URL when it is `http`/`https`, has a host, and that host
/// equals an allow-list entry or is a subdomain of one.
/// [`TargetError::Invalid`] or [`TargetError::HostNotAllowed`] otherwise.
pub fn validate_target(raw: &str, allowed_hosts: &[String]) -> Result<Url, TargetError> {
    let url = Url::parse(raw.trim()).map_err(|e| TargetError::Invalid(e.to_string()))?;
    check_target(&url, allowed_hosts)?;
    Ok(url)
}

fn check_target(url: &Url, allowed_hosts: &[String]) -> Result<(), TargetError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TargetError::Invalid(format!(
            "unsupported scheme {}",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| TargetError::Invalid("missing host".to_string()))?
        .to_ascii_lowercase();

    if allowed_hosts.is_empty() {
        return Ok(());
    }
    let allowed = allowed_hosts.iter().any(|entry| {
        let entry = entry.trim().trim_start_matches('.').to_ascii_lowercase();
        host == entry || host.ends_with(&format!(".{entry}"))
    });
    if allowed {
        Ok(())
    } else {
        Err(TargetError::HostNotAllowed(host))
    }
}
