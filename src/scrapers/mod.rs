//! Scraper trait and the host registry.
//!
//! Each scraper is a site-specific traversal policy: it registers HTML
//! handlers on a crawler, runs the crawl from a seed URL and returns the
//! collected book.

mod phrack;
mod royalroad;
mod scribblehub;

pub use phrack::PhrackScraper;
pub use royalroad::RoyalRoadScraper;
pub use scribblehub::ScribbleHubScraper;

use crate::book::ScrapedBook;
use crate::crawler::Crawler;
use crate::error::ScraperError;
use async_trait::async_trait;
use std::collections::HashMap;
use url::Url;

/// Trait for site scrapers.
///
/// A scraper registers its handlers on the crawler it is given, so each
/// crawler should be used for a single scrape.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Returns the human-readable name of this scraper.
    fn name(&self) -> &'static str;

    /// Returns the host this scraper handles.
    fn host(&self) -> &'static str;

    /// Crawls from `seed` and returns everything collected.
    async fn scrape(&self, crawler: &Crawler, seed: &Url) -> Result<ScrapedBook, ScraperError>;
}

/// Registry of available scrapers, keyed by host.
pub struct ScraperRegistry {
    scrapers: HashMap<&'static str, Box<dyn Scraper>>,
}

impl Default for ScraperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScraperRegistry {
    /// Creates a new registry with all available scrapers.
    pub fn new() -> Self {
        let scrapers: Vec<Box<dyn Scraper>> = vec![
            Box::new(RoyalRoadScraper),
            Box::new(PhrackScraper),
            Box::new(ScribbleHubScraper),
        ];

        Self {
            scrapers: scrapers.into_iter().map(|s| (s.host(), s)).collect(),
        }
    }

    /// Finds the scraper registered for the URL's host.
    pub fn find_for_url(&self, url: &Url) -> Option<&dyn Scraper> {
        let host = url.host_str()?.to_ascii_lowercase();
        self.scrapers.get(host.as_str()).map(|s| s.as_ref())
    }

    /// Parses `raw` and finds its scraper.
    pub fn resolve(&self, raw: &str) -> Result<(&dyn Scraper, Url), ScraperError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ScraperError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScraperError::InvalidUrl(raw.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ScraperError::InvalidUrl(raw.to_string()))?;

        let scraper = self
            .find_for_url(&url)
            .ok_or_else(|| ScraperError::UnsupportedHost(host.to_string()))?;
        Ok((scraper, url))
    }

    /// Returns the supported hosts, sorted.
    pub fn hosts(&self) -> Vec<&'static str> {
        let mut hosts: Vec<&'static str> = self.scrapers.keys().copied().collect();
        hosts.sort_unstable();
        hosts
    }
}

/// Schedules `url`, logging anything other than an expected revisit.
pub(crate) fn schedule(crawler: &Crawler, url: &str) {
    if let Err(e) = crawler.visit(url)
        && !e.is_revisit()
    {
        tracing::debug!(url, error = %e, "not scheduled");
    }
}
