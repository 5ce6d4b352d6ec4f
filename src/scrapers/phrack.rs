//! Phrack (phrack.org) scraper implementation.
//!
//! Issues link to each other in a graph with cycles. Every link is followed
//! once; revisits are suppressed by the crawler, so the walk terminates.
//! Pages finish in any order, so the handlers only record each page's links
//! and the reading order is derived from that graph once the crawl is done.

use super::{Scraper, schedule};
use crate::book::{BookHandle, Chapter, Metadata, ScrapedBook};
use crate::crawler::Crawler;
use crate::error::ScraperError;
use async_trait::async_trait;
use scraper::Selector;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use url::Url;

const TITLE: &str = "Phrack Magazine";
const COVER_URL: &str = "http://phrack.org/images/phrack-logo.jpg";

static ARTICLE_TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".p-title").unwrap());
static PRE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("pre").unwrap());

/// Links found on one fetched page, in document order.
#[derive(Debug, Default)]
struct PageLinks {
    /// Issue navigation links; candidates for the table of contents.
    tissue: Vec<String>,
    /// Links that are followed but never listed.
    details: Vec<String>,
    /// True if the page produced a chapter.
    article: bool,
}

/// Pages seen during the crawl, keyed by request URL.
#[derive(Debug, Default)]
struct IssueGraph {
    pages: HashMap<String, PageLinks>,
}

impl IssueGraph {
    fn page(&mut self, url: &Url) -> &mut PageLinks {
        self.pages.entry(url.as_str().to_string()).or_default()
    }

    /// Article URLs in depth-first discovery order from `seed`.
    ///
    /// A page is listed where its first issue link is met, then walked
    /// before the next link on the same page. Pages without a chapter are
    /// walked through but not listed.
    fn reading_order(&self, seed: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut listed = HashSet::new();
        let mut walked = HashSet::new();
        self.walk(seed, &mut walked, &mut listed, &mut order);
        order.retain(|url| self.pages.get(url).is_some_and(|page| page.article));
        order
    }

    fn walk(
        &self,
        url: &str,
        walked: &mut HashSet<String>,
        listed: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if !walked.insert(url.to_string()) {
            return;
        }
        let Some(page) = self.pages.get(url) else {
            return;
        };

        for link in &page.tissue {
            if listed.insert(link.clone()) {
                order.push(link.clone());
            }
            self.walk(link, walked, listed, order);
        }
        for link in &page.details {
            self.walk(link, walked, listed, order);
        }
    }
}

/// Phrack scraper.
pub struct PhrackScraper;

#[async_trait]
impl Scraper for PhrackScraper {
    fn name(&self) -> &'static str {
        "Phrack"
    }

    fn host(&self) -> &'static str {
        "phrack.org"
    }

    async fn scrape(&self, crawler: &Crawler, seed: &Url) -> Result<ScrapedBook, ScraperError> {
        let book = BookHandle::spawn();
        book.set_metadata(Metadata {
            title: TITLE.to_string(),
            cover_url: COVER_URL.to_string(),
            ..Default::default()
        });
        let graph = Arc::new(Mutex::new(IssueGraph::default()));

        {
            let graph = graph.clone();
            crawler.on_html(".tissue a", move |el| {
                let Some(url) = el.attr("href").and_then(|href| el.absolute_url(href)) else {
                    return;
                };
                graph
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .page(el.request_url())
                    .tissue
                    .push(url.as_str().to_string());
                schedule(el.crawler(), url.as_str());
            })?;
        }

        {
            let graph = graph.clone();
            crawler.on_html(".details a", move |el| {
                let Some(url) = el.attr("href").and_then(|href| el.absolute_url(href)) else {
                    return;
                };
                graph
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .page(el.request_url())
                    .details
                    .push(url.as_str().to_string());
                schedule(el.crawler(), url.as_str());
            })?;
        }

        {
            let book = book.clone();
            let graph = graph.clone();
            crawler.on_html("body", move |el| {
                let Some(pre) = el.child_html(&PRE) else {
                    return;
                };
                graph
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .page(el.request_url())
                    .article = true;
                book.insert_chapter(
                    el.request_url().as_str(),
                    Chapter {
                        title: el.child_text(&ARTICLE_TITLE),
                        content: format!("<pre>{}</pre>", pre),
                    },
                );
            })?;
        }

        tracing::info!(seed = %seed, "scraping Phrack issues");
        crawler.run(seed.as_str()).await?;

        let mut root = seed.clone();
        root.set_fragment(None);
        let order = graph
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reading_order(root.as_str());
        tracing::debug!(articles = order.len(), "derived reading order");
        for url in order {
            book.push_toc(url);
        }
        book.finish().await
    }
}
