//! Concurrent crawl orchestrator.
//!
//! A [`Crawler`] schedules page fetches, enforces the host allow-list and
//! per-host concurrency ceilings, suppresses revisits, serves cached responses
//! and dispatches parsed HTML to handlers registered per CSS selector.
//!
//! Fetches run as spawned tasks. Parsing and handler dispatch happen
//! synchronously once a fetch completes, so handlers never observe a
//! suspension point and may schedule further visits directly.

pub mod limits;
mod page;
mod work;

pub use limits::LimitRule;
pub use page::{Element, Page};

use crate::cache::ResponseCache;
use crate::config::CrawlConfig;
use crate::error::{ConfigError, CrawlError};
use crate::transport::{Request, Response, Transport};
use limits::Limits;
use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use url::Url;
use work::WorkGroup;

/// Callback invoked for each element matching a handler's selector.
pub type HtmlHandler = Arc<dyn Fn(&Element<'_>) + Send + Sync>;

/// Callback invoked when a scheduled fetch fails.
pub type ErrorObserver = Arc<dyn Fn(&Url, &CrawlError) + Send + Sync>;

/// Construction parameters for a crawler family.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Hosts that may be fetched. Empty allows every host.
    pub allowed_domains: Vec<String>,

    /// Concurrency ceilings, first match wins.
    pub limits: Vec<LimitRule>,

    /// Upper bound on a single transport round trip.
    pub request_timeout: Duration,

    /// User agents rotated across requests. Empty sends none.
    pub user_agents: Vec<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            limits: vec![LimitRule::default()],
            request_timeout: Duration::from_secs(60),
            user_agents: Vec::new(),
        }
    }
}

impl CrawlOptions {
    /// Options restricting a crawl to `host` with configured limits.
    pub fn for_host(host: &str, config: &CrawlConfig) -> Self {
        Self {
            allowed_domains: vec![host.to_string()],
            limits: vec![LimitRule {
                domain_glob: config.domain_glob.clone(),
                parallelism: config.parallelism,
            }],
            request_timeout: Duration::from_secs(config.request_timeout_sec),
            user_agents: config.user_agents.clone(),
        }
    }
}

/// Round-robin user agent source.
#[derive(Debug)]
struct UserAgentPool {
    agents: Vec<String>,
    next: AtomicUsize,
}

impl UserAgentPool {
    fn new(agents: Vec<String>) -> Self {
        Self {
            agents,
            next: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Option<&str> {
        if self.agents.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        Some(&self.agents[index])
    }
}

/// State shared by a crawler and all of its siblings.
struct Shared {
    transport: Arc<dyn Transport>,
    cache: Option<ResponseCache>,
    allowed_domains: Vec<String>,
    visited: Mutex<HashSet<String>>,
    user_agents: UserAgentPool,
    request_timeout: Duration,
    work: Arc<WorkGroup>,
}

struct Handler {
    selector: Selector,
    callback: HtmlHandler,
}

struct Inner {
    shared: Arc<Shared>,
    limits: Limits,
    handlers: RwLock<Vec<Arc<Handler>>>,
    observers: RwLock<Vec<ErrorObserver>>,
}

/// Handle to a crawler. Clones refer to the same crawler.
#[derive(Clone)]
pub struct Crawler {
    inner: Arc<Inner>,
}

impl fmt::Debug for Crawler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crawler")
            .field("transport", &self.inner.shared.transport.name())
            .field("allowed_domains", &self.inner.shared.allowed_domains)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    /// Creates the first crawler of a new family.
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Option<ResponseCache>,
        options: CrawlOptions,
    ) -> Result<Self, ConfigError> {
        let limits = Limits::compile(&options.limits)?;
        let shared = Shared {
            transport,
            cache,
            allowed_domains: options
                .allowed_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            visited: Mutex::new(HashSet::new()),
            user_agents: UserAgentPool::new(options.user_agents),
            request_timeout: options.request_timeout,
            work: Arc::new(WorkGroup::new()),
        };

        Ok(Self::with_shared(Arc::new(shared), limits))
    }

    fn with_shared(shared: Arc<Shared>, limits: Limits) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared,
                limits,
                handlers: RwLock::new(Vec::new()),
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Derives a crawler that shares allow-list, cache, transport, visited
    /// set and work tracking, with its own concurrency ceilings and handlers.
    pub fn sibling(&self) -> Crawler {
        Self::with_shared(self.inner.shared.clone(), self.inner.limits.fresh())
    }

    /// Registers `handler` for elements matching `selector`.
    ///
    /// Handlers run in registration order, each over its matches in document
    /// order.
    pub fn on_html<F>(&self, selector: &str, handler: F) -> Result<(), CrawlError>
    where
        F: Fn(&Element<'_>) + Send + Sync + 'static,
    {
        let parsed = Selector::parse(selector).map_err(|e| CrawlError::InvalidSelector {
            selector: selector.to_string(),
            message: e.to_string(),
        })?;

        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(Handler {
                selector: parsed,
                callback: Arc::new(handler),
            }));
        Ok(())
    }

    /// Registers an observer for failed fetches.
    pub fn on_error<F>(&self, observer: F)
    where
        F: Fn(&Url, &CrawlError) + Send + Sync + 'static,
    {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    /// Schedules a fetch of `url`.
    ///
    /// Fails synchronously when the URL is invalid, its host is not allowed,
    /// or it was already scheduled by this crawler family.
    pub fn visit(&self, url: &str) -> Result<(), CrawlError> {
        let url = canonicalize(url)?;
        self.schedule(url, false)
    }

    /// Visits `seed` and waits for every fetch it transitively schedules.
    ///
    /// Only a failure of the seed itself fails the run.
    pub async fn run(&self, seed: &str) -> Result<(), CrawlError> {
        let url = canonicalize(seed)?;
        self.inner.shared.work.reset();
        self.schedule(url, true)?;
        self.wait().await
    }

    /// Waits until no fetch is outstanding across the crawler family.
    pub async fn wait(&self) -> Result<(), CrawlError> {
        self.inner.shared.work.wait().await
    }

    fn is_allowed(&self, host: &str) -> bool {
        let allowed = &self.inner.shared.allowed_domains;
        allowed.is_empty() || allowed.iter().any(|d| d.eq_ignore_ascii_case(host))
    }

    fn schedule(&self, url: Url, is_seed: bool) -> Result<(), CrawlError> {
        let host = url.host_str().unwrap_or_default();
        if !self.is_allowed(host) {
            return Err(CrawlError::ForbiddenDomain(host.to_string()));
        }

        let inserted = self
            .inner
            .shared
            .visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string());
        if !inserted {
            return Err(CrawlError::AlreadyVisited(url.to_string()));
        }

        let guard = self.inner.shared.work.start();
        let crawler = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            crawler.process(url, is_seed).await;
        });
        Ok(())
    }

    async fn process(&self, url: Url, is_seed: bool) {
        match self.fetch(&url).await {
            Ok(response) => self.dispatch(&url, &response),
            Err(error) => {
                tracing::warn!(url = %url, error = %error, "fetch failed");
                self.notify_error(&url, &error);
                if is_seed {
                    self.inner.shared.work.fail(error);
                }
            }
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Response, CrawlError> {
        let shared = &self.inner.shared;

        // Held until the response is buffered, released before dispatch.
        let _permit = match self.inner.limits.for_host(url.host_str().unwrap_or_default()) {
            Some(semaphore) => semaphore.acquire_owned().await.ok(),
            None => None,
        };

        let mut request = Request::get(url.clone());
        if let Some(agent) = shared.user_agents.next() {
            request = request.with_header(USER_AGENT, agent);
        }
        tracing::debug!(url = %url, "visit");

        let cache = shared
            .cache
            .as_ref()
            .filter(|_| ResponseCache::is_cacheable(&request));
        let cached = match cache {
            Some(cache) => cache.load(&request).await,
            None => None,
        };

        let response = match cached {
            Some(response) => response,
            None => {
                let response = self.round_trip(&request).await?;
                if let Some(cache) = cache
                    && !response.status.is_server_error()
                    && let Err(e) = cache.store(&request, &response).await
                {
                    tracing::warn!(url = %url, error = %e, "failed to cache response");
                }
                response
            }
        };

        tracing::debug!(
            url = %url,
            status = response.status.as_u16(),
            version = %response.version,
            bytes = response.body.len(),
            "response"
        );

        if !response.status.is_success() {
            return Err(CrawlError::HttpStatus {
                url: url.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn round_trip(&self, request: &Request) -> Result<Response, CrawlError> {
        let shared = &self.inner.shared;
        match tokio::time::timeout(shared.request_timeout, shared.transport.round_trip(request))
            .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => Err(CrawlError::Transport {
                url: request.url.to_string(),
                source,
            }),
            Err(_) => Err(CrawlError::Timeout {
                url: request.url.to_string(),
                seconds: shared.request_timeout.as_secs(),
            }),
        }
    }

    /// Parses the response and runs every handler against it.
    ///
    /// Kept synchronous: the parsed document is not `Send`.
    fn dispatch(&self, request_url: &Url, response: &Response) {
        if !response.is_html() {
            tracing::trace!(url = %request_url, content_type = ?response.content_type(), "skipping non-HTML response");
            return;
        }

        let handlers: Vec<Arc<Handler>> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if handlers.is_empty() {
            return;
        }

        let document = Html::parse_document(&response.text());
        let page = Page::new(request_url, &response.url, self);
        for handler in &handlers {
            for element in document.select(&handler.selector) {
                (handler.callback)(&Element::new(&page, element));
            }
        }
    }

    fn notify_error(&self, url: &Url, error: &CrawlError) {
        let observers: Vec<ErrorObserver> = self
            .inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(url, error);
        }
    }
}

/// Parses `raw` as an absolute HTTP(S) URL without a fragment.
fn canonicalize(raw: &str) -> Result<Url, CrawlError> {
    let mut url =
        Url::parse(raw.trim()).map_err(|e| CrawlError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(CrawlError::InvalidUrl(raw.to_string()));
    }
    url.set_fragment(None);
    Ok(url)
}
