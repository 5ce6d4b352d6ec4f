//! Error types for the ebook scraper.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use thiserror::Error;

/// Errors produced by a transport backend while performing one request.
#[derive(Error, Debug)]
pub enum TransportError {
    /// In-process HTTP client failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The external fetch tool could not be located
    #[error("Fetch tool not found: {0}")]
    BinaryNotFound(String),

    /// The external fetch tool could not be started
    #[error("Failed to spawn fetch tool: {0}")]
    Spawn(#[source] std::io::Error),

    /// The external fetch tool exited unsuccessfully
    #[error("Fetch tool exited with {status}: {stderr}")]
    ExitStatus {
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// The fetch tool output could not be turned into a response
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request cannot be expressed for this transport
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors raised by the crawl orchestrator.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// URL parsing or validation failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Host is not in the allow-list
    #[error("Forbidden domain: {0}")]
    ForbiddenDomain(String),

    /// URL was already scheduled by this crawl
    #[error("Already visited: {0}")]
    AlreadyVisited(String),

    /// Transport failed for this request
    #[error("Fetching {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    /// Server answered with a non-success status
    #[error("Fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Request did not finish in time
    #[error("Fetching {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    /// Handler selector could not be parsed
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

impl CrawlError {
    /// Returns true for rejections that are expected during traversal.
    pub fn is_revisit(&self) -> bool {
        matches!(self, CrawlError::AlreadyVisited(_))
    }
}

/// Main error type for scraping operations.
#[derive(Error, Debug)]
pub enum ScraperError {
    /// No scraper is registered for this host
    #[error("No scraper registered for host: {0}")]
    UnsupportedHost(String),

    /// URL parsing or validation failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The crawl itself failed
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    /// The book actor stopped before the book was collected
    #[error("Book collector stopped unexpectedly")]
    BookClosed,
}

/// Error type for document assembly.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// A table of contents entry has no chapter
    #[error("No chapter scraped for table of contents entry: {url}")]
    MissingChapter { url: String },

    /// Cover image could not be fetched
    #[error("Failed to fetch cover {url}: {message}")]
    CoverFetch { url: String, message: String },

    /// Failed to write the output file
    #[error("Failed to write document: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to build the container archive
    #[error("Failed to build archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}
