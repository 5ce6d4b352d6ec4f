//! Ebook scraper - turns serialized web publications into EPUB files.
//!
//! This library provides functionality for:
//! - Crawling a publication concurrently under per-host limits
//! - Site-specific traversal of Royal Road, Phrack and Scribble Hub
//! - Assembling the collected chapters into an EPUB in reading order
//! - Fetching pages in-process or through a `curl` subprocess

pub mod assembler;
pub mod book;
pub mod cache;
pub mod config;
pub mod console;
pub mod crawler;
pub mod epub;
pub mod error;
pub mod logging;
pub mod scrapers;
pub mod transport;

// Re-export commonly used types
pub use assembler::{Assembler, AssemblyProgress, output_filename};
pub use book::{BookHandle, Chapter, Metadata, ScrapedBook, TocEntry};
pub use cache::ResponseCache;
pub use config::{Config, TransportKind};
pub use console::Console;
pub use crawler::{CrawlOptions, Crawler, Element, LimitRule};
pub use epub::Epub;
pub use error::{AssemblyError, ConfigError, CrawlError, ScraperError, TransportError};
pub use scrapers::{Scraper, ScraperRegistry};
pub use transport::{Request, Response, Transport, build_transport};
