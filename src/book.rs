//! The book under construction and the actor that owns it.
//!
//! Crawl handlers never touch the book directly. They hold a [`BookHandle`]
//! and send [`BookEvent`] messages to a single task that applies them in
//! arrival order.

use crate::error::ScraperError;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

/// One position in the reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub url: String,
}

/// One fetched unit of content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    /// XHTML fragment.
    pub content: String,
}

/// Descriptive metadata captured from the index page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub author: String,
    /// Absolute cover image URL, empty when the work has none.
    pub cover_url: String,
    /// Description markup.
    pub description: String,
}

/// Everything a scrape produced.
#[derive(Debug, Clone, Default)]
pub struct ScrapedBook {
    pub metadata: Metadata,
    /// Canonical reading order.
    pub toc: Vec<TocEntry>,
    /// Chapters keyed by source URL.
    pub chapters: HashMap<String, Chapter>,
}

impl ScrapedBook {
    /// Chapters in reading order; `None` marks an entry with no chapter.
    pub fn ordered_chapters(&self) -> impl Iterator<Item = (&TocEntry, Option<&Chapter>)> {
        self.toc
            .iter()
            .map(|entry| (entry, self.chapters.get(&entry.url)))
    }

    /// TOC entries that have no chapter.
    pub fn missing_chapters(&self) -> Vec<&str> {
        self.toc
            .iter()
            .filter(|entry| !self.chapters.contains_key(&entry.url))
            .map(|entry| entry.url.as_str())
            .collect()
    }
}

/// Mutations applied by the book actor.
#[derive(Debug)]
pub enum BookEvent {
    SetMetadata(Metadata),
    /// Ignored once metadata has been set.
    SetMetadataOnce(Metadata),
    PushToc(String),
    InsertChapter {
        url: String,
        chapter: Chapter,
    },
    /// Lists the URL and stores its chapter in one step.
    AppendChapter {
        url: String,
        chapter: Chapter,
    },
    Finish(oneshot::Sender<ScrapedBook>),
}

struct BookActor {
    book: ScrapedBook,
    metadata_set: bool,
    events: mpsc::UnboundedReceiver<BookEvent>,
}

impl BookActor {
    async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                BookEvent::SetMetadata(metadata) => {
                    self.book.metadata = metadata;
                    self.metadata_set = true;
                }
                BookEvent::SetMetadataOnce(metadata) => {
                    if !self.metadata_set {
                        self.book.metadata = metadata;
                        self.metadata_set = true;
                    }
                }
                BookEvent::PushToc(url) => self.push_toc(url),
                BookEvent::InsertChapter { url, chapter } => {
                    self.book.chapters.insert(url, chapter);
                }
                BookEvent::AppendChapter { url, chapter } => {
                    self.push_toc(url.clone());
                    self.book.chapters.insert(url, chapter);
                }
                BookEvent::Finish(reply) => {
                    let _ = reply.send(self.book);
                    return;
                }
            }
        }
    }

    fn push_toc(&mut self, url: String) {
        self.book.toc.push(TocEntry { url });
    }
}

/// Cloneable sender side of the book actor.
#[derive(Debug, Clone)]
pub struct BookHandle {
    events: mpsc::UnboundedSender<BookEvent>,
}

impl BookHandle {
    /// Spawns a book actor and returns its handle.
    pub fn spawn() -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let actor = BookActor {
            book: ScrapedBook::default(),
            metadata_set: false,
            events: rx,
        };
        tokio::spawn(actor.run());
        Self { events }
    }

    fn send(&self, event: BookEvent) {
        if let Err(e) = self.events.send(event) {
            tracing::trace!(event = ?e.0, "book already finished, dropping event");
        }
    }

    pub fn set_metadata(&self, metadata: Metadata) {
        self.send(BookEvent::SetMetadata(metadata));
    }

    pub fn set_metadata_once(&self, metadata: Metadata) {
        self.send(BookEvent::SetMetadataOnce(metadata));
    }

    pub fn push_toc(&self, url: impl Into<String>) {
        self.send(BookEvent::PushToc(url.into()));
    }

    pub fn insert_chapter(&self, url: impl Into<String>, chapter: Chapter) {
        self.send(BookEvent::InsertChapter {
            url: url.into(),
            chapter,
        });
    }

    pub fn append_chapter(&self, url: impl Into<String>, chapter: Chapter) {
        self.send(BookEvent::AppendChapter {
            url: url.into(),
            chapter,
        });
    }

    /// Stops the actor and returns the finished book.
    ///
    /// Events sent before this call are applied first.
    pub async fn finish(&self) -> Result<ScrapedBook, ScraperError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(BookEvent::Finish(reply))
            .map_err(|_| ScraperError::BookClosed)?;
        rx.await.map_err(|_| ScraperError::BookClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(title: &str) -> Chapter {
        Chapter {
            title: title.to_string(),
            content: format!("<p>{title}</p>"),
        }
    }

    #[tokio::test]
    async fn test_events_apply_in_order() {
        let book = BookHandle::spawn();
        book.push_toc("u1");
        book.push_toc("u2");
        book.insert_chapter("u2", chapter("two"));
        book.insert_chapter("u1", chapter("one"));
        book.insert_chapter("u1", chapter("one again"));

        let book = book.finish().await.unwrap();
        let order: Vec<&str> = book.toc.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(order, vec!["u1", "u2"]);
        assert_eq!(book.chapters["u1"].title, "one again");
        assert!(book.missing_chapters().is_empty());
    }

    #[tokio::test]
    async fn test_set_metadata_once_keeps_first() {
        let book = BookHandle::spawn();
        book.set_metadata_once(Metadata {
            title: "First".to_string(),
            ..Default::default()
        });
        book.set_metadata_once(Metadata {
            title: "Second".to_string(),
            ..Default::default()
        });

        let book = book.finish().await.unwrap();
        assert_eq!(book.metadata.title, "First");
    }

    #[tokio::test]
    async fn test_append_chapter_lists_and_stores() {
        let book = BookHandle::spawn();
        book.append_chapter("p1", chapter("one"));
        book.append_chapter("p2", chapter("two"));
        book.push_toc("p3");

        let book = book.finish().await.unwrap();
        let titles: Vec<Option<&str>> = book
            .ordered_chapters()
            .map(|(_, c)| c.map(|c| c.title.as_str()))
            .collect();
        assert_eq!(titles, vec![Some("one"), Some("two"), None]);
        assert_eq!(book.missing_chapters(), vec!["p3"]);
    }

    #[tokio::test]
    async fn test_finish_twice_reports_closed() {
        let book = BookHandle::spawn();
        let clone = book.clone();
        book.finish().await.unwrap();

        assert!(matches!(clone.finish().await, Err(ScraperError::BookClosed)));
        // Late events are dropped without panicking.
        clone.push_toc("late");
    }
}
