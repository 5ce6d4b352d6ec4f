//! Turns a scraped book into an EPUB in reading order.

use crate::book::ScrapedBook;
use crate::epub::{CoverImage, Epub};
use crate::error::AssemblyError;
use crate::transport::{Request, Transport};
use reqwest::header::USER_AGENT;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Stylesheet applied to the cover page.
pub const COVER_CSS: &str = r#"@charset "utf-8";

body { margin: 0; padding: 0; text-align: center; }
div.cover { height: 100%; }
div.cover img { height: 100%; max-width: 100%; object-fit: contain; }
"#;

/// Progress report emitted after each section is added.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyProgress<'a> {
    pub current: usize,
    pub total: usize,
    pub title: &'a str,
}

/// Builds EPUBs, fetching covers through a transport.
///
/// Covers are usually served from a CDN, so they bypass the host-restricted
/// crawler.
pub struct Assembler {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl Assembler {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            user_agent: None,
        }
    }

    /// Sends `user_agent` with the cover request.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Assembles `book`, calling `progress` once per section.
    ///
    /// Fails if a table of contents entry has no chapter. Chapters that are
    /// not listed are left out.
    pub async fn assemble<F>(
        &self,
        book: &ScrapedBook,
        mut progress: F,
    ) -> Result<Epub, AssemblyError>
    where
        F: FnMut(AssemblyProgress<'_>),
    {
        let metadata = &book.metadata;
        let mut epub = Epub::new(metadata.title.as_str());
        epub.set_author(metadata.author.as_str());

        if !metadata.cover_url.is_empty() {
            let cover = self.fetch_cover(&metadata.cover_url).await?;
            epub.set_cover(cover, COVER_CSS);
            epub.set_description(metadata.description.as_str());
        }

        let total = book.toc.len();
        for (index, (entry, chapter)) in book.ordered_chapters().enumerate() {
            let chapter = chapter.ok_or_else(|| AssemblyError::MissingChapter {
                url: entry.url.clone(),
            })?;
            epub.add_section(&chapter.content, chapter.title.as_str());
            progress(AssemblyProgress {
                current: index + 1,
                total,
                title: &chapter.title,
            });
        }

        tracing::debug!(title = %metadata.title, sections = total, "assembled book");
        Ok(epub)
    }

    async fn fetch_cover(&self, raw: &str) -> Result<CoverImage, AssemblyError> {
        let failed = |message: String| AssemblyError::CoverFetch {
            url: raw.to_string(),
            message,
        };

        let url = Url::parse(raw).map_err(|e| failed(e.to_string()))?;
        let mut request = Request::get(url.clone());
        if let Some(user_agent) = &self.user_agent {
            request = request.with_header(USER_AGENT, user_agent);
        }

        let response = tokio::time::timeout(self.timeout, self.transport.round_trip(&request))
            .await
            .map_err(|_| failed(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| failed(e.to_string()))?;
        if !response.status.is_success() {
            return Err(failed(format!("HTTP {}", response.status.as_u16())));
        }

        let media_type = cover_media_type(response.content_type(), &url);
        tracing::debug!(url = %url, media_type = %media_type, bytes = response.body.len(), "fetched cover");
        Ok(CoverImage {
            data: response.body,
            media_type,
        })
    }
}

/// Media type from the Content-Type header, falling back to the extension.
fn cover_media_type(content_type: Option<&str>, url: &Url) -> String {
    if let Some(content_type) = content_type {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence.starts_with("image/") {
            return essence;
        }
    }

    let extension = Path::new(url.path())
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match extension.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "image/jpeg",
    }
    .to_string()
}

/// File name for a book titled `title`.
///
/// The title is lower-cased and spaces become `-`. Surrounding whitespace is
/// also trimmed and path separators become `-`, so a title can never name a
/// file outside the output directory.
pub fn output_filename(title: &str) -> String {
    let stem: String = title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '-',
            c => c,
        })
        .collect();

    if stem.is_empty() {
        "untitled.epub".to_string()
    } else {
        format!("{}.epub", stem)
    }
}
