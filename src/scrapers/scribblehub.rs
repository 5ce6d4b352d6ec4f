//! Scribble Hub (www.scribblehub.com) scraper implementation.
//!
//! The series page points at the first chapter and every chapter points at
//! the next one, so chapters are discovered one at a time and listed in the
//! order they are reached.

use super::{Scraper, schedule};
use crate::book::{BookHandle, Chapter, Metadata, ScrapedBook};
use crate::crawler::Crawler;
use crate::error::ScraperError;
use async_trait::async_trait;
use scraper::Selector;
use std::sync::LazyLock;
use url::Url;

/// CSS selectors used for parsing.
struct Selectors {
    /// "Read first" button on the series page.
    first_chapter: Selector,
    title: Selector,
    author: Selector,
    cover: Selector,
    description: Selector,
    chapter_title: Selector,
    chapter_content: Selector,
    next_chapter: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    first_chapter: Selector::parse(".read_buttons a:first-child").unwrap(),
    title: Selector::parse(".fic_title").unwrap(),
    author: Selector::parse(".auth_name_fic").unwrap(),
    cover: Selector::parse(".fic_image img").unwrap(),
    description: Selector::parse(".wi_fic_desc").unwrap(),
    chapter_title: Selector::parse(".chapter-title").unwrap(),
    chapter_content: Selector::parse(".chp_raw").unwrap(),
    next_chapter: Selector::parse(".btn-next").unwrap(),
});

/// Scribble Hub scraper.
pub struct ScribbleHubScraper;

#[async_trait]
impl Scraper for ScribbleHubScraper {
    fn name(&self) -> &'static str {
        "Scribble Hub"
    }

    fn host(&self) -> &'static str {
        "www.scribblehub.com"
    }

    async fn scrape(&self, crawler: &Crawler, seed: &Url) -> Result<ScrapedBook, ScraperError> {
        let book = BookHandle::spawn();

        {
            let book = book.clone();
            crawler.on_html("body", move |el| {
                let s = &*SELECTORS;

                if let Some(first) = el
                    .child_attr(&s.first_chapter, "href")
                    .and_then(|href| el.absolute_url(&href))
                {
                    book.set_metadata_once(Metadata {
                        title: el.child_text(&s.title),
                        author: el.child_text(&s.author),
                        cover_url: el
                            .child_attr(&s.cover, "src")
                            .and_then(|src| el.absolute_url(&src))
                            .map(String::from)
                            .unwrap_or_default(),
                        description: el.child_html(&s.description).unwrap_or_default(),
                    });
                    schedule(el.crawler(), first.as_str());
                }

                if let Some(content) = el
                    .child_html(&s.chapter_content)
                    .filter(|content| !content.trim().is_empty())
                {
                    book.append_chapter(
                        el.request_url().as_str(),
                        Chapter {
                            title: el.child_text(&s.chapter_title),
                            content,
                        },
                    );
                }

                if let Some(next) = el
                    .child_attr(&s.next_chapter, "href")
                    .and_then(|href| el.absolute_url(&href))
                {
                    schedule(el.crawler(), next.as_str());
                }
            })?;
        }

        tracing::info!(seed = %seed, "scraping Scribble Hub series");
        crawler.run(seed.as_str()).await?;
        book.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing;
    use crate::transport::stub::StubTransport;
    use std::sync::Arc;

    const SERIES: &str = "https://www.scribblehub.com/series/1/story/";

    fn series_page() -> &'static str {
        r#"<html><body>
             <div class="fic_image"><img src="/img/cover.jpg"></div>
             <div class="fic_title">The Story</div>
             <span class="auth_name_fic">Author</span>
             <div class="wi_fic_desc"><p>Blurb</p></div>
             <div class="read_buttons"><a href="/read/1-story/chapter/1/">Read First</a><a href="/read/1-story/chapter/9/">Read Last</a></div>
           </body></html>"#
    }

    fn chapter_page(n: u32, next: Option<&str>) -> String {
        let next = next
            .map(|href| format!(r#"<a class="btn-next" href="{href}">Next</a>"#))
            .unwrap_or_default();
        format!(
            r#"<html><body>
                 <div class="chapter-title">Chapter {n}</div>
                 <div class="chp_raw"><p>Text {n}</p></div>
                 {next}
               </body></html>"#
        )
    }

    fn chapter_url(n: u32) -> String {
        format!("https://www.scribblehub.com/read/1-story/chapter/{n}/")
    }

    #[tokio::test]
    async fn test_chain_walk_collects_chapters_in_order() {
        let stub = Arc::new(
            StubTransport::new()
                .page(SERIES, series_page())
                .page(&chapter_url(1), &chapter_page(1, Some("/read/1-story/chapter/2/")))
                .page(&chapter_url(2), &chapter_page(2, Some(&chapter_url(3))))
                .page(&chapter_url(3), &chapter_page(3, None)),
        );
        let crawler = testing::crawler(&stub, "www.scribblehub.com");
        let seed = Url::parse(SERIES).unwrap();

        let book = ScribbleHubScraper.scrape(&crawler, &seed).await.unwrap();

        let toc: Vec<String> = book.toc.iter().map(|e| e.url.clone()).collect();
        assert_eq!(toc, vec![chapter_url(1), chapter_url(2), chapter_url(3)]);
        assert_eq!(book.chapters.len(), 3);
        assert_eq!(book.chapters[&chapter_url(2)].title, "Chapter 2");
        assert_eq!(book.chapters[&chapter_url(2)].content.trim(), "<p>Text 2</p>");
        assert_eq!(stub.requested().len(), 4);

        assert_eq!(book.metadata.title, "The Story");
        assert_eq!(book.metadata.author, "Author");
        assert_eq!(
            book.metadata.cover_url,
            "https://www.scribblehub.com/img/cover.jpg"
        );
        assert_eq!(book.metadata.description, "<p>Blurb</p>");
    }

    #[tokio::test]
    async fn test_cyclic_chain_stops_at_first_repeat() {
        let stub = Arc::new(
            StubTransport::new()
                .page(SERIES, series_page())
                .page(&chapter_url(1), &chapter_page(1, Some(&chapter_url(2))))
                .page(&chapter_url(2), &chapter_page(2, Some(&chapter_url(1)))),
        );
        let crawler = testing::crawler(&stub, "www.scribblehub.com");
        let seed = Url::parse(SERIES).unwrap();

        let book = ScribbleHubScraper.scrape(&crawler, &seed).await.unwrap();

        assert_eq!(book.toc.len(), 2);
        assert_eq!(stub.requested().len(), 3);
    }
}
