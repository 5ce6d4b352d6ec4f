//! Royal Road (www.royalroad.com) scraper implementation.
//!
//! The fiction page lists every chapter in a table. Chapters are listed in
//! table order while the page is dispatched and fetched on a sibling crawler,
//! so the reading order does not depend on which chapter finishes first.

use super::{Scraper, schedule};
use crate::book::{BookHandle, Chapter, Metadata, ScrapedBook};
use crate::crawler::Crawler;
use crate::epub::xml_escape;
use crate::error::ScraperError;
use async_trait::async_trait;
use scraper::Selector;
use std::sync::LazyLock;
use url::Url;

/// CSS selectors used for parsing.
struct Selectors {
    title: Selector,
    author: Selector,
    cover: Selector,
    description: Selector,
    /// Chapter links inside the `#chapters` table.
    chapter_link: Selector,
    chapter_title: Selector,
    chapter_content: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    title: Selector::parse(".fic-title h1").unwrap(),
    author: Selector::parse(".fic-title h4 a").unwrap(),
    cover: Selector::parse(r#".fic-header img[data-type="cover"]"#).unwrap(),
    description: Selector::parse(".description .hidden-content").unwrap(),
    chapter_link: Selector::parse("tr td:nth-child(1) a").unwrap(),
    chapter_title: Selector::parse(".fic-header h1").unwrap(),
    chapter_content: Selector::parse(".chapter-content").unwrap(),
});

/// Royal Road scraper.
pub struct RoyalRoadScraper;

/// Normalizes a cover URL: placeholders become empty, full-size art is
/// swapped for the large rendition.
fn cover_url(url: Option<Url>) -> String {
    match url {
        Some(url) if !url.as_str().contains("/nocover") => {
            url.as_str().replace("covers-full", "covers-large")
        }
        _ => String::new(),
    }
}

#[async_trait]
impl Scraper for RoyalRoadScraper {
    fn name(&self) -> &'static str {
        "Royal Road"
    }

    fn host(&self) -> &'static str {
        "www.royalroad.com"
    }

    async fn scrape(&self, crawler: &Crawler, seed: &Url) -> Result<ScrapedBook, ScraperError> {
        let book = BookHandle::spawn();
        let chapters = crawler.sibling();

        {
            let book = book.clone();
            crawler.on_html("html", move |el| {
                let s = &*SELECTORS;
                let cover = el
                    .child_attr(&s.cover, "src")
                    .and_then(|src| el.absolute_url(&src));
                book.set_metadata(Metadata {
                    title: el.child_text(&s.title),
                    author: el.child_text(&s.author),
                    cover_url: cover_url(cover),
                    description: el.child_html(&s.description).unwrap_or_default(),
                });
            })?;
        }

        {
            let book = book.clone();
            let chapters = chapters.clone();
            crawler.on_html("#chapters", move |el| {
                el.for_each(&SELECTORS.chapter_link, |_, anchor| {
                    let Some(url) = anchor.attr("href").and_then(|href| el.absolute_url(href))
                    else {
                        return;
                    };
                    book.push_toc(url.as_str());
                    schedule(&chapters, url.as_str());
                });
            })?;
        }

        {
            let book = book.clone();
            chapters.on_html("html", move |el| {
                let s = &*SELECTORS;
                let title = el.child_text(&s.chapter_title);
                let content = format!(
                    "<h2>{}</h2>{}",
                    xml_escape(&title),
                    el.child_html(&s.chapter_content).unwrap_or_default()
                );
                book.insert_chapter(el.request_url().as_str(), Chapter { title, content });
            })?;
        }

        tracing::info!(seed = %seed, "scraping Royal Road fiction");
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
    use std::time::Duration;

    const BASE: &str = "https://www.royalroad.com";

    fn fiction_page() -> String {
        r#"
        <html><body>
          <div class="fic-header">
            <img data-type="cover" src="https://www.royalroadcdn.com/public/covers-full/42.jpg">
            <div class="fic-title"><h1>Mother of Learning</h1><h4>by <a href="/profile/1">nobody103</a></h4></div>
          </div>
          <div class="description"><div class="hidden-content"><p>Time loop.</p></div></div>
          <table id="chapters">
            <tr><td><a href="/fiction/1/chapter/1#start">One</a></td><td><a href="/ignored">date</a></td></tr>
            <tr><td><a href="/fiction/1/chapter/2">Two</a></td><td></td></tr>
            <tr><td><a href="/fiction/1/chapter/3">Three</a></td><td></td></tr>
          </table>
        </body></html>
        "#
        .to_string()
    }

    fn chapter_page(title: &str) -> String {
        format!(
            r#"<html><body><div class="fic-header"><h1>{title}</h1></div>
               <div class="chapter-content"><p>{title} text</p></div></body></html>"#
        )
    }

    #[tokio::test]
    async fn test_toc_order_independent_of_completion_order() {
        let stub = Arc::new(
            StubTransport::new()
                .page(&format!("{BASE}/fiction/1"), &fiction_page())
                .page_with_delay(
                    &format!("{BASE}/fiction/1/chapter/1"),
                    &chapter_page("One"),
                    Duration::from_millis(80),
                )
                .page_with_delay(
                    &format!("{BASE}/fiction/1/chapter/2"),
                    &chapter_page("Two & More"),
                    Duration::from_millis(120),
                )
                .page_with_delay(
                    &format!("{BASE}/fiction/1/chapter/3"),
                    &chapter_page("Three"),
                    Duration::from_millis(10),
                ),
        );
        let crawler = testing::crawler(&stub, "www.royalroad.com");
        let seed = Url::parse(&format!("{BASE}/fiction/1")).unwrap();

        let book = RoyalRoadScraper.scrape(&crawler, &seed).await.unwrap();

        let completions = stub.completions();
        assert_eq!(completions.last().unwrap(), &format!("{BASE}/fiction/1/chapter/2"));

        let toc: Vec<&str> = book.toc.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            toc,
            vec![
                "https://www.royalroad.com/fiction/1/chapter/1",
                "https://www.royalroad.com/fiction/1/chapter/2",
                "https://www.royalroad.com/fiction/1/chapter/3",
            ]
        );
        assert!(book.missing_chapters().is_empty());

        let second = &book.chapters[toc[1]];
        assert_eq!(second.title, "Two & More");
        assert!(second.content.starts_with("<h2>Two &amp; More</h2>"));
        assert!(second.content.contains("<p>Two &amp; More text</p>"));

        assert_eq!(book.metadata.title, "Mother of Learning");
        assert_eq!(book.metadata.author, "nobody103");
        assert_eq!(
            book.metadata.cover_url,
            "https://www.royalroadcdn.com/public/covers-large/42.jpg"
        );
        assert_eq!(book.metadata.description, "<p>Time loop.</p>");
        assert!(!stub.requested().iter().any(|u| u.ends_with("/ignored")));
    }

    #[test]
    fn test_cover_url_normalization() {
        let nocover = Url::parse("https://www.royalroad.com/dist/img/nocover-new-min.png").ok();
        assert_eq!(cover_url(nocover), "");
        assert_eq!(cover_url(None), "");

        let full = Url::parse("https://cdn.example.com/covers-full/1.jpg").ok();
        assert_eq!(cover_url(full), "https://cdn.example.com/covers-large/1.jpg");
    }

    #[tokio::test]
    async fn test_seed_failure_is_an_error() {
        let stub = Arc::new(StubTransport::new());
        let crawler = testing::crawler(&stub, "www.royalroad.com");
        let seed = Url::parse(&format!("{BASE}/fiction/404")).unwrap();

        let result = RoyalRoadScraper.scrape(&crawler, &seed).await;
        assert!(matches!(result, Err(ScraperError::Crawl(_))));
    }
}
