//! Views over a fetched page handed to HTML handlers.

use super::Crawler;
use crate::error::CrawlError;
use scraper::{ElementRef, Selector};
use url::Url;

/// The page being dispatched.
pub struct Page<'a> {
    request_url: &'a Url,
    final_url: &'a Url,
    crawler: &'a Crawler,
}

impl<'a> Page<'a> {
    pub(crate) fn new(request_url: &'a Url, final_url: &'a Url, crawler: &'a Crawler) -> Self {
        Self {
            request_url,
            final_url,
            crawler,
        }
    }
}

/// One element matched by a handler's selector.
pub struct Element<'a> {
    page: &'a Page<'a>,
    element: ElementRef<'a>,
}

impl<'a> Element<'a> {
    pub(crate) fn new(page: &'a Page<'a>, element: ElementRef<'a>) -> Self {
        Self { page, element }
    }

    /// URL that was scheduled, before redirects.
    pub fn request_url(&self) -> &'a Url {
        self.page.request_url
    }

    /// URL the page was finally served from.
    pub fn url(&self) -> &'a Url {
        self.page.final_url
    }

    /// The crawler that fetched this page.
    pub fn crawler(&self) -> &'a Crawler {
        self.page.crawler
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Text content, trimmed.
    pub fn text(&self) -> String {
        self.element.text().collect::<String>().trim().to_string()
    }

    /// Concatenated text of every matching descendant, trimmed.
    ///
    /// Empty when nothing matches.
    pub fn child_text(&self, selector: &Selector) -> String {
        self.element
            .select(selector)
            .flat_map(|child| child.text())
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Trimmed `attr` of the first matching descendant with a non-blank value.
    pub fn child_attr(&self, selector: &Selector, attr: &str) -> Option<String> {
        self.element.select(selector).find_map(|child| {
            child
                .value()
                .attr(attr)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
    }

    /// Inner markup of the first matching descendant.
    pub fn child_html(&self, selector: &Selector) -> Option<String> {
        self.element
            .select(selector)
            .next()
            .map(|child| child.inner_html())
    }

    /// Resolves `href` against the page URL, dropping any fragment.
    ///
    /// Pure in-page anchors and non-HTTP schemes yield `None`.
    pub fn absolute_url(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }

        let mut url = self.page.final_url.join(href).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.set_fragment(None);
        Some(url)
    }

    /// Calls `f` for each matching descendant in document order.
    pub fn for_each<F>(&self, selector: &Selector, mut f: F)
    where
        F: FnMut(usize, &Element<'_>),
    {
        for (index, child) in self.element.select(selector).enumerate() {
            f(index, &Element::new(self.page, child));
        }
    }

    /// Schedules `href`, resolved against this page, on the dispatching crawler.
    pub fn visit(&self, href: &str) -> Result<(), CrawlError> {
        let url = self
            .absolute_url(href)
            .ok_or_else(|| CrawlError::InvalidUrl(href.to_string()))?;
        self.page.crawler.visit(url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlOptions;
    use crate::transport::stub::StubTransport;
    use scraper::Html;
    use std::sync::Arc;

    const DOC: &str = r#"
        <html><body>
          <div class="story">
            <h1 class="title">  The Title  </h1>
            <p class="line">one</p>
            <p class="line">two</p>
            <a class="nav" href="/chapter/2#top">next</a>
            <a class="nav" href="mailto:someone@example.com">mail</a>
            <img class="cover" src="  ">
            <img class="cover" src="/img/cover.png">
          </div>
        </body></html>
    "#;

    fn crawler() -> Crawler {
        Crawler::new(
            Arc::new(StubTransport::new()),
            None,
            CrawlOptions::default(),
        )
        .unwrap()
    }

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    fn with_story<F: FnOnce(&Element<'_>)>(f: F) {
        let crawler = crawler();
        let request = Url::parse("https://example.com/chapter/1").unwrap();
        let fin = Url::parse("https://example.com/chapter/1?x=1").unwrap();
        let page = Page::new(&request, &fin, &crawler);
        let html = Html::parse_document(DOC);
        let story = html.select(&sel(".story")).next().unwrap();
        f(&Element::new(&page, story));
    }

    #[test]
    fn test_child_text() {
        with_story(|el| {
            assert_eq!(el.child_text(&sel(".title")), "The Title");
            assert_eq!(el.child_text(&sel(".line")), "onetwo");
            assert_eq!(el.child_text(&sel(".missing")), "");
        });
    }

    #[test]
    fn test_child_attr_skips_blank_values() {
        with_story(|el| {
            assert_eq!(
                el.child_attr(&sel("img.cover"), "src").as_deref(),
                Some("/img/cover.png")
            );
            assert_eq!(el.child_attr(&sel(".missing"), "href"), None);
        });
    }

    #[test]
    fn test_child_html_first_match() {
        with_story(|el| {
            assert_eq!(el.child_html(&sel(".line")).as_deref(), Some("one"));
            assert!(el.child_html(&sel("table")).is_none());
        });
    }

    #[test]
    fn test_absolute_url() {
        with_story(|el| {
            assert_eq!(
                el.absolute_url("/chapter/2#top").unwrap().as_str(),
                "https://example.com/chapter/2"
            );
            assert_eq!(
                el.absolute_url("3").unwrap().as_str(),
                "https://example.com/chapter/3"
            );
            assert!(el.absolute_url("#comments").is_none());
            assert!(el.absolute_url("mailto:someone@example.com").is_none());
            assert!(el.absolute_url("").is_none());
        });
    }

    #[test]
    fn test_urls_and_for_each() {
        with_story(|el| {
            assert_eq!(el.request_url().as_str(), "https://example.com/chapter/1");
            assert_eq!(el.url().as_str(), "https://example.com/chapter/1?x=1");

            let mut seen = Vec::new();
            el.for_each(&sel("a.nav"), |index, link| {
                seen.push((index, link.text(), link.attr("href").map(str::to_string)));
            });
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].0, 0);
            assert_eq!(seen[0].1, "next");
            assert_eq!(seen[1].2.as_deref(), Some("mailto:someone@example.com"));
        });
    }
}
