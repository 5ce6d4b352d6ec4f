//! Request transport contract and its backends.
//!
//! A [`Transport`] turns one outbound [`Request`] into a [`Response`]. The
//! default backend uses an in-process HTTP client; the curl backend shells out
//! for sites that reject the in-process client.

pub mod curl;
mod http;
#[cfg(test)]
pub(crate) mod stub;

pub use curl::CurlTransport;
pub use http::HttpTransport;

use crate::config::{TransportConfig, TransportKind};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// HTTP protocol version as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ProtocolVersion {
    pub const HTTP_1_1: ProtocolVersion = ProtocolVersion { major: 1, minor: 1 };

    /// Parses `"major.minor"` or a bare `"major"` (minor defaults to 0).
    pub fn parse(version: &str) -> Result<Self, TransportError> {
        let version = version.trim();
        let (major, minor) = version.split_once('.').unwrap_or((version, "0"));

        let parse_part = |part: &str| {
            part.parse::<u32>().map_err(|_| {
                TransportError::MalformedResponse(format!("invalid HTTP version '{}'", version))
            })
        };

        Ok(Self {
            major: parse_part(major)?,
            minor: parse_part(minor)?,
        })
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl Request {
    /// Creates a GET request with no headers.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Adds a header, ignoring values that are not valid header text.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after any redirects.
    pub url: Url,
    pub status: StatusCode,
    pub version: ProtocolVersion,
    pub headers: HeaderMap,
    pub trailers: HeaderMap,
    pub body: Vec<u8>,
    /// Whether the connection was closed after this response.
    pub close: bool,
}

impl Response {
    /// Returns the Content-Type header value, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Returns true if the body should be parsed as HTML.
    ///
    /// Responses without a Content-Type are assumed to be HTML.
    pub fn is_html(&self) -> bool {
        match self.content_type() {
            Some(content_type) => {
                let content_type = content_type.to_ascii_lowercase();
                content_type.contains("html") || content_type.starts_with("text/plain")
            }
            None => true,
        }
    }

    /// Decodes the body as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A backend capable of performing one request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the human-readable name of this backend.
    fn name(&self) -> &'static str;

    /// Performs the request and buffers the full response.
    async fn round_trip(&self, request: &Request) -> Result<Response, TransportError>;
}

/// Builds the transport selected by configuration.
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
    match config.backend {
        TransportKind::Default => Ok(Arc::new(HttpTransport::new()?)),
        TransportKind::Curl => Ok(Arc::new(CurlTransport::locate(
            config.curl_path.as_deref(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(
            ProtocolVersion::parse("1.1").unwrap(),
            ProtocolVersion::HTTP_1_1
        );
        assert_eq!(
            ProtocolVersion::parse("2").unwrap(),
            ProtocolVersion { major: 2, minor: 0 }
        );
        assert_eq!(
            ProtocolVersion::parse("1.0").unwrap(),
            ProtocolVersion { major: 1, minor: 0 }
        );
    }

    #[test]
    fn test_parse_version_rejects_non_numeric() {
        assert!(matches!(
            ProtocolVersion::parse("one.1"),
            Err(TransportError::MalformedResponse(_))
        ));
        assert!(ProtocolVersion::parse("1.x").is_err());
        assert!(ProtocolVersion::parse("").is_err());
    }

    #[test]
    fn test_is_html() {
        let mut response = Response {
            url: Url::parse("https://example.com/").unwrap(),
            status: StatusCode::OK,
            version: ProtocolVersion::HTTP_1_1,
            headers: HeaderMap::new(),
            trailers: HeaderMap::new(),
            body: Vec::new(),
            close: false,
        };
        assert!(response.is_html());

        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        assert!(response.is_html());

        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
        assert!(!response.is_html());
    }
}
