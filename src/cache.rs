//! On-disk response cache.
//!
//! Entries are content-addressed by request identity (method and URL), so
//! repeated runs over the same seed are served locally. Each entry is a JSON
//! metadata file plus a raw body file. Both are written to a unique temporary
//! name and renamed into place, which keeps concurrent readers and writers of
//! the same key safe.

use crate::transport::{ProtocolVersion, Request, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// Metadata stored alongside a cached body.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    url: String,
    status: u16,
    version_major: u32,
    version_minor: u32,
    headers: Vec<(String, String)>,
}

/// Directory-backed response cache shared by every crawler in a run.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    /// Creates a cache rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Only GET requests are cached.
    pub fn is_cacheable(request: &Request) -> bool {
        request.method == Method::GET
    }

    /// Stable key for a request.
    pub fn key(request: &Request) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.method.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(request.url.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let shard = self.dir.join(&key[..2]);
        (
            shard.join(format!("{key}.json")),
            shard.join(format!("{key}.body")),
        )
    }

    /// Looks up a cached response. Missing or unreadable entries are a miss.
    pub async fn load(&self, request: &Request) -> Option<Response> {
        let key = Self::key(request);
        let (meta_path, body_path) = self.paths(&key);

        let meta = tokio::fs::read(&meta_path).await.ok()?;
        let entry: CacheEntry = match serde_json::from_slice(&meta) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %meta_path.display(), error = %e, "ignoring corrupt cache entry");
                return None;
            }
        };
        let body = tokio::fs::read(&body_path).await.ok()?;

        let url = Url::parse(&entry.url).ok()?;
        let status = StatusCode::from_u16(entry.status).ok()?;
        let mut headers = HeaderMap::new();
        for (name, value) in &entry.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }

        tracing::trace!(url = %request.url, key = %key, "cache hit");
        Some(Response {
            url,
            status,
            version: ProtocolVersion {
                major: entry.version_major,
                minor: entry.version_minor,
            },
            headers,
            trailers: HeaderMap::new(),
            body,
            close: false,
        })
    }

    /// Stores a response for later runs.
    pub async fn store(&self, request: &Request, response: &Response) -> io::Result<()> {
        let key = Self::key(request);
        let (meta_path, body_path) = self.paths(&key);
        if let Some(shard) = meta_path.parent() {
            tokio::fs::create_dir_all(shard).await?;
        }

        let entry = CacheEntry {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            version_major: response.version.major,
            version_minor: response.version.minor,
            headers: response
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        };
        let meta = serde_json::to_vec(&entry).map_err(io::Error::other)?;

        // Body first: a reader that sees the metadata always finds a body.
        write_atomic(&body_path, &response.body).await?;
        write_atomic(&meta_path, &meta).await?;
        Ok(())
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::CONTENT_TYPE;
    use tempfile::TempDir;

    fn request(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    fn response(url: &str, body: &[u8]) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        Response {
            url: Url::parse(url).unwrap(),
            status: StatusCode::OK,
            version: ProtocolVersion::HTTP_1_1,
            headers,
            trailers: HeaderMap::new(),
            body: body.to_vec(),
            close: true,
        }
    }

    #[test]
    fn test_key_depends_on_method_and_url() {
        let a = request("https://example.com/a");
        let b = request("https://example.com/b");
        let mut post = request("https://example.com/a");
        post.method = Method::POST;

        assert_eq!(ResponseCache::key(&a), ResponseCache::key(&a.clone()));
        assert_ne!(ResponseCache::key(&a), ResponseCache::key(&b));
        assert_ne!(ResponseCache::key(&a), ResponseCache::key(&post));
        assert!(ResponseCache::is_cacheable(&a));
        assert!(!ResponseCache::is_cacheable(&post));
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        let req = request("https://example.com/chapter/1");

        assert!(cache.load(&req).await.is_none());

        cache
            .store(&req, &response("https://example.com/chapter/1", b"<p>hi</p>"))
            .await
            .unwrap();

        let hit = cache.load(&req).await.unwrap();
        assert_eq!(hit.body, b"<p>hi</p>");
        assert_eq!(hit.status, StatusCode::OK);
        assert_eq!(hit.headers.get(CONTENT_TYPE).unwrap(), "text/html");
        assert!(!hit.close);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        let req = request("https://example.com/broken");
        let (meta_path, body_path) = cache.paths(&ResponseCache::key(&req));
        std::fs::create_dir_all(meta_path.parent().unwrap()).unwrap();
        std::fs::write(&meta_path, b"{not json").unwrap();
        std::fs::write(&body_path, b"body").unwrap();

        assert!(cache.load(&req).await.is_none());
    }
}
