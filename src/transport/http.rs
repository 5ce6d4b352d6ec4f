//! In-process transport backed by `reqwest`.

use super::{ProtocolVersion, Request, Response, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::Version;
use reqwest::header::HeaderMap;

/// Default transport using a shared HTTP client with a cookie store.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a fresh client.
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            client: create_http_client()?,
        })
    }
}

/// Common HTTP client configuration.
///
/// User agents are set per request by the crawler, and timeouts are applied
/// around each request, so neither is configured here.
fn create_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().cookie_store(true).build()
}

fn protocol_version(version: Version) -> ProtocolVersion {
    let (major, minor) = if version == Version::HTTP_09 {
        (0, 9)
    } else if version == Version::HTTP_10 {
        (1, 0)
    } else if version == Version::HTTP_2 {
        (2, 0)
    } else if version == Version::HTTP_3 {
        (3, 0)
    } else {
        (1, 1)
    };
    ProtocolVersion { major, minor }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn round_trip(&self, request: &Request) -> Result<Response, TransportError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await?;

        let url = response.url().clone();
        let status = response.status();
        let version = protocol_version(response.version());
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            url,
            status,
            version,
            headers,
            trailers: HeaderMap::new(),
            body,
            close: false,
        })
    }
}
