//! Scripted in-memory transport for tests.

use super::{ProtocolVersion, Request, Response, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Outcome {
    Respond {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    },
    Fail,
}

#[derive(Debug, Clone)]
struct Route {
    outcome: Outcome,
    delay: Duration,
}

/// Serves canned responses keyed by URL, recording traffic.
///
/// Unknown URLs answer 404.
#[derive(Debug, Default)]
pub(crate) struct StubTransport {
    routes: HashMap<String, Route>,
    requests: Mutex<Vec<Request>>,
    completions: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serves `html` at `url` immediately.
    pub(crate) fn page(self, url: &str, html: &str) -> Self {
        self.page_with_delay(url, html, Duration::ZERO)
    }

    /// Serves `html` at `url` after `delay`.
    pub(crate) fn page_with_delay(self, url: &str, html: &str, delay: Duration) -> Self {
        self.route(url, 200, "text/html; charset=utf-8", html.as_bytes(), delay)
    }

    pub(crate) fn route(
        mut self,
        url: &str,
        status: u16,
        content_type: &'static str,
        body: &[u8],
        delay: Duration,
    ) -> Self {
        self.routes.insert(
            url.to_string(),
            Route {
                outcome: Outcome::Respond {
                    status,
                    content_type,
                    body: body.to_vec(),
                },
                delay,
            },
        );
        self
    }

    /// Fails every request to `url` at the transport level.
    pub(crate) fn failing(mut self, url: &str) -> Self {
        self.routes.insert(
            url.to_string(),
            Route {
                outcome: Outcome::Fail,
                delay: Duration::ZERO,
            },
        );
        self
    }

    /// URLs requested so far, in request order.
    pub(crate) fn requested(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.to_string())
            .collect()
    }

    /// Requests received so far.
    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// URLs in the order their responses completed.
    pub(crate) fn completions(&self) -> Vec<String> {
        self.completions.lock().unwrap().clone()
    }

    /// Highest number of concurrent requests observed.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StubTransport {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn round_trip(&self, request: &Request) -> Result<Response, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let route = self.routes.get(request.url.as_str()).cloned();
        let delay = route.as_ref().map(|r| r.delay).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completions
            .lock()
            .unwrap()
            .push(request.url.to_string());

        let (status, content_type, body) = match route.map(|r| r.outcome) {
            Some(Outcome::Respond {
                status,
                content_type,
                body,
            }) => (status, content_type, body),
            Some(Outcome::Fail) => {
                return Err(TransportError::MalformedResponse(
                    "scripted failure".to_string(),
                ));
            }
            None => (404, "text/html", b"not found".to_vec()),
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));

        Ok(Response {
            url: request.url.clone(),
            status: StatusCode::from_u16(status).expect("stub status"),
            version: ProtocolVersion::HTTP_1_1,
            headers,
            trailers: HeaderMap::new(),
            body,
            close: false,
        })
    }
}
