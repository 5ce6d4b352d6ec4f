//! Transport that shells out to `curl`.
//!
//! Some sites behind Cloudflare reject the in-process client but accept curl
//! with a browser user agent. curl writes the body followed by two trailer
//! blocks produced by `--write-out`: the `%{json}` transfer summary and the
//! `%{header_json}` response headers. Each block is preceded by [`DELIMITER`].

use super::{ProtocolVersion, Request, Response, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use url::Url;

/// Separator written before each trailer block.
///
/// Must not contain `%` or `\`, which curl interprets in `--write-out`.
pub const DELIMITER: &str = "\n\n--8<--ebook-scraper-trailer--8<--\n\n";

/// Transfer summary from `%{json}`. Only the fields we use are decoded.
#[derive(Debug, Deserialize)]
struct TransferInfo {
    response_code: u16,
    http_version: String,
    #[serde(default)]
    url_effective: Option<String>,
}

/// Transport invoking a curl binary once per request.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    binary: PathBuf,
}

impl CurlTransport {
    /// Creates a transport using the given curl binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Uses `binary` if given, otherwise looks up `curl` on `PATH`.
    pub fn locate(binary: Option<&Path>) -> Result<Self, TransportError> {
        let binary = match binary {
            Some(path) => path.to_path_buf(),
            None => which::which("curl")
                .map_err(|e| TransportError::BinaryNotFound(format!("curl: {}", e)))?,
        };
        tracing::debug!(binary = %binary.display(), "using curl transport");
        Ok(Self::new(binary))
    }
}

/// Builds the curl argument list for a request.
fn build_args(request: &Request) -> Result<Vec<String>, TransportError> {
    let mut args = vec![
        request.url.to_string(),
        "--compressed".to_string(),
        "--silent".to_string(),
        "--show-error".to_string(),
        "--write-out".to_string(),
        format!("{DELIMITER}%{{json}}{DELIMITER}%{{header_json}}"),
        "-X".to_string(),
        request.method.to_string(),
    ];

    for (name, value) in &request.headers {
        let value = value.to_str().map_err(|_| {
            TransportError::InvalidRequest(format!("header '{}' is not valid text", name))
        })?;
        args.push("-H".to_string());
        args.push(format!("{}: {}", name, value));
    }

    Ok(args)
}

/// Finds the last occurrence of `needle` in `haystack`.
fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Splits curl output from the right into body, transfer info and headers.
///
/// The body may itself contain the delimiter; the trailers never do.
fn split_trailers<'a>(
    output: &'a [u8],
    delimiter: &[u8],
) -> Option<(&'a [u8], &'a [u8], &'a [u8])> {
    let second = rfind(output, delimiter)?;
    let first = rfind(&output[..second], delimiter)?;

    Some((
        &output[..first],
        &output[first + delimiter.len()..second],
        &output[second + delimiter.len()..],
    ))
}

/// Builds a header map from curl's `%{header_json}` object.
///
/// Names are canonicalized case-insensitively; values for names that differ
/// only in case are merged in the order they are encountered.
fn canonicalize_headers(raw: BTreeMap<String, Vec<String>>) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    for (name, values) in raw {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            TransportError::MalformedResponse(format!("invalid header name '{}'", name))
        })?;
        for value in values {
            let value = HeaderValue::from_bytes(value.as_bytes()).map_err(|_| {
                TransportError::MalformedResponse(format!("invalid value for header '{}'", name))
            })?;
            headers.append(name.clone(), value);
        }
    }

    Ok(headers)
}

/// Reconstructs a response from curl's combined stdout.
fn parse_output(output: &[u8], request_url: &Url) -> Result<Response, TransportError> {
    let (body, info, headers) = split_trailers(output, DELIMITER.as_bytes()).ok_or_else(|| {
        TransportError::MalformedResponse("missing trailer blocks in curl output".to_string())
    })?;

    let info: TransferInfo = serde_json::from_slice(info).map_err(|e| {
        TransportError::MalformedResponse(format!("invalid transfer info: {}", e))
    })?;
    let headers: BTreeMap<String, Vec<String>> = serde_json::from_slice(headers)
        .map_err(|e| TransportError::MalformedResponse(format!("invalid header block: {}", e)))?;

    let status = StatusCode::from_u16(info.response_code).map_err(|_| {
        TransportError::MalformedResponse(format!("invalid status code {}", info.response_code))
    })?;
    let version = ProtocolVersion::parse(&info.http_version)?;
    let headers = canonicalize_headers(headers)?;

    let url = info
        .url_effective
        .as_deref()
        .and_then(|effective| Url::parse(effective).ok())
        .unwrap_or_else(|| request_url.clone());

    Ok(Response {
        url,
        status,
        version,
        headers,
        trailers: HeaderMap::new(),
        body: body.to_vec(),
        close: true,
    })
}

#[async_trait]
impl Transport for CurlTransport {
    fn name(&self) -> &'static str {
        "curl"
    }

    async fn round_trip(&self, request: &Request) -> Result<Response, TransportError> {
        let args = build_args(request)?;

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(TransportError::Spawn)?;

        if !output.status.success() {
            return Err(TransportError::ExitStatus {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_output(&output.stdout, &request.url)
    }
}
