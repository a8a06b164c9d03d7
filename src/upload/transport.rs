//! HTTP seam of the upload client.
//!
//! The client never talks to `reqwest` directly. Everything it needs from the
//! wire is a status code, the `Location` and `Range` headers and the body, so
//! tests can substitute an in-memory server.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument};

/// The parts of an HTTP response the upload state machine looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    /// `Location` header, carrying the session URI on session creation.
    pub location: Option<String>,
    /// `Range` header, carrying the confirmed byte range on a 308.
    pub range: Option<String>,
    pub body: String,
}

impl ApiResponse {
    /// The upload finished and the body holds the created resource.
    pub fn is_complete(&self) -> bool {
        matches!(self.status, 200 | 201)
    }

    /// "Resume Incomplete": the server holds a prefix of the content.
    pub fn is_incomplete(&self) -> bool {
        self.status == 308
    }
}

/// A request that never produced an HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request could not be built: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Request(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_builder() {
            TransportError::Request(e.to_string())
        } else {
            TransportError::Connection(e.to_string())
        }
    }
}

/// Value of a `Content-Range` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRange {
    /// `bytes start-end/total`, `end` inclusive.
    Bytes { start: u64, end: u64, total: u64 },
    /// `bytes */total`, the zero-length status query.
    Status { total: u64 },
}

impl ContentRange {
    /// Range covering `len` bytes starting at `start`. `len` must be positive.
    pub fn chunk(start: u64, len: u64, total: u64) -> Self {
        ContentRange::Bytes {
            start,
            end: start + len - 1,
            total,
        }
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentRange::Bytes { start, end, total } => {
                write!(f, "bytes {}-{}/{}", start, end, total)
            }
            ContentRange::Status { total } => write!(f, "bytes */{}", total),
        }
    }
}

/// Number of bytes the server confirms through a `Range: bytes=0-N` header.
///
/// A missing header means nothing has been persisted yet.
pub fn confirmed_bytes(range: Option<&str>) -> Option<u64> {
    let Some(range) = range else {
        return Some(0);
    };
    let spec = range.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    if start.trim() != "0" {
        return None;
    }
    end.trim().parse::<u64>().ok().map(|end| end + 1)
}

/// Everything needed to open a resumable session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInit {
    /// JSON body of the `videos.insert` call.
    pub metadata: serde_json::Value,
    pub content_length: u64,
    pub content_type: String,
    pub notify_subscribers: bool,
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Open a resumable session. The session URI comes back in `Location`.
    async fn create_session(
        &self,
        access_token: &str,
        init: &SessionInit,
    ) -> Result<ApiResponse, TransportError>;

    /// Send one contiguous slice of the file.
    async fn put_chunk(
        &self,
        access_token: &str,
        session_uri: &str,
        range: ContentRange,
        bytes: Vec<u8>,
    ) -> Result<ApiResponse, TransportError>;

    /// Ask the server how much of the file it holds.
    async fn query_status(
        &self,
        access_token: &str,
        session_uri: &str,
        total: u64,
    ) -> Result<ApiResponse, TransportError>;
}

/// [`UploadTransport`] backed by the YouTube Data API v3.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    upload_base_url: String,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, upload_base_url: impl Into<String>) -> Self {
        Self {
            client,
            upload_base_url: upload_base_url.into(),
        }
    }

    async fn into_api_response(response: reqwest::Response) -> Result<ApiResponse, TransportError> {
        let status = response.status().as_u16();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let location = header("location");
        let range = header("range");
        let body = response.text().await?;
        Ok(ApiResponse {
            status,
            location,
            range,
            body,
        })
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    #[instrument(skip(self, access_token, init), fields(bytes = init.content_length))]
    async fn create_session(
        &self,
        access_token: &str,
        init: &SessionInit,
    ) -> Result<ApiResponse, TransportError> {
        let url = format!("{}/videos", self.upload_base_url);
        let notify = if init.notify_subscribers { "true" } else { "false" };
        let response = self
            .client
            .post(&url)
            .query(&[
                ("uploadType", "resumable"),
                ("part", "snippet,status"),
                ("notifySubscribers", notify),
            ])
            .bearer_auth(access_token)
            .header("X-Upload-Content-Length", init.content_length.to_string())
            .header("X-Upload-Content-Type", &init.content_type)
            .json(&init.metadata)
            .send()
            .await?;
        let response = Self::into_api_response(response).await?;
        debug!(status = response.status, "session creation answered");
        Ok(response)
    }

    #[instrument(skip(self, access_token, session_uri, bytes), fields(range = %range))]
    async fn put_chunk(
        &self,
        access_token: &str,
        session_uri: &str,
        range: ContentRange,
        bytes: Vec<u8>,
    ) -> Result<ApiResponse, TransportError> {
        let response = self
            .client
            .put(session_uri)
            .bearer_auth(access_token)
            .header("Content-Length", bytes.len().to_string())
            .header("Content-Range", range.to_string())
            .body(bytes)
            .send()
            .await?;
        Self::into_api_response(response).await
    }

    #[instrument(skip(self, access_token, session_uri))]
    async fn query_status(
        &self,
        access_token: &str,
        session_uri: &str,
        total: u64,
    ) -> Result<ApiResponse, TransportError> {
        let response = self
            .client
            .put(session_uri)
            .bearer_auth(access_token)
            .header("Content-Length", "0")
            .header("Content-Range", ContentRange::Status { total }.to_string())
            .send()
            .await?;
        Self::into_api_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_format() {
        assert_eq!(
            ContentRange::chunk(0, 262_144, 1_000_000).to_string(),
            "bytes 0-262143/1000000"
        );
        assert_eq!(
            ContentRange::Status { total: 1_000_000 }.to_string(),
            "bytes */1000000"
        );
    }

    #[test]
    fn test_confirmed_bytes_from_range_header() {
        assert_eq!(confirmed_bytes(None), Some(0));
        assert_eq!(confirmed_bytes(Some("bytes=0-262143")), Some(262_144));
        assert_eq!(confirmed_bytes(Some("bytes=0-0")), Some(1));
        assert_eq!(confirmed_bytes(Some("bytes=10-20")), None);
        assert_eq!(confirmed_bytes(Some("garbage")), None);
    }

    #[test]
    fn test_request_errors_are_not_retryable() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Connection("reset".into()).is_retryable());
        assert!(!TransportError::Request("bad header".into()).is_retryable());
    }
}
