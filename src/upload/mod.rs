// Resumable upload subsystem
//
// - metadata: what gets published and how it is shaped for Shorts
// - transport: the HTTP seam (real client and the trait tests substitute)
// - retry: bounded exponential backoff
// - failure: error classification shared with the orchestrator
// - client: the resumable upload state machine

pub mod client;
pub mod failure;
pub mod metadata;
pub mod retry;
pub mod transport;

use async_trait::async_trait;
use uuid::Uuid;

pub use client::UploadClient;
pub use failure::{ErrorClassifier, ErrorKind, UploadFailure};
pub use metadata::{PrivacyLevel, UploadRequest, VideoMetadata};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use transport::{ApiResponse, ContentRange, HttpTransport, SessionInit, TransportError, UploadTransport};

use crate::error::AuthResult;

/// Supplies a bearer token for each request, refreshing it when needed.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> AuthResult<String>;
}

/// A fixed token, for callers that manage freshness themselves.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> AuthResult<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    SessionCreated,
    Uploading,
    Complete,
    Failed,
}

/// Server-side state of one resumable upload, as far as the client knows it.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub session_id: Uuid,
    pub resumable_endpoint_uri: Option<String>,
    pub bytes_total: u64,
    /// Durable watermark: bytes the server has acknowledged.
    pub bytes_confirmed: u64,
    pub state: SessionState,
}

impl UploadSession {
    pub fn new(bytes_total: u64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            resumable_endpoint_uri: None,
            bytes_total,
            bytes_confirmed: 0,
            state: SessionState::Init,
        }
    }

    pub fn created(&mut self, uri: String) {
        self.resumable_endpoint_uri = Some(uri);
        self.state = SessionState::SessionCreated;
    }

    pub fn remaining(&self) -> u64 {
        self.bytes_total - self.bytes_confirmed
    }
}

/// A finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub video_id: String,
    pub privacy_level: PrivacyLevel,
}
