//! Top-level publish flow: credential, quota admission, upload.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::auth::{ClientDescriptor, Credential, CredentialStore, FreshTokenSource};
use crate::config::UploadConfig;
use crate::error::{AuthError, AuthResult};
use crate::quota::{OperationKind, QuotaTracker, Reservation};
use crate::upload::{ErrorKind, PrivacyLevel, UploadClient, UploadFailure, UploadRequest, VideoMetadata};

/// Final outcome of one publish. Failures are values: nothing raw escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Published {
        video_id: String,
        watch_url: String,
        privacy_level: PrivacyLevel,
    },
    Failed {
        error_kind: ErrorKind,
        message: String,
        retryable: bool,
    },
}

impl UploadResult {
    pub fn is_published(&self) -> bool {
        matches!(self, UploadResult::Published { .. })
    }
}

impl From<UploadFailure> for UploadResult {
    fn from(failure: UploadFailure) -> Self {
        UploadResult::Failed {
            error_kind: failure.kind,
            message: failure.message,
            retryable: failure.retryable,
        }
    }
}

impl fmt::Display for UploadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadResult::Published { watch_url, .. } => f.write_str(watch_url),
            UploadResult::Failed {
                error_kind,
                message,
                ..
            } => write!(f, "{}: {}", error_kind, message),
        }
    }
}

/// Public link of an uploaded Short.
pub fn watch_url(base: &str, video_id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), video_id)
}

pub struct PublishOrchestrator {
    credentials: Arc<CredentialStore>,
    quota: Arc<QuotaTracker>,
    client: Arc<UploadClient>,
    interactive: bool,
    session_retries: u32,
    watch_url_base: String,
    default_category: String,
    default_tags: Vec<String>,
}

impl PublishOrchestrator {
    pub fn new(
        credentials: Arc<CredentialStore>,
        quota: Arc<QuotaTracker>,
        client: Arc<UploadClient>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            credentials,
            quota,
            client,
            interactive: true,
            session_retries: config.session_retries,
            watch_url_base: config.watch_url_base.clone(),
            default_category: config.default_category.clone(),
            default_tags: config.default_tags.clone(),
        }
    }

    /// Whether a browser consent flow may be started.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    #[instrument(skip_all, fields(file = %local_file_path.display()))]
    pub async fn publish(
        &self,
        local_file_path: &Path,
        metadata: VideoMetadata,
        descriptor: &ClientDescriptor,
        cancel: &CancellationToken,
    ) -> UploadResult {
        let request = UploadRequest::new(
            local_file_path,
            metadata,
            &self.default_category,
            &self.default_tags,
        );
        if let Err(message) = request.validate() {
            return UploadFailure::session(message).into();
        }
        if let Err(e) = tokio::fs::metadata(local_file_path).await {
            return UploadFailure::io(&e).into();
        }

        let credential = match self.credential(descriptor).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(code = e.code(), "no usable credential");
                return UploadFailure::auth(&e).into();
            }
        };
        let tokens = FreshTokenSource::new(self.credentials.clone(), credential);
        let cost = self.quota.estimate_cost(OperationKind::VideosInsert);

        let mut attempt = 0;
        loop {
            if let Reservation::Rejected { requested, remaining } = self.quota.reserve(cost) {
                return UploadFailure::new(
                    ErrorKind::QuotaExceeded,
                    format!(
                        "daily quota would be exceeded: {} units needed, {} remaining until reset",
                        requested, remaining
                    ),
                )
                .into();
            }

            info!(title = request.title(), privacy = %request.privacy_level(), attempt, "uploading");
            match self.client.upload(&request, &tokens, cancel).await {
                Ok(done) => {
                    let url = watch_url(&self.watch_url_base, &done.video_id);
                    info!(video_id = %done.video_id, url = %url, "published");
                    return UploadResult::Published {
                        video_id: done.video_id,
                        watch_url: url,
                        privacy_level: done.privacy_level,
                    };
                }
                Err(failure)
                    if failure.retryable
                        && attempt < self.session_retries
                        && !cancel.is_cancelled() =>
                {
                    attempt += 1;
                    warn!("upload failed ({}), starting a new session", failure);
                }
                Err(failure) => return failure.into(),
            }
        }
    }

    /// A fresh credential carrying the upload scope, obtaining consent if the
    /// context allows it.
    async fn credential(&self, descriptor: &ClientDescriptor) -> AuthResult<Credential> {
        let stored = match self.credentials.load()? {
            Some(c) if c.client_id == descriptor.client_id && c.has_upload_scope() => Some(c),
            Some(_) => {
                warn!("stored credential is for another client or lacks the upload scope, ignoring it");
                None
            }
            None => None,
        };

        let Some(credential) = stored else {
            return self.consent(descriptor).await;
        };
        match self.credentials.ensure_fresh(&credential).await {
            Err(AuthError::InvalidGrant) if self.interactive => {
                warn!("refresh token is no longer valid, asking for consent again");
                self.credentials.acquire_interactive(descriptor).await
            }
            other => other,
        }
    }

    async fn consent(&self, descriptor: &ClientDescriptor) -> AuthResult<Credential> {
        if !self.interactive {
            return Err(AuthError::ConsentRequired);
        }
        self.credentials.acquire_interactive(descriptor).await
    }
}
