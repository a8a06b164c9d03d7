use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Deserialize;
use std::future::Future;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::UploadConfig;
use super::failure::{ErrorClassifier, ErrorKind, UploadFailure};
use super::metadata::{PrivacyLevel, UploadRequest};
use super::retry::{self, RetryError, RetryPolicy, Retryable, Sleeper, TokioSleeper};
use super::transport::{confirmed_bytes, ApiResponse, ContentRange, SessionInit, TransportError, UploadTransport};
use super::{AccessTokenSource, CompletedUpload, SessionState, UploadSession};

/// Only in-session transport hiccups are retried here. Session expiry is
/// retryable for the orchestrator, which starts a new session, but not for
/// the session that just expired.
impl Retryable for UploadFailure {
    fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transport && self.retryable
    }
}

/// What the server said about the session after a chunk or status query.
enum Progress {
    Complete(CompletedUpload),
    Confirmed(u64),
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
    status: Option<UploadedVideoStatus>,
}

#[derive(Debug, Deserialize)]
struct UploadedVideoStatus {
    #[serde(rename = "privacyStatus")]
    privacy_status: Option<String>,
}

/// Drives one resumable upload from INIT to COMPLETE or FAILED.
///
/// Chunks go out strictly in order on a single task. After any interruption
/// the server is queried for its watermark and sending resumes from there, so
/// acknowledged bytes are never sent twice. Session creation is retried only
/// until a session URI has been obtained.
pub struct UploadClient {
    transport: Arc<dyn UploadTransport>,
    classifier: ErrorClassifier,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    chunk_size: u64,
    request_timeout: Duration,
    show_progress: bool,
}

impl UploadClient {
    pub fn new(transport: Arc<dyn UploadTransport>, config: &UploadConfig) -> Self {
        Self {
            transport,
            classifier: ErrorClassifier::new(config.error_reasons.clone()),
            retry: RetryPolicy::from(&config.retry),
            sleeper: Arc::new(TokioSleeper),
            chunk_size: config.chunk_size,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            show_progress: config.show_progress,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Upload `request`, returning the created video or a classified failure.
    #[instrument(skip_all, fields(file = %request.local_file_path().display()))]
    pub async fn upload(
        &self,
        request: &UploadRequest,
        tokens: &dyn AccessTokenSource,
        cancel: &CancellationToken,
    ) -> Result<CompletedUpload, UploadFailure> {
        request.validate().map_err(UploadFailure::session)?;

        let mut file = File::open(request.local_file_path())
            .await
            .map_err(|e| UploadFailure::io(&e))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| UploadFailure::io(&e))?
            .len();
        if total == 0 {
            return Err(UploadFailure::session("video file is empty"));
        }

        let mut session = UploadSession::new(total);
        let outcome = self
            .drive(&mut session, request, &mut file, tokens, cancel)
            .await;

        match &outcome {
            Ok(done) => {
                session.state = SessionState::Complete;
                info!(
                    session_id = %session.session_id,
                    video_id = %done.video_id,
                    bytes = total,
                    "upload complete"
                );
            }
            Err(failure) => {
                session.state = SessionState::Failed;
                warn!(
                    session_id = %session.session_id,
                    confirmed = session.bytes_confirmed,
                    total,
                    error_kind = %failure.kind,
                    "upload failed: {}",
                    failure.message
                );
            }
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut UploadSession,
        request: &UploadRequest,
        file: &mut File,
        tokens: &dyn AccessTokenSource,
        cancel: &CancellationToken,
    ) -> Result<CompletedUpload, UploadFailure> {
        let uri = self
            .create_session(request, session.bytes_total, tokens, cancel)
            .await?;
        session.created(uri);
        info!(session_id = %session.session_id, bytes = session.bytes_total, "resumable session created");

        let bar = self.progress_bar(session.bytes_total);
        let outcome = self
            .transfer(session, request.privacy_level(), file, tokens, cancel, &bar)
            .await;
        match &outcome {
            Ok(_) => bar.finish_with_message("uploaded"),
            Err(_) => bar.abandon(),
        }
        outcome
    }

    async fn create_session(
        &self,
        request: &UploadRequest,
        total: u64,
        tokens: &dyn AccessTokenSource,
        cancel: &CancellationToken,
    ) -> Result<String, UploadFailure> {
        let init = SessionInit {
            metadata: request.to_resource(),
            content_length: total,
            content_type: content_type_for(request),
            notify_subscribers: request.notify_subscribers(),
        };
        let init = &init;

        let created = self
            .retry
            .run(self.sleeper.as_ref(), cancel, |attempt| async move {
                if attempt > 0 {
                    debug!(attempt, "retrying session creation");
                }
                let token = bearer(tokens).await?;
                let response = self
                    .guarded(cancel, self.transport.create_session(&token, init))
                    .await?;
                if !response.is_complete() {
                    return Err(self.classifier.classify(&response));
                }
                response
                    .location
                    .ok_or_else(|| UploadFailure::session("session created without a Location header"))
            })
            .await;

        created.map_err(|e| match e {
            RetryError::Fatal(failure) => failure,
            RetryError::Exhausted { retries, last } => UploadFailure::exhausted(retries, &last),
            RetryError::Cancelled => UploadFailure::cancelled(),
        })
    }

    async fn transfer(
        &self,
        session: &mut UploadSession,
        privacy: PrivacyLevel,
        file: &mut File,
        tokens: &dyn AccessTokenSource,
        cancel: &CancellationToken,
        bar: &ProgressBar,
    ) -> Result<CompletedUpload, UploadFailure> {
        let uri = session
            .resumable_endpoint_uri
            .clone()
            .ok_or_else(|| UploadFailure::session("no resumable session"))?;
        let total = session.bytes_total;
        let mut backoff = self.retry.backoff();
        let mut resync = false;
        session.state = SessionState::Uploading;

        loop {
            if resync || session.bytes_confirmed == total {
                let token = bearer(tokens).await?;
                let queried = self
                    .guarded(cancel, self.transport.query_status(&token, &uri, total))
                    .await
                    .and_then(|response| self.interpret(response, total, privacy));
                let failure = match queried {
                    Ok(Progress::Complete(done)) => return Ok(done),
                    Ok(Progress::Confirmed(confirmed)) if confirmed < total => {
                        self.confirm(session, confirmed, bar);
                        debug!(confirmed, total, "resuming after status query");
                        resync = false;
                        None
                    }
                    Ok(Progress::Confirmed(_)) => Some(UploadFailure::new(
                        ErrorKind::Transport,
                        "server holds every byte but has not finalized the upload",
                    )),
                    Err(failure) => Some(failure),
                };
                if let Some(failure) = failure {
                    self.back_off(&mut backoff, failure, cancel).await?;
                    continue;
                }
            }

            let start = session.bytes_confirmed;
            let len = self.chunk_size.min(session.remaining());
            let bytes = read_chunk(file, start, len)
                .await
                .map_err(|e| UploadFailure::io(&e))?;
            let range = ContentRange::chunk(start, len, total);
            debug!(%range, "sending chunk");

            let token = bearer(tokens).await?;
            let sent = self
                .guarded(cancel, self.transport.put_chunk(&token, &uri, range, bytes))
                .await
                .and_then(|response| self.interpret(response, total, privacy));
            match sent {
                Ok(Progress::Complete(done)) => {
                    bar.set_position(total);
                    return Ok(done);
                }
                Ok(Progress::Confirmed(confirmed)) if confirmed > start => {
                    backoff.reset();
                    self.confirm(session, confirmed, bar);
                }
                Ok(Progress::Confirmed(confirmed)) => {
                    // No forward progress: spend the retry budget like any
                    // other transient failure.
                    self.confirm(session, confirmed, bar);
                    let stalled = UploadFailure::new(
                        ErrorKind::Transport,
                        format!("chunk at offset {} was not acknowledged", start),
                    );
                    self.back_off(&mut backoff, stalled, cancel).await?;
                }
                Err(failure) => {
                    self.back_off(&mut backoff, failure, cancel).await?;
                    resync = true;
                }
            }
        }
    }

    /// Wait out a retryable failure, or turn it into the terminal one.
    async fn back_off(
        &self,
        backoff: &mut retry::Backoff<'_>,
        failure: UploadFailure,
        cancel: &CancellationToken,
    ) -> Result<(), UploadFailure> {
        if !failure.is_retryable() {
            return Err(failure);
        }
        let Some(delay) = backoff.next_delay() else {
            return Err(UploadFailure::exhausted(backoff.retries(), &failure));
        };
        warn!(
            "Retry attempt {}/{} after {}, waiting {:?}",
            backoff.retries(),
            self.retry.max_attempts,
            failure,
            delay
        );
        if retry::wait(self.sleeper.as_ref(), cancel, delay).await {
            Ok(())
        } else {
            Err(UploadFailure::cancelled())
        }
    }

    fn confirm(&self, session: &mut UploadSession, confirmed: u64, bar: &ProgressBar) {
        if confirmed < session.bytes_confirmed {
            warn!(
                previous = session.bytes_confirmed,
                confirmed, "server watermark moved backwards, resending from server offset"
            );
        }
        session.bytes_confirmed = confirmed;
        bar.set_position(confirmed);
    }

    fn interpret(
        &self,
        response: ApiResponse,
        total: u64,
        privacy: PrivacyLevel,
    ) -> Result<Progress, UploadFailure> {
        if response.is_complete() {
            let video: UploadedVideo = serde_json::from_str(&response.body).map_err(|e| {
                UploadFailure::session(format!("unreadable video resource in final response: {}", e))
            })?;
            if video.id.is_empty() {
                return Err(UploadFailure::session("final response carries no video id"));
            }
            let privacy_level = video
                .status
                .and_then(|s| s.privacy_status)
                .and_then(|s| s.parse().ok())
                .unwrap_or(privacy);
            return Ok(Progress::Complete(CompletedUpload {
                video_id: video.id,
                privacy_level,
            }));
        }
        if response.is_incomplete() {
            return confirmed_bytes(response.range.as_deref())
                .filter(|confirmed| *confirmed <= total)
                .map(Progress::Confirmed)
                .ok_or_else(|| {
                    UploadFailure::new(
                        ErrorKind::Transport,
                        format!("unusable Range header {:?}", response.range),
                    )
                });
        }
        Err(self.classifier.classify(&response))
    }

    /// Bound a request by the timeout and abandon it on cancellation.
    async fn guarded<F>(&self, cancel: &CancellationToken, request: F) -> Result<ApiResponse, UploadFailure>
    where
        F: Future<Output = Result<ApiResponse, TransportError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadFailure::cancelled()),
            outcome = tokio::time::timeout(self.request_timeout, request) => match outcome {
                Err(_) => Err(UploadFailure::transport(&TransportError::Timeout)),
                Ok(Err(e)) => Err(UploadFailure::transport(&e)),
                Ok(Ok(response)) => Ok(response),
            },
        }
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        bar
    }
}

async fn bearer(tokens: &dyn AccessTokenSource) -> Result<String, UploadFailure> {
    tokens
        .access_token()
        .await
        .map_err(|e| UploadFailure::auth(&e))
}

async fn read_chunk(file: &mut File, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

fn content_type_for(request: &UploadRequest) -> String {
    let ext = request
        .local_file_path()
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "video/*",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::retry::RecordingSleeper;
    use crate::upload::{StaticToken, VideoMetadata};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted responses for session creation; chunk traffic is answered by
    /// a simple in-memory server.
    #[derive(Default)]
    struct ScriptedTransport {
        create: Mutex<Vec<Result<ApiResponse, TransportError>>>,
        create_calls: Mutex<u32>,
        chunk_calls: Mutex<u32>,
        received: Mutex<u64>,
        fail_chunks: Mutex<u32>,
        chunk_reply: Option<ApiResponse>,
    }

    impl ScriptedTransport {
        fn created() -> Result<ApiResponse, TransportError> {
            Ok(ApiResponse {
                status: 200,
                location: Some("https://upload.example/session/1".to_string()),
                ..ApiResponse::default()
            })
        }

        fn with_create(responses: Vec<Result<ApiResponse, TransportError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                create: Mutex::new(responses),
                ..Self::default()
            }
        }

        fn answer(&self, total: u64) -> ApiResponse {
            let received = *self.received.lock().unwrap();
            if received == total {
                ApiResponse {
                    status: 201,
                    body: r#"{"id":"vid123","status":{"privacyStatus":"private"}}"#.to_string(),
                    ..ApiResponse::default()
                }
            } else {
                ApiResponse {
                    status: 308,
                    range: (received > 0).then(|| format!("bytes=0-{}", received - 1)),
                    ..ApiResponse::default()
                }
            }
        }
    }

    #[async_trait]
    impl UploadTransport for ScriptedTransport {
        async fn create_session(&self, _: &str, _: &SessionInit) -> Result<ApiResponse, TransportError> {
            *self.create_calls.lock().unwrap() += 1;
            self.create.lock().unwrap().pop().unwrap_or_else(Self::created)
        }

        async fn put_chunk(
            &self,
            _: &str,
            _: &str,
            range: ContentRange,
            bytes: Vec<u8>,
        ) -> Result<ApiResponse, TransportError> {
            *self.chunk_calls.lock().unwrap() += 1;
            if let Some(reply) = &self.chunk_reply {
                return Ok(reply.clone());
            }
            {
                let mut fail = self.fail_chunks.lock().unwrap();
                if *fail > 0 {
                    *fail -= 1;
                    return Err(TransportError::Connection("connection reset".to_string()));
                }
            }
            let ContentRange::Bytes { start, total, .. } = range else {
                panic!("status query sent as chunk");
            };
            {
                let mut received = self.received.lock().unwrap();
                assert_eq!(start, *received, "chunk does not continue the watermark");
                *received += bytes.len() as u64;
            }
            Ok(self.answer(total))
        }

        async fn query_status(&self, _: &str, _: &str, total: u64) -> Result<ApiResponse, TransportError> {
            Ok(self.answer(total))
        }
    }

    fn config(chunk_size: u64) -> UploadConfig {
        UploadConfig {
            chunk_size,
            show_progress: false,
            ..UploadConfig::default()
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            jitter: 0.0,
        }
    }

    fn request_for(dir: &tempfile::TempDir, size: usize) -> UploadRequest {
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, vec![7u8; size]).unwrap();
        UploadRequest::new(path, VideoMetadata::default(), "22", &[])
    }

    fn client(transport: Arc<ScriptedTransport>, chunk_size: u64, sleeper: Arc<RecordingSleeper>) -> UploadClient {
        UploadClient::new(transport, &config(chunk_size))
            .with_sleeper(sleeper)
            .with_retry_policy(policy())
    }

    #[tokio::test]
    async fn test_uploads_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_for(&dir, 2_500);
        let transport = Arc::new(ScriptedTransport::default());
        let sleeper = Arc::new(RecordingSleeper::default());

        let done = client(transport.clone(), 1_000, sleeper.clone())
            .upload(&request, &StaticToken("tok".into()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(done.video_id, "vid123");
        assert_eq!(done.privacy_level, PrivacyLevel::Private);
        assert_eq!(*transport.received.lock().unwrap(), 2_500);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_session_creation_retries_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_for(&dir, 10);
        let transport = Arc::new(ScriptedTransport::with_create(vec![
            Err(TransportError::Timeout),
            Ok(ApiResponse {
                status: 503,
                ..ApiResponse::default()
            }),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let done = client(transport.clone(), 1_000, sleeper.clone())
            .upload(&request, &StaticToken("tok".into()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(done.video_id, "vid123");
        assert_eq!(*transport.create_calls.lock().unwrap(), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_session_creation_rejected_metadata_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_for(&dir, 10);
        let transport = Arc::new(ScriptedTransport::with_create(vec![Ok(ApiResponse {
            status: 400,
            body: r#"{"error":{"message":"bad title","errors":[{"reason":"invalidTitle"}]}}"#.to_string(),
            ..ApiResponse::default()
        })]));

        let failure = client(transport.clone(), 1_000, Arc::default())
            .upload(&request, &StaticToken("tok".into()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::Session);
        assert!(!failure.retryable);
        assert_eq!(*transport.create_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_chunk_failures_exhaust_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_for(&dir, 2_000);
        let transport = Arc::new(ScriptedTransport {
            fail_chunks: Mutex::new(100),
            ..ScriptedTransport::default()
        });
        let sleeper = Arc::new(RecordingSleeper::default());

        let failure = client(transport.clone(), 1_000, sleeper.clone())
            .upload(&request, &StaticToken("tok".into()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::TransportExhausted);
        assert!(failure.retryable);
        assert_eq!(sleeper.delays().len(), 3);
        assert_eq!(*transport.create_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_fails_without_in_session_retry() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_for(&dir, 2_000);
        let transport = Arc::new(ScriptedTransport {
            chunk_reply: Some(ApiResponse {
                status: 410,
                ..ApiResponse::default()
            }),
            ..ScriptedTransport::default()
        });
        let sleeper = Arc::new(RecordingSleeper::default());

        let failure = client(transport, 1_000, sleeper.clone())
            .upload(&request, &StaticToken("tok".into()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::SessionExpired);
        assert!(failure.retryable);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_unacknowledged_chunks_exhaust_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_for(&dir, 2_000);
        let transport = Arc::new(ScriptedTransport {
            chunk_reply: Some(ApiResponse {
                status: 308,
                ..ApiResponse::default()
            }),
            ..ScriptedTransport::default()
        });
        let sleeper = Arc::new(RecordingSleeper::default());

        let failure = tokio::time::timeout(
            Duration::from_secs(5),
            client(transport.clone(), 1_000, sleeper.clone()).upload(
                &request,
                &StaticToken("tok".into()),
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("upload must terminate")
        .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::TransportExhausted);
        assert_eq!(sleeper.delays().len(), 3);
        assert_eq!(*transport.chunk_calls.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_remote_quota_rejection_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_for(&dir, 2_000);
        let transport = Arc::new(ScriptedTransport {
            chunk_reply: Some(ApiResponse {
                status: 403,
                body: r#"{"error":{"message":"quota","errors":[{"reason":"quotaExceeded"}]}}"#.to_string(),
                ..ApiResponse::default()
            }),
            ..ScriptedTransport::default()
        });
        let sleeper = Arc::new(RecordingSleeper::default());

        let failure = client(transport.clone(), 1_000, sleeper.clone())
            .upload(&request, &StaticToken("tok".into()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::QuotaExceeded);
        assert!(!failure.retryable);
        assert!(sleeper.delays().is_empty());
        assert_eq!(*transport.chunk_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_quota_rejection_at_session_creation_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_for(&dir, 2_000);
        let transport = Arc::new(ScriptedTransport::with_create(vec![Ok(ApiResponse {
            status: 403,
            body: r#"{"error":{"message":"quota","errors":[{"reason":"quotaExceeded"}]}}"#.to_string(),
            ..ApiResponse::default()
        })]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let failure = client(transport.clone(), 1_000, sleeper.clone())
            .upload(&request, &StaticToken("tok".into()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::QuotaExceeded);
        assert!(!failure.retryable);
        assert!(sleeper.delays().is_empty());
        assert_eq!(*transport.create_calls.lock().unwrap(), 1);
        assert_eq!(*transport.chunk_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let request = request_for(&dir, 2_000);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = client(Arc::new(ScriptedTransport::default()), 1_000, Arc::default())
            .upload(&request, &StaticToken("tok".into()), &cancel)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::Cancelled);
        assert!(!failure.retryable);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_failure() {
        let request = UploadRequest::new("/nonexistent/clip.mp4", VideoMetadata::default(), "22", &[]);
        let failure = client(Arc::new(ScriptedTransport::default()), 1_000, Arc::default())
            .upload(&request, &StaticToken("tok".into()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::Io);
        assert!(!failure.retryable);
    }

    #[test]
    fn test_content_type_from_extension() {
        let request = UploadRequest::new("a.MOV", VideoMetadata::default(), "22", &[]);
        assert_eq!(content_type_for(&request), "video/quicktime");
    }
}
