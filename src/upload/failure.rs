use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::AuthError;
use super::transport::{ApiResponse, TransportError};

/// Classification of a terminal upload failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credential missing, invalid or revoked.
    Auth,
    /// Local or remote quota exhausted for the day.
    QuotaExceeded,
    /// Malformed request or metadata.
    Session,
    /// Timeout, connection failure or server error; retried with backoff.
    Transport,
    /// Transport failures outlasted the retry policy.
    TransportExhausted,
    /// The remote resumable session is gone.
    SessionExpired,
    /// The local file could not be read.
    Io,
    /// Stopped by the operator.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth_error",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::Session => "session_error",
            ErrorKind::Transport => "transport_error",
            ErrorKind::TransportExhausted => "transport_exhausted",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::Io => "io_error",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether a failure of this kind may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::TransportExhausted | ErrorKind::SessionExpired
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified upload failure. This is a value the orchestrator branches on,
/// never a raw transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl UploadFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    pub fn auth(err: &AuthError) -> Self {
        Self::new(ErrorKind::Auth, err.to_string())
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Session, message)
    }

    pub fn io(err: &std::io::Error) -> Self {
        Self::new(ErrorKind::Io, format!("read local file: {}", err))
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "upload cancelled by operator")
    }

    pub fn transport(err: &TransportError) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    /// Wrap the last transport failure once the retry budget is spent.
    pub fn exhausted(attempts: u32, last: &UploadFailure) -> Self {
        Self::new(
            ErrorKind::TransportExhausted,
            format!("gave up after {} retries: {}", attempts, last.message),
        )
    }
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Google API error envelope.
///
/// See: <https://developers.google.com/youtube/v3/docs/errors>
#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorItem {
    reason: Option<String>,
}

/// Maps non-success API responses onto an [`ErrorKind`].
///
/// Reason codes found in the error body take precedence; the table comes from
/// configuration so it can be corrected without touching code. Responses
/// without a known reason fall back to their status class.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    reasons: BTreeMap<String, ErrorKind>,
}

impl ErrorClassifier {
    pub fn new(reasons: BTreeMap<String, ErrorKind>) -> Self {
        Self { reasons }
    }

    pub fn classify(&self, response: &ApiResponse) -> UploadFailure {
        let parsed = serde_json::from_str::<GoogleErrorResponse>(&response.body).ok();
        let reason = parsed
            .as_ref()
            .and_then(|r| r.error.errors.iter().find_map(|e| e.reason.clone()));
        let detail = match &parsed {
            Some(r) if !r.error.message.is_empty() => r.error.message.clone(),
            _ => response.body.chars().take(200).collect(),
        };

        let kind = reason
            .as_deref()
            .and_then(|r| self.reasons.get(r).copied())
            .unwrap_or_else(|| Self::kind_for_status(response.status));

        let message = match reason {
            Some(reason) => format!("HTTP {} {}: {}", response.status, reason, detail),
            None => format!("HTTP {}: {}", response.status, detail),
        };
        UploadFailure::new(kind, message)
    }

    fn kind_for_status(status: u16) -> ErrorKind {
        match status {
            401 | 403 => ErrorKind::Auth,
            404 | 410 => ErrorKind::SessionExpired,
            408 | 429 => ErrorKind::Transport,
            500..=599 => ErrorKind::Transport,
            _ => ErrorKind::Session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            body: body.to_string(),
            ..ApiResponse::default()
        }
    }

    fn forbidden(reason: &str) -> ApiResponse {
        response(
            403,
            &format!(
                r#"{{"error":{{"code":403,"message":"denied","errors":[{{"domain":"youtube.quota","reason":"{}"}}]}}}}"#,
                reason
            ),
        )
    }

    #[test]
    fn test_quota_reason_is_distinct_from_auth() {
        let classifier = ErrorClassifier::new(UploadConfig::default().error_reasons);

        let quota = classifier.classify(&forbidden("quotaExceeded"));
        assert_eq!(quota.kind, ErrorKind::QuotaExceeded);
        assert!(!quota.retryable);
        assert!(quota.message.contains("quotaExceeded"));

        let denied = classifier.classify(&forbidden("insufficientPermissions"));
        assert_eq!(denied.kind, ErrorKind::Auth);

        let rate = classifier.classify(&forbidden("rateLimitExceeded"));
        assert_eq!(rate.kind, ErrorKind::Transport);
        assert!(rate.retryable);
    }

    #[test]
    fn test_unknown_reason_falls_back_to_status() {
        let classifier = ErrorClassifier::new(BTreeMap::new());
        assert_eq!(classifier.classify(&forbidden("somethingNew")).kind, ErrorKind::Auth);
        assert_eq!(classifier.classify(&response(503, "unavailable")).kind, ErrorKind::Transport);
        assert_eq!(classifier.classify(&response(400, "bad")).kind, ErrorKind::Session);
        assert_eq!(classifier.classify(&response(410, "")).kind, ErrorKind::SessionExpired);
    }

    #[test]
    fn test_configured_override_wins() {
        let mut reasons = BTreeMap::new();
        reasons.insert("rateLimitExceeded".to_string(), ErrorKind::QuotaExceeded);
        let classifier = ErrorClassifier::new(reasons);

        let failure = classifier.classify(&forbidden("rateLimitExceeded"));
        assert_eq!(failure.kind, ErrorKind::QuotaExceeded);
        assert!(!failure.retryable);
    }

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(ErrorKind::TransportExhausted.to_string(), "transport_exhausted");
        assert_eq!(ErrorKind::Cancelled.to_string(), "cancelled");
    }
}
