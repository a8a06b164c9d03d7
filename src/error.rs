use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShortgenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, ShortgenError>;

/// Failures of the credential lifecycle.
///
/// None of these are retried by the credential store itself; the caller decides
/// whether to fall back to interactive consent or surface the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No stored credential and the execution context cannot ask the user.
    #[error("consent_required: no stored credential and interactive consent is unavailable")]
    ConsentRequired,

    /// The user denied consent on the authorization page.
    #[error("access_denied: {0}")]
    AccessDenied(String),

    /// The refresh token was revoked or has expired server-side.
    #[error("invalid_grant: refresh token is no longer valid")]
    InvalidGrant,

    /// The stored credential does not carry the upload scope.
    #[error("insufficient_scope: credential lacks {0}")]
    InsufficientScope(String),

    /// The client descriptor file could not be read or parsed.
    #[error("client descriptor: {0}")]
    Descriptor(String),

    /// Code exchange, refresh or revocation failed for another reason.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// Reading or writing the token store failed.
    #[error("token store: {0}")]
    Store(String),
}

impl AuthError {
    /// Short machine-readable code, as echoed on the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::ConsentRequired => "consent_required",
            AuthError::AccessDenied(_) => "access_denied",
            AuthError::InvalidGrant => "invalid_grant",
            AuthError::InsufficientScope(_) => "insufficient_scope",
            AuthError::Descriptor(_) => "invalid_client_descriptor",
            AuthError::Exchange(_) => "exchange_failed",
            AuthError::Store(_) => "token_store",
        }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
