use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::error::{AuthError, AuthResult};

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_REVOKE_URI: &str = "https://oauth2.googleapis.com/revoke";

pub fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// OAuth client identity, read from the operator's client secret file.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientDescriptor {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
}

impl Default for ClientDescriptor {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: None,
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
        }
    }
}

impl fmt::Debug for ClientDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDescriptor")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawDescriptor {
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

/// The Cloud Console nests the client under `installed` or `web`; hand-made
/// files are often flat.
#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorFile {
    Installed { installed: RawDescriptor },
    Web { web: RawDescriptor },
    Flat(RawDescriptor),
}

impl ClientDescriptor {
    pub fn from_file(path: &Path) -> AuthResult<Self> {
        if !path.exists() {
            return Err(AuthError::Descriptor(format!(
                "client secret file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Descriptor(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
            .map_err(|e| AuthError::Descriptor(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(content: &str) -> Result<Self, String> {
        let file: DescriptorFile = serde_json::from_str(content).map_err(|_| {
            "expected client_id and client_secret, flat or under \"installed\"/\"web\"".to_string()
        })?;
        let raw = match file {
            DescriptorFile::Installed { installed } => installed,
            DescriptorFile::Web { web } => web,
            DescriptorFile::Flat(raw) => raw,
        };
        if raw.client_id.trim().is_empty() || raw.client_secret.trim().is_empty() {
            return Err("client_id and client_secret must not be empty".to_string());
        }

        Ok(Self {
            client_id: raw.client_id,
            client_secret: raw.client_secret,
            redirect_uri: raw.redirect_uri.or_else(|| raw.redirect_uris.into_iter().next()),
            auth_uri: raw.auth_uri.unwrap_or_else(|| GOOGLE_AUTH_URI.to_string()),
            token_uri: raw.token_uri.unwrap_or_else(default_token_uri),
        })
    }
}
