// OAuth2 credential lifecycle
//
// - descriptor: the client secret file downloaded from the Cloud Console
// - store: where the credential is persisted between runs
// - endpoint: code exchange, refresh and revocation against the token server
// - acquirer: first-time consent through the browser
// - credential_store: load, acquire, refresh and revoke behind one lock
//
// Token values and the client secret are never logged. `Debug` on the types
// that carry them prints a redacted form.

pub mod acquirer;
pub mod credential_store;
pub mod descriptor;
pub mod endpoint;
pub mod store;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub use acquirer::{AuthorizationGrant, BrowserAcquirer, CannedCodeAcquirer, CredentialAcquirer};
pub use credential_store::{CredentialStore, FreshTokenSource};
pub use descriptor::ClientDescriptor;
pub use endpoint::{GoogleTokenEndpoint, TokenEndpoint, TokenGrant};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};

/// Scope required for `videos.insert`.
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// Lifetime assumed when the token server does not say.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 55 * 60;

/// A persisted OAuth2 credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
    pub scopes: BTreeSet<String>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "descriptor::default_token_uri")]
    pub token_uri: String,
    /// Incremented on every persisted change, so a caller can tell whether
    /// someone else refreshed the credential since it was read.
    #[serde(default)]
    pub generation: u64,
}

impl Credential {
    /// Build a credential from a fresh code exchange or refresh.
    ///
    /// `previous` supplies the refresh token and scopes when the server omits
    /// them, which Google does on refresh.
    pub fn from_grant(
        grant: TokenGrant,
        client: &ClientDescriptor,
        now: DateTime<Utc>,
        previous: Option<&Credential>,
    ) -> Option<Self> {
        let refresh_token = grant
            .refresh_token
            .or_else(|| previous.map(|p| p.refresh_token.clone()))?;
        // Lifetimes chrono cannot represent are treated as unspecified.
        let default_lifetime = Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS);
        let lifetime = grant
            .expires_in_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .unwrap_or(default_lifetime);
        let expiry = now
            .checked_add_signed(lifetime)
            .unwrap_or(now + default_lifetime);
        let scopes = match grant.scopes {
            Some(scopes) if !scopes.is_empty() => scopes.into_iter().collect(),
            _ => previous.map(|p| p.scopes.clone()).unwrap_or_default(),
        };

        Some(Self {
            access_token: grant.access_token,
            refresh_token,
            expiry,
            scopes,
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            token_uri: client.token_uri.clone(),
            generation: previous.map(|p| p.generation + 1).unwrap_or(0),
        })
    }

    pub fn has_upload_scope(&self) -> bool {
        self.scopes.contains(UPLOAD_SCOPE)
    }

    /// Whether the access token expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expiry - margin <= now
    }

    /// The client this credential was issued to.
    pub fn client(&self) -> ClientDescriptor {
        ClientDescriptor {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            token_uri: self.token_uri.clone(),
            ..ClientDescriptor::default()
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn credential(expiry: DateTime<Utc>) -> Credential {
        Credential {
            access_token: "ya29.access".to_string(),
            refresh_token: "1//refresh".to_string(),
            expiry,
            scopes: [UPLOAD_SCOPE.to_string()].into_iter().collect(),
            client_id: "client.apps.googleusercontent.com".to_string(),
            client_secret: "shh".to_string(),
            token_uri: descriptor::default_token_uri(),
            generation: 0,
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let printed = format!("{:?}", credential(noon()));
        assert!(!printed.contains("ya29.access"));
        assert!(!printed.contains("1//refresh"));
        assert!(!printed.contains("shh"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_expiry_margin() {
        let cred = credential(noon());
        let margin = Duration::seconds(60);
        assert!(!cred.expires_within(noon() - Duration::seconds(61), margin));
        assert!(cred.expires_within(noon() - Duration::seconds(60), margin));
        assert!(cred.expires_within(noon() + Duration::seconds(1), margin));
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token_and_scopes() {
        let previous = credential(noon());
        let grant = TokenGrant {
            access_token: "ya29.new".to_string(),
            refresh_token: None,
            expires_in_secs: None,
            scopes: None,
        };
        let refreshed = Credential::from_grant(grant, &previous.client(), noon(), Some(&previous)).unwrap();

        assert_eq!(refreshed.refresh_token, previous.refresh_token);
        assert!(refreshed.has_upload_scope());
        assert_eq!(refreshed.expiry, noon() + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        assert_eq!(refreshed.generation, 1);
    }

    #[test]
    fn test_unrepresentable_lifetime_falls_back_to_default() {
        let previous = credential(noon());
        for secs in [u64::MAX, u64::MAX / 2, i64::MAX as u64] {
            let grant = TokenGrant {
                access_token: "ya29.new".to_string(),
                refresh_token: None,
                expires_in_secs: Some(secs),
                scopes: None,
            };
            let refreshed =
                Credential::from_grant(grant, &previous.client(), noon(), Some(&previous)).unwrap();
            assert_eq!(refreshed.expiry, noon() + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        }
    }

    #[test]
    fn test_first_grant_requires_refresh_token() {
        let grant = TokenGrant {
            access_token: "ya29.new".to_string(),
            refresh_token: None,
            expires_in_secs: Some(3600),
            scopes: Some(vec![UPLOAD_SCOPE.to_string()]),
        };
        assert!(Credential::from_grant(grant, &ClientDescriptor::default(), noon(), None).is_none());
    }
}
