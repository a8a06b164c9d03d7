use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::reqwest;
use oauth2::{
    AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet, PkceCodeVerifier,
    RedirectUrl, RefreshToken, RequestTokenError, RevocationUrl, StandardRevocableToken,
    TokenResponse, TokenUrl,
};
use std::fmt;
use tracing::{debug, instrument, warn};

use super::descriptor::{ClientDescriptor, GOOGLE_REVOKE_URI};
use crate::error::{AuthError, AuthResult};

/// What the token server handed back.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_secs: Option<u64>,
    pub scopes: Option<Vec<String>>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in_secs", &self.expires_in_secs)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl From<&BasicTokenResponse> for TokenGrant {
    fn from(response: &BasicTokenResponse) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in_secs: response.expires_in().map(|d| d.as_secs()),
            scopes: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.to_string()).collect()),
        }
    }
}

/// The token server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Trade an authorization code for tokens.
    async fn exchange_code(
        &self,
        client: &ClientDescriptor,
        code: &str,
        pkce_verifier: &str,
        redirect_uri: &str,
    ) -> AuthResult<TokenGrant>;

    /// Get a new access token. A revoked or expired refresh token yields
    /// [`AuthError::InvalidGrant`].
    async fn refresh(&self, client: &ClientDescriptor, refresh_token: &str) -> AuthResult<TokenGrant>;

    /// Invalidate the grant server-side.
    async fn revoke(&self, client: &ClientDescriptor, refresh_token: &str) -> AuthResult<()>;
}

type ConfiguredClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet, EndpointSet>;

/// [`TokenEndpoint`] speaking to Google's OAuth2 server through `oauth2`.
#[derive(Debug, Clone)]
pub struct GoogleTokenEndpoint {
    http: reqwest::Client,
    revoke_uri: String,
}

impl GoogleTokenEndpoint {
    pub fn new() -> AuthResult<Self> {
        let http = reqwest::ClientBuilder::new()
            // Token requests must not follow redirects (SSRF).
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Exchange(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            revoke_uri: GOOGLE_REVOKE_URI.to_string(),
        })
    }

    fn client(&self, descriptor: &ClientDescriptor) -> AuthResult<ConfiguredClient> {
        let token_url = TokenUrl::new(descriptor.token_uri.clone())
            .map_err(|e| AuthError::Descriptor(format!("invalid token_uri: {}", e)))?;
        let revocation_url = RevocationUrl::new(self.revoke_uri.clone())
            .map_err(|e| AuthError::Descriptor(format!("invalid revocation url: {}", e)))?;
        Ok(BasicClient::new(ClientId::new(descriptor.client_id.clone()))
            .set_client_secret(ClientSecret::new(descriptor.client_secret.clone()))
            .set_token_uri(token_url)
            .set_revocation_url(revocation_url))
    }
}

#[async_trait]
impl TokenEndpoint for GoogleTokenEndpoint {
    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        descriptor: &ClientDescriptor,
        code: &str,
        pkce_verifier: &str,
        redirect_uri: &str,
    ) -> AuthResult<TokenGrant> {
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AuthError::Exchange(format!("invalid redirect uri: {}", e)))?;
        let client = self.client(descriptor)?.set_redirect_uri(redirect_url);

        let response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::Exchange(format!("exchange authorization code: {}", e)))?;

        debug!("authorization code exchanged");
        Ok(TokenGrant::from(&response))
    }

    #[instrument(skip_all)]
    async fn refresh(&self, descriptor: &ClientDescriptor, refresh_token: &str) -> AuthResult<TokenGrant> {
        let client = self.client(descriptor)?;
        let refresh_token = RefreshToken::new(refresh_token.to_string());

        match client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http)
            .await
        {
            Ok(response) => {
                debug!("access token refreshed");
                Ok(TokenGrant::from(&response))
            }
            Err(RequestTokenError::ServerResponse(ref sr))
                if matches!(sr.error(), BasicErrorResponseType::InvalidGrant) =>
            {
                warn!("refresh token rejected as invalid_grant");
                Err(AuthError::InvalidGrant)
            }
            Err(e) => Err(AuthError::Exchange(format!("exchange refresh token: {}", e))),
        }
    }

    #[instrument(skip_all)]
    async fn revoke(&self, descriptor: &ClientDescriptor, refresh_token: &str) -> AuthResult<()> {
        let client = self.client(descriptor)?;
        let token = StandardRevocableToken::RefreshToken(RefreshToken::new(refresh_token.to_string()));

        client
            .revoke_token(token)
            .map_err(|e| AuthError::Exchange(format!("revoke token: {}", e)))?
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::Exchange(format!("revoke token: {}", e)))?;
        debug!("token revoked");
        Ok(())
    }
}
