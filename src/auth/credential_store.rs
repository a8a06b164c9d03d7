use async_trait::async_trait;
use chrono::Duration;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

use super::acquirer::CredentialAcquirer;
use super::descriptor::ClientDescriptor;
use super::endpoint::TokenEndpoint;
use super::store::TokenStore;
use super::{Credential, UPLOAD_SCOPE};
use crate::clock::Clock;
use crate::error::{AuthError, AuthResult};
use crate::upload::AccessTokenSource;

/// Owns the credential lifecycle: load, first consent, refresh, revocation.
///
/// Every mutation goes through one async lock and is persisted before the
/// lock is released, so concurrent pipelines share a single writer. The lock
/// is held for at most one round-trip to the token server.
pub struct CredentialStore {
    store: Arc<dyn TokenStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    acquirer: Arc<dyn CredentialAcquirer>,
    clock: Arc<dyn Clock>,
    refresh_margin: Duration,
    /// Guards store mutations; held for at most one token round-trip.
    lock: tokio::sync::Mutex<()>,
    /// Serializes consent flows.
    consent: tokio::sync::Mutex<()>,
}

impl CredentialStore {
    pub fn new(
        store: Arc<dyn TokenStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        acquirer: Arc<dyn CredentialAcquirer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            endpoint,
            acquirer,
            clock,
            refresh_margin: Duration::seconds(60),
            lock: tokio::sync::Mutex::new(()),
            consent: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// The persisted credential, if any.
    pub fn load(&self) -> AuthResult<Option<Credential>> {
        self.store.load()
    }

    /// Run the consent flow for `descriptor` and persist the result.
    ///
    /// Consents are serialized on their own lock, so refreshes by other
    /// pipelines proceed while the user is on the consent page. The store
    /// lock is only taken to persist the result. If a usable credential for
    /// the same client is persisted by the time this call's turn comes,
    /// it is returned and no second consent is started.
    #[instrument(skip_all, fields(client_id = %descriptor.client_id))]
    pub async fn acquire_interactive(&self, descriptor: &ClientDescriptor) -> AuthResult<Credential> {
        let _consent = self.consent.lock().await;
        if let Some(existing) = self.usable_for(descriptor)? {
            debug!("usable credential appeared while waiting, skipping consent");
            return Ok(existing);
        }

        let scopes = vec![UPLOAD_SCOPE.to_string()];
        let grant = self.acquirer.authorize(descriptor, &scopes).await?;
        let mut tokens = self
            .endpoint
            .exchange_code(descriptor, &grant.code, &grant.pkce_verifier, &grant.redirect_uri)
            .await?;
        if tokens.scopes.is_none() {
            tokens.scopes = Some(scopes);
        }

        let mut credential = Credential::from_grant(tokens, descriptor, self.clock.now(), None)
            .ok_or_else(|| AuthError::Exchange("token server issued no refresh token".to_string()))?;
        if !credential.has_upload_scope() {
            return Err(AuthError::InsufficientScope(UPLOAD_SCOPE.to_string()));
        }

        let _guard = self.lock.lock().await;
        credential.generation = self
            .store
            .load()?
            .map(|previous| previous.generation + 1)
            .unwrap_or(0);
        self.store.save(&credential)?;
        info!(expiry = %credential.expiry, "credential acquired");
        Ok(credential)
    }

    /// The persisted credential, if it can be used for `descriptor` as is.
    fn usable_for(&self, descriptor: &ClientDescriptor) -> AuthResult<Option<Credential>> {
        Ok(self.store.load()?.filter(|existing| {
            existing.client_id == descriptor.client_id
                && existing.has_upload_scope()
                && !existing.expires_within(self.clock.now(), self.refresh_margin)
        }))
    }

    /// Return `credential`, refreshed first if it expires within the margin.
    #[instrument(skip_all)]
    pub async fn ensure_fresh(&self, credential: &Credential) -> AuthResult<Credential> {
        if !credential.expires_within(self.clock.now(), self.refresh_margin) {
            return Ok(credential.clone());
        }

        let _guard = self.lock.lock().await;
        let now = self.clock.now();

        let current = match self.store.load()? {
            Some(stored)
                if stored.client_id == credential.client_id
                    && stored.generation > credential.generation =>
            {
                stored
            }
            _ => credential.clone(),
        };
        if !current.expires_within(now, self.refresh_margin) {
            debug!(generation = current.generation, "credential already refreshed by another task");
            return Ok(current);
        }

        let client = current.client();
        let grant = self.endpoint.refresh(&client, &current.refresh_token).await?;
        let refreshed = Credential::from_grant(grant, &client, self.clock.now(), Some(&current))
            .ok_or_else(|| AuthError::Exchange("refresh returned no usable token".to_string()))?;

        self.store.save(&refreshed)?;
        info!(expiry = %refreshed.expiry, generation = refreshed.generation, "access token refreshed");
        Ok(refreshed)
    }

    /// Revoke the grant and delete the persisted credential.
    #[instrument(skip_all)]
    pub async fn revoke(&self, credential: &Credential) -> AuthResult<()> {
        let _guard = self.lock.lock().await;
        self.endpoint
            .revoke(&credential.client(), &credential.refresh_token)
            .await?;
        self.store.delete()?;
        info!("credential revoked");
        Ok(())
    }
}

/// Hands out access tokens for one pipeline, refreshing through the shared
/// [`CredentialStore`] whenever the current one is close to expiry.
pub struct FreshTokenSource {
    store: Arc<CredentialStore>,
    current: Mutex<Credential>,
}

impl FreshTokenSource {
    pub fn new(store: Arc<CredentialStore>, credential: Credential) -> Self {
        Self {
            store,
            current: Mutex::new(credential),
        }
    }
}

#[async_trait]
impl AccessTokenSource for FreshTokenSource {
    async fn access_token(&self) -> AuthResult<String> {
        let snapshot = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let fresh = self.store.ensure_fresh(&snapshot).await?;
        let token = fresh.access_token.clone();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = fresh;
        Ok(token)
    }
}
