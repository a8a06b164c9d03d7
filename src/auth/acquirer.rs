use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::{self, Bytes};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, RedirectUrl, Scope};
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::descriptor::ClientDescriptor;
use crate::error::{AuthError, AuthResult};

const CONSENT_DONE_HTML: &str =
    "<html><body><h3>shortgen is authorized.</h3><p>You can close this window.</p></body></html>";
const CONSENT_DENIED_HTML: &str =
    "<html><body><h3>Authorization was not granted.</h3><p>You can close this window.</p></body></html>";

/// An authorization code, ready to be exchanged at the token endpoint.
#[derive(Clone)]
pub struct AuthorizationGrant {
    pub code: String,
    pub pkce_verifier: String,
    pub redirect_uri: String,
}

impl fmt::Debug for AuthorizationGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGrant")
            .field("code", &"<redacted>")
            .field("pkce_verifier", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Obtains user consent and returns the resulting authorization code.
#[async_trait]
pub trait CredentialAcquirer: Send + Sync {
    async fn authorize(&self, client: &ClientDescriptor, scopes: &[String]) -> AuthResult<AuthorizationGrant>;
}

/// Opens the consent page in the system browser and catches the redirect on
/// a loopback listener.
#[derive(Debug, Clone)]
pub struct BrowserAcquirer {
    consent_timeout: Duration,
}

impl Default for BrowserAcquirer {
    fn default() -> Self {
        Self {
            consent_timeout: Duration::from_secs(300),
        }
    }
}

impl BrowserAcquirer {
    pub fn new(consent_timeout: Duration) -> Self {
        Self { consent_timeout }
    }
}

#[async_trait]
impl CredentialAcquirer for BrowserAcquirer {
    #[instrument(skip_all)]
    async fn authorize(&self, descriptor: &ClientDescriptor, scopes: &[String]) -> AuthResult<AuthorizationGrant> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AuthError::Exchange(format!("bind callback listener: {}", e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AuthError::Exchange(format!("callback listener address: {}", e)))?;
        let redirect_uri = format!("http://{}:{}", addr.ip(), addr.port());

        let auth_url = AuthUrl::new(descriptor.auth_uri.clone())
            .map_err(|e| AuthError::Descriptor(format!("invalid auth_uri: {}", e)))?;
        let redirect_url = RedirectUrl::new(redirect_uri.clone())
            .map_err(|e| AuthError::Exchange(format!("invalid redirect uri: {}", e)))?;
        let client = BasicClient::new(ClientId::new(descriptor.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_redirect_uri(redirect_url);

        let csrf = CsrfToken::new_random();
        let state = csrf.clone();
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let mut request = client
            // The flow runs exactly once, so the state is fixed up front.
            .authorize_url(move || state.clone())
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");
        for scope in scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        let (consent_url, _) = request.url();

        info!(url = %consent_url, "asking user to complete the consent flow");
        if let Err(e) = webbrowser::open(consent_url.as_str()) {
            warn!("could not open a browser ({}), open the URL above manually", e);
        }

        let code = tokio::time::timeout(self.consent_timeout, wait_for_callback(listener, csrf))
            .await
            .map_err(|_| AuthError::Exchange("timed out waiting for consent".to_string()))??;

        Ok(AuthorizationGrant {
            code,
            pkce_verifier: pkce_verifier.secret().clone(),
            redirect_uri,
        })
    }
}

/// What a request to the loopback listener carried.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    /// Not a redirect, e.g. the browser asking for a favicon.
    Unrelated,
    BadState,
    Denied(String),
    Code(String),
}

fn parse_callback(query: Option<&str>, csrf: &str) -> Callback {
    let mut state = None;
    let mut code = None;
    let mut error = None;
    for (k, v) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        match &*k {
            "state" => state = Some(v.into_owned()),
            "code" => code = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }

    if state.is_none() && code.is_none() && error.is_none() {
        return Callback::Unrelated;
    }
    if state.as_deref() != Some(csrf) {
        return Callback::BadState;
    }
    match (error, code) {
        (Some(error), _) => Callback::Denied(error),
        (None, Some(code)) => Callback::Code(code),
        (None, None) => Callback::Denied("no authorization code in callback".to_string()),
    }
}

fn page(status: StatusCode, html: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(html)));
    *response.status_mut() = status;
    response
}

/// Serve the loopback listener until the consent redirect arrives.
async fn wait_for_callback(listener: TcpListener, csrf: CsrfToken) -> AuthResult<String> {
    let (tx, mut rx) = mpsc::channel::<AuthResult<String>>(1);

    loop {
        tokio::select! {
            outcome = rx.recv() => {
                return outcome.unwrap_or_else(|| {
                    Err(AuthError::Exchange("callback listener stopped".to_string()))
                });
            }
            accepted = listener.accept() => {
                let (stream, _) = accepted
                    .map_err(|e| AuthError::Exchange(format!("accept callback connection: {}", e)))?;
                let io = hyper_util::rt::TokioIo::new(stream);
                let tx = tx.clone();
                let csrf = csrf.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<body::Incoming>| {
                        let tx = tx.clone();
                        let csrf = csrf.clone();
                        async move {
                            let response = match parse_callback(req.uri().query(), csrf.secret()) {
                                Callback::Unrelated => page(StatusCode::NOT_FOUND, ""),
                                Callback::BadState => page(StatusCode::BAD_REQUEST, "invalid state"),
                                Callback::Denied(error) => {
                                    let err = if error == "access_denied" {
                                        AuthError::AccessDenied("user denied consent".to_string())
                                    } else {
                                        AuthError::AccessDenied(error)
                                    };
                                    let _ = tx.try_send(Err(err));
                                    page(StatusCode::OK, CONSENT_DENIED_HTML)
                                }
                                Callback::Code(code) => {
                                    let _ = tx.try_send(Ok(code));
                                    page(StatusCode::OK, CONSENT_DONE_HTML)
                                }
                            };
                            Ok::<_, Infallible>(response)
                        }
                    });
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("callback connection ended: {}", e);
                    }
                });
            }
        }
    }
}

/// Returns a fixed outcome without any user interaction.
#[derive(Debug)]
pub struct CannedCodeAcquirer {
    outcome: AuthResult<String>,
    calls: AtomicUsize,
}

impl CannedCodeAcquirer {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            outcome: Ok(code.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn denying() -> Self {
        Self {
            outcome: Err(AuthError::AccessDenied("user denied consent".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialAcquirer for CannedCodeAcquirer {
    async fn authorize(&self, _: &ClientDescriptor, _: &[String]) -> AuthResult<AuthorizationGrant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let code = self.outcome.clone()?;
        Ok(AuthorizationGrant {
            code,
            pkce_verifier: "canned-verifier".to_string(),
            redirect_uri: "http://127.0.0.1:0".to_string(),
        })
    }
}
