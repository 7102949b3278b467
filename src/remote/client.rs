//! Authenticated HTTP client for the remote APIs.
//!
//! Every call asks the session for a bearer token first. When the session
//! reports a rotation, the new record goes to the credential store before
//! the request is sent. Read-only calls run through the transient-retry
//! middleware; mutating calls are attempted exactly once.

use std::sync::Arc;
use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use tokio::sync::Mutex;

use crate::credentials::{CredentialStore, Rotation, Session};
use crate::errors::DeployError;

/// Whether a call may be retried on transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Read,
    Mutation,
}

pub struct AuthenticatedClient {
    session: Mutex<Session>,
    store: Arc<dyn CredentialStore>,
    reads: ClientWithMiddleware,
    writes: ClientWithMiddleware,
    api_key: Option<String>,
}

/// Base reqwest client shared by the API and token endpoints.
pub fn build_http_client() -> Result<reqwest::Client, DeployError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("scriptdeploy/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(DeployError::transport)
}

impl AuthenticatedClient {
    pub fn new(
        http: reqwest::Client,
        session: Session,
        store: Arc<dyn CredentialStore>,
        api_key: Option<String>,
    ) -> Self {
        // Retries: 3 times, exponential backoff
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let reads = ClientBuilder::new(http.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        let writes = ClientBuilder::new(http).build();

        Self {
            session: Mutex::new(session),
            store,
            reads,
            writes,
            api_key,
        }
    }

    fn persist(&self, rotation: &Rotation) -> Result<(), DeployError> {
        tracing::info!(
            location = %self.store.location().display(),
            refresh_token_rotated = rotation.refresh_token_rotated,
            "token refreshed, saving"
        );
        self.store.persist(&rotation.record)
    }

    /// Send a request built by `build`, returning the successful response.
    ///
    /// `build` may run twice: after a 401 on a token we believed valid the
    /// session is refreshed once and the request replayed.
    pub async fn send<F>(&self, kind: CallKind, build: F) -> Result<reqwest::Response, DeployError>
    where
        F: Fn(&ClientWithMiddleware) -> RequestBuilder,
    {
        let client = match kind {
            CallKind::Read => &self.reads,
            CallKind::Mutation => &self.writes,
        };

        let mut session = self.session.lock().await;
        let auth = session
            .authorize()
            .await
            .map_err(|e| e.with_credential_path(self.store.location()))?;
        let refreshed_now = auth.rotation.is_some();
        if let Some(rotation) = &auth.rotation {
            self.persist(rotation)?;
        }

        let resp = self.dispatch(client, &build, &auth.bearer).await?;
        if resp.status().as_u16() != 401 || refreshed_now || !session.can_refresh() {
            return check_status(resp).await;
        }

        tracing::warn!("access token rejected, forcing a refresh and retrying once");
        let rotation = session
            .refresh()
            .await
            .map_err(|e| e.with_credential_path(self.store.location()))?;
        self.persist(&rotation)?;
        let bearer = session.credentials().access_token.clone();
        drop(session);

        let resp = self.dispatch(client, &build, &bearer).await?;
        check_status(resp).await
    }

    async fn dispatch<F>(
        &self,
        client: &ClientWithMiddleware,
        build: &F,
        bearer: &str,
    ) -> Result<reqwest::Response, DeployError>
    where
        F: Fn(&ClientWithMiddleware) -> RequestBuilder,
    {
        let mut req = build(client).bearer_auth(bearer);
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key.as_str())]);
        }

        req.send().await.map_err(|e| {
            tracing::warn!("remote request failed: {}", e);
            DeployError::transport(e)
        })
    }
}

/// Turn a non-2xx response into `DeployError::Remote`, keeping the
/// provider's error message when the body carries one.
pub async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, DeployError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or(body);

    Err(DeployError::Remote {
        status: Some(status.as_u16()),
        message,
    })
}
