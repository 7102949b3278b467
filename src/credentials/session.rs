//! Refreshable OAuth session built from a stored credential record.
//!
//! Refresh is lazy: `authorize` only talks to the token endpoint when the
//! known expiry is inside the refresh window. When a refresh happens the
//! caller receives the updated record as a [`Rotation`] and is responsible
//! for persisting it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::CredentialRecord;
use crate::errors::DeployError;

/// Refresh this long before the recorded expiry.
const REFRESH_SKEW_SECS: i64 = 300;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Credential shape the HTTP layer works with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Expiry as epoch milliseconds.
    pub expiry_date: Option<i64>,
    pub token_type: String,
    /// Scopes joined with single spaces.
    pub scope: String,
}

impl From<&CredentialRecord> for SessionCredentials {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            access_token: record.token.clone(),
            refresh_token: record.refresh_token.clone(),
            expiry_date: record.expiry.map(|ts| ts.timestamp_millis()),
            token_type: "Bearer".to_string(),
            scope: record.scopes.join(" "),
        }
    }
}

/// Token endpoint response for `grant_type=refresh_token`.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    error_description: Option<String>,
}

/// Talks to the OAuth token endpoint.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    token_uri: String,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, token_uri: impl Into<String>) -> Self {
        Self {
            http,
            token_uri: token_uri.into(),
        }
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// A rejected grant maps to `CredentialExpired`; anything else is a
    /// plain remote failure.
    pub async fn refresh(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, DeployError> {
        let resp = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(DeployError::transport)?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<TokenResponse>()
                .await
                .map_err(|e| DeployError::Remote {
                    status: Some(status.as_u16()),
                    message: format!("invalid token response: {}", e),
                });
        }

        let body = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<TokenErrorBody>(&body) {
            Ok(err) if err.error == "invalid_grant" || err.error == "invalid_client" || status.as_u16() == 401 => {
                Err(DeployError::expired(match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                }))
            }
            _ if status.as_u16() == 401 => Err(DeployError::expired(body)),
            _ => Err(DeployError::Remote {
                status: Some(status.as_u16()),
                message: format!("token refresh failed: {}", body),
            }),
        }
    }
}

/// A refreshed credential the caller must persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotation {
    pub record: CredentialRecord,
    /// The provider issued a new refresh token as well.
    pub refresh_token_rotated: bool,
}

/// Result of [`Session::authorize`].
#[derive(Debug, Clone)]
pub struct Authorization {
    pub bearer: String,
    /// Set when this call refreshed the access token.
    pub rotation: Option<Rotation>,
}

pub struct Session {
    record: CredentialRecord,
    credentials: SessionCredentials,
    oauth: OAuthClient,
}

impl Session {
    pub fn new(record: CredentialRecord, oauth: OAuthClient) -> Self {
        let credentials = SessionCredentials::from(&record);
        Self {
            record,
            credentials,
            oauth,
        }
    }

    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    pub fn can_refresh(&self) -> bool {
        self.credentials
            .refresh_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    /// True when the access token is missing or expires within the skew
    /// window. An unknown expiry counts as valid until the server says
    /// otherwise.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.credentials.access_token.is_empty() {
            return true;
        }
        match self.credentials.expiry_date {
            Some(millis) => millis - (now + Duration::seconds(REFRESH_SKEW_SECS)).timestamp_millis() <= 0,
            None => false,
        }
    }

    /// Bearer token for the next call, refreshing first if needed.
    pub async fn authorize(&mut self) -> Result<Authorization, DeployError> {
        let rotation = if self.needs_refresh(Utc::now()) {
            Some(self.refresh().await?)
        } else {
            None
        };

        Ok(Authorization {
            bearer: self.credentials.access_token.clone(),
            rotation,
        })
    }

    /// Refresh unconditionally, e.g. after the server rejected a token we
    /// believed was still valid.
    pub async fn refresh(&mut self) -> Result<Rotation, DeployError> {
        let refresh_token = match self.credentials.refresh_token.as_deref() {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => {
                return Err(DeployError::expired(
                    "access token expired and no refresh_token is stored",
                ))
            }
        };

        tracing::info!(token_uri = %self.oauth.token_uri(), "refreshing access token");
        let resp = self
            .oauth
            .refresh(&self.record.client_id, &self.record.client_secret, &refresh_token)
            .await?;

        let expiry = resp
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        let refresh_token_rotated = resp
            .refresh_token
            .as_deref()
            .is_some_and(|new| new != refresh_token);

        self.record = self
            .record
            .refreshed(resp.access_token, expiry, resp.refresh_token);
        self.credentials = SessionCredentials::from(&self.record);

        tracing::info!(
            expiry = ?self.record.expiry,
            refresh_token_rotated,
            "access token refreshed"
        );

        Ok(Rotation {
            record: self.record.clone(),
            refresh_token_rotated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(expiry: Option<DateTime<Utc>>) -> CredentialRecord {
        CredentialRecord {
            token: "ya29.old".into(),
            refresh_token: Some("1//refresh".into()),
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
            scopes: vec!["scope-a".into(), "scope-b".into()],
            expiry,
            extra: Default::default(),
        }
    }

    fn session(server: &MockServer, expiry: Option<DateTime<Utc>>) -> Session {
        let oauth = OAuthClient::new(reqwest::Client::new(), format!("{}/token", server.uri()));
        Session::new(record(expiry), oauth)
    }

    #[test]
    fn test_maps_record_into_session_shape() {
        let expiry = Utc::now();
        let creds = SessionCredentials::from(&record(Some(expiry)));
        assert_eq!(creds.access_token, "ya29.old");
        assert_eq!(creds.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(creds.expiry_date, Some(expiry.timestamp_millis()));
        assert_eq!(creds.token_type, "Bearer");
        assert_eq!(creds.scope, "scope-a scope-b");
    }

    #[tokio::test]
    async fn test_future_expiry_does_not_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut session = session(&server, Some(Utc::now() + Duration::hours(1)));
        let auth = session.authorize().await.unwrap();
        assert_eq!(auth.bearer, "ya29.old");
        assert!(auth.rotation.is_none());
    }

    #[tokio::test]
    async fn test_unknown_expiry_does_not_refresh() {
        let server = MockServer::start().await;
        let mut session = session(&server, None);
        assert!(!session.needs_refresh(Utc::now()));
        assert!(session.authorize().await.unwrap().rotation.is_none());
    }

    #[tokio::test]
    async fn test_past_expiry_refreshes_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=client-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server, Some(Utc::now() - Duration::hours(1)));
        let auth = session.authorize().await.unwrap();
        assert_eq!(auth.bearer, "ya29.new");

        let rotation = auth.rotation.expect("refresh should report a rotation");
        assert!(!rotation.refresh_token_rotated);
        assert_eq!(rotation.record.token, "ya29.new");
        assert_eq!(rotation.record.refresh_token.as_deref(), Some("1//refresh"));
        assert!(rotation.record.expiry.unwrap() > Utc::now());

        // second call reuses the fresh token
        let again = session.authorize().await.unwrap();
        assert!(again.rotation.is_none());
        assert_eq!(again.bearer, "ya29.new");
    }

    #[tokio::test]
    async fn test_refresh_without_lifetime_is_not_repeated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server, Some(Utc::now() - Duration::hours(1)));
        let first = session.authorize().await.unwrap();
        let rotation = first.rotation.expect("expired token should refresh");
        assert_eq!(rotation.record.expiry, None);
        assert_eq!(session.credentials().expiry_date, None);

        for _ in 0..2 {
            let auth = session.authorize().await.unwrap();
            assert!(auth.rotation.is_none());
            assert_eq!(auth.bearer, "ya29.new");
        }
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3600,
                "refresh_token": "1//rotated"
            })))
            .mount(&server)
            .await;

        let mut session = session(&server, Some(Utc::now() - Duration::minutes(1)));
        let rotation = session.refresh().await.unwrap();
        assert!(rotation.refresh_token_rotated);
        assert_eq!(session.credentials().refresh_token.as_deref(), Some("1//rotated"));
    }

    #[tokio::test]
    async fn test_invalid_grant_is_credential_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let mut session = session(&server, Some(Utc::now() - Duration::hours(2)));
        let err = session.authorize().await.unwrap_err();
        assert!(matches!(err, DeployError::CredentialExpired { .. }));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_token_endpoint_outage_is_not_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let mut session = session(&server, Some(Utc::now() - Duration::hours(2)));
        let err = session.authorize().await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let server = MockServer::start().await;
        let oauth = OAuthClient::new(reqwest::Client::new(), format!("{}/token", server.uri()));
        let mut rec = record(Some(Utc::now() - Duration::hours(1)));
        rec.refresh_token = None;
        let mut session = Session::new(rec, oauth);

        assert!(!session.can_refresh());
        let err = session.authorize().await.unwrap_err();
        assert!(matches!(err, DeployError::CredentialExpired { .. }));
    }
}
