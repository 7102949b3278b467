//! Persisted OAuth credential handling.
//!
//! The credential file is produced by an external authorization tool and
//! has the shape:
//!
//! ```json
//! {
//!   "token": "ya29...",
//!   "refresh_token": "1//0g...",
//!   "client_id": "1234.apps.googleusercontent.com",
//!   "client_secret": "GOCSPX-...",
//!   "scopes": ["https://www.googleapis.com/auth/drive"],
//!   "expiry": "2026-10-19T12:00:00.000Z"
//! }
//! ```
//!
//! Fields this crate does not understand (e.g. `token_uri`) survive a rewrite.

pub mod session;
pub mod store;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use session::{Authorization, OAuthClient, Rotation, Session, SessionCredentials};
pub use store::{has_valid, load, CredentialStore, FileCredentialStore};

/// The on-disk credential bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Current access token.
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default, deserialize_with = "scopes_from_list_or_string")]
    pub scopes: Vec<String>,
    #[serde(
        default,
        deserialize_with = "expiry_from_iso8601",
        serialize_with = "expiry_to_iso8601",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<DateTime<Utc>>,
    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CredentialRecord {
    /// Reason the record cannot be used, if any.
    pub fn validate(&self) -> Result<(), String> {
        let missing: Vec<&str> = [
            ("client_id", self.client_id.trim().is_empty()),
            ("client_secret", self.client_secret.trim().is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing {}", missing.join(" and ")))
        }
    }

    /// Copy of this record carrying a refreshed access token. Every other
    /// field is preserved; `refresh_token` changes only when the provider
    /// rotated it. The old expiry belongs to the old token, so a response
    /// without a lifetime leaves `expiry` unset.
    pub fn refreshed(
        &self,
        access_token: String,
        expiry: Option<DateTime<Utc>>,
        refresh_token: Option<String>,
    ) -> Self {
        let mut updated = self.clone();
        updated.token = access_token;
        updated.expiry = expiry;
        if refresh_token.is_some() {
            updated.refresh_token = refresh_token;
        }
        updated
    }
}

fn scopes_from_list_or_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Option::<Scopes>::deserialize(deserializer)? {
        Some(Scopes::List(list)) => list,
        Some(Scopes::Joined(joined)) => joined.split_whitespace().map(String::from).collect(),
        None => Vec::new(),
    })
}

/// Accepts RFC 3339 timestamps as well as naive ISO 8601 ones, which are
/// taken to be UTC. Anything unreadable counts as an unknown expiry.
fn expiry_from_iso8601<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(raw)) if raw.trim().is_empty() => return Ok(None),
        Some(serde_json::Value::String(raw)) => parse_expiry(&raw).ok_or(raw),
        Some(other) => Err(other.to_string()),
    };

    match parsed {
        Ok(ts) => Ok(Some(ts)),
        Err(raw) => {
            tracing::warn!(expiry = %raw, "ignoring unreadable credential expiry");
            Ok(None)
        }
    }
}

fn expiry_to_iso8601<S>(expiry: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match expiry {
        Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
