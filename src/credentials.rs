//! Service-account authorization for the spreadsheet APIs.
//!
//! The credential blob comes from the environment, never from disk. A signed
//! JWT assertion is exchanged for a bearer token, which is cached and renewed
//! shortly before it expires.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::CredentialError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const RENEW_MARGIN_SECS: i64 = 60;

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Parses the raw credential blob.
pub fn parse_service_account(raw: Option<&str>) -> Result<ServiceAccountKey, CredentialError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(CredentialError::Missing)?;
    serde_json::from_str(raw).map_err(|err| CredentialError::Malformed(err.to_string()))
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(RENEW_MARGIN_SECS) < self.expires_at
    }
}

/// Authorized client handle: hands out bearer tokens for API calls.
pub struct TokenSource {
    http: reqwest::Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn new(http: reqwest::Client, key: ServiceAccountKey) -> Result<Self, CredentialError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|err| CredentialError::InvalidKey(err.to_string()))?;
        Ok(Self {
            http,
            key,
            signing_key,
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Returns a valid bearer token, exchanging a new assertion when the
    /// cached one is missing or about to expire.
    pub async fn access_token(&self) -> Result<String, CredentialError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let token = self.exchange(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, CredentialError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES.join(" "),
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|err| CredentialError::InvalidKey(err.to_string()))
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<AccessToken, CredentialError> {
        let assertion = self.assertion(now)?;
        debug!(token_uri = %self.key.token_uri, "exchanging service-account assertion");

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|err| CredentialError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| CredentialError::Network(format!("invalid token response: {err}")))?;

        let expires_at = Duration::try_seconds(token.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                CredentialError::Network(format!(
                    "token lifetime out of range: {}s",
                    token.expires_in
                ))
            })?;

        Ok(AccessToken {
            value: token.access_token,
            expires_at,
        })
    }
}

/// Parses the credential blob and performs the initial authorization call.
pub async fn authorize(
    http: reqwest::Client,
    raw: Option<&str>,
) -> Result<Arc<TokenSource>, CredentialError> {
    let key = parse_service_account(raw)?;
    let source = TokenSource::new(http, key)?;
    source.access_token().await?;
    info!(client_email = %source.client_email(), "spreadsheet credentials authorized");
    Ok(Arc::new(source))
}
