//! OAuth token holder for the posting account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_MS: i64 = 60_000;

/// Serialized token set as produced by Google's OAuth tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix time in milliseconds.
    #[serde(default)]
    pub expiry_date: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenSet {
    /// A token without a recorded expiry is trusted until the API rejects it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expiry_date) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(_), Some(expiry)) => expiry - EXPIRY_MARGIN_MS <= now.timestamp_millis(),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    NoRefreshToken,
    Http(String),
    Rejected(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NoRefreshToken => write!(f, "access token expired and no refresh token is configured"),
            Error::Http(e) => write!(f, "token refresh HTTP error: {e}"),
            Error::Rejected(e) => write!(f, "token refresh rejected: {e}"),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
}

pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    tokens: Mutex<TokenSet>,
}

impl OAuthClient {
    pub fn new(client_id: String, client_secret: String, tokens: TokenSet) -> Self {
        Self {
            client_id,
            client_secret,
            http: reqwest::Client::new(),
            tokens: Mutex::new(tokens),
        }
    }

    /// Current access token, refreshed first if it has expired.
    pub async fn access_token(&self) -> Result<String, Error> {
        let mut tokens = self.tokens.lock().await;
        if !tokens.is_expired(Utc::now())
            && let Some(ref token) = tokens.access_token
        {
            return Ok(token.clone());
        }

        let refresh_token = tokens.refresh_token.clone().ok_or(Error::NoRefreshToken)?;
        let refreshed = self.refresh(&refresh_token).await?;

        tokens.expiry_date = refreshed
            .expires_in
            .map(|secs| Utc::now().timestamp_millis() + secs * 1000);
        tokens.access_token = Some(refreshed.access_token.clone());
        if refreshed.token_type.is_some() {
            tokens.token_type = refreshed.token_type;
        }
        if refreshed.scope.is_some() {
            tokens.scope = refreshed.scope;
        }

        info!("🔑 Refreshed OAuth access token");
        Ok(refreshed.access_token)
    }

    /// Forget the cached access token so the next call refreshes it.
    pub async fn invalidate(&self) {
        let mut tokens = self.tokens.lock().await;
        tokens.access_token = None;
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, Error> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Token refresh failed: {status}");
            return Err(Error::Rejected(format!("{status}: {body}")));
        }

        response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| Error::Rejected(format!("unreadable token response: {e}")))
    }
}
