//! OAuth2 client credentials for Microsoft services.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::ServiceError;

/// Anything able to hand out a bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, ServiceError>;
}

/// Pre-issued bearer token.
#[derive(Debug, Clone)]
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, ServiceError> {
        Ok(self.0.expose_secret().to_owned())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Client credentials flow with an in-memory token cache.
///
/// One cache is bound to one resource (Graph, SharePoint admin, ...).
#[derive(Debug)]
pub struct TokenCache {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    scope: String,
    cached: RwLock<Option<CachedToken>>,
    grace_period: Duration,
}

impl TokenCache {
    /// Create a new [`TokenCache`] for `resource`.
    pub fn new(
        http: reqwest::Client,
        login_endpoint: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
        resource: &str,
    ) -> Self {
        Self {
            http,
            token_url: format!("{login_endpoint}/{tenant_id}/oauth2/v2.0/token"),
            client_id: client_id.into(),
            client_secret,
            scope: format!("{}/.default", resource.trim_end_matches('/')),
            cached: RwLock::new(None),
            grace_period: Duration::minutes(5),
        }
    }

    #[instrument(skip(self), fields(scope = %self.scope))]
    async fn acquire(&self) -> Result<CachedToken, ServiceError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| ServiceError::Auth(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Auth(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::Auth(err.to_string()))?;

        debug!(expires_in = token.expires_in, "access token acquired");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl TokenSource for TokenCache {
    async fn token(&self) -> Result<String, ServiceError> {
        if let Some(token) = self.cached.read().await.as_ref() {
            if !token.is_expired(self.grace_period) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.acquire().await?;
        let access_token = token.access_token.clone();
        *self.cached.write().await = Some(token);

        Ok(access_token)
    }
}
