use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::day_card::{DayCard, DayCardDraft, EntryBackend};
use super::error::ClientError;
use super::kv::KeyValueStore;
use super::session::SessionTracker;
use crate::auth::cookies::CredentialScope;

pub const ACCESS_TOKEN_KEY: &str = "daypat.access_token";
pub const REFRESH_TOKEN_KEY: &str = "daypat.refresh_token";
const API_PREFIX: &str = "/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub anon_key: String,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    pub fn from_env() -> Result<Self, ClientError> {
        let url = std::env::var("DAYPAT_API_URL").ok().filter(|v| !v.trim().is_empty());
        let key = std::env::var("DAYPAT_ANON_KEY").ok().filter(|v| !v.trim().is_empty());
        match (url, key) {
            (Some(url), Some(key)) => Ok(Self::new(url, key)),
            (None, _) => Err(ClientError::Config("DAYPAT_API_URL is not set".into())),
            (_, None) => Err(ClientError::Config("DAYPAT_ANON_KEY is not set".into())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct DayCardEnvelope {
    card: Option<DayCard>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for the DayPat API. Tokens go to the store picked at
/// construction: persistent when the user asked to be remembered.
pub struct ApiClient {
    config: ClientConfig,
    http: reqwest::Client,
    scope: CredentialScope,
    credentials: Arc<dyn KeyValueStore>,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        scope: CredentialScope,
        credentials: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self {
            config,
            http,
            scope,
            credentials,
        })
    }

    pub fn scope(&self) -> CredentialScope {
        self.scope
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.config.api_url, API_PREFIX, path)
    }

    pub fn access_token(&self) -> Option<String> {
        self.credentials.get(ACCESS_TOKEN_KEY).unwrap_or_else(|e| {
            warn!(error = %e, "credentials unreadable");
            None
        })
    }

    fn store_tokens(&self, tokens: &TokenPair) -> Result<(), ClientError> {
        self.credentials
            .set(ACCESS_TOKEN_KEY, &tokens.access_token)
            .and_then(|_| self.credentials.set(REFRESH_TOKEN_KEY, &tokens.refresh_token))
            .map_err(|e| ClientError::Unexpected(format!("store credentials: {}", e)))
    }

    pub fn clear_credentials(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.credentials.remove(key) {
                warn!(error = %e, key, "credential not cleared");
            }
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, self.url(path))
            .header("x-api-key", &self.config.anon_key);
        if let Some(token) = self.access_token() {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ClientError> {
        let res = req.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res.json::<T>().await?);
        }
        let detail = res
            .json::<ErrorEnvelope>()
            .await
            .map(|e| e.error.message)
            .unwrap_or_default();
        debug!(%status, %detail, "api call failed");
        Err(ClientError::from_status(status, detail))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let remember_me = self.scope == CredentialScope::Persistent;
        let req = self
            .request(reqwest::Method::POST, "/auth/login")
            .json(&json!({ "email": email, "password": password, "remember_me": remember_me }));
        let tokens: TokenPair = self.send(req).await?;
        self.store_tokens(&tokens)?;
        info!(remember_me, "signed in");
        Ok(())
    }

    /// Revoke server-side state and forget local credentials. Credentials
    /// are dropped even when the server cannot be reached.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .request(reqwest::Method::POST, "/auth/logout")
            .send()
            .await
            .map_err(ClientError::from)
            .and_then(|res| match res.status() {
                s if s.is_success() || s == StatusCode::UNAUTHORIZED => Ok(()),
                s => Err(ClientError::from_status(s, String::new())),
            });
        self.clear_credentials();
        result
    }
}

#[async_trait]
impl EntryBackend for ApiClient {
    async fn fetch_day_card(&self, date: &str) -> Result<Option<DayCard>, ClientError> {
        let req = self.request(reqwest::Method::GET, &format!("/entries/{}", date));
        let envelope: DayCardEnvelope = self.send(req).await?;
        Ok(envelope.card)
    }

    async fn upsert_day_card(&self, draft: &DayCardDraft) -> Result<DayCard, ClientError> {
        let req = self
            .request(reqwest::Method::PUT, &format!("/entries/{}", draft.date))
            .json(draft);
        self.send(req).await
    }
}

/// Owner of the current [`ApiClient`]. Built on first use; [`reset`] must be
/// called after logout or after the remember-me preference changes so the
/// next client picks the right credential store.
///
/// [`reset`]: ClientSlot::reset
pub struct ClientSlot {
    config: Result<ClientConfig, ClientError>,
    persistent: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    current: Mutex<Option<Arc<ApiClient>>>,
}

impl ClientSlot {
    pub fn new(
        config: Result<ClientConfig, ClientError>,
        persistent: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
    ) -> Self {
        if let Err(e) = &config {
            warn!(error = %e, "api client unavailable");
        }
        Self {
            config,
            persistent,
            session,
            current: Mutex::new(None),
        }
    }

    pub fn from_env(persistent: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self::new(ClientConfig::from_env(), persistent, session)
    }

    pub fn tracker(&self) -> SessionTracker {
        SessionTracker::new(self.persistent.clone(), self.session.clone())
    }

    pub fn get(&self) -> Result<Arc<ApiClient>, ClientError> {
        let config = self.config.clone()?;
        let mut current = self
            .current
            .lock()
            .map_err(|_| ClientError::Unexpected("client slot poisoned".into()))?;
        if let Some(client) = current.as_ref() {
            return Ok(client.clone());
        }

        let scope = CredentialScope::from_remember_me(self.tracker().get_remember_me());
        let store = match scope {
            CredentialScope::Persistent => self.persistent.clone(),
            CredentialScope::Session => self.session.clone(),
        };
        let client = Arc::new(ApiClient::new(config, scope, store)?);
        debug!(?scope, "api client created");
        *current = Some(client.clone());
        Ok(client)
    }

    pub fn reset(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}
