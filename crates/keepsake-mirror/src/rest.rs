//! PostgREST-compatible HTTP remote store.
//!
//! Tables are exposed at `{base_url}/rest/v1/{table}` and filtered with
//! `column=eq.value` query parameters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keepsake_core::defaults::{REMOTE_REST_PATH, REMOTE_TIMEOUT_SECS};
use keepsake_core::{Error, RemoteRow, RemoteStore, Result, SessionProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default backend URL for local development.
pub const DEFAULT_REMOTE_URL: &str = "http://localhost:54321";

/// Configuration for the HTTP remote store.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL of the backend (without the REST path).
    pub base_url: String,
    /// Project API key sent as the `apikey` header.
    pub api_key: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REMOTE_URL.to_string(),
            api_key: None,
            timeout_seconds: REMOTE_TIMEOUT_SECS,
        }
    }
}

impl RestConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `KEEPSAKE_REMOTE_URL` | `http://localhost:54321` | Backend base URL |
    /// | `KEEPSAKE_REMOTE_API_KEY` | unset | Project API key |
    /// | `KEEPSAKE_REMOTE_TIMEOUT_SECS` | `30` | Per-call timeout |
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("KEEPSAKE_REMOTE_URL")
                .unwrap_or_else(|_| DEFAULT_REMOTE_URL.to_string()),
            api_key: std::env::var("KEEPSAKE_REMOTE_API_KEY").ok(),
            timeout_seconds: std::env::var("KEEPSAKE_REMOTE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(REMOTE_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ClientIdRow {
    client_id: Uuid,
}

/// Remote store speaking the PostgREST dialect over HTTP.
pub struct RestRemoteStore {
    client: Client,
    config: RestConfig,
    session: Arc<dyn SessionProvider>,
}

impl RestRemoteStore {
    /// Create a store; the session supplies the bearer token per request.
    pub fn new(config: RestConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            url = %config.base_url,
            timeout_seconds = config.timeout_seconds,
            "Initializing REST remote store"
        );

        Ok(Self {
            client,
            config,
            session,
        })
    }

    /// Create from environment variables.
    pub fn from_env(session: Arc<dyn SessionProvider>) -> Result<Self> {
        Self::new(RestConfig::from_env(), session)
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}{}/{}",
            self.config.base_url.trim_end_matches('/'),
            REMOTE_REST_PATH,
            table
        )
    }

    /// Attach project key and bearer token.
    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let mut req = req;
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("apikey", api_key);
        }
        let bearer = self
            .session
            .access_token()
            .or_else(|| self.config.api_key.clone());
        if let Some(token) = bearer {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let response = self.authorize(req).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Network(format!("Request timed out: {}", e))
            } else {
                Error::Network(format!("Request failed: {}", e))
            }
        })?;
        check_status(response).await
    }
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(status = %status, "Remote store refused credentials");
            Err(Error::NotAuthenticated)
        }
        _ => {
            warn!(status = %status, body = %body, "Remote store rejected request");
            Err(Error::RemoteRejected(format!("{}: {}", status, body)))
        }
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn find_row(
        &self,
        table: &str,
        owner_id: &str,
        client_id: Uuid,
    ) -> Result<Option<RemoteRow>> {
        let req = self.client.get(self.table_url(table)).query(&[
            ("select", "*".to_string()),
            ("owner_id", eq(owner_id)),
            ("client_id", eq(client_id)),
            ("limit", "1".to_string()),
        ]);

        let rows: Vec<RemoteRow> = self
            .send(req)
            .await?
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse rows: {}", e)))?;
        debug!(table, found = !rows.is_empty(), "Looked up remote row");
        Ok(rows.into_iter().next())
    }

    async fn insert_row(&self, table: &str, row: &RemoteRow) -> Result<()> {
        let req = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(row);
        self.send(req).await?;
        Ok(())
    }

    async fn update_row(&self, table: &str, remote_id: &str, row: &RemoteRow) -> Result<()> {
        let mut body = row.clone();
        body.remote_id = None;

        let req = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", eq(remote_id))])
            .header("Prefer", "return=minimal")
            .json(&body);
        self.send(req).await?;
        Ok(())
    }

    async fn delete_rows(&self, table: &str, owner_id: &str, client_id: Uuid) -> Result<u64> {
        let req = self
            .client
            .delete(self.table_url(table))
            .query(&[
                ("owner_id", eq(owner_id)),
                ("client_id", eq(client_id)),
                ("select", "id".to_string()),
            ])
            .header("Prefer", "return=representation");

        let text = self.send(req).await?.text().await?;
        if text.trim().is_empty() {
            return Ok(0);
        }
        let removed: Vec<serde_json::Value> = serde_json::from_str(&text)?;
        Ok(removed.len() as u64)
    }

    async fn list_client_ids(&self, table: &str, owner_id: &str) -> Result<Vec<Uuid>> {
        let req = self.client.get(self.table_url(table)).query(&[
            ("select", "client_id".to_string()),
            ("owner_id", eq(owner_id)),
        ]);

        let rows: Vec<ClientIdRow> = self
            .send(req)
            .await?
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse client ids: {}", e)))?;
        Ok(rows.into_iter().map(|r| r.client_id).collect())
    }
}
