//! minato-client — outbound FHIR store client.
//!
//! Cached client-credential auth, bounded retry with exponential
//! backoff, and the search/create/update surface the intake gateway
//! uses. This crate owns every unbounded-latency operation in the
//! system; the core never waits on anything.

pub mod error;
pub mod retry;
pub mod token;

pub use error::{Result, StoreError};
pub use retry::RetryPolicy;
pub use token::TokenCache;

use serde_json::Value;

/// Connection settings for the FHIR store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL, e.g. `https://fhir.example.com`. The token endpoint is
    /// `{base}/oauth2/token` and resources live under `{base}/fhir/R4`.
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub retry: RetryPolicy,
}

pub struct FhirStore {
    config: StoreConfig,
    http: reqwest::Client,
    tokens: TokenCache,
}

impl FhirStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            tokens: TokenCache::new(),
        }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn fhir_url(&self, path: &str) -> String {
        format!("{}/fhir/R4/{}", self.base(), path)
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.base())
    }

    async fn bearer(&self) -> Result<String> {
        self.tokens
            .bearer(
                &self.http,
                &self.token_url(),
                &self.config.client_id,
                &self.config.client_secret,
                &self.config.scope,
            )
            .await
    }

    /// Search a resource type; returns the searchset Bundle.
    pub async fn search(&self, resource_type: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.config
            .retry
            .run("search", move || async move {
                let token = self.bearer().await?;
                let response = self
                    .http
                    .get(self.fhir_url(resource_type))
                    .query(params)
                    .bearer_auth(token)
                    .send()
                    .await?;
                read_json(response).await
            })
            .await
    }

    /// First match for `identifier=system|value`, if any.
    pub async fn find_by_identifier(
        &self,
        resource_type: &str,
        system: &str,
        value: &str,
    ) -> Result<Option<Value>> {
        let identifier = format!("{system}|{value}");
        let bundle = self
            .search(resource_type, &[("identifier", identifier.as_str())])
            .await?;
        Ok(bundle
            .get("entry")
            .and_then(Value::as_array)
            .and_then(|entries| entries.first())
            .and_then(|entry| entry.get("resource"))
            .cloned())
    }

    /// Create a resource; returns the stored representation.
    pub async fn create(&self, resource_type: &str, resource: &Value) -> Result<Value> {
        tracing::info!(target: "store", resource_type, "store create");
        self.config
            .retry
            .run("create", move || async move {
                let token = self.bearer().await?;
                let response = self
                    .http
                    .post(self.fhir_url(resource_type))
                    .bearer_auth(token)
                    .json(resource)
                    .send()
                    .await?;
                read_json(response).await
            })
            .await
    }

    /// Update a resource by id; returns the stored representation.
    pub async fn update(&self, resource_type: &str, id: &str, resource: &Value) -> Result<Value> {
        tracing::info!(target: "store", resource_type, id, "store update");
        let path = format!("{resource_type}/{id}");
        let path = path.as_str();
        self.config
            .retry
            .run("update", move || async move {
                let token = self.bearer().await?;
                let response = self
                    .http
                    .put(self.fhir_url(path))
                    .bearer_auth(token)
                    .json(resource)
                    .send()
                    .await?;
                read_json(response).await
            })
            .await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}
