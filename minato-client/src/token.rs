//! Client-credentials token cache for the outbound FHIR store.
//!
//! A token is reused until 30 seconds before its expiry, then refreshed
//! under a write lock with a post-acquisition re-check so concurrent
//! requests trigger a single refresh.

use crate::error::{Result, StoreError};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Refresh this long before the token would expire.
const REFRESH_SKEW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_SKEW < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    300
}

#[derive(Default)]
pub struct TokenCache {
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bearer token, fetching a fresh one when needed.
    pub async fn bearer(
        &self,
        http: &reqwest::Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<String> {
        // Fast path (read lock)
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref()
                && token.is_fresh()
            {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited
        if let Some(token) = cached.as_ref()
            && token.is_fresh()
        {
            return Ok(token.access_token.clone());
        }

        let response = http
            .post(token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", scope),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Token(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Token(format!("malformed token response: {e}")))?;

        let expires_in = token.expires_in;
        let fresh = CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        };
        tracing::debug!(target: "store", expires_in, "store token refreshed");

        let bearer = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(bearer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_fresh_until_skew_window() {
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        assert!(token.is_fresh());
    }

    #[test]
    fn test_token_stale_inside_skew_window() {
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(10),
        };
        assert!(!token.is_fresh());
    }

    #[test]
    fn test_expires_in_defaults_when_absent() {
        let response: TokenResponse =
            serde_json::from_str(r#"{ "access_token": "abc" }"#).unwrap();
        assert_eq!(response.expires_in, 300);
    }
}
