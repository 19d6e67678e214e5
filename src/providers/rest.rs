// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! REST provider client.
//!
//! Speaks the unified pull surface our wearable partners expose:
//! form-encoded OAuth token endpoints and a bearer-authed, cursored
//! readings endpoint. HTTP status codes map onto the engine error
//! taxonomy: 401/403 means the grant is gone, 429 and 5xx are
//! retryable outages.

use crate::error::{Result, SyncError};
use crate::models::Provider;
use crate::providers::{FetchPage, ProviderTokens, RawReadingItem, WearableProvider};
use chrono::{Duration, Utc};
use serde::Deserialize;

/// reqwest-backed implementation of [`WearableProvider`].
#[derive(Clone)]
pub struct RestProvider {
    http: reqwest::Client,
    provider: Provider,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl RestProvider {
    pub fn new(
        provider: Provider,
        base_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider,
            base_url,
            client_id,
            client_secret,
        }
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<ProviderTokens> {
        let url = format!("{}/oauth2/token", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(|e| SyncError::Transient(format!("token request failed: {}", e)))?;

        let body: TokenResponse = self.check_response_json(response).await?;
        Ok(ProviderTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
            account_id: body.account_id,
        })
    }

    /// Map an error response onto the engine taxonomy.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(SyncError::AuthRevoked(format!(
                    "{} rejected credentials: HTTP {}",
                    self.provider, status
                )));
            }

            if status.as_u16() == 429 {
                tracing::warn!(provider = %self.provider, "Provider rate limit hit (429)");
                return Err(SyncError::Transient("provider rate limit".to_string()));
            }

            return Err(SyncError::Transient(format!(
                "{} HTTP {}: {}",
                self.provider, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::Validation(format!("JSON parse error: {}", e)))
    }
}

#[async_trait::async_trait]
impl WearableProvider for RestProvider {
    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokens> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn fetch_readings(
        &self,
        access_token: &str,
        since_cursor: Option<&str>,
    ) -> Result<FetchPage> {
        let url = format!("{}/v1/readings", self.base_url);
        let mut request = self.http.get(&url).bearer_auth(access_token);
        if let Some(cursor) = since_cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transient(format!("readings fetch failed: {}", e)))?;

        let page: ReadingsResponse = self.check_response_json(response).await?;
        Ok(FetchPage {
            items: page.items,
            next_cursor: page.next_cursor,
        })
    }
}

/// Token endpoint wire format.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Seconds until the access token expires.
    expires_in: i64,
    /// Provider account id, returned on authorization-code exchange.
    account_id: Option<String>,
}

/// Readings endpoint wire format.
#[derive(Debug, Deserialize)]
struct ReadingsResponse {
    items: Vec<RawReadingItem>,
    next_cursor: Option<String>,
}
