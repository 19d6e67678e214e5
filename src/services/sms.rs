// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SMS transport contract and HTTP implementation.
//!
//! Retry and backoff for failed sends live in the reminder engine;
//! the transport does exactly one delivery attempt per call.

use crate::config::SmsSettings;
use crate::error::{Result, SyncError};
use serde::Deserialize;

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub message_id: String,
}

/// One-shot SMS delivery.
#[async_trait::async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<DeliveryResult>;
}

/// reqwest-backed SMS gateway client.
#[derive(Clone)]
pub struct HttpSmsClient {
    http: reqwest::Client,
    settings: SmsSettings,
}

impl HttpSmsClient {
    pub fn new(settings: SmsSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

#[async_trait::async_trait]
impl SmsTransport for HttpSmsClient {
    async fn send(&self, phone: &str, message: &str) -> Result<DeliveryResult> {
        let response = self
            .http
            .post(&self.settings.api_url)
            .bearer_auth(&self.settings.api_token)
            .form(&[
                ("from", self.settings.from_number.as_str()),
                ("to", phone),
                ("body", message),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Transient(format!("SMS send failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(SyncError::Transient(format!(
                    "SMS gateway HTTP {}: {}",
                    status, body
                )));
            }
            // 4xx: bad number or rejected content, retrying won't help.
            return Err(SyncError::Validation(format!(
                "SMS gateway HTTP {}: {}",
                status, body
            )));
        }

        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Validation(format!("SMS response parse error: {}", e)))?;
        Ok(DeliveryResult {
            message_id: body.message_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}
