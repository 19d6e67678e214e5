// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wearable provider capability contract and registry.
//!
//! Each provider integration implements [`WearableProvider`]; the
//! engines select one through [`ProviderRegistry`], which also owns
//! the per-provider semaphore bounding outbound call concurrency.

pub mod rest;

pub use rest::RestProvider;

use crate::error::{Result, SyncError};
use crate::models::Provider;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Token material returned by a provider's OAuth endpoints.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    /// Provider-side account id; present on code exchange.
    pub account_id: Option<String>,
}

/// One raw reading item as delivered by a provider, before
/// normalization into the canonical vocabulary.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReadingItem {
    /// Provider-side item identifier (stable across re-fetches).
    pub id: String,
    /// Provider-native metric name, e.g. `step_count`.
    pub metric: String,
    pub value: f64,
    /// Provider-native unit, e.g. `lbs`.
    pub unit: String,
    /// RFC3339 instant the reading was taken.
    pub timestamp: String,
}

/// One page of raw readings plus the cursor to resume from.
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    pub items: Vec<RawReadingItem>,
    pub next_cursor: Option<String>,
}

/// Capability contract each wearable provider must satisfy.
///
/// The engines are agnostic to whether an implementation talks to the
/// provider directly or to an intermediary aggregation layer.
#[async_trait::async_trait]
pub trait WearableProvider: Send + Sync {
    /// Exchange an OAuth authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens>;

    /// Refresh an expiring access token.
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokens>;

    /// Fetch readings since the given cursor (None = from the start).
    async fn fetch_readings(
        &self,
        access_token: &str,
        since_cursor: Option<&str>,
    ) -> Result<FetchPage>;
}

struct RegistryEntry {
    client: Arc<dyn WearableProvider>,
    semaphore: Arc<Semaphore>,
}

/// Provider implementations keyed by provider identifier.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: HashMap<Provider, RegistryEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider client with its outbound concurrency cap.
    pub fn register(
        &mut self,
        provider: Provider,
        client: Arc<dyn WearableProvider>,
        concurrency_cap: usize,
    ) {
        self.entries.insert(
            provider,
            RegistryEntry {
                client,
                semaphore: Arc::new(Semaphore::new(concurrency_cap.max(1))),
            },
        );
    }

    pub fn client(&self, provider: Provider) -> Result<Arc<dyn WearableProvider>> {
        self.entries
            .get(&provider)
            .map(|e| e.client.clone())
            .ok_or_else(|| SyncError::NotFound(format!("provider {} not registered", provider)))
    }

    /// Semaphore shared by all of one provider's connections.
    pub fn semaphore(&self, provider: Provider) -> Result<Arc<Semaphore>> {
        self.entries
            .get(&provider)
            .map(|e| e.semaphore.clone())
            .ok_or_else(|| SyncError::NotFound(format!("provider {} not registered", provider)))
    }
}
