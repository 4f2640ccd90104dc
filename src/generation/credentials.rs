//! Ordered credential resolution for the remote generator.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::{self, KeyValueStore};

/// A source of the API credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// The credential, if this source has one.
    async fn resolve(&self) -> Option<String>;
}

/// A credential fixed at construction (environment or build-time injection).
#[derive(Debug, Clone)]
pub struct StaticCredential {
    key: Option<String>,
}

impl StaticCredential {
    pub fn new(key: Option<String>) -> Self {
        Self { key }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    fn name(&self) -> &'static str {
        "injected"
    }

    async fn resolve(&self) -> Option<String> {
        self.key.clone()
    }
}

/// The credential saved in local persistent storage.
#[derive(Clone)]
pub struct StoredCredential {
    storage: Arc<dyn KeyValueStore>,
}

impl StoredCredential {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CredentialProvider for StoredCredential {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn resolve(&self) -> Option<String> {
        match storage::load_api_key(self.storage.as_ref()).await {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Failed to read stored API key");
                None
            }
        }
    }
}

/// Providers consulted in order; the first non-empty credential wins.
#[derive(Clone, Default)]
pub struct CredentialChain {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl CredentialChain {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Chain with no providers; never resolves.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Chain holding a single fixed key.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self::new(vec![Arc::new(StaticCredential::new(Some(key.into())))])
    }

    pub fn push(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub async fn resolve(&self) -> Option<String> {
        for provider in &self.providers {
            if let Some(key) = provider.resolve().await {
                if !key.trim().is_empty() {
                    debug!(source = provider.name(), "Resolved API credential");
                    return Some(key);
                }
            }
        }
        None
    }
}
