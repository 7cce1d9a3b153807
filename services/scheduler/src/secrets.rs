//! Secrets service interface and mock implementation.
//!
//! The cluster secrets service stores transport-encryption material under
//! the service's namespace. Uninstall only needs two operations: list the
//! namespace, delete each entry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Errors from the secrets service.
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("secrets service unavailable: {0}")]
    Unavailable(String),
}

/// Client for the cluster secrets service.
#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// Lists the secret names stored under `namespace`.
    async fn list(&self, namespace: &str) -> Result<Vec<String>, SecretsError>;

    /// Deletes one secret from `namespace`.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), SecretsError>;
}

/// Mock secrets client for testing. Tracks list-call counts and deletions.
pub struct MockSecretsClient {
    secrets: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    fail: bool,
}

impl MockSecretsClient {
    /// A mock namespace seeded with the given secret names.
    #[must_use]
    pub fn with_secrets(secrets: Vec<String>) -> Self {
        Self {
            secrets: Mutex::new(secrets),
            list_calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// An empty mock namespace.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_secrets(Vec::new())
    }

    /// A mock that reports the service as unavailable.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            secrets: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    /// Number of list calls made so far.
    #[must_use]
    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Secret names still present in the namespace.
    #[must_use]
    pub fn remaining(&self) -> Vec<String> {
        self.secrets.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl SecretsClient for MockSecretsClient {
    async fn list(&self, namespace: &str) -> Result<Vec<String>, SecretsError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SecretsError::Unavailable("mock outage".to_string()));
        }
        info!(namespace = %namespace, "[MOCK] Listing secrets");
        Ok(self.secrets.lock().expect("mock lock poisoned").clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), SecretsError> {
        if self.fail {
            return Err(SecretsError::Unavailable("mock outage".to_string()));
        }
        info!(namespace = %namespace, secret = %name, "[MOCK] Deleting secret");
        self.secrets
            .lock()
            .expect("mock lock poisoned")
            .retain(|s| s != name);
        Ok(())
    }
}
