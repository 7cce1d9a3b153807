//! Service specification types.
//!
//! The spec describes what the service looked like when it was installed.
//! The uninstall scheduler only consults it for the service name and for
//! whether any task declared transport encryption (which decides whether a
//! TLS-cleanup phase is needed). Loading the spec from its packaging format
//! is the embedder's concern.

use serde::{Deserialize, Serialize};

/// A deployed service: a name plus the pods it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default)]
    pub pods: Vec<PodSpec>,
}

/// A pod template within a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// A task template within a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub transport_encryption: Vec<TransportEncryptionSpec>,
}

/// A transport-encryption artifact a task was provisioned with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportEncryptionSpec {
    pub name: String,
    pub kind: TransportEncryptionKind,
}

/// Artifact format for transport encryption material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportEncryptionKind {
    Tls,
    Keystore,
}

impl ServiceSpec {
    /// A spec with no pods; enough for services that never declared any.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pods: Vec::new(),
        }
    }

    /// Whether any task in the service declared transport encryption.
    #[must_use]
    pub fn uses_transport_encryption(&self) -> bool {
        self.pods
            .iter()
            .flat_map(|pod| pod.tasks.iter())
            .any(|task| !task.transport_encryption.is_empty())
    }
}
