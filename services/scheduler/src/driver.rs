//! Offer-protocol driver interface and mock implementation.
//!
//! The driver abstracts the transport to the cluster master:
//! - Accepting offers with operations, declining unwanted offers
//! - Killing tasks, triggering reconciliation
//! - Deregistering the framework
//!
//! A mock implementation is provided for testing and development. The
//! real transport lives with the deployment, not in this crate.

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use berth_proto::{OfferFilters, OfferId, Operation, TaskId, TaskStatus};

/// Errors from driver calls.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The master refused the call. Retry on a later offer cycle.
    #[error("master rejected {call}: {reason}")]
    Rejected { call: &'static str, reason: String },

    /// The driver has lost its connection to the master.
    #[error("driver disconnected")]
    Disconnected,
}

/// Commands the scheduler can send to the master.
#[async_trait]
pub trait SchedulerDriver: Send + Sync {
    /// Accepts offers, applying the given operations to their resources.
    async fn accept(
        &self,
        offer_ids: &[OfferId],
        operations: &[Operation],
        filters: OfferFilters,
    ) -> Result<(), DriverError>;

    /// Declines a single offer for the filter's refusal window.
    async fn decline(&self, offer_id: &OfferId, filters: OfferFilters) -> Result<(), DriverError>;

    /// Asks the master to kill a task. Unknown tasks produce a terminal
    /// status update rather than an error.
    async fn kill(&self, task_id: &TaskId) -> Result<(), DriverError>;

    /// Triggers task reconciliation. An empty list means "everything".
    async fn reconcile(&self, statuses: &[TaskStatus]) -> Result<(), DriverError>;

    /// Removes the framework from the master.
    async fn deregister(&self) -> Result<(), DriverError>;
}

/// A single recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Accept {
        offer_ids: Vec<OfferId>,
        operations: Vec<Operation>,
    },
    Decline {
        offer_id: OfferId,
        refuse_seconds: u64,
    },
    Kill {
        task_id: TaskId,
    },
    Reconcile {
        statuses: usize,
    },
    Deregister,
}

/// Mock driver for testing and development. Records every call; can be
/// configured to reject accepts.
pub struct MockDriver {
    calls: Mutex<Vec<DriverCall>>,
    reject_accepts: bool,
}

impl MockDriver {
    /// Create a new mock driver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reject_accepts: false,
        }
    }

    /// Create a mock driver whose accept calls are all rejected.
    #[must_use]
    pub fn rejecting_accepts() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reject_accepts: true,
        }
    }

    /// Every call recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().expect("mock lock poisoned").clone()
    }

    /// Accept calls recorded so far.
    #[must_use]
    pub fn accepts(&self) -> Vec<DriverCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, DriverCall::Accept { .. }))
            .collect()
    }

    /// Number of decline calls recorded so far.
    #[must_use]
    pub fn decline_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, DriverCall::Decline { .. }))
            .count()
    }

    /// Task IDs killed so far, in order.
    #[must_use]
    pub fn killed(&self) -> Vec<TaskId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Kill { task_id } => Some(task_id),
                _ => None,
            })
            .collect()
    }

    /// Number of reconcile calls recorded so far.
    #[must_use]
    pub fn reconcile_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, DriverCall::Reconcile { .. }))
            .count()
    }

    /// Whether a deregister call was recorded.
    #[must_use]
    pub fn deregistered(&self) -> bool {
        self.calls()
            .iter()
            .any(|c| matches!(c, DriverCall::Deregister))
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().expect("mock lock poisoned").push(call);
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerDriver for MockDriver {
    async fn accept(
        &self,
        offer_ids: &[OfferId],
        operations: &[Operation],
        _filters: OfferFilters,
    ) -> Result<(), DriverError> {
        if self.reject_accepts {
            return Err(DriverError::Rejected {
                call: "accept",
                reason: "mock driver configured to reject".to_string(),
            });
        }
        info!(
            offers = offer_ids.len(),
            operations = operations.len(),
            "[MOCK] Accepting offers"
        );
        self.record(DriverCall::Accept {
            offer_ids: offer_ids.to_vec(),
            operations: operations.to_vec(),
        });
        Ok(())
    }

    async fn decline(&self, offer_id: &OfferId, filters: OfferFilters) -> Result<(), DriverError> {
        debug!(offer_id = %offer_id, refuse_seconds = filters.refuse_seconds, "[MOCK] Declining offer");
        self.record(DriverCall::Decline {
            offer_id: offer_id.clone(),
            refuse_seconds: filters.refuse_seconds,
        });
        Ok(())
    }

    async fn kill(&self, task_id: &TaskId) -> Result<(), DriverError> {
        info!(task_id = %task_id, "[MOCK] Killing task");
        self.record(DriverCall::Kill {
            task_id: task_id.clone(),
        });
        Ok(())
    }

    async fn reconcile(&self, statuses: &[TaskStatus]) -> Result<(), DriverError> {
        debug!(statuses = statuses.len(), "[MOCK] Reconciling tasks");
        self.record(DriverCall::Reconcile {
            statuses: statuses.len(),
        });
        Ok(())
    }

    async fn deregister(&self) -> Result<(), DriverError> {
        info!("[MOCK] Deregistering framework");
        self.record(DriverCall::Deregister);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_driver_records_calls() {
        let driver = MockDriver::new();
        driver.kill(&TaskId::new("node-0__a")).await.unwrap();
        driver
            .decline(&OfferId::new("offer-1"), OfferFilters::long_decline())
            .await
            .unwrap();

        assert_eq!(driver.killed(), vec![TaskId::new("node-0__a")]);
        assert_eq!(driver.decline_count(), 1);
        assert!(!driver.deregistered());
    }

    #[tokio::test]
    async fn test_rejecting_driver() {
        let driver = MockDriver::rejecting_accepts();
        let err = driver
            .accept(&[OfferId::new("offer-1")], &[], OfferFilters::long_decline())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Rejected { call: "accept", .. }));
        assert!(driver.accepts().is_empty());
    }
}
