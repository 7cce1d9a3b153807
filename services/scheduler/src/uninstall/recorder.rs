//! Records accepted operations into durable uninstall progress.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error};

use berth_proto::{tombstone, OfferFilters, OfferId, Operation, TOMBSTONE_PREFIX};

use crate::driver::SchedulerDriver;
use crate::plan::PlanManager;
use crate::state::{StateStore, StateStoreError};

use super::SchedulerError;

/// Observes accepted operation batches and persists their effect: every
/// task resource matching a released reservation is rewritten with the
/// tombstone prefix, and the corresponding release step goes complete.
///
/// The tombstone write is the canonical durable signal of progress. A
/// crash after tombstoning but before the step update is harmless: the
/// next plan build simply omits the step.
pub struct UninstallRecorder {
    state_store: Arc<StateStore>,
    plans: PlanManager,
}

impl UninstallRecorder {
    pub fn new(state_store: Arc<StateStore>, plans: PlanManager) -> Self {
        Self { state_store, plans }
    }

    /// Records every reservation affected by an accepted batch.
    pub fn record(&self, operations: &[Operation]) -> Result<(), StateStoreError> {
        let mut reservation_ids = BTreeSet::new();
        for operation in operations {
            for id in operation.reservation_ids() {
                if !id.starts_with(TOMBSTONE_PREFIX) {
                    reservation_ids.insert(id.to_string());
                }
            }
        }
        for id in reservation_ids {
            self.record_reservation(&id)?;
        }
        Ok(())
    }

    fn record_reservation(&self, reservation_id: &str) -> Result<(), StateStoreError> {
        let mut updated = Vec::new();
        for mut task in self.state_store.fetch_tasks()? {
            let mut touched = false;
            for resource in &mut task.resources {
                if resource.reservation_id.as_deref() == Some(reservation_id) {
                    resource.reservation_id = Some(tombstone(reservation_id));
                    touched = true;
                }
            }
            if touched {
                updated.push(task);
            }
        }

        if updated.is_empty() {
            // The master's view is ground truth; a released reservation
            // with no persisted owner is an observability signal only.
            error!(
                reservation_id = %reservation_id,
                "Released a reservation no persisted task owns"
            );
        } else {
            debug!(
                reservation_id = %reservation_id,
                tasks = updated.len(),
                "Tombstoning released reservation"
            );
            self.state_store.store_tasks(&updated)?;
        }

        if !self
            .plans
            .with_plan_mut(|plan| plan.mark_release_complete(reservation_id))
        {
            debug!(reservation_id = %reservation_id, "No open release step for reservation");
        }
        Ok(())
    }
}

/// The accept surface of the driver with the recorder interposed: every
/// successful accept is immediately recorded.
pub struct OfferAccepter<D: SchedulerDriver> {
    driver: Arc<D>,
    recorder: UninstallRecorder,
}

impl<D: SchedulerDriver> OfferAccepter<D> {
    pub fn new(driver: Arc<D>, recorder: UninstallRecorder) -> Self {
        Self { driver, recorder }
    }

    /// Accepts one offer with its operations, then records the effect.
    /// A master rejection leaves the persisted view untouched so the
    /// next offer cycle retries.
    pub async fn accept(
        &self,
        offer_id: &OfferId,
        operations: &[Operation],
    ) -> Result<(), SchedulerError> {
        self.driver
            .accept(
                std::slice::from_ref(offer_id),
                operations,
                OfferFilters::long_decline(),
            )
            .await?;
        self.recorder.record(operations)?;
        Ok(())
    }
}
