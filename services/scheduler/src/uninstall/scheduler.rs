//! The uninstall scheduler: offer and status callbacks, candidate
//! driving, and the cold-start registration gate.
//!
//! The driver delivers callbacks one at a time per scheduler instance, so
//! all plan mutation happens on the callback path; the plan lock only
//! shields the operator HTTP reads and is never held across an await.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use berth_proto::{FrameworkId, Offer, OfferFilters, TaskId, TaskStatus};

use crate::driver::SchedulerDriver;
use crate::plan::{Plan, PlanManager, StepAsset, StepRef};
use crate::secrets::{SecretsClient, SecretsError};
use crate::spec::ServiceSpec;
use crate::state::StateStore;

use super::{
    OfferAccepter, SchedulerError, UninstallPlanBuilder, UninstallRecorder,
    UninstallResourceCleaner,
};

/// Coordinates the teardown of one service against the master.
pub struct UninstallScheduler<D: SchedulerDriver> {
    state_store: Arc<StateStore>,
    driver: Arc<D>,
    secrets_client: Option<Arc<dyn SecretsClient>>,
    plans: PlanManager,
    cleaner: UninstallResourceCleaner,
    accepter: OfferAccepter<D>,
}

impl<D: SchedulerDriver> UninstallScheduler<D> {
    /// Builds the uninstall plan from persisted state and wires the
    /// offer-processing machinery around it. The plan is built exactly
    /// once per scheduler process.
    pub fn new(
        service_spec: &ServiceSpec,
        state_store: Arc<StateStore>,
        driver: Arc<D>,
        secrets_client: Option<Arc<dyn SecretsClient>>,
    ) -> Result<Self, SchedulerError> {
        let plan =
            UninstallPlanBuilder::build(service_spec, &state_store, secrets_client.is_some())?;
        let plans = PlanManager::new(plan);
        let recorder = UninstallRecorder::new(Arc::clone(&state_store), plans.clone());
        let accepter = OfferAccepter::new(Arc::clone(&driver), recorder);

        Ok(Self {
            state_store,
            driver,
            secrets_client,
            plans,
            cleaner: UninstallResourceCleaner::new(),
            accepter,
        })
    }

    /// The restart gate: whether this scheduler should register with the
    /// master at all.
    ///
    /// When no framework ID is persisted and every persisted resource is
    /// already tombstoned, the only remaining work is clearing the state
    /// store itself, which higher-level teardown handles. Registering in
    /// that state would re-create bookkeeping after it was wiped.
    pub fn wants_registration(&self) -> Result<bool, SchedulerError> {
        Ok(!self.all_but_state_store_uninstalled()?)
    }

    fn all_but_state_store_uninstalled(&self) -> Result<bool, SchedulerError> {
        if self.state_store.fetch_framework_id()?.is_some() {
            return Ok(false);
        }
        let tasks = self.state_store.fetch_tasks()?;
        Ok(tasks
            .iter()
            .flat_map(|t| t.resources.iter())
            .filter(|r| r.is_reserved())
            .all(|r| r.is_tombstoned()))
    }

    /// Called when the master hands over registration. Persists the
    /// framework ID and triggers implicit task reconciliation.
    pub async fn registered(&self, framework_id: &FrameworkId) -> Result<(), SchedulerError> {
        self.state_store.store_framework_id(framework_id)?;
        info!(framework_id = %framework_id, "Registered; proceeding with uninstall plan");
        self.driver.reconcile(&[]).await?;
        Ok(())
    }

    /// Processes one offer cycle.
    pub async fn offers(&self, offers: &[Offer]) -> Result<(), SchedulerError> {
        // Errored steps get another try each cycle.
        self.plans.with_plan_mut(Plan::retry_errored);

        let candidates = self.plans.candidates();
        if !candidates.is_empty() {
            let names: Vec<String> = self.plans.with_plan(|plan| {
                candidates
                    .iter()
                    .filter_map(|r| plan.step(*r).map(|s| s.name.clone()))
                    .collect()
            });
            info!(count = candidates.len(), steps = ?names, "Processing uninstall candidates");
        }
        for step_ref in candidates {
            self.start_step(step_ref).await;
        }

        // Destroy/unreserve any reserved resource or volume on offer.
        let mut consumed = HashSet::new();
        for recommendation in self.cleaner.evaluate(offers) {
            match self
                .accepter
                .accept(&recommendation.offer_id, &recommendation.operations)
                .await
            {
                Ok(()) => {
                    consumed.insert(recommendation.offer_id);
                }
                Err(e) => warn!(
                    offer_id = %recommendation.offer_id,
                    error = %e,
                    "Accept failed; will retry on a later offer"
                ),
            }
        }

        // Decline the rest with the long refusal window.
        let unused: Vec<&Offer> = offers.iter().filter(|o| !consumed.contains(&o.id)).collect();
        if unused.is_empty() {
            debug!("No offers to decline");
        } else {
            info!(count = unused.len(), "Declining unused offers");
            for offer in unused {
                if let Err(e) = self
                    .driver
                    .decline(&offer.id, OfferFilters::long_decline())
                    .await
                {
                    warn!(offer_id = %offer.id, error = %e, "Decline failed");
                }
            }
        }

        Ok(())
    }

    /// Processes one task status update: persists it under the resolved
    /// task name and completes the matching kill step on terminal states.
    pub fn task_status(&self, status: &TaskStatus) -> Result<(), SchedulerError> {
        let Some(task_name) = self.state_store.task_name_for_id(&status.task_id)? else {
            warn!(task_id = %status.task_id, "Status update for unknown task");
            return Ok(());
        };
        debug!(task = %task_name, state = ?status.state, "Persisting task status");
        self.state_store.store_status(&task_name, status)?;

        if status.state.is_terminal()
            && self
                .plans
                .with_plan_mut(|plan| plan.mark_task_killed(&task_name))
        {
            info!(task = %task_name, "Task reached a terminal state; kill step complete");
        }
        Ok(())
    }

    /// Handle to the single uninstall plan, for the operator surface.
    #[must_use]
    pub fn plan_manager(&self) -> PlanManager {
        self.plans.clone()
    }

    async fn start_step(&self, step_ref: StepRef) {
        let Some(asset) = self
            .plans
            .with_plan(|plan| plan.step(step_ref).map(|s| s.asset.clone()))
        else {
            return;
        };

        match asset {
            StepAsset::Task { name, id } => self.start_kill(step_ref, &name, &id).await,
            StepAsset::Reservation { .. } => {
                // Primed; the cleaner and recorder drive it to complete
                // whenever the master re-offers the reservation.
                self.with_step(step_ref, |step| step.start());
            }
            StepAsset::SecretsNamespace { namespace } => {
                self.start_tls_cleanup(step_ref, &namespace).await;
            }
            StepAsset::Deregister => self.start_deregister(step_ref).await,
        }
    }

    async fn start_kill(&self, step_ref: StepRef, task_name: &str, task_id: &TaskId) {
        self.with_step(step_ref, |step| step.start());
        if let Err(e) = self.driver.kill(task_id).await {
            warn!(task = %task_name, error = %e, "Kill request failed");
            self.with_step(step_ref, |step| step.fail());
            return;
        }

        // A task with no live status will never send another update; the
        // master treats the kill of an unknown task as already done.
        let live = match self.state_store.fetch_status(task_name) {
            Ok(Some(status)) => !status.state.is_terminal(),
            Ok(None) => false,
            Err(e) => {
                warn!(task = %task_name, error = %e, "Could not read task status");
                false
            }
        };
        if live {
            info!(task = %task_name, "Kill issued; awaiting terminal status");
            self.with_step(step_ref, |step| step.submitted());
        } else {
            self.with_step(step_ref, |step| step.complete());
        }
    }

    async fn start_tls_cleanup(&self, step_ref: StepRef, namespace: &str) {
        let Some(client) = self.secrets_client.clone() else {
            // The builder only emits this step with a client configured.
            warn!("TLS cleanup step without a secrets client");
            self.with_step(step_ref, |step| step.fail());
            return;
        };
        self.with_step(step_ref, |step| step.start());

        match purge_secrets(client.as_ref(), namespace).await {
            Ok(deleted) => {
                info!(namespace = %namespace, deleted, "Secrets namespace purged");
                self.with_step(step_ref, |step| step.complete());
            }
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Secrets cleanup failed; will retry");
                self.with_step(step_ref, |step| step.fail());
            }
        }
    }

    async fn start_deregister(&self, step_ref: StepRef) {
        self.with_step(step_ref, |step| {
            step.start();
            step.submitted();
        });

        // Deregister first; only wipe bookkeeping once the master let go.
        if let Err(e) = self.driver.deregister().await {
            warn!(error = %e, "Deregister failed; will retry");
            self.with_step(step_ref, |step| step.fail());
            return;
        }
        match self.state_store.clear_all() {
            Ok(()) => {
                info!("Framework deregistered and service state cleared");
                self.with_step(step_ref, |step| step.complete());
            }
            Err(e) => {
                warn!(error = %e, "State wipe failed; will retry");
                self.with_step(step_ref, |step| step.fail());
            }
        }
    }

    fn with_step(&self, step_ref: StepRef, f: impl FnOnce(&mut crate::plan::Step)) {
        self.plans.with_plan_mut(|plan| {
            if let Some(step) = plan.step_mut(step_ref) {
                f(step);
            }
        });
    }
}

async fn purge_secrets(
    client: &dyn SecretsClient,
    namespace: &str,
) -> Result<usize, SecretsError> {
    let names = client.list(namespace).await?;
    for name in &names {
        client.delete(namespace, name).await?;
    }
    Ok(names.len())
}
