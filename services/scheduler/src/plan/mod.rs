//! Plan machinery: phases, the plan tree, and the plan manager.
//!
//! A plan is an ordered list of phases; a phase is a list of steps worked
//! serially or in parallel. Phase and plan statuses are projections of
//! their children. The phase gate rule: a step is not a candidate until
//! every step in all earlier phases is complete.

mod status;
mod step;

use std::sync::{Arc, RwLock};

use serde::Serialize;

pub use status::Status;
pub use step::{Step, StepAsset};

/// How steps within a phase are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One step at a time, in declaration order.
    Serial,
    /// Any eligible step may be worked at any time.
    Parallel,
}

/// An ordered group of steps with a single strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub name: String,
    pub strategy: Strategy,
    pub steps: Vec<Step>,
}

impl Phase {
    #[must_use]
    pub fn new(name: &str, strategy: Strategy, steps: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            strategy,
            steps,
        }
    }

    /// Derived status of this phase.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::aggregate(self.steps.iter().map(Step::status))
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status().is_complete()
    }

    /// Indices of steps currently eligible for work within this phase.
    fn candidate_indices(&self) -> Vec<usize> {
        match self.strategy {
            Strategy::Parallel => self
                .steps
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_candidate())
                .map(|(i, _)| i)
                .collect(),
            Strategy::Serial => self
                .steps
                .iter()
                .position(|s| !s.status().is_complete())
                .filter(|&i| self.steps[i].is_candidate())
                .map(|i| vec![i])
                .unwrap_or_default(),
        }
    }
}

/// Addresses one step within a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRef {
    pub phase: usize,
    pub step: usize,
}

/// The full uninstall plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub name: String,
    pub phases: Vec<Phase>,
}

impl Plan {
    #[must_use]
    pub fn new(name: &str, phases: Vec<Phase>) -> Self {
        Self {
            name: name.to_string(),
            phases,
        }
    }

    /// A plan with no children. Trivially complete; used when there is
    /// nothing left to do.
    #[must_use]
    pub fn trivial(name: &str) -> Self {
        Self::new(name, Vec::new())
    }

    /// Derived status of the whole plan.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::aggregate(self.phases.iter().map(Phase::status))
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status().is_complete()
    }

    /// Flattened step statuses in plan order. Handy for assertions.
    #[must_use]
    pub fn step_statuses(&self) -> Vec<Status> {
        self.phases
            .iter()
            .flat_map(|p| p.steps.iter().map(Step::status))
            .collect()
    }

    /// Eligible steps under the phase gate: only the earliest
    /// non-complete phase may hand out candidates.
    #[must_use]
    pub fn candidates(&self) -> Vec<StepRef> {
        for (phase_idx, phase) in self.phases.iter().enumerate() {
            if phase.is_complete() {
                continue;
            }
            return phase
                .candidate_indices()
                .into_iter()
                .map(|step| StepRef {
                    phase: phase_idx,
                    step,
                })
                .collect();
        }
        Vec::new()
    }

    /// Returns errored steps to PENDING for the next attempt.
    pub fn retry_errored(&mut self) {
        for phase in &mut self.phases {
            for step in &mut phase.steps {
                step.retry();
            }
        }
    }

    #[must_use]
    pub fn step(&self, step_ref: StepRef) -> Option<&Step> {
        self.phases
            .get(step_ref.phase)
            .and_then(|p| p.steps.get(step_ref.step))
    }

    pub fn step_mut(&mut self, step_ref: StepRef) -> Option<&mut Step> {
        self.phases
            .get_mut(step_ref.phase)
            .and_then(|p| p.steps.get_mut(step_ref.step))
    }

    /// Marks the release step for `reservation_id` complete. Returns
    /// whether a matching non-complete step was found.
    pub fn mark_release_complete(&mut self, reservation_id: &str) -> bool {
        for phase in &mut self.phases {
            for step in &mut phase.steps {
                if let StepAsset::Reservation { id } = &step.asset {
                    if id == reservation_id && !step.status().is_complete() {
                        step.complete();
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Marks the kill step for `task_name` complete. Returns whether a
    /// matching non-complete step was found.
    pub fn mark_task_killed(&mut self, task_name: &str) -> bool {
        for phase in &mut self.phases {
            for step in &mut phase.steps {
                if let StepAsset::Task { name, .. } = &step.asset {
                    if name == task_name && !step.status().is_complete() {
                        step.complete();
                        return true;
                    }
                }
            }
        }
        false
    }
}

// =============================================================================
// Plan manager
// =============================================================================

/// Shared handle to the single uninstall plan.
///
/// The offer callback is the only writer; the HTTP surface reads
/// snapshots. The lock is never held across an await point.
#[derive(Clone)]
pub struct PlanManager {
    inner: Arc<RwLock<Plan>>,
}

impl PlanManager {
    #[must_use]
    pub fn new(plan: Plan) -> Self {
        Self {
            inner: Arc::new(RwLock::new(plan)),
        }
    }

    /// Runs a closure against the plan under the read lock.
    pub fn with_plan<R>(&self, f: impl FnOnce(&Plan) -> R) -> R {
        f(&self.inner.read().expect("plan lock poisoned"))
    }

    /// Runs a closure against the plan under the write lock.
    pub fn with_plan_mut<R>(&self, f: impl FnOnce(&mut Plan) -> R) -> R {
        f(&mut self.inner.write().expect("plan lock poisoned"))
    }

    /// Current work candidates under the phase gate.
    #[must_use]
    pub fn candidates(&self) -> Vec<StepRef> {
        self.with_plan(Plan::candidates)
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.with_plan(Plan::status)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.with_plan(Plan::is_complete)
    }

    /// A serializable snapshot for the operator surface.
    #[must_use]
    pub fn view(&self) -> PlanView {
        self.with_plan(|plan| PlanView {
            name: plan.name.clone(),
            status: plan.status(),
            phases: plan
                .phases
                .iter()
                .map(|phase| PhaseView {
                    name: phase.name.clone(),
                    status: phase.status(),
                    steps: phase
                        .steps
                        .iter()
                        .map(|step| StepView {
                            name: step.name.clone(),
                            status: step.status(),
                        })
                        .collect(),
                })
                .collect(),
        })
    }
}

// =============================================================================
// Operator views
// =============================================================================

/// Plan snapshot served over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
    pub name: String,
    pub status: Status,
    pub phases: Vec<PhaseView>,
}

/// Phase snapshot within a [`PlanView`].
#[derive(Debug, Clone, Serialize)]
pub struct PhaseView {
    pub name: String,
    pub status: Status,
    pub steps: Vec<StepView>,
}

/// Step snapshot within a [`PhaseView`].
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub name: String,
    pub status: Status,
}
