//! Steps: the leaves of the uninstall plan.
//!
//! A step is pure data: a name, the real-world asset it stands for, and a
//! status. Side effects live in the scheduler loop, which matches on the
//! asset and drives the transitions below:
//!
//! ```text
//! PENDING --start()--> PREPARED --submitted()--> STARTING --complete()--> COMPLETE
//! any --fail()--> ERROR --retry()--> PENDING
//! ```

use berth_proto::TaskId;

use super::status::Status;

/// The real-world object a step represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAsset {
    /// A task to kill.
    Task { name: String, id: TaskId },
    /// A reservation to release back to the cluster.
    Reservation { id: String },
    /// A secrets namespace to purge.
    SecretsNamespace { namespace: String },
    /// The terminal framework deregistration.
    Deregister,
}

/// One unit of uninstall work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub asset: StepAsset,
    status: Status,
}

impl Step {
    /// A step that kills the named task.
    #[must_use]
    pub fn kill(task_name: &str, task_id: TaskId) -> Self {
        Self {
            name: format!("kill-{task_name}"),
            asset: StepAsset::Task {
                name: task_name.to_string(),
                id: task_id,
            },
            status: Status::Pending,
        }
    }

    /// A step that releases one reservation.
    #[must_use]
    pub fn release(reservation_id: &str) -> Self {
        Self {
            name: format!("unreserve-{reservation_id}"),
            asset: StepAsset::Reservation {
                id: reservation_id.to_string(),
            },
            status: Status::Pending,
        }
    }

    /// A step that purges the service's secrets namespace.
    #[must_use]
    pub fn tls_cleanup(namespace: &str) -> Self {
        Self {
            name: "tls-cleanup".to_string(),
            asset: StepAsset::SecretsNamespace {
                namespace: namespace.to_string(),
            },
            status: Status::Pending,
        }
    }

    /// The terminal deregister step.
    #[must_use]
    pub fn deregister() -> Self {
        Self {
            name: "deregister".to_string(),
            asset: StepAsset::Deregister,
            status: Status::Pending,
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether the step may be handed out as a work candidate.
    #[must_use]
    pub fn is_candidate(&self) -> bool {
        matches!(self.status, Status::Pending | Status::Prepared)
    }

    /// Marks the step eligible for work. Idempotent; never regresses a
    /// step that has moved past PREPARED.
    pub fn start(&mut self) {
        if self.status == Status::Pending {
            self.status = Status::Prepared;
        }
    }

    /// Records that an operation for this step is in flight.
    pub fn submitted(&mut self) {
        if matches!(self.status, Status::Pending | Status::Prepared) {
            self.status = Status::Starting;
        }
    }

    /// Marks the step done. Monotonic: once complete, always complete.
    pub fn complete(&mut self) {
        self.status = Status::Complete;
    }

    /// Records a failed attempt. Complete steps are unaffected.
    pub fn fail(&mut self) {
        if self.status != Status::Complete {
            self.status = Status::Error;
        }
    }

    /// Returns an errored step to the back of the queue.
    pub fn retry(&mut self) {
        if self.status == Status::Error {
            self.status = Status::Pending;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut step = Step::release("res-1");
        assert_eq!(step.status(), Status::Pending);
        assert!(step.is_candidate());

        step.start();
        assert_eq!(step.status(), Status::Prepared);
        step.start();
        assert_eq!(step.status(), Status::Prepared);

        step.submitted();
        assert_eq!(step.status(), Status::Starting);
        assert!(!step.is_candidate());

        step.complete();
        assert_eq!(step.status(), Status::Complete);
    }

    #[test]
    fn test_complete_is_monotonic() {
        let mut step = Step::release("res-1");
        step.complete();
        step.fail();
        step.start();
        assert_eq!(step.status(), Status::Complete);
    }

    #[test]
    fn test_error_retry_cycle() {
        let mut step = Step::kill("node-0", TaskId::for_task("node-0", "a"));
        step.start();
        step.fail();
        assert_eq!(step.status(), Status::Error);
        assert!(!step.is_candidate());

        step.retry();
        assert_eq!(step.status(), Status::Pending);
    }

    #[test]
    fn test_complete_from_pending() {
        // The recorder can confirm a release the master performed before
        // the step was ever handed out.
        let mut step = Step::release("res-1");
        step.complete();
        assert_eq!(step.status(), Status::Complete);
    }
}
