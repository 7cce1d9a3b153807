//! Constructs the uninstall plan from persisted state.
//!
//! The builder reads the task set exactly once, at scheduler startup.
//! Later task mutations never add or remove steps; tombstoning recorded
//! by the offer loop is the only state that changes underneath the plan.

use std::collections::HashMap;

use tracing::info;

use berth_proto::{TaskId, TaskStatus};

use crate::plan::{Phase, Plan, Step, Strategy};
use crate::spec::ServiceSpec;
use crate::state::{StateStore, StateStoreError, TaskRecord};

pub const PLAN_NAME: &str = "uninstall";
pub const KILL_PHASE: &str = "task-kill";
pub const RELEASE_PHASE: &str = "unreserve-resources";
pub const TLS_PHASE: &str = "tls-cleanup";
pub const DEREGISTER_PHASE: &str = "deregister-service";

/// Work derived from the persisted task set at build time.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TaskInventory {
    /// Tasks that must be killed, in task order.
    pub kill_targets: Vec<(String, TaskId)>,
    /// Distinct reservation IDs still awaiting release. A reservation
    /// shared by several tasks appears once.
    pub release_targets: Vec<String>,
}

/// Enumerates outstanding work from the persisted tasks.
///
/// A task is killed if it still owns any non-tombstoned resource or was
/// permanently failed in an error state. The latter contribute none of
/// their exclusive resources: the master will never re-offer them.
pub(crate) fn take_inventory(
    tasks: &[TaskRecord],
    statuses: &HashMap<String, TaskStatus>,
) -> TaskInventory {
    let mut inventory = TaskInventory::default();
    for task in tasks {
        let failed_in_error = task.permanently_failed_in_error(statuses.get(&task.name));
        let owns_live = task
            .resources
            .iter()
            .any(|r| r.live_reservation_id().is_some());

        if owns_live || failed_in_error {
            inventory
                .kill_targets
                .push((task.name.clone(), task.task_id.clone()));
        }
        if failed_in_error {
            continue;
        }
        for resource in &task.resources {
            if let Some(id) = resource.live_reservation_id() {
                if !inventory.release_targets.iter().any(|seen| seen == id) {
                    inventory.release_targets.push(id.to_string());
                }
            }
        }
    }
    inventory
}

/// Builds the uninstall plan, once per scheduler process.
pub struct UninstallPlanBuilder;

impl UninstallPlanBuilder {
    /// Constructs the phase-ordered plan from the persisted task set.
    ///
    /// With nothing to kill, nothing to release, and no framework ID
    /// persisted, the plan is an already-complete placeholder with no
    /// children.
    pub fn build(
        service_spec: &ServiceSpec,
        state_store: &StateStore,
        has_secrets_client: bool,
    ) -> Result<Plan, StateStoreError> {
        let tasks = state_store.fetch_tasks()?;
        let mut statuses = HashMap::new();
        for task in &tasks {
            if let Some(status) = state_store.fetch_status(&task.name)? {
                statuses.insert(task.name.clone(), status);
            }
        }
        let inventory = take_inventory(&tasks, &statuses);
        let framework_id = state_store.fetch_framework_id()?;

        if inventory.kill_targets.is_empty()
            && inventory.release_targets.is_empty()
            && framework_id.is_none()
        {
            info!("No tasks, no reservations, no framework ID; nothing to uninstall");
            return Ok(Plan::trivial(PLAN_NAME));
        }

        let tls_cleanup = service_spec.uses_transport_encryption() && has_secrets_client;
        info!(
            kills = inventory.kill_targets.len(),
            releases = inventory.release_targets.len(),
            tls_cleanup,
            "Built uninstall plan"
        );

        let kill_steps = inventory
            .kill_targets
            .into_iter()
            .map(|(name, id)| Step::kill(&name, id))
            .collect();
        let release_steps = inventory
            .release_targets
            .iter()
            .map(|id| Step::release(id))
            .collect();

        let mut phases = vec![
            Phase::new(KILL_PHASE, Strategy::Serial, kill_steps),
            Phase::new(RELEASE_PHASE, Strategy::Parallel, release_steps),
        ];
        if tls_cleanup {
            phases.push(Phase::new(
                TLS_PHASE,
                Strategy::Parallel,
                vec![Step::tls_cleanup(&service_spec.name)],
            ));
        }
        phases.push(Phase::new(
            DEREGISTER_PHASE,
            Strategy::Serial,
            vec![Step::deregister()],
        ));

        Ok(Plan::new(PLAN_NAME, phases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use berth_proto::{tombstone, FrameworkId, Resource, TaskState};
    use berth_store::MemPersister;

    use crate::state::TaskLabels;

    fn task(name: &str, resources: Vec<Resource>) -> TaskRecord {
        TaskRecord {
            name: name.to_string(),
            task_id: TaskId::for_task(name, "0"),
            resources,
            labels: TaskLabels::default(),
        }
    }

    fn scalar(id: &str) -> Resource {
        Resource::reserved_scalar("cpus", 1.0, id, "role", "principal")
    }

    fn store() -> StateStore {
        StateStore::new(Arc::new(MemPersister::new()), "data-service")
    }

    #[test]
    fn test_inventory_coalesces_shared_reservations() {
        let tasks = vec![
            task("node-0", vec![scalar("r1"), scalar("r2"), scalar("r3")]),
            task("node-1", vec![scalar("r2"), scalar("r4")]),
        ];
        let inventory = take_inventory(&tasks, &HashMap::new());

        assert_eq!(inventory.kill_targets.len(), 2);
        assert_eq!(inventory.release_targets, vec!["r1", "r2", "r3", "r4"]);
    }

    #[test]
    fn test_inventory_skips_tombstoned_resources() {
        let mut released = scalar("r1");
        released.reservation_id = Some(tombstone("r1"));
        let tasks = vec![task("node-0", vec![released, scalar("r2")])];

        let inventory = take_inventory(&tasks, &HashMap::new());
        assert_eq!(inventory.release_targets, vec!["r2"]);
        // Still owns r2, so the kill remains.
        assert_eq!(inventory.kill_targets.len(), 1);
    }

    #[test]
    fn test_inventory_drops_error_task_exclusive_resources() {
        let mut failed = task("node-1", vec![scalar("r2"), scalar("r4")]);
        failed.labels.permanently_failed = true;
        let tasks = vec![
            task("node-0", vec![scalar("r1"), scalar("r2"), scalar("r3")]),
            failed,
        ];
        let mut statuses = HashMap::new();
        statuses.insert(
            "node-1".to_string(),
            TaskStatus::new(TaskId::for_task("node-1", "0"), TaskState::Error),
        );

        let inventory = take_inventory(&tasks, &statuses);
        // Both tasks are killed; r4 (exclusive to the failed task) is
        // dropped while shared r2 stays.
        assert_eq!(inventory.kill_targets.len(), 2);
        assert_eq!(inventory.release_targets, vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_inventory_keeps_resources_for_unlabeled_error_task() {
        // An ERROR status without the permanently-failed label keeps the
        // task's resources in the plan.
        let tasks = vec![task("node-0", vec![scalar("r1")])];
        let mut statuses = HashMap::new();
        statuses.insert(
            "node-0".to_string(),
            TaskStatus::new(TaskId::for_task("node-0", "0"), TaskState::Error),
        );

        let inventory = take_inventory(&tasks, &statuses);
        assert_eq!(inventory.release_targets, vec!["r1"]);
    }

    #[test]
    fn test_build_orders_phases() {
        let store = store();
        store
            .store_framework_id(&FrameworkId::new("fw-1"))
            .unwrap();
        store
            .store_tasks(&[task("node-0", vec![scalar("r1"), scalar("r2")])])
            .unwrap();

        let plan =
            UninstallPlanBuilder::build(&ServiceSpec::named("data-service"), &store, false)
                .unwrap();
        let names: Vec<&str> = plan.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![KILL_PHASE, RELEASE_PHASE, DEREGISTER_PHASE]);
        // 1 kill + 2 releases + 1 deregister.
        assert_eq!(plan.step_statuses().len(), 4);
    }

    #[test]
    fn test_build_includes_tls_phase_only_with_client() {
        use crate::spec::{PodSpec, TaskSpec, TransportEncryptionKind, TransportEncryptionSpec};

        let store = store();
        store
            .store_framework_id(&FrameworkId::new("fw-1"))
            .unwrap();
        store
            .store_tasks(&[task("node-0", vec![scalar("r1")])])
            .unwrap();

        let mut spec = ServiceSpec::named("data-service");
        spec.pods.push(PodSpec {
            name: "node".to_string(),
            tasks: vec![TaskSpec {
                name: "server".to_string(),
                transport_encryption: vec![TransportEncryptionSpec {
                    name: "cert".to_string(),
                    kind: TransportEncryptionKind::Tls,
                }],
            }],
        });

        let with_client = UninstallPlanBuilder::build(&spec, &store, true).unwrap();
        assert!(with_client.phases.iter().any(|p| p.name == TLS_PHASE));

        let without_client = UninstallPlanBuilder::build(&spec, &store, false).unwrap();
        assert!(!without_client.phases.iter().any(|p| p.name == TLS_PHASE));
    }

    #[test]
    fn test_build_trivial_plan_for_empty_store() {
        let store = store();
        let plan =
            UninstallPlanBuilder::build(&ServiceSpec::named("data-service"), &store, false)
                .unwrap();
        assert!(plan.is_complete());
        assert!(plan.phases.is_empty());
    }

    #[test]
    fn test_build_keeps_deregister_when_framework_id_remains() {
        // Everything tombstoned but the framework is still registered:
        // the deregister step is the remaining work.
        let store = store();
        store
            .store_framework_id(&FrameworkId::new("fw-1"))
            .unwrap();
        let mut released = scalar("r1");
        released.reservation_id = Some(tombstone("r1"));
        store.store_tasks(&[task("node-0", vec![released])]).unwrap();

        let plan =
            UninstallPlanBuilder::build(&ServiceSpec::named("data-service"), &store, false)
                .unwrap();
        assert!(!plan.is_complete());
        assert_eq!(plan.step_statuses().len(), 1);
    }
}
