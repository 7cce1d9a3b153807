//! Integration tests for the uninstall flow.
//!
//! These drive the scheduler the way the master does: construct it over
//! a seeded state store, hand over registration, then feed offer cycles
//! and status updates and watch the plan converge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use berth_proto::{
    tombstone, AgentId, FrameworkId, Offer, OfferId, Range, Resource, TaskId, TaskState,
    TaskStatus,
};
use berth_scheduler::driver::{DriverCall, MockDriver};
use berth_scheduler::plan::Status;
use berth_scheduler::secrets::{MockSecretsClient, SecretsClient};
use berth_scheduler::spec::{
    PodSpec, ServiceSpec, TaskSpec, TransportEncryptionKind, TransportEncryptionSpec,
};
use berth_scheduler::state::{StateStore, TaskLabels, TaskRecord};
use berth_scheduler::uninstall::UninstallScheduler;
use berth_store::MemPersister;

const SERVICE_NAME: &str = "data-service";
const ROLE: &str = "data-service-role";
const PRINCIPAL: &str = "data-service-principal";

const RESERVED_RESOURCE_1_ID: &str = "reserved-resource-id";
const RESERVED_RESOURCE_2_ID: &str = "reserved-volume-id";
const RESERVED_RESOURCE_3_ID: &str = "reserved-cpu-id-0";
const RESERVED_RESOURCE_4_ID: &str = "reserved-cpu-id-1";

static OFFER_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn ports() -> Resource {
    Resource::reserved_ranges(
        "ports",
        vec![Range {
            begin: 123,
            end: 234,
        }],
        RESERVED_RESOURCE_1_ID,
        ROLE,
        PRINCIPAL,
    )
}

fn volume() -> Resource {
    Resource::reserved_volume(999.0, RESERVED_RESOURCE_2_ID, "/data", ROLE, PRINCIPAL)
}

fn cpu_0() -> Resource {
    Resource::reserved_scalar("cpus", 1.0, RESERVED_RESOURCE_3_ID, ROLE, PRINCIPAL)
}

fn cpu_1() -> Resource {
    Resource::reserved_scalar("cpus", 1.0, RESERVED_RESOURCE_4_ID, ROLE, PRINCIPAL)
}

fn task_a() -> TaskRecord {
    TaskRecord {
        name: "task-a".to_string(),
        task_id: TaskId::for_task("task-a", "uuid-a"),
        resources: vec![ports(), volume(), cpu_0()],
        labels: TaskLabels::default(),
    }
}

fn task_b() -> TaskRecord {
    // Marked permanently failed; only takes effect once the task is
    // also in a terminal error state.
    TaskRecord {
        name: "task-b".to_string(),
        task_id: TaskId::for_task("task-b", "uuid-b"),
        resources: vec![volume(), cpu_1()],
        labels: TaskLabels {
            permanently_failed: true,
        },
    }
}

fn offer(resources: Vec<Resource>) -> Offer {
    let n = OFFER_COUNTER.fetch_add(1, Ordering::SeqCst);
    Offer {
        id: OfferId::new(format!("offer-{n}")),
        framework_id: FrameworkId::new("fw-1"),
        agent_id: AgentId::new("agent-1"),
        hostname: "node-1.cluster".to_string(),
        resources,
    }
}

fn seeded_store() -> Arc<StateStore> {
    let store = Arc::new(StateStore::new(
        Arc::new(MemPersister::new()),
        SERVICE_NAME,
    ));
    store.store_tasks(&[task_a()]).unwrap();
    store
        .store_framework_id(&FrameworkId::new("fw-1"))
        .unwrap();
    store
}

fn tls_service_spec() -> ServiceSpec {
    let mut spec = ServiceSpec::named(SERVICE_NAME);
    spec.pods.push(PodSpec {
        name: "node".to_string(),
        tasks: vec![TaskSpec {
            name: "server".to_string(),
            transport_encryption: vec![TransportEncryptionSpec {
                name: "server-cert".to_string(),
                kind: TransportEncryptionKind::Keystore,
            }],
        }],
    });
    spec
}

async fn registered_scheduler(
    store: Arc<StateStore>,
    driver: Arc<MockDriver>,
) -> UninstallScheduler<MockDriver> {
    let scheduler =
        UninstallScheduler::new(&ServiceSpec::named(SERVICE_NAME), store, driver, None).unwrap();
    scheduler.registered(&FrameworkId::new("fw-1")).await.unwrap();
    scheduler
}

fn statuses(scheduler: &UninstallScheduler<MockDriver>) -> Vec<Status> {
    scheduler.plan_manager().with_plan(|p| p.step_statuses())
}

#[tokio::test]
async fn test_empty_offers() {
    let driver = Arc::new(MockDriver::new());
    let scheduler = registered_scheduler(seeded_store(), Arc::clone(&driver)).await;

    scheduler.offers(&[]).await.unwrap();

    assert_eq!(driver.reconcile_count(), 1);
    assert!(driver.accepts().is_empty());
    assert_eq!(driver.decline_count(), 0);
}

#[tokio::test]
async fn test_initial_plan() {
    let scheduler = registered_scheduler(seeded_store(), Arc::new(MockDriver::new())).await;
    // 1 task kill + 3 unique resources + deregister step.
    assert_eq!(statuses(&scheduler), vec![Status::Pending; 5]);
}

#[tokio::test]
async fn test_initial_plan_task_resource_overlap() {
    let store = seeded_store();
    store.store_tasks(&[task_b()]).unwrap();

    let scheduler = registered_scheduler(store, Arc::new(MockDriver::new())).await;
    // 2 task kills + 4 unique resources + deregister step.
    assert_eq!(statuses(&scheduler), vec![Status::Pending; 7]);
}

#[tokio::test]
async fn test_initial_plan_task_error() {
    // With a terminal ERROR status, task B's exclusive resource is
    // omitted while the shared volume (also owned by task A) stays.
    let store = seeded_store();
    store.store_tasks(&[task_b()]).unwrap();
    store
        .store_status(
            "task-b",
            &TaskStatus::new(TaskId::for_task("task-b", "uuid-b"), TaskState::Error),
        )
        .unwrap();

    let scheduler = registered_scheduler(store, Arc::new(MockDriver::new())).await;
    // 2 task kills + 3 unique resources (task A's) + deregister step.
    assert_eq!(statuses(&scheduler), vec![Status::Pending; 6]);
}

#[tokio::test]
async fn test_uninstall_steps_prepared() {
    let driver = Arc::new(MockDriver::new());
    let scheduler = registered_scheduler(seeded_store(), Arc::clone(&driver)).await;

    // First cycle: the serial kill phase hands out its only step, the
    // kill is issued, and with no live status it completes in place.
    scheduler.offers(&[offer(vec![])]).await.unwrap();
    assert_eq!(
        statuses(&scheduler),
        vec![
            Status::Complete,
            Status::Pending,
            Status::Pending,
            Status::Pending,
            Status::Pending,
        ]
    );
    assert_eq!(driver.killed(), vec![TaskId::for_task("task-a", "uuid-a")]);

    // Second cycle: the release phase is unblocked and its steps prime.
    scheduler.offers(&[offer(vec![])]).await.unwrap();
    assert_eq!(
        statuses(&scheduler),
        vec![
            Status::Complete,
            Status::Prepared,
            Status::Prepared,
            Status::Prepared,
            Status::Pending,
        ]
    );
}

#[tokio::test]
async fn test_uninstall_steps_complete() {
    let driver = Arc::new(MockDriver::new());
    let scheduler = registered_scheduler(seeded_store(), Arc::clone(&driver)).await;

    scheduler
        .offers(&[offer(vec![ports(), volume()])])
        .await
        .unwrap();
    assert_eq!(
        statuses(&scheduler),
        vec![
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Pending,
            Status::Pending,
        ]
    );

    scheduler.offers(&[offer(vec![cpu_0()])]).await.unwrap();
    assert_eq!(
        statuses(&scheduler),
        vec![
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Pending,
        ]
    );
}

#[tokio::test]
async fn test_plan_completes() {
    let driver = Arc::new(MockDriver::new());
    let store = seeded_store();
    let scheduler = registered_scheduler(Arc::clone(&store), Arc::clone(&driver)).await;

    scheduler
        .offers(&[offer(vec![ports(), volume(), cpu_0()])])
        .await
        .unwrap();
    assert_eq!(
        statuses(&scheduler),
        vec![
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Pending,
        ]
    );

    // One more crank finishes the deregister step.
    scheduler.offers(&[offer(vec![])]).await.unwrap();
    assert_eq!(statuses(&scheduler), vec![Status::Complete; 5]);
    assert!(scheduler.plan_manager().is_complete());
    assert!(driver.deregistered());
    // The persisted bookkeeping is gone.
    assert!(store.fetch_framework_id().unwrap().is_none());
    assert!(store.fetch_tasks().unwrap().is_empty());
}

#[tokio::test]
async fn test_all_but_deregistered_plan_completes() {
    // Empty state store: no framework ID, no tasks. The plan is a
    // trivial complete placeholder and registration is skipped.
    let store = Arc::new(StateStore::new(
        Arc::new(MemPersister::new()),
        SERVICE_NAME,
    ));
    let scheduler = UninstallScheduler::new(
        &ServiceSpec::named(SERVICE_NAME),
        store,
        Arc::new(MockDriver::new()),
        None,
    )
    .unwrap();

    assert!(scheduler.plan_manager().is_complete());
    assert!(scheduler
        .plan_manager()
        .with_plan(|p| p.phases.is_empty()));
    assert!(!scheduler.wants_registration().unwrap());
}

#[tokio::test]
async fn test_tls_cleanup_invoked() {
    let driver = Arc::new(MockDriver::new());
    let secrets = Arc::new(MockSecretsClient::with_secrets(vec![
        "server-cert".to_string(),
    ]));
    let scheduler = UninstallScheduler::new(
        &tls_service_spec(),
        seeded_store(),
        Arc::clone(&driver),
        Some(Arc::clone(&secrets) as Arc<dyn SecretsClient>),
    )
    .unwrap();
    scheduler.registered(&FrameworkId::new("fw-1")).await.unwrap();

    // Run through the kill and release phases.
    scheduler
        .offers(&[offer(vec![ports(), volume(), cpu_0()])])
        .await
        .unwrap();
    assert_eq!(
        statuses(&scheduler),
        vec![
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Pending,
            Status::Pending,
        ]
    );

    // Then the TLS cleanup phase.
    scheduler.offers(&[offer(vec![])]).await.unwrap();
    assert_eq!(
        statuses(&scheduler),
        vec![
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Complete,
            Status::Pending,
        ]
    );
    assert_eq!(secrets.list_call_count(), 1);
    assert!(secrets.remaining().is_empty());

    // Then the final deregister phase.
    scheduler.offers(&[offer(vec![])]).await.unwrap();
    assert_eq!(statuses(&scheduler), vec![Status::Complete; 6]);
    assert!(scheduler.plan_manager().is_complete());
}

#[tokio::test]
async fn test_restart_after_tombstone_skips_released() {
    // Crash-restart semantics: the previous process tombstoned the ports
    // reservation but died before updating step status. The rebuilt plan
    // must only carry the remaining reservations.
    let store = Arc::new(StateStore::new(
        Arc::new(MemPersister::new()),
        SERVICE_NAME,
    ));
    let mut record = task_a();
    record.resources[0].reservation_id = Some(tombstone(RESERVED_RESOURCE_1_ID));
    store.store_tasks(&[record]).unwrap();
    store
        .store_framework_id(&FrameworkId::new("fw-1"))
        .unwrap();

    let driver = Arc::new(MockDriver::new());
    let scheduler = registered_scheduler(store, Arc::clone(&driver)).await;
    // 1 kill + 2 releases (volume, cpu) + deregister.
    assert_eq!(statuses(&scheduler).len(), 4);

    // Even if the master echoes the tombstoned resource back in an
    // offer, no duplicate unreserve is emitted for it.
    let mut echoed = ports();
    echoed.reservation_id = Some(tombstone(RESERVED_RESOURCE_1_ID));
    scheduler
        .offers(&[offer(vec![echoed, volume(), cpu_0()])])
        .await
        .unwrap();

    for call in driver.accepts() {
        if let DriverCall::Accept { operations, .. } = call {
            for op in operations {
                assert!(op
                    .reservation_ids()
                    .all(|id| !id.contains(RESERVED_RESOURCE_1_ID)));
            }
        }
    }
    assert!(scheduler.plan_manager().with_plan(|p| p.phases[1].is_complete()));
}

#[tokio::test]
async fn test_duplicate_release_is_idempotent() {
    let driver = Arc::new(MockDriver::new());
    let store = seeded_store();
    let scheduler = registered_scheduler(Arc::clone(&store), Arc::clone(&driver)).await;

    // The master delivers the same reservation in two consecutive
    // cycles (it had not yet processed the first unreserve).
    scheduler.offers(&[offer(vec![cpu_0()])]).await.unwrap();
    scheduler.offers(&[offer(vec![cpu_0()])]).await.unwrap();

    let complete: Vec<Status> = statuses(&scheduler)
        .into_iter()
        .filter(|s| s.is_complete())
        .collect();
    // Exactly one kill and one release step ended complete.
    assert_eq!(complete.len(), 2);

    // The persisted resource is tombstoned exactly once over.
    let tasks = store.fetch_tasks().unwrap();
    let id = tasks[0].resources[2].reservation_id.as_deref().unwrap();
    assert_eq!(id, tombstone(RESERVED_RESOURCE_3_ID));
}

#[tokio::test]
async fn test_rejected_accept_retries_next_cycle() {
    let driver = Arc::new(MockDriver::rejecting_accepts());
    let store = seeded_store();
    let scheduler = registered_scheduler(Arc::clone(&store), Arc::clone(&driver)).await;

    scheduler.offers(&[offer(vec![])]).await.unwrap();
    scheduler.offers(&[offer(vec![cpu_0()])]).await.unwrap();

    // The release step stays primed and nothing was tombstoned.
    assert_eq!(
        statuses(&scheduler),
        vec![
            Status::Complete,
            Status::Prepared,
            Status::Prepared,
            Status::Prepared,
            Status::Pending,
        ]
    );
    assert!(!store.fetch_tasks().unwrap()[0].resources[2].is_tombstoned());
}

#[tokio::test]
async fn test_kill_step_waits_for_live_task() {
    let store = seeded_store();
    store
        .store_status(
            "task-a",
            &TaskStatus::new(TaskId::for_task("task-a", "uuid-a"), TaskState::Running),
        )
        .unwrap();

    let driver = Arc::new(MockDriver::new());
    let scheduler = registered_scheduler(Arc::clone(&store), Arc::clone(&driver)).await;

    // The task was last seen running, so the kill stays in flight.
    scheduler.offers(&[offer(vec![])]).await.unwrap();
    assert_eq!(statuses(&scheduler)[0], Status::Starting);
    assert_eq!(driver.killed().len(), 1);

    // The terminal update completes the kill step and is persisted.
    scheduler
        .task_status(&TaskStatus::new(
            TaskId::for_task("task-a", "uuid-a"),
            TaskState::Killed,
        ))
        .unwrap();
    assert_eq!(statuses(&scheduler)[0], Status::Complete);
    assert_eq!(
        store.fetch_status("task-a").unwrap().unwrap().state,
        TaskState::Killed
    );

    // The release phase unblocks on the next cycle.
    scheduler.offers(&[offer(vec![])]).await.unwrap();
    assert_eq!(statuses(&scheduler)[1], Status::Prepared);
}

#[tokio::test]
async fn test_unused_offers_get_long_decline() {
    let driver = Arc::new(MockDriver::new());
    let scheduler = registered_scheduler(seeded_store(), Arc::clone(&driver)).await;

    scheduler
        .offers(&[offer(vec![]), offer(vec![cpu_0()])])
        .await
        .unwrap();

    let declines: Vec<DriverCall> = driver
        .calls()
        .into_iter()
        .filter(|c| matches!(c, DriverCall::Decline { .. }))
        .collect();
    assert_eq!(declines.len(), 1);
    for decline in declines {
        if let DriverCall::Decline { refuse_seconds, .. } = decline {
            assert_eq!(refuse_seconds, berth_proto::LONG_DECLINE.as_secs());
        }
    }
}
