//! Offer, resource, and status types for the offer protocol.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, FrameworkId, OfferId, TaskId};

/// Sentinel prefix marking a reservation as already released in the
/// persisted view. No legitimate reservation ID may begin with this.
pub const TOMBSTONE_PREFIX: &str = "uninstalled_";

/// Refusal window for offers the framework will not want again. Large
/// compared to any plausible uninstall duration so the master stops
/// re-offering declined resources.
pub const LONG_DECLINE: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Rewrites a reservation ID with the tombstone sentinel.
#[must_use]
pub fn tombstone(reservation_id: &str) -> String {
    format!("{TOMBSTONE_PREFIX}{reservation_id}")
}

/// A contiguous inclusive range of integers (ports, typically).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}

/// The quantity a resource carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceValue {
    Scalar(f64),
    Ranges(Vec<Range>),
}

/// Persistent-volume metadata. Present iff the resource is a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Persistence ID the master tracks the volume under.
    pub persistence_id: String,
    /// Container path the volume is mounted at.
    pub container_path: String,
}

/// A resource as described by the master: either unreserved (no
/// reservation ID) or a durable claim tied to a role and principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name as the master knows it (`cpus`, `mem`, `ports`, `disk`).
    pub name: String,
    pub value: ResourceValue,
    pub role: String,
    #[serde(default)]
    pub principal: Option<String>,
    /// Opaque ID tagged onto every reserved resource.
    #[serde(default)]
    pub reservation_id: Option<String>,
    /// Present iff this resource is a persistent volume.
    #[serde(default)]
    pub volume: Option<Volume>,
}

impl Resource {
    /// Builds a reserved scalar resource.
    #[must_use]
    pub fn reserved_scalar(
        name: &str,
        value: f64,
        reservation_id: &str,
        role: &str,
        principal: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            value: ResourceValue::Scalar(value),
            role: role.to_string(),
            principal: Some(principal.to_string()),
            reservation_id: Some(reservation_id.to_string()),
            volume: None,
        }
    }

    /// Builds a reserved range resource.
    #[must_use]
    pub fn reserved_ranges(
        name: &str,
        ranges: Vec<Range>,
        reservation_id: &str,
        role: &str,
        principal: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            value: ResourceValue::Ranges(ranges),
            role: role.to_string(),
            principal: Some(principal.to_string()),
            reservation_id: Some(reservation_id.to_string()),
            volume: None,
        }
    }

    /// Builds a reserved persistent volume backed by `disk`.
    #[must_use]
    pub fn reserved_volume(
        disk: f64,
        reservation_id: &str,
        container_path: &str,
        role: &str,
        principal: &str,
    ) -> Self {
        Self {
            name: "disk".to_string(),
            value: ResourceValue::Scalar(disk),
            role: role.to_string(),
            principal: Some(principal.to_string()),
            reservation_id: Some(reservation_id.to_string()),
            volume: Some(Volume {
                persistence_id: reservation_id.to_string(),
                container_path: container_path.to_string(),
            }),
        }
    }

    /// Whether the resource carries a reservation ID at all.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.reservation_id.is_some()
    }

    /// Whether the resource is a persistent volume.
    #[must_use]
    pub fn is_volume(&self) -> bool {
        self.volume.is_some()
    }

    /// Whether the persisted view already marks this reservation released.
    #[must_use]
    pub fn is_tombstoned(&self) -> bool {
        self.reservation_id
            .as_deref()
            .is_some_and(|id| id.starts_with(TOMBSTONE_PREFIX))
    }

    /// The reservation ID, if the resource is reserved and not tombstoned.
    #[must_use]
    pub fn live_reservation_id(&self) -> Option<&str> {
        self.reservation_id
            .as_deref()
            .filter(|id| !id.starts_with(TOMBSTONE_PREFIX))
    }
}

/// One resource offer from the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub framework_id: FrameworkId,
    pub agent_id: AgentId,
    pub hostname: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// An operation submitted to the master inside an accept call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Operation {
    /// Releases reservations back to the cluster pool.
    Unreserve { resources: Vec<Resource> },
    /// Destroys persistent volumes. Must precede the unreserve of the
    /// backing disk within the same accept call.
    Destroy { volumes: Vec<Resource> },
}

impl Operation {
    /// Reservation IDs affected by this operation.
    pub fn reservation_ids(&self) -> impl Iterator<Item = &str> {
        let resources = match self {
            Self::Unreserve { resources } => resources,
            Self::Destroy { volumes } => volumes,
        };
        resources
            .iter()
            .filter_map(|r| r.reservation_id.as_deref())
    }
}

/// Filters attached to accept and decline calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferFilters {
    /// How long the master should withhold re-offering these resources.
    pub refuse_seconds: u64,
}

impl OfferFilters {
    /// The long refusal window used while uninstalling.
    #[must_use]
    pub fn long_decline() -> Self {
        Self {
            refuse_seconds: LONG_DECLINE.as_secs(),
        }
    }
}

/// Task lifecycle states as reported by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
    Error,
}

impl TaskState {
    /// Whether the state is terminal (the task will never run again
    /// under this ID).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Killed | Self::Lost | Self::Error
        )
    }
}

/// A status update for a single task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskStatus {
    #[must_use]
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
        }
    }
}
