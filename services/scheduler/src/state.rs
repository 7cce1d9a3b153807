//! Persisted scheduler bookkeeping.
//!
//! Layout under the service namespace:
//! - `<service>/FrameworkId` — the registered framework ID
//! - `<service>/Tasks/<name>/info` — one [`TaskRecord`] per task
//! - `<service>/Tasks/<name>/status` — the task's last reported status
//!
//! Records are JSON. The backing persister serializes all mutations; this
//! store only adds the path scheme and the serde boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use berth_proto::{FrameworkId, Resource, TaskId, TaskState, TaskStatus};
use berth_store::{Persister, StoreError};

const FRAMEWORK_ID_NODE: &str = "FrameworkId";
const TASKS_NODE: &str = "Tasks";
const TASK_INFO_NODE: &str = "info";
const TASK_STATUS_NODE: &str = "status";

/// Errors from state-store operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] StoreError),

    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

/// Labels attached to a persisted task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLabels {
    /// Set when the pod was replaced after an unrecoverable failure. The
    /// master will never re-offer such a task's exclusive resources.
    #[serde(default)]
    pub permanently_failed: bool,
}

/// A persisted task: identity plus the resources reserved for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub task_id: TaskId,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub labels: TaskLabels,
}

impl TaskRecord {
    /// Whether this task was permanently failed while in a terminal error
    /// state. Such tasks are killed but their exclusive resources are not
    /// waited for: the master will never re-offer them.
    ///
    /// Note the label alone is not enough; a task whose last status is
    /// ERROR without the label keeps its resources in play.
    #[must_use]
    pub fn permanently_failed_in_error(&self, last_status: Option<&TaskStatus>) -> bool {
        self.labels.permanently_failed
            && last_status
                .is_some_and(|s| matches!(s.state, TaskState::Error | TaskState::Failed))
    }
}

/// Store for framework-level bookkeeping, backed by a [`Persister`].
pub struct StateStore {
    persister: Arc<dyn Persister>,
    root: String,
}

impl StateStore {
    /// Creates a store namespaced under the service name.
    pub fn new(persister: Arc<dyn Persister>, service_name: &str) -> Self {
        Self {
            persister,
            root: service_name.trim_matches('/').to_string(),
        }
    }

    fn framework_id_path(&self) -> String {
        format!("{}/{}", self.root, FRAMEWORK_ID_NODE)
    }

    fn task_info_path(&self, task_name: &str) -> String {
        format!("{}/{}/{}/{}", self.root, TASKS_NODE, task_name, TASK_INFO_NODE)
    }

    fn task_status_path(&self, task_name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.root, TASKS_NODE, task_name, TASK_STATUS_NODE
        )
    }

    /// Persists the framework ID handed over at registration.
    pub fn store_framework_id(&self, id: &FrameworkId) -> Result<(), StateStoreError> {
        self.persister
            .set(&self.framework_id_path(), id.as_str().as_bytes())?;
        Ok(())
    }

    /// Fetches the registered framework ID, if any.
    pub fn fetch_framework_id(&self) -> Result<Option<FrameworkId>, StateStoreError> {
        match self.persister.get(&self.framework_id_path()) {
            Ok(bytes) => Ok(Some(FrameworkId::new(String::from_utf8_lossy(&bytes)))),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persists task records atomically.
    pub fn store_tasks(&self, tasks: &[TaskRecord]) -> Result<(), StateStoreError> {
        let mut entries = BTreeMap::new();
        for task in tasks {
            let path = self.task_info_path(&task.name);
            let bytes = serde_json::to_vec(task).map_err(|source| StateStoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
            entries.insert(path, bytes);
        }
        self.persister.set_many(entries)?;
        Ok(())
    }

    /// Lists the names of all persisted tasks.
    pub fn fetch_task_names(&self) -> Result<Vec<String>, StateStoreError> {
        Ok(self
            .persister
            .get_children(&format!("{}/{}", self.root, TASKS_NODE))?)
    }

    /// Fetches one task record by name.
    pub fn fetch_task(&self, task_name: &str) -> Result<Option<TaskRecord>, StateStoreError> {
        let path = self.task_info_path(task_name);
        match self.persister.get(&path) {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|source| StateStoreError::Corrupt { path, source })?;
                Ok(Some(record))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches every persisted task record, in name order.
    pub fn fetch_tasks(&self) -> Result<Vec<TaskRecord>, StateStoreError> {
        let mut tasks = Vec::new();
        for name in self.fetch_task_names()? {
            // A name with no info node is a half-written entry; skip it.
            match self.fetch_task(&name)? {
                Some(task) => tasks.push(task),
                None => warn!(task = %name, "Task node present without info record"),
            }
        }
        Ok(tasks)
    }

    /// Persists a task's last reported status.
    pub fn store_status(
        &self,
        task_name: &str,
        status: &TaskStatus,
    ) -> Result<(), StateStoreError> {
        let path = self.task_status_path(task_name);
        let bytes = serde_json::to_vec(status).map_err(|source| StateStoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        self.persister.set(&path, &bytes)?;
        Ok(())
    }

    /// Fetches a task's last reported status, if any.
    pub fn fetch_status(&self, task_name: &str) -> Result<Option<TaskStatus>, StateStoreError> {
        let path = self.task_status_path(task_name);
        match self.persister.get(&path) {
            Ok(bytes) => {
                let status = serde_json::from_slice(&bytes)
                    .map_err(|source| StateStoreError::Corrupt { path, source })?;
                Ok(Some(status))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves the task name a status update belongs to, preferring the
    /// persisted records over the name baked into the ID.
    pub fn task_name_for_id(&self, task_id: &TaskId) -> Result<Option<String>, StateStoreError> {
        for task in self.fetch_tasks()? {
            if &task.task_id == task_id {
                return Ok(Some(task.name));
            }
        }
        Ok(task_id.task_name().map(str::to_string))
    }

    /// Wipes everything persisted under the service namespace.
    pub fn clear_all(&self) -> Result<(), StateStoreError> {
        match self.persister.delete_all(&self.root) {
            Ok(()) => Ok(()),
            // Nothing stored is already the goal state.
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
