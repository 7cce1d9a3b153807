//! Typed IDs for master-assigned identifiers.
//!
//! The master mints these values; the scheduler treats them as opaque
//! strings. Wrapping them in newtypes keeps an `OfferId` from ever being
//! handed somewhere a `TaskId` belongs.

use serde::{Deserialize, Serialize};

/// Macro to define a typed wrapper around an opaque master-assigned string.
///
/// This generates a newtype with:
/// - `new()` accepting anything `Into<String>`
/// - `as_str()` for borrowing the raw value
/// - `Display`, `From<&str>`, and `From<String>` implementations
/// - `Serialize`/`Deserialize` as a bare string
/// - `Ord`, `Hash`, and other standard traits
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the raw identifier string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(
    /// Identifies a single resource offer from the master.
    OfferId
);
define_id!(
    /// Identifies the agent (node) an offer or task lives on.
    AgentId
);
define_id!(
    /// Identifies a registered framework. Absent until registration
    /// completes; wiped during deregistration.
    FrameworkId
);
define_id!(
    /// Identifies a launched task. By framework convention the value is
    /// `<task-name>__<unique-suffix>`, so the owning task name can be
    /// recovered from the ID alone.
    TaskId
);

/// Separator between the task name and the unique suffix in a [`TaskId`].
const TASK_NAME_DELIMITER: &str = "__";

impl TaskId {
    /// Returns the task name embedded in this ID, or `None` if the value
    /// does not follow the `<name>__<suffix>` convention.
    #[must_use]
    pub fn task_name(&self) -> Option<&str> {
        self.0.rsplit_once(TASK_NAME_DELIMITER).map(|(name, _)| name)
    }

    /// Builds a task ID from a task name and a unique suffix.
    #[must_use]
    pub fn for_task(name: &str, suffix: &str) -> Self {
        Self(format!("{name}{TASK_NAME_DELIMITER}{suffix}"))
    }
}
