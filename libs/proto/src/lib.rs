//! # berth-proto
//!
//! Protocol types shared with the cluster master.
//!
//! ## Design Principles
//!
//! - IDs minted by the master are opaque strings; typed wrappers prevent
//!   mixing them up, but never interpret their contents (the one exception
//!   is the task-name prefix baked into [`TaskId`])
//! - Resources carry their reservation metadata inline; a resource with no
//!   reservation ID is unreserved and never touched by the scheduler
//! - Released reservations are marked with the [`TOMBSTONE_PREFIX`]
//!   sentinel rather than deleted, so a restart can tell "released" from
//!   "never seen"
//!
//! ## Contents
//!
//! - Typed IDs (`OfferId`, `TaskId`, `AgentId`, `FrameworkId`)
//! - Offer and resource model (`Offer`, `Resource`, `Volume`)
//! - Driver operations (`Operation`) and decline filters (`OfferFilters`)
//! - Task status reporting (`TaskStatus`, `TaskState`)

mod ids;
mod types;

pub use ids::{AgentId, FrameworkId, OfferId, TaskId};
pub use types::*;
