//! The uninstall coordinator.
//!
//! Components, in data-flow order:
//! - [`UninstallPlanBuilder`] reads the persisted task set once at startup
//!   and constructs the kill → release → TLS-cleanup → deregister plan
//! - [`UninstallScheduler`] drives the plan from the offer stream: starts
//!   candidates, runs the cleaner, accepts or declines every offer
//! - [`UninstallResourceCleaner`] sweeps offered resources the framework
//!   still owns into DESTROY/UNRESERVE operations
//! - [`UninstallRecorder`] observes accepted operations, tombstones the
//!   matching persisted resources, and marks release steps complete
//!
//! The persisted tombstones are the durable progress signal: rebuilding
//! the plan after a crash recomputes exactly the work still outstanding.

mod builder;
mod cleaner;
mod recorder;
mod scheduler;

use thiserror::Error;

pub use builder::UninstallPlanBuilder;
pub use cleaner::{OfferRecommendation, UninstallResourceCleaner};
pub use recorder::{OfferAccepter, UninstallRecorder};
pub use scheduler::UninstallScheduler;

use crate::driver::DriverError;
use crate::state::StateStoreError;

/// Errors surfaced by the uninstall coordinator. All are retryable from
/// the next offer cycle; none are fatal to the process.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("state store error: {0}")]
    State(#[from] StateStoreError),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}
