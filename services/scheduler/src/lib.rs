//! # berth-scheduler
//!
//! The uninstall coordinator for a berth-managed service.
//!
//! When a service is marked for teardown, this scheduler registers with the
//! cluster master and systematically walks back everything the service ever
//! claimed: it kills remaining tasks, releases every reservation the master
//! re-offers (scalar shares, port ranges, persistent volumes), purges
//! transport-encryption secrets, and finally deregisters the framework and
//! wipes its persisted bookkeeping.
//!
//! The work is organized as a dependency-ordered plan (kill → release →
//! TLS cleanup → deregister) advanced by the asynchronous stream of
//! resource offers. Progress is durable: released reservations are
//! tombstoned in the state store, so a crash at any point resumes with
//! exactly the work still outstanding.

pub mod api;
pub mod config;
pub mod driver;
pub mod plan;
pub mod secrets;
pub mod spec;
pub mod state;
pub mod uninstall;
