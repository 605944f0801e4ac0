//! Clocked partition scheduler.
//!
//! Drives a simulated entity whose computation is split into partitions,
//! each bound to an input clock. Time-driven clocks start partitions from a
//! fixed-step loop; output clocks ticked by a running partition start
//! dependent partitions. Partitions run concurrently and exchange values
//! through per-input mailboxes under a shared preemption lock.

pub mod cli;
pub mod config;
pub mod error;
/// Output recording.
pub mod io;
pub mod model;
pub mod reporting;
pub mod runner;
/// Scheduler core: clocks, requests, dispatch, activation and dependency
/// resolution.
pub mod sim;
pub mod telemetry;
