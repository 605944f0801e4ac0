//! Simulated entities the scheduler can drive.

/// Reference three-partition model with clocked inputs and outputs.
pub mod clocks;

pub use clocks::ClocksModel;
