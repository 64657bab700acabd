//! Log setup for the tunnelsmith binary.
//!
//! See [`Tracing`] for the available outputs and [`TelemetryOptions`] for the
//! matching command line arguments.
pub mod tracing;

pub use tracing::{TelemetryOptions, Tracing};
