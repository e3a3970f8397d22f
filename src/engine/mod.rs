//! Concurrency primitives for link checking
//!
//! # Components
//!
//! - `ParallelRunner`: Runs an async operation over a stream with a fixed worker count
//! - `AdmissionGate`: One check per host at a time, with a cooldown between checks
//! - `ReleaseScheduler`: Timer service the gate uses for delayed releases

mod gate;
mod release;
mod runner;

pub use gate::{AdmissionError, AdmissionGate, AdmissionToken, PERMITS_PER_HOST};
pub use release::ReleaseScheduler;
pub use runner::{ParallelError, ParallelRunner};
