//! Coordinator of a distributed heat diffusion run.
//!
//! Workers connect over TCP, each receives a contiguous block of rows and the
//! coordinator keeps them in lockstep: it relays boundary rows between
//! neighbors, combines their local max-deltas and broadcasts a decision after
//! every iteration.

pub mod config;
mod coordinator;
pub mod error;
mod inbox;
pub mod record;
mod state;
mod sync;

pub use config::RunConfig;
pub use coordinator::Coordinator;
pub use error::RunError;
pub use record::{RunRecord, RunReport, Strategy};
