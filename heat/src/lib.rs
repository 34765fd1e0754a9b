//! Numeric core of the heat diffusion solver: grids, domain decomposition,
//! the five-point stencil and the single-process baselines.

pub mod error;
pub mod grid;
pub mod parallel;
pub mod partition;
pub mod sequential;
pub mod stencil;

pub use error::ConfigError;
pub use grid::{Grid, InitialCondition, max_abs_diff};
pub use partition::{Partition, RowRange, partition};
pub use stencil::{DEFAULT_ALPHA, Relaxation, Solution};
