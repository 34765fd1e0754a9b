//! The five-point stencil shared by every execution strategy.

use ndarray::{ArrayView1, ArrayViewMut1};

use crate::{ConfigError, Grid};

/// Diffusion coefficient for which an update is the average of the four neighbors.
pub const DEFAULT_ALPHA: f64 = 0.25;

/// Parameters of an iterative relaxation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relaxation {
    /// Diffusion coefficient of the stencil.
    pub alpha: f64,
    /// The run converges once a sweep changes no cell by this much or more.
    pub epsilon: f64,
    /// Hard ceiling on the amount of sweeps.
    pub max_iterations: u32,
}

impl Relaxation {
    /// Checks every parameter is in its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "alpha",
                value: self.alpha,
            });
        }

        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "epsilon",
                value: self.epsilon,
            });
        }

        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_iterations",
                value: 0.0,
            });
        }

        Ok(())
    }

    /// Whether a sweep with `residual` at zero-based `iteration` ends the run.
    pub fn is_done(&self, iteration: u32, residual: f64) -> bool {
        residual < self.epsilon || iteration.saturating_add(1) >= self.max_iterations
    }
}

/// The outcome of a single-process relaxation.
#[derive(Debug, Clone)]
pub struct Solution {
    pub grid: Grid,
    /// Amount of sweeps performed.
    pub iterations: u32,
    /// Max-delta of the last sweep.
    pub residual: f64,
    /// Max-delta of every sweep, in order.
    pub history: Vec<f64>,
}

/// Folds a cell change into a running max-delta, a NaN change poisons the result.
#[inline]
pub fn max_delta(acc: f64, delta: f64) -> f64 {
    if delta > acc || delta.is_nan() { delta } else { acc }
}

/// Relaxes one row into `out`.
///
/// The first and last columns are copied unchanged.
///
/// # Arguments
/// * `above` - The previous values of the row above.
/// * `row` - The previous values of this row.
/// * `below` - The previous values of the row below.
/// * `out` - Where to write the new values of this row.
/// * `alpha` - The diffusion coefficient.
///
/// # Returns
/// The max absolute change of any cell of the row.
pub fn relax_row(
    above: ArrayView1<f64>,
    row: ArrayView1<f64>,
    below: ArrayView1<f64>,
    mut out: ArrayViewMut1<f64>,
    alpha: f64,
) -> f64 {
    let width = row.len();
    debug_assert_eq!(above.len(), width);
    debug_assert_eq!(below.len(), width);
    debug_assert_eq!(out.len(), width);

    out.assign(&row);

    let mut acc = 0.0;
    for c in 1..width.saturating_sub(1) {
        let center = row[c];
        let laplacian = above[c] + below[c] + row[c - 1] + row[c + 1] - 4.0 * center;
        let value = center + alpha * laplacian;

        acc = max_delta(acc, (value - center).abs());
        out[c] = value;
    }

    acc
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, array};

    use super::*;

    #[test]
    fn quarter_alpha_averages_neighbors() {
        let above = array![0.0, 4.0, 0.0];
        let row = array![1.0, 2.0, 3.0];
        let below = array![0.0, 8.0, 0.0];
        let mut out = Array1::zeros(3);

        let delta = relax_row(above.view(), row.view(), below.view(), out.view_mut(), 0.25);

        assert_eq!(out, array![1.0, 4.0, 3.0]);
        assert_eq!(delta, 2.0);
    }

    #[test]
    fn edge_columns_stay_fixed() {
        let hot = array![9.0, 9.0, 9.0, 9.0];
        let row = array![5.0, 0.0, 0.0, 7.0];
        let mut out = Array1::zeros(4);

        relax_row(hot.view(), row.view(), hot.view(), out.view_mut(), 0.25);

        assert_eq!(out[0], 5.0);
        assert_eq!(out[3], 7.0);
    }

    #[test]
    fn nan_poisons_the_delta() {
        assert!(max_delta(max_delta(0.0, f64::NAN), 1.0).is_nan());
        assert_eq!(max_delta(0.5, 0.25), 0.5);
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        let ok = Relaxation {
            alpha: DEFAULT_ALPHA,
            epsilon: 1e-3,
            max_iterations: 10,
        };
        assert!(ok.validate().is_ok());

        assert!(Relaxation { alpha: 0.0, ..ok }.validate().is_err());
        assert!(Relaxation { epsilon: f64::NAN, ..ok }.validate().is_err());
        assert!(Relaxation { max_iterations: 0, ..ok }.validate().is_err());
    }

    #[test]
    fn ceiling_ends_the_run() {
        let relax = Relaxation {
            alpha: DEFAULT_ALPHA,
            epsilon: 1e-3,
            max_iterations: 3,
        };

        assert!(!relax.is_done(1, 1.0));
        assert!(relax.is_done(2, 1.0));
        assert!(relax.is_done(0, 1e-4));
    }
}
