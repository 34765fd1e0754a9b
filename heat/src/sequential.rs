//! Single-threaded baseline, the reference every other strategy is checked against.

use log::debug;

use crate::{
    Grid,
    stencil::{self, Relaxation, Solution},
};

/// Computes one Jacobi sweep of `cur` into `next`.
///
/// The first and last rows are copied unchanged.
///
/// # Returns
/// The max absolute change of any cell.
pub fn sweep(cur: &Grid, next: &mut Grid, alpha: f64) -> f64 {
    let height = cur.nrows();
    next.row_mut(0).assign(&cur.row(0));
    next.row_mut(height - 1).assign(&cur.row(height - 1));

    (1..height.saturating_sub(1)).fold(0.0, |acc, r| {
        let delta = stencil::relax_row(
            cur.row(r - 1),
            cur.row(r),
            cur.row(r + 1),
            next.row_mut(r),
            alpha,
        );

        stencil::max_delta(acc, delta)
    })
}

/// Relaxes `initial` until convergence or the iteration ceiling.
///
/// # Arguments
/// * `initial` - The starting grid, must not be empty.
/// * `relax` - The relaxation parameters, assumed validated.
///
/// # Returns
/// The final grid after the last sweep together with the residual history.
pub fn solve(initial: &Grid, relax: &Relaxation) -> Solution {
    let mut cur = initial.clone();
    let mut next = initial.clone();
    let mut history = Vec::new();

    for iteration in 0..relax.max_iterations {
        let residual = sweep(&cur, &mut next, relax.alpha);
        std::mem::swap(&mut cur, &mut next);
        history.push(residual);

        if relax.is_done(iteration, residual) {
            break;
        }
    }

    let residual = history.last().copied().unwrap_or_default();
    debug!(iterations = history.len(), residual = residual; "sequential relaxation finished");

    Solution {
        grid: cur,
        iterations: history.len() as u32,
        residual,
        history,
    }
}
