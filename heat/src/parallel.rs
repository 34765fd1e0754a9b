//! Shared-memory baseline, rows of a sweep are relaxed on a rayon pool.

use log::debug;
use ndarray::{Axis, parallel::prelude::*};
use rayon::ThreadPoolBuilder;

use crate::{
    ConfigError, Grid,
    stencil::{self, Relaxation, Solution},
};

/// Relaxes `initial` until convergence or the iteration ceiling using `threads` threads.
///
/// Each sweep is an implicit barrier: every row of iteration `k` is written before
/// any row of iteration `k + 1` is read.
///
/// # Arguments
/// * `initial` - The starting grid, must not be empty.
/// * `relax` - The relaxation parameters, assumed validated.
/// * `threads` - The amount of threads of the pool.
///
/// # Returns
/// The final grid, or a `ConfigError` if `threads` is zero or the pool can't be built.
pub fn solve(initial: &Grid, relax: &Relaxation, threads: usize) -> Result<Solution, ConfigError> {
    if threads == 0 {
        return Err(ConfigError::InvalidParameter {
            name: "threads",
            value: 0.0,
        });
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ConfigError::ThreadPool(e.to_string()))?;

    let height = initial.nrows();
    let alpha = relax.alpha;
    let mut cur = initial.clone();
    let mut next = initial.clone();
    let mut history = Vec::new();

    for iteration in 0..relax.max_iterations {
        let residual = pool.install(|| {
            next.axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .map(|(r, mut out)| {
                    if r == 0 || r == height - 1 {
                        out.assign(&cur.row(r));
                        return 0.0;
                    }

                    stencil::relax_row(cur.row(r - 1), cur.row(r), cur.row(r + 1), out, alpha)
                })
                .reduce(|| 0.0, stencil::max_delta)
        });

        std::mem::swap(&mut cur, &mut next);
        history.push(residual);

        if relax.is_done(iteration, residual) {
            break;
        }
    }

    let residual = history.last().copied().unwrap_or_default();
    debug!(threads = threads, iterations = history.len(); "parallel relaxation finished");

    Ok(Solution {
        grid: cur,
        iterations: history.len() as u32,
        residual,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_ALPHA, InitialCondition, sequential};

    #[test]
    fn matches_the_sequential_baseline_exactly() {
        let relax = Relaxation {
            alpha: DEFAULT_ALPHA,
            epsilon: 1e-3,
            max_iterations: 10_000,
        };

        for initial in [
            InitialCondition::default().build(17, 11).unwrap(),
            InitialCondition::Random {
                seed: 3,
                low: -10.0,
                high: 10.0,
            }
            .build(9, 13)
            .unwrap(),
        ] {
            let seq = sequential::solve(&initial, &relax);

            for threads in [1, 2, 4] {
                let par = solve(&initial, &relax, threads).unwrap();
                assert_eq!(par.grid, seq.grid);
                assert_eq!(par.iterations, seq.iterations);
                assert_eq!(par.history, seq.history);
            }
        }
    }

    #[test]
    fn zero_threads_is_a_config_error() {
        let initial = InitialCondition::default().build(4, 4).unwrap();
        let relax = Relaxation {
            alpha: DEFAULT_ALPHA,
            epsilon: 1e-3,
            max_iterations: 10,
        };

        assert!(matches!(
            solve(&initial, &relax, 0),
            Err(ConfigError::InvalidParameter { name: "threads", .. })
        ));
    }
}
