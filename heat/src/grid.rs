use ndarray::Array2;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Whole-domain temperatures, `height` rows by `width` columns.
pub type Grid = Array2<f64>;

/// How the starting temperatures of a run are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InitialCondition {
    /// Every cell at `ambient`, the top row held at `source`.
    HotTop { ambient: f64, source: f64 },
    /// Uniformly distributed temperatures in `[low, high)`, reproducible through `seed`.
    Random { seed: u64, low: f64, high: f64 },
}

impl Default for InitialCondition {
    fn default() -> Self {
        InitialCondition::HotTop {
            ambient: 20.0,
            source: 100.0,
        }
    }
}

impl InitialCondition {
    /// Builds the starting grid.
    ///
    /// # Arguments
    /// * `height` - The amount of rows.
    /// * `width` - The amount of columns.
    ///
    /// # Returns
    /// The grid, or a `ConfigError` if it would be empty or the bounds are invalid.
    pub fn build(&self, height: usize, width: usize) -> Result<Grid, ConfigError> {
        if height == 0 || width == 0 {
            return Err(ConfigError::EmptyGrid { height, width });
        }

        let grid = match *self {
            InitialCondition::HotTop { ambient, source } => {
                let mut grid = Grid::from_elem((height, width), ambient);
                grid.row_mut(0).fill(source);
                grid
            }
            InitialCondition::Random { seed, low, high } => {
                if !(low.is_finite() && high.is_finite() && low < high) {
                    return Err(ConfigError::InvalidParameter {
                        name: "random.high",
                        value: high,
                    });
                }

                let mut rng = StdRng::seed_from_u64(seed);
                Grid::from_shape_simple_fn((height, width), || rng.random_range(low..high))
            }
        };

        Ok(grid)
    }
}

/// The largest absolute cell difference between two grids of the same shape.
///
/// Any NaN cell makes the result NaN.
pub fn max_abs_diff(a: &Grid, b: &Grid) -> f64 {
    debug_assert_eq!(a.dim(), b.dim());

    a.iter()
        .zip(b)
        .fold(0.0, |acc, (x, y)| crate::stencil::max_delta(acc, (x - y).abs()))
}
