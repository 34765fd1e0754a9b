//! Row-block domain decomposition.

use std::ops::Range;

use crate::ConfigError;

/// A half-open range of global rows, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// The rows owned by one worker and who its neighbors are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub rows: RowRange,
    /// The partition right above this one, if any.
    pub prev: Option<usize>,
    /// The partition right below this one, if any.
    pub next: Option<usize>,
}

/// Splits `[0, height)` into `workers` contiguous row blocks.
///
/// Block sizes differ by at most one row, the first `height % workers` blocks
/// take the extra rows.
///
/// # Arguments
/// * `height` - The amount of rows of the grid.
/// * `workers` - The amount of partitions to create.
///
/// # Returns
/// The ordered partitions, or a `ConfigError` if `workers` is zero or greater than `height`.
pub fn partition(height: usize, workers: usize) -> Result<Vec<Partition>, ConfigError> {
    if workers == 0 {
        return Err(ConfigError::NoWorkers);
    }

    if workers > height {
        return Err(ConfigError::TooManyWorkers { workers, height });
    }

    let base = height / workers;
    let rem = height % workers;
    let mut start = 0;

    let partitions = (0..workers)
        .map(|index| {
            let end = start + base + usize::from(index < rem);
            let rows = RowRange { start, end };
            start = end;

            Partition {
                index,
                rows,
                prev: index.checked_sub(1),
                next: (index + 1 < workers).then_some(index + 1),
            }
        })
        .collect();

    Ok(partitions)
}
