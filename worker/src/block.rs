use comms::msg::{Edge, InitSpec};
use heat::stencil;
use ndarray::Array2;

use crate::error::{Result, WorkerErr};

/// A worker's slice of the grid: the owned rows plus one ghost row per neighbor.
///
/// Local row `0` is the top ghost when there is a previous neighbor, the last
/// local row is the bottom ghost when there is a next neighbor. A missing
/// neighbor means the outermost owned row is a global edge and stays fixed.
#[derive(Debug, Clone)]
pub struct Block {
    cur: Array2<f64>,
    next: Array2<f64>,
    owned: usize,
    has_prev: bool,
    has_next: bool,
    alpha: f64,
}

impl Block {
    /// Builds the local block out of a partition assignment.
    ///
    /// # Errors
    /// `WorkerErr::InvalidInit` if the assignment is inconsistent.
    pub fn from_init(spec: &InitSpec) -> Result<Self> {
        let width = spec.width as usize;
        let owned = spec.owned_rows();

        if spec.row_end <= spec.row_start {
            let text = format!("empty row range {}..{}", spec.row_start, spec.row_end);
            return Err(WorkerErr::InvalidInit(text));
        }

        if width == 0 {
            return Err(WorkerErr::InvalidInit("grid width is zero".to_string()));
        }

        if !(spec.alpha.is_finite() && spec.epsilon.is_finite()) {
            let text = format!("alpha {} and epsilon {} must be finite", spec.alpha, spec.epsilon);
            return Err(WorkerErr::InvalidInit(text));
        }

        let rows = spec.block_rows();
        let cur = Array2::from_shape_vec((rows, width), spec.rows.clone()).map_err(|_| {
            let (got, expected) = (spec.rows.len(), rows * width);
            WorkerErr::InvalidInit(format!("got {got} initial values, expected {expected}"))
        })?;

        Ok(Self {
            next: cur.clone(),
            cur,
            owned,
            has_prev: spec.has_prev,
            has_next: spec.has_next,
            alpha: spec.alpha,
        })
    }

    pub fn width(&self) -> usize {
        self.cur.ncols()
    }

    fn first_owned(&self) -> usize {
        usize::from(self.has_prev)
    }

    fn last_owned(&self) -> usize {
        self.first_owned() + self.owned - 1
    }

    fn touches_ghost(&self, r: usize) -> bool {
        (self.has_prev && r == self.first_owned()) || (self.has_next && r == self.last_owned())
    }

    fn is_fixed(&self, r: usize) -> bool {
        (!self.has_prev && r == self.first_owned()) || (!self.has_next && r == self.last_owned())
    }

    fn relax_local(&mut self, r: usize) -> f64 {
        if self.is_fixed(r) {
            self.next.row_mut(r).assign(&self.cur.row(r));
            return 0.0;
        }

        stencil::relax_row(
            self.cur.row(r - 1),
            self.cur.row(r),
            self.cur.row(r + 1),
            self.next.row_mut(r),
            self.alpha,
        )
    }

    /// Runs one sweep over the owned rows and makes the result current.
    ///
    /// Rows away from the ghosts go first, then the rows relying on ghost data.
    ///
    /// # Returns
    /// The local max absolute change.
    pub fn relax(&mut self) -> f64 {
        let (first, last) = (self.first_owned(), self.last_owned());
        let mut acc = 0.0;

        for r in first..=last {
            if !self.touches_ghost(r) {
                acc = stencil::max_delta(acc, self.relax_local(r));
            }
        }

        let edges = if first == last { vec![first] } else { vec![first, last] };
        for r in edges {
            if self.touches_ghost(r) {
                acc = stencil::max_delta(acc, self.relax_local(r));
            }
        }

        std::mem::swap(&mut self.cur, &mut self.next);
        acc
    }

    /// The edges this block reports to the coordinator every iteration.
    pub fn boundary_edges(&self) -> Vec<Edge> {
        match (self.has_prev, self.has_next) {
            (false, false) => vec![Edge::Solo],
            (true, false) => vec![Edge::Top],
            (false, true) => vec![Edge::Bottom],
            (true, true) => vec![Edge::Top, Edge::Bottom],
        }
    }

    /// Whether this block keeps a ghost row for `edge`.
    pub fn has_ghost(&self, edge: Edge) -> bool {
        match edge {
            Edge::Top => self.has_prev,
            Edge::Bottom => self.has_next,
            Edge::Solo => false,
        }
    }

    /// A copy of the current owned row at `edge`, empty for `Edge::Solo`.
    pub fn edge_row(&self, edge: Edge) -> Vec<f64> {
        match edge {
            Edge::Top => self.cur.row(self.first_owned()).to_vec(),
            Edge::Bottom => self.cur.row(self.last_owned()).to_vec(),
            Edge::Solo => Vec::new(),
        }
    }

    /// Overwrites the ghost row at `edge` with a neighbor's boundary row.
    ///
    /// The caller guarantees `row` is `width` long and the ghost exists.
    pub fn install_ghost(&mut self, edge: Edge, row: &[f64]) {
        let r = match edge {
            Edge::Top => 0,
            Edge::Bottom => self.last_owned() + 1,
            Edge::Solo => return,
        };

        self.cur
            .row_mut(r)
            .iter_mut()
            .zip(row)
            .for_each(|(dst, src)| *dst = *src);
    }

    /// The current owned rows, row-major.
    pub fn owned_values(&self) -> Vec<f64> {
        let (first, last) = (self.first_owned(), self.last_owned());
        self.cur
            .rows()
            .into_iter()
            .skip(first)
            .take(last - first + 1)
            .flatten()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use heat::{DEFAULT_ALPHA, InitialCondition, sequential};
    use ndarray::s;

    use super::*;

    fn spec_for(grid: &Array2<f64>, start: usize, end: usize) -> InitSpec {
        let height = grid.nrows();
        let has_prev = start > 0;
        let has_next = end < height;
        let lo = start - usize::from(has_prev);
        let hi = end + usize::from(has_next);

        InitSpec {
            worker: 0,
            workers: 1,
            row_start: start as u32,
            row_end: end as u32,
            width: grid.ncols() as u32,
            epsilon: 1e-3,
            alpha: DEFAULT_ALPHA,
            has_prev,
            has_next,
            rows: grid.slice(s![lo..hi, ..]).iter().copied().collect(),
        }
    }

    #[test]
    fn whole_grid_block_matches_a_sequential_sweep() {
        let grid = InitialCondition::default().build(6, 5).unwrap();
        let mut block = Block::from_init(&spec_for(&grid, 0, 6)).unwrap();

        let mut expected = grid.clone();
        let seq_delta = sequential::sweep(&grid, &mut expected, DEFAULT_ALPHA);
        let delta = block.relax();

        assert_eq!(delta, seq_delta);
        assert_eq!(block.owned_values(), expected.iter().copied().collect::<Vec<_>>());
        assert_eq!(block.boundary_edges(), [Edge::Solo]);
    }

    #[test]
    fn middle_block_uses_its_ghosts() {
        let grid = InitialCondition::default().build(6, 4).unwrap();
        let mut block = Block::from_init(&spec_for(&grid, 2, 4)).unwrap();

        let mut expected = grid.clone();
        sequential::sweep(&grid, &mut expected, DEFAULT_ALPHA);
        block.relax();

        let want: Vec<f64> = expected.slice(s![2..4, ..]).iter().copied().collect();
        assert_eq!(block.owned_values(), want);
        assert_eq!(block.boundary_edges(), [Edge::Top, Edge::Bottom]);
        assert_eq!(block.edge_row(Edge::Top), expected.row(2).to_vec());
        assert_eq!(block.edge_row(Edge::Bottom), expected.row(3).to_vec());
    }

    #[test]
    fn single_row_between_two_ghosts() {
        let grid = InitialCondition::default().build(3, 3).unwrap();
        let mut block = Block::from_init(&spec_for(&grid, 1, 2)).unwrap();

        // (100 + 20 + 20 + 20) / 4
        assert_eq!(block.relax(), 20.0);
        assert_eq!(block.owned_values(), [20.0, 40.0, 20.0]);
    }

    #[test]
    fn installed_ghost_feeds_the_next_sweep() {
        let grid = InitialCondition::default().build(4, 3).unwrap();
        let mut block = Block::from_init(&spec_for(&grid, 2, 4)).unwrap();
        assert!(block.has_ghost(Edge::Top) && !block.has_ghost(Edge::Bottom));

        block.install_ghost(Edge::Top, &[0.0, 60.0, 0.0]);
        block.relax();

        // Row 2 center: (60 + 20 + 20 + 20) / 4, row 3 is the fixed bottom edge.
        assert_eq!(block.owned_values(), [20.0, 30.0, 20.0, 20.0, 20.0, 20.0]);
    }

    #[test]
    fn mismatched_row_count_is_rejected() {
        let grid = InitialCondition::default().build(4, 3).unwrap();
        let mut spec = spec_for(&grid, 0, 2);
        spec.rows.pop();

        assert!(matches!(Block::from_init(&spec), Err(WorkerErr::InvalidInit(_))));
    }
}
