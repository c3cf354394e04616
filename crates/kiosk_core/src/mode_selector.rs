use rand::{rngs::StdRng, Rng, SeedableRng};
use shared::domain::Mode;

pub const SPIN_CELLS: usize = 9;
pub const CENTER_CELL: usize = 4;
pub const CENTER_PLACEHOLDER: &str = "?";

pub const DEFAULT_SPIN_POOL: &[&str] = &[
    "ICON MODE",
    "POWER POSE",
    "SOFT LAUNCH",
    "BESTIE VIBES",
    "CAMERA LOVER",
    "SQUAD GOALS",
    "UNBOTHERED",
    "PARTY ANIMAL",
    "MAIN EVENT",
    "GOLDEN HOUR",
    "CEO ENERGY",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinReel {
    cells: Vec<String>,
    highlight: bool,
    settled: bool,
}

impl SpinReel {
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn center(&self) -> &str {
        &self.cells[CENTER_CELL]
    }

    /// Set for legendary modes while the reel is spinning.
    pub fn highlight(&self) -> bool {
        self.highlight
    }

    #[cfg(test)]
    pub(crate) fn is_settled(&self) -> bool {
        self.settled
    }
}

pub struct ModeSelector {
    pool: Vec<String>,
    rng: StdRng,
}

impl ModeSelector {
    pub fn new(pool: Vec<String>) -> Self {
        Self::with_rng(pool, StdRng::from_entropy())
    }

    pub fn with_seed(pool: Vec<String>, seed: u64) -> Self {
        Self::with_rng(pool, StdRng::seed_from_u64(seed))
    }

    fn with_rng(pool: Vec<String>, rng: StdRng) -> Self {
        let pool = if pool.is_empty() {
            DEFAULT_SPIN_POOL.iter().map(|label| label.to_string()).collect()
        } else {
            pool
        };
        Self { pool, rng }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &[String] {
        &self.pool
    }

    /// Fresh reel for a spin toward `assigned`.
    pub fn begin(&mut self, assigned: &Mode) -> SpinReel {
        let mut reel = SpinReel {
            cells: vec![CENTER_PLACEHOLDER.to_string(); SPIN_CELLS],
            highlight: assigned.is_legendary(),
            settled: false,
        };
        self.shuffle(&mut reel);
        reel
    }

    /// One decorative update. The center cell is never touched and a settled
    /// reel stays settled.
    pub fn shuffle(&mut self, reel: &mut SpinReel) {
        if reel.settled {
            return;
        }
        for (index, cell) in reel.cells.iter_mut().enumerate() {
            if index == CENTER_CELL {
                continue;
            }
            let pick = self.rng.gen_range(0..self.pool.len());
            cell.clone_from(&self.pool[pick]);
        }
    }

    pub fn settle(&self, reel: &mut SpinReel, assigned: &Mode) {
        reel.cells[CENTER_CELL].clone_from(&assigned.name);
        reel.highlight = false;
        reel.settled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> ModeSelector {
        ModeSelector::with_seed(Vec::new(), 7)
    }

    #[test]
    fn empty_pool_falls_back_to_placeholders() {
        assert_eq!(selector().pool().len(), DEFAULT_SPIN_POOL.len());
    }

    #[test]
    fn center_converges_to_assigned_mode_after_any_number_of_shuffles() {
        let assigned = Mode::new("SPACE PILOT", "Common", None);
        for shuffles in [0usize, 1, 27, 500] {
            let mut selector = selector();
            let mut reel = selector.begin(&assigned);
            for _ in 0..shuffles {
                selector.shuffle(&mut reel);
                assert_eq!(reel.center(), CENTER_PLACEHOLDER);
            }
            selector.settle(&mut reel, &assigned);
            assert_eq!(reel.center(), "SPACE PILOT");
            assert!(reel.is_settled());
        }
    }

    #[test]
    fn assigned_mode_outside_the_pool_still_wins() {
        let assigned = Mode::new("NOT IN ANY POOL", "Common", None);
        let mut selector = selector();
        let mut reel = selector.begin(&assigned);
        selector.settle(&mut reel, &assigned);
        selector.shuffle(&mut reel);
        assert_eq!(reel.center(), "NOT IN ANY POOL");
    }

    #[test]
    fn decorative_cells_come_from_the_pool() {
        let mut selector = ModeSelector::with_seed(vec!["A".into(), "B".into()], 1);
        let mut reel = selector.begin(&Mode::new("Z", "Common", None));
        selector.shuffle(&mut reel);
        for (index, cell) in reel.cells().iter().enumerate() {
            if index == CENTER_CELL {
                continue;
            }
            assert!(cell == "A" || cell == "B", "unexpected cell {cell}");
        }
    }

    #[test]
    fn legendary_highlight_lasts_until_settle() {
        let assigned = Mode::new("DISCO QUEEN", "Legendary", None);
        let mut selector = selector();
        let mut reel = selector.begin(&assigned);
        assert!(reel.highlight());
        selector.shuffle(&mut reel);
        assert!(reel.highlight());
        selector.settle(&mut reel, &assigned);
        assert!(!reel.highlight());

        let common = selector.begin(&Mode::new("ROCKSTAR", "Common", None));
        assert!(!common.highlight());
    }
}
