//! Block dissolve: clears the surface in a random block order over a fixed
//! wall-clock budget, one slice per loop iteration.

use super::palette::BLACK;
use super::render::Surface;
use rand::Rng;
use std::time::{Duration, Instant};

/// Smallest per-block delay.
pub const MIN_BLOCK_DELAY: Duration = Duration::from_micros(1);

/// The surface partitioned into `block`-sized squares; edge blocks are
/// clipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
    width: u16,
    height: u16,
    block: u16,
}

impl BlockGrid {
    pub fn new(width: u16, height: u16, block: u16) -> Self {
        Self {
            width,
            height,
            block: block.max(1),
        }
    }

    pub fn cols(&self) -> usize {
        usize::from(self.width).div_ceil(usize::from(self.block))
    }

    pub fn rows(&self) -> usize {
        usize::from(self.height).div_ceil(usize::from(self.block))
    }

    pub fn count(&self) -> usize {
        self.cols() * self.rows()
    }

    /// Pixel rectangle `(x, y, w, h)` of block `index`.
    pub fn rect(&self, index: usize) -> (u16, u16, u16, u16) {
        let cols = self.cols().max(1);
        let block = usize::from(self.block);
        let x = ((index % cols) * block).min(usize::from(self.width)) as u16;
        let y = ((index / cols) * block).min(usize::from(self.height)) as u16;
        let w = self.block.min(self.width.saturating_sub(x));
        let h = self.block.min(self.height.saturating_sub(y));
        (x, y, w, h)
    }
}

/// Uniformly random permutation of `0..n` (Fisher-Yates).
pub fn shuffled_order<R: Rng>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        order.swap(i, j);
    }
    order
}

/// Delay between consecutive blocks for a `total` budget over `blocks`.
pub fn per_block_delay(total: Duration, blocks: usize) -> Duration {
    let blocks = u32::try_from(blocks.max(1)).unwrap_or(u32::MAX);
    (total / blocks).max(MIN_BLOCK_DELAY)
}

/// One dissolve in progress.
#[derive(Debug, Clone)]
pub struct Dissolve {
    grid: BlockGrid,
    order: Vec<usize>,
    cleared: usize,
    per_block: Duration,
    started: Instant,
}

impl Dissolve {
    /// Plans a dissolve of `surface` starting at `now`.
    pub fn new<S: Surface + ?Sized, R: Rng>(
        surface: &S,
        block: u16,
        duration: Duration,
        rng: &mut R,
        now: Instant,
    ) -> Self {
        let grid = BlockGrid::new(surface.width(), surface.height(), block);
        let order = shuffled_order(grid.count(), rng);
        Self {
            per_block: per_block_delay(duration, order.len()),
            grid,
            order,
            cleared: 0,
            started: now,
        }
    }

    pub fn grid(&self) -> BlockGrid {
        self.grid
    }

    /// Block indices in clearing order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn per_block(&self) -> Duration {
        self.per_block
    }

    pub fn cleared(&self) -> usize {
        self.cleared
    }

    pub fn is_finished(&self) -> bool {
        self.cleared >= self.order.len()
    }

    /// Clears every block due by `now` and returns `true` once all blocks
    /// are cleared. Block `k` is due at `started + k * per_block`.
    pub fn step<S: Surface + ?Sized>(&mut self, surface: &mut S, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.started);
        let due = (elapsed.as_nanos() / self.per_block.as_nanos().max(1))
            .saturating_add(1)
            .min(self.order.len() as u128) as usize;

        while self.cleared < due {
            let (x, y, w, h) = self.grid.rect(self.order[self.cleared]);
            surface.fill_rect(x, y, w, h, BLACK);
            self.cleared += 1;
        }
        self.is_finished()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::device::render::FrameBuffer;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn grid_covers_surface_with_clipped_edges() {
        let grid = BlockGrid::new(10, 6, 4);
        assert_eq!((grid.cols(), grid.rows(), grid.count()), (3, 2, 6));
        assert_eq!(grid.rect(0), (0, 0, 4, 4));
        assert_eq!(grid.rect(2), (8, 0, 2, 4));
        assert_eq!(grid.rect(5), (8, 4, 2, 2));
    }

    #[test]
    fn default_panel_has_512_blocks() {
        assert_eq!(BlockGrid::new(128, 64, 4).count(), 512);
    }

    #[test]
    fn per_block_delay_is_floored() {
        assert_eq!(
            per_block_delay(Duration::from_millis(1500), 512),
            Duration::from_nanos(2_929_687)
        );
        assert_eq!(per_block_delay(Duration::ZERO, 512), MIN_BLOCK_DELAY);
        assert_eq!(per_block_delay(Duration::from_secs(1), 0), Duration::from_secs(1));
    }

    #[test]
    fn dissolve_is_time_sliced_and_clears_everything() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut fb = FrameBuffer::new(16, 8);
        fb.fill_rect(0, 0, 16, 8, 0xFFFF);
        let t0 = Instant::now();
        let mut dissolve = Dissolve::new(&fb, 4, Duration::from_millis(80), &mut rng, t0);
        assert_eq!(dissolve.per_block(), Duration::from_millis(10));

        assert!(!dissolve.step(&mut fb, t0));
        assert_eq!(dissolve.cleared(), 1);
        assert!(!dissolve.step(&mut fb, t0 + Duration::from_millis(35)));
        assert_eq!(dissolve.cleared(), 4);
        assert!(!fb.is_blank());

        assert!(dissolve.step(&mut fb, t0 + Duration::from_millis(70)));
        assert!(fb.is_blank());
        assert!(dissolve.step(&mut fb, t0 + Duration::from_secs(5)));
        assert_eq!(dissolve.cleared(), 8);
    }

    proptest! {
        #[test]
        fn permutation_visits_every_block_once(
            width in 1u16..200,
            height in 1u16..100,
            block in 1u16..9,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let fb = FrameBuffer::new(width, height);
            let dissolve = Dissolve::new(&fb, block, Duration::from_millis(1500), &mut rng, Instant::now());

            let mut visited = dissolve.order().to_vec();
            visited.sort_unstable();
            let expected: Vec<usize> = (0..dissolve.grid().count()).collect();
            prop_assert_eq!(visited, expected);
        }
    }
}
