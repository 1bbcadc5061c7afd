/// An inclusive arc of horizon sectors, possibly wrapping around zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorRange {
    first: usize,
    count: usize,
}

impl SectorRange {
    /// The whole circle; used when the view position lies inside a node's
    /// footprint.
    pub fn full(sectors: usize) -> Self {
        Self {
            first: 0,
            count: sectors,
        }
    }

    /// The shorter inclusive arc between two sectors. A footprint seen from
    /// outside never subtends more than half the circle, so the shorter arc
    /// is always the one spanning the box.
    pub fn arc(a: usize, b: usize, sectors: usize) -> Self {
        debug_assert!(a < sectors && b < sectors);

        let forward = (b + sectors - a) % sectors;
        let backward = (a + sectors - b) % sectors;

        if forward <= backward {
            Self {
                first: a,
                count: forward + 1,
            }
        } else {
            Self {
                first: b,
                count: backward + 1,
            }
        }
    }

    fn indices(self, sectors: usize) -> impl Iterator<Item = usize> {
        (0..self.count).map(move |offset| (self.first + offset) % sectors)
    }
}

/// The angular horizon around the view position.
///
/// Slot `i` holds the highest elevation angle (height over horizontal
/// distance) raised into sector `i` so far this pass. Anything whose highest
/// possible elevation angle stays below the buffer over its whole angular
/// extent is occluded.
pub struct HorizonBuffer {
    heights: Vec<f32>,
}

impl HorizonBuffer {
    pub fn new(sectors: usize) -> Self {
        debug_assert!(sectors > 0, "horizon buffer needs at least one sector");

        Self {
            heights: vec![f32::NEG_INFINITY; sectors],
        }
    }

    pub fn sectors(&self) -> usize {
        self.heights.len()
    }

    /// Forgets everything seen so far; called at the start of every pass.
    pub fn reset(&mut self) {
        self.heights.fill(f32::NEG_INFINITY);
    }

    /// Whether `elevation` rises above the horizon anywhere within `range`.
    pub fn is_above(&self, range: SectorRange, elevation: f32) -> bool {
        range
            .indices(self.heights.len())
            .any(|sector| elevation > self.heights[sector])
    }

    /// Raises the horizon over `range` to at least `elevation`. Existing
    /// higher values are kept, the buffer only ever grows.
    pub fn heighten(&mut self, range: SectorRange, elevation: f32) {
        for sector in range.indices(self.heights.len()) {
            if self.heights[sector] < elevation {
                self.heights[sector] = elevation;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn arcs_pick_the_shorter_direction() {
        let range = SectorRange::arc(2, 5, 100);
        assert_eq!(range.indices(100).collect::<Vec<_>>(), vec![2, 3, 4, 5]);

        // Wraps around zero instead of walking the long way.
        let range = SectorRange::arc(98, 1, 100);
        assert_eq!(range.indices(100).collect::<Vec<_>>(), vec![98, 99, 0, 1]);

        // Order of the endpoints does not matter.
        assert_eq!(SectorRange::arc(5, 2, 100), SectorRange::arc(2, 5, 100));
    }

    #[test]
    fn heighten_never_lowers() {
        let mut horizon = HorizonBuffer::new(10);

        horizon.heighten(SectorRange::arc(0, 4, 10), 2.0);
        horizon.heighten(SectorRange::arc(2, 6, 10), 1.0);

        assert!(!horizon.is_above(SectorRange::arc(3, 3, 10), 1.5));
        assert!(horizon.is_above(SectorRange::arc(5, 5, 10), 1.5));
    }

    #[test]
    fn buffer_value_equals_maximum_of_covering_contributions() {
        let sectors = 37;
        let mut rng = StdRng::seed_from_u64(42);
        let mut horizon = HorizonBuffer::new(sectors);
        let mut expected = vec![f32::NEG_INFINITY; sectors];

        for _ in 0..200 {
            let a = rng.random_range(0..sectors);
            let b = rng.random_range(0..sectors);
            let elevation = rng.random_range(-5.0..5.0);
            let range = SectorRange::arc(a, b, sectors);

            horizon.heighten(range, elevation);
            for sector in range.indices(sectors) {
                expected[sector] = expected[sector].max(elevation);
            }
        }

        for (sector, &value) in expected.iter().enumerate() {
            let range = SectorRange::arc(sector, sector, sectors);
            assert!(!horizon.is_above(range, value));
            assert!(horizon.is_above(range, value + 1e-3));
        }
    }

    #[test]
    fn reset_clears_every_sector() {
        let mut horizon = HorizonBuffer::new(8);
        horizon.heighten(SectorRange::full(8), 10.0);
        horizon.reset();

        assert!(horizon.is_above(SectorRange::full(8), -100.0));
    }
}
