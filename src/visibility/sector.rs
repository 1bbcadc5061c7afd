use bevy::prelude::*;

/// Resolution of the quantized cosine used to map directions onto horizon
/// sectors without a transcendental call per query.
const COSINE_STEPS: usize = 1024;

/// Horizontal distances below this are treated as this value wherever they
/// end up as a divisor.
pub(crate) const MIN_HORIZONTAL_DISTANCE: f32 = 1e-3;

/// Maps horizontal directions around the view position onto horizon sectors.
///
/// Sector `i` covers the angular span `[i, i + 1) * 360° / N` measured from
/// the +x axis towards +z. The table stores the sector for the upper half
/// circle per quantized cosine; the lower half mirrors it. Directions landing
/// exactly on a sector boundary may bucket to either adjacent sector, which
/// the inclusive ranges of the horizon buffer absorb.
pub(crate) struct SectorTable {
    sectors: usize,
    table: Box<[u32]>,
}

impl SectorTable {
    pub(crate) fn new(sectors: usize) -> Self {
        debug_assert!(sectors > 0, "sector table needs at least one sector");

        let table = (0..=COSINE_STEPS)
            .map(|step| {
                let cosine = step as f32 / COSINE_STEPS as f32 * 2.0 - 1.0;
                let angle = cosine.clamp(-1.0, 1.0).acos();
                let sector = (angle / std::f32::consts::TAU * sectors as f32) as u32;
                sector.min(sectors as u32 - 1)
            })
            .collect();

        Self { sectors, table }
    }

    pub(crate) fn sectors(&self) -> usize {
        self.sectors
    }

    /// The sector containing the horizontal direction `direction` (x/z plane).
    pub(crate) fn sector(&self, direction: Vec2) -> usize {
        let length = direction.length().max(MIN_HORIZONTAL_DISTANCE);
        let cosine = (direction.x / length).clamp(-1.0, 1.0);
        let step = ((cosine + 1.0) * 0.5 * COSINE_STEPS as f32).round() as usize;
        let upper = self.table[step] as usize;

        if direction.y >= 0.0 {
            upper
        } else {
            self.sectors - 1 - upper
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_directions_land_in_their_quarters() {
        let table = SectorTable::new(100);

        assert_eq!(table.sector(Vec2::new(1.0, 0.001)), 0);
        assert!((24..=26).contains(&table.sector(Vec2::new(0.0, 1.0))));
        assert!((47..=50).contains(&table.sector(Vec2::new(-1.0, 0.1))));
        assert!((73..=76).contains(&table.sector(Vec2::new(0.0, -1.0))));
        assert_eq!(table.sector(Vec2::new(1.0, -0.001)), 99);
    }

    #[test]
    fn sectors_advance_monotonically_around_the_circle() {
        let sectors = 64;
        let table = SectorTable::new(sectors);

        let mut previous = table.sector(Vec2::new(1.0, 0.01));
        for step in 1..256 {
            let angle = step as f32 / 256.0 * std::f32::consts::TAU;
            let sector = table.sector(Vec2::new(angle.cos(), angle.sin()));

            // Wrapping forward distance stays small, the sector never jumps
            // backwards by more than the boundary slop.
            let forward = (sector + sectors - previous) % sectors;
            assert!(
                forward <= 3 || forward >= sectors - 1,
                "sector jumped from {previous} to {sector}"
            );
            previous = sector;
        }
    }

    #[test]
    fn opposite_directions_are_half_a_circle_apart() {
        let table = SectorTable::new(100);
        let direction = Vec2::new(0.6, 0.8);

        let a = table.sector(direction);
        let b = table.sector(-direction);
        let distance = (b + 100 - a) % 100;

        assert!((49..=51).contains(&distance), "distance was {distance}");
    }
}
