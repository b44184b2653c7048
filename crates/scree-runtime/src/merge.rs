use scree_instancing::Placement;

/// Combines a previous result with a regeneration of the octants in `mask`.
///
/// Previous placements in masked octants are replaced; fresh placements
/// outside the mask are ignored. The result is ordered by candidate index,
/// previous entries first on ties.
pub fn merge_octant_results(previous: &[Placement], fresh: &[Placement], mask: u8) -> Vec<Placement> {
    let in_mask = |p: &&Placement| mask & (1u8 << p.octant) != 0;
    let mut merged: Vec<Placement> = previous
        .iter()
        .filter(|p| !in_mask(p))
        .chain(fresh.iter().filter(in_mask))
        .copied()
        .collect();
    merged.sort_by_key(|p| p.candidate_index);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use scree_geom::{Basis, Vec3};

    fn at(octant: u8, index: u32, scale: f32) -> Placement {
        Placement {
            position: Vec3::ZERO,
            basis: Basis::IDENTITY,
            scale,
            octant,
            candidate_index: index,
        }
    }

    #[test]
    fn replaces_masked_octants_only() {
        let previous = vec![at(0, 0, 1.0), at(1, 1, 1.0), at(0, 2, 1.0), at(1, 3, 1.0)];
        let fresh = vec![at(1, 1, 2.0), at(0, 4, 2.0), at(1, 5, 2.0)];
        let merged = merge_octant_results(&previous, &fresh, 0b10);
        let summary: Vec<(u32, f32)> = merged.iter().map(|p| (p.candidate_index, p.scale)).collect();
        assert_eq!(summary, vec![(0, 1.0), (1, 2.0), (2, 1.0), (5, 2.0)]);
    }

    #[test]
    fn empty_mask_keeps_previous() {
        let previous = vec![at(3, 0, 1.0), at(7, 1, 1.0)];
        assert_eq!(merge_octant_results(&previous, &[at(3, 9, 5.0)], 0), previous);
    }
}
