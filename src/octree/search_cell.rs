use std::cmp::Ordering;

use nalgebra::Vector3;
use ordered_float::OrderedFloat;
use smallvec::SmallVec;

use crate::constants::Kilometer;

use super::SearchRegion;

/// A queued sub-volume of the search: center, half extents, the misfit at the center and a
/// lower bound of the misfit anywhere inside the cell.
///
/// Cells are plain values owned by the priority queue of a single search; subdividing a
/// cell produces eight new values and never links back to the parent.
#[derive(Debug, Clone)]
pub struct SearchCell {
    pub center: Vector3<f64>,
    pub half_extent: Vector3<f64>,
    pub misfit: f64,
    /// No point of the cell has a misfit below this value
    pub bound: f64,
    // insertion rank, used to keep equal keys in a deterministic order
    pub(crate) rank: u64,
}

impl SearchCell {
    pub fn from_region(region: &SearchRegion, misfit: f64, bound: f64, rank: u64) -> Self {
        SearchCell {
            center: region.center,
            half_extent: region.half_extent,
            misfit,
            bound,
            rank,
        }
    }

    /// Distance from the center to any corner.
    pub fn half_diagonal(&self) -> Kilometer {
        self.half_extent.norm()
    }

    /// Largest full extent over the three dimensions.
    pub fn size(&self) -> Kilometer {
        2.0 * self.half_extent.max()
    }

    /// Centers and half extent of the children.
    ///
    /// Every axis at least half as long as the longest one is halved, so a flat cell first
    /// splits horizontally into four until its extents are comparable, then into eight.
    /// Misfits are left to the caller.
    pub fn child_centers(&self) -> (SmallVec<[Vector3<f64>; 8]>, Vector3<f64>) {
        let longest = self.half_extent.max();
        let split = self.half_extent.map(|h| h >= 0.5 * longest);
        let child_half = Vector3::from_fn(|i, _| {
            if split[i] {
                0.5 * self.half_extent[i]
            } else {
                self.half_extent[i]
            }
        });

        let signs = |axis: usize| -> &'static [f64] {
            if split[axis] {
                &[-1.0, 1.0]
            } else {
                &[0.0]
            }
        };
        let mut centers = SmallVec::new();
        for &sx in signs(0) {
            for &sy in signs(1) {
                for &sz in signs(2) {
                    centers.push(
                        self.center
                            + Vector3::new(sx * child_half.x, sy * child_half.y, sz * child_half.z),
                    );
                }
            }
        }
        (centers, child_half)
    }
}

// The BinaryHeap is a max-heap: the cell with the *lowest* bound must compare greatest so
// that it is popped first. Equal bounds fall back to the center misfit, then insertion order.
impl Eq for SearchCell {}
impl PartialEq for SearchCell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Ord for SearchCell {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(other.bound)
            .cmp(&OrderedFloat(self.bound))
            .then_with(|| OrderedFloat(other.misfit).cmp(&OrderedFloat(self.misfit)))
            .then_with(|| other.rank.cmp(&self.rank))
    }
}
impl PartialOrd for SearchCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod search_cell_test {
    use super::*;
    use std::collections::BinaryHeap;

    fn cell(misfit: f64, rank: u64) -> SearchCell {
        SearchCell {
            center: Vector3::zeros(),
            half_extent: Vector3::new(4.0, 4.0, 2.0),
            misfit,
            bound: 0.0,
            rank,
        }
    }

    #[test]
    fn test_heap_pops_lowest_bound_before_misfit() {
        let mut heap = BinaryHeap::new();
        heap.push(SearchCell {
            bound: 0.5,
            ..cell(0.1, 0)
        });
        heap.push(cell(9.0, 1));
        heap.push(cell(2.0, 2));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|c| c.rank)).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_heap_pops_lowest_misfit_first() {
        let mut heap = BinaryHeap::new();
        heap.push(cell(3.0, 0));
        heap.push(cell(1.0, 1));
        heap.push(cell(f64::NAN, 2));
        heap.push(cell(1.0, 3));
        heap.push(cell(2.0, 4));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|c| c.rank)).collect();
        // NaN sorts above every number in OrderedFloat, so it comes out last
        assert_eq!(order, vec![1, 3, 4, 0, 2]);
    }

    #[test]
    fn test_children_tile_the_parent() {
        let parent = cell(0.0, 0);
        let (centers, half) = parent.child_centers();
        assert_eq!(centers.len(), 8);
        assert_eq!(half, Vector3::new(2.0, 2.0, 1.0));
        assert_eq!(parent.size(), 8.0);
        assert_eq!(parent.half_diagonal(), 6.0);

        let sum: Vector3<f64> = centers.iter().sum();
        assert_eq!(sum, Vector3::zeros());
        assert!(centers.contains(&Vector3::new(2.0, -2.0, 1.0)));
    }

    #[test]
    fn test_flat_cell_splits_horizontally() {
        let flat = SearchCell {
            half_extent: Vector3::new(500.0, 500.0, 50.0),
            center: Vector3::new(0.0, 0.0, 50.0),
            ..cell(0.0, 0)
        };
        let (centers, half) = flat.child_centers();
        assert_eq!(centers.len(), 4);
        assert_eq!(half, Vector3::new(250.0, 250.0, 50.0));
        assert!(centers.iter().all(|c| c.z == 50.0));
        assert!(centers.contains(&Vector3::new(-250.0, 250.0, 50.0)));

        // once the extents are comparable the split is back to eight children
        let cube = SearchCell {
            half_extent: Vector3::new(62.5, 62.5, 50.0),
            ..flat
        };
        assert_eq!(cube.child_centers().0.len(), 8);
    }
}
