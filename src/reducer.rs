use nalgebra::DMatrix;
use tracing::{info, warn};

use crate::{assembler::GlobalSystem, datatypes::Mesh};

/// Records which original mesh vertices survive the elimination of fixed
/// nodes, in their original relative order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMap {
    original_len: usize,
    /// `kept[r]` is the original index of reduced row `r`
    kept: Vec<usize>,
}

impl IndexMap {
    /// Builds the map from the set of eliminated original indices
    ///
    /// # Arguments
    /// * `original_len` - The size of the unreduced system
    /// * `removed` - Original indices that were eliminated, in any order
    pub fn from_removed(original_len: usize, removed: &[usize]) -> IndexMap {
        let mut eliminated = vec![false; original_len];
        for &i in removed {
            if i < original_len {
                eliminated[i] = true;
            }
        }
        let kept = (0..original_len).filter(|&i| !eliminated[i]).collect();
        IndexMap { original_len, kept }
    }

    pub fn original_len(&self) -> usize {
        self.original_len
    }

    pub fn reduced_len(&self) -> usize {
        self.kept.len()
    }

    pub fn kept(&self) -> &[usize] {
        &self.kept
    }

    /// Original index of a reduced row
    pub fn original(&self, reduced: usize) -> Option<usize> {
        self.kept.get(reduced).copied()
    }

    pub fn is_eliminated(&self, original: usize) -> bool {
        self.kept.binary_search(&original).is_err()
    }

    /// Scatters a reduced vector back to the original size
    ///
    /// # Arguments
    /// * `reduced` - A vector of length `reduced_len()`
    /// * `fill` - The value written at every eliminated index
    ///
    /// # Returns
    /// A vector of length `original_len()`
    pub fn expand(&self, reduced: &[f64], fill: f64) -> Vec<f64> {
        let mut expanded = Vec::with_capacity(self.original_len);
        let mut cursor = 0;
        let mut next_kept = self.kept.iter().peekable();

        for i in 0..self.original_len {
            if next_kept.peek() == Some(&&i) {
                next_kept.next();
                expanded.push(reduced[cursor]);
                cursor += 1;
            } else {
                expanded.push(fill);
            }
        }

        expanded
    }
}

/// Stiffness and mass matrices with the fixed degrees of freedom removed
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedSystem {
    pub stiffness: DMatrix<f64>,
    pub mass: DMatrix<f64>,
    pub index_map: IndexMap,
}

impl ReducedSystem {
    pub fn size(&self) -> usize {
        self.stiffness.nrows()
    }
}

/// Deletes row and column `i` of a square matrix, shifting everything past
/// `i` up and left by one
pub fn remove_row_col(matrix: DMatrix<f64>, i: usize) -> DMatrix<f64> {
    matrix.remove_row(i).remove_column(i)
}

/// Copies the rows and columns that are not in `removed` into a new matrix.
/// Only the set of removed indices matters, not its order.
pub fn compact(matrix: &DMatrix<f64>, removed: &[usize]) -> (DMatrix<f64>, IndexMap) {
    let index_map = IndexMap::from_removed(matrix.nrows(), removed);
    let kept = index_map.kept();
    let n = kept.len();

    let compacted = DMatrix::from_fn(n, n, |row, col| matrix[(kept[row], kept[col])]);
    (compacted, index_map)
}

/// Eliminates every fixed mesh vertex from the global system, along with
/// vertices that belong to no element
///
/// # Arguments
/// * `system` - The assembled global system, consumed
/// * `mesh` - The mesh the system was assembled from
///
/// # Returns
/// The reduced system along with the reduced to original index map
pub fn reduce(system: GlobalSystem, mesh: &Mesh) -> ReducedSystem {
    let n = system.size();
    let mut stiffness = system.stiffness;
    let mut mass = system.mass;
    let mut removed: Vec<usize> = mesh
        .vertices
        .iter()
        .filter(|v| v.is_fixed() && v.index < n)
        .map(|v| v.index)
        .collect();
    let num_fixed = removed.len();

    // a vertex outside every element has an empty mass row
    let isolated: Vec<usize> = (0..n)
        .filter(|&i| mass[(i, i)] == 0.0 && !removed.contains(&i))
        .collect();
    if !isolated.is_empty() {
        warn!("eliminating {} nodes that belong to no element", isolated.len());
        removed.extend(isolated);
    }

    // highest first so the indices still to visit stay valid
    removed.sort_unstable_by(|a, b| b.cmp(a));
    removed.dedup();
    for &i in &removed {
        stiffness = remove_row_col(stiffness, i);
        mass = remove_row_col(mass, i);
    }

    let index_map = IndexMap::from_removed(n, &removed);
    info!(
        "eliminated {} fixed nodes, reduced system is {} x {}",
        num_fixed,
        index_map.reduced_len(),
        index_map.reduced_len()
    );

    ReducedSystem {
        stiffness,
        mass,
        index_map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{
        ElementOrder, MeshVertex, Vertex, BOUNDARY_MARKER, FIXED_MARKER, INTERIOR_MARKER,
    };

    /// Symmetric matrix whose entries encode their position
    fn labelled(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| (10 * i.min(j) + i.max(j)) as f64)
    }

    fn mesh_with_markers(markers: &[i32]) -> Mesh {
        Mesh {
            vertices: markers
                .iter()
                .enumerate()
                .map(|(index, &boundary_marker)| MeshVertex {
                    index,
                    position: Vertex::new(index as f64, 0.0),
                    boundary_marker,
                })
                .collect(),
            elements: Vec::new(),
            order: ElementOrder::Linear,
            source_index_base: 0,
        }
    }

    #[test]
    fn remove_row_col_shifts_later_entries() {
        let reduced = remove_row_col(labelled(4), 1);
        assert_eq!(reduced.nrows(), 3);
        assert_eq!(reduced[(0, 0)], 0.0);
        assert_eq!(reduced[(0, 1)], 2.0);
        assert_eq!(reduced[(1, 2)], 23.0);
        assert_eq!(reduced[(2, 2)], 33.0);
    }

    #[test]
    fn compaction_ignores_removal_order() {
        let matrix = labelled(6);
        let (a, map_a) = compact(&matrix, &[4, 1, 2]);
        let (b, map_b) = compact(&matrix, &[1, 2, 4]);
        assert_eq!(a, b);
        assert_eq!(map_a, map_b);
        assert_eq!(map_a.kept(), &[0, 3, 5]);
    }

    #[test]
    fn reduce_matches_compaction() {
        let markers = [
            FIXED_MARKER,
            BOUNDARY_MARKER,
            INTERIOR_MARKER,
            FIXED_MARKER,
            BOUNDARY_MARKER,
            FIXED_MARKER,
            INTERIOR_MARKER,
        ];
        let mesh = mesh_with_markers(&markers);
        let system = GlobalSystem {
            stiffness: labelled(7),
            mass: labelled(7) * 2.0,
            area: 0.0,
        };

        let (expected_stiffness, expected_map) = compact(&system.stiffness, &[0, 3, 5]);
        let (expected_mass, _) = compact(&system.mass, &[5, 0, 3]);

        let reduced = reduce(system, &mesh);
        assert_eq!(reduced.stiffness, expected_stiffness);
        assert_eq!(reduced.mass, expected_mass);
        assert_eq!(reduced.index_map, expected_map);
        assert_eq!(reduced.index_map.kept(), &[1, 2, 4, 6]);
        assert_eq!(reduced.size(), 7 - mesh.num_fixed());
    }

    #[test]
    fn reduce_keeps_symmetry() {
        let mesh = mesh_with_markers(&[BOUNDARY_MARKER, FIXED_MARKER, BOUNDARY_MARKER]);
        let system = GlobalSystem {
            stiffness: labelled(3),
            mass: DMatrix::identity(3, 3),
            area: 1.0,
        };
        let reduced = reduce(system, &mesh);
        assert_eq!(reduced.stiffness, reduced.stiffness.transpose());
        assert_eq!(reduced.mass, DMatrix::identity(2, 2));
    }

    #[test]
    fn isolated_nodes_are_eliminated() {
        let mesh = mesh_with_markers(&[BOUNDARY_MARKER, BOUNDARY_MARKER, FIXED_MARKER]);
        let mut mass = DMatrix::identity(3, 3);
        mass[(1, 1)] = 0.0;
        let system = GlobalSystem {
            stiffness: DMatrix::identity(3, 3),
            mass,
            area: 1.0,
        };

        let reduced = reduce(system, &mesh);
        assert_eq!(reduced.size(), 1);
        assert_eq!(reduced.index_map.kept(), &[0]);
    }

    #[test]
    fn expansion_fills_eliminated_indices() {
        let map = IndexMap::from_removed(6, &[0, 3, 4]);
        let expanded = map.expand(&[7.0, 8.0, 9.0], -1.0);
        assert_eq!(expanded, vec![-1.0, 7.0, 8.0, -1.0, -1.0, 9.0]);

        assert!(map.is_eliminated(3));
        assert!(!map.is_eliminated(5));
        assert_eq!(map.original(1), Some(2));
        assert_eq!(map.original(3), None);
    }

    #[test]
    fn nothing_fixed_is_identity() {
        let map = IndexMap::from_removed(3, &[]);
        assert_eq!(map.expand(&[1.0, 2.0, 3.0], 0.0), vec![1.0, 2.0, 3.0]);
        assert_eq!(map.reduced_len(), map.original_len());
    }
}
