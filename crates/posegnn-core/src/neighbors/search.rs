//! Image enumeration for one structure.
//!
//! Atoms are first wrapped into the cell, remembering the integer lattice
//! offset each one was moved by. Every translation that can bring a wrapped
//! pair within the cutoff is then enumerated explicitly and checked against
//! the exact distance. For direction `k` the bound is
//! `n_k = ceil(cutoff / w_k + span_k)`, where `w_k` is the perpendicular width
//! of the cell and `span_k < 1` the spread of the wrapped fractional
//! coordinates, so the image count depends on the cutoff only. Reported shifts
//! include the wrap offsets and therefore refer to the caller's positions.
use super::cell::LatticeCell;
use itertools::iproduct;
use nalgebra::Vector3;
use tracing::warn;

/// Edge between two atoms of the same structure, in structure-local indices.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImageEdge {
    pub source: usize,
    pub target: usize,
    pub shift: [i32; 3],
    pub distance: f64,
}

/// Positions moved into the cell, with the lattice offset removed from each.
pub(crate) fn wrap(
    cell: &LatticeCell,
    positions: &[Vector3<f64>],
) -> (Vec<Vector3<f64>>, Vec<[i32; 3]>) {
    positions
        .iter()
        .map(|p| {
            let f = cell.to_fractional(p);
            let offset = [f[0].floor() as i32, f[1].floor() as i32, f[2].floor() as i32];
            (p - cell.translation(offset), offset)
        })
        .unzip()
}

pub(crate) fn image_bounds(cell: &LatticeCell, positions: &[Vector3<f64>], cutoff: f64) -> [i32; 3] {
    let mut lo = Vector3::repeat(f64::INFINITY);
    let mut hi = Vector3::repeat(f64::NEG_INFINITY);
    for p in positions {
        let f = cell.to_fractional(p);
        lo = lo.inf(&f);
        hi = hi.sup(&f);
    }
    let span = if positions.is_empty() {
        Vector3::zeros()
    } else {
        hi - lo
    };
    let widths = cell.perpendicular_widths();
    let mut bounds = [0i32; 3];
    for k in 0..3 {
        bounds[k] = (cutoff / widths[k] + span[k]).ceil() as i32;
    }
    bounds
}

/// Lattice translations to visit, in lexicographic order, with their
/// Cartesian offsets. A null cell only has the zero translation.
pub(crate) fn translations(
    cell: Option<&LatticeCell>,
    positions: &[Vector3<f64>],
    cutoff: f64,
) -> Vec<([i32; 3], Vector3<f64>)> {
    let Some(cell) = cell else {
        return vec![([0, 0, 0], Vector3::zeros())];
    };
    let [na, nb, nc] = image_bounds(cell, positions, cutoff);
    iproduct!(-na..=na, -nb..=nb, -nc..=nc)
        .map(|(a, b, c)| {
            let shift = [a, b, c];
            (shift, cell.translation(shift))
        })
        .collect()
}

/// All directed edges of one structure with `0 < distance <= cutoff`.
///
/// Ordered by source, then target, then translation.
pub(crate) fn search_structure(
    positions: &[Vector3<f64>],
    cell: Option<&LatticeCell>,
    cutoff: f64,
) -> Vec<ImageEdge> {
    let (wrapped, offsets) = match cell {
        Some(cell) => wrap(cell, positions),
        None => (positions.to_vec(), vec![[0; 3]; positions.len()]),
    };
    let images = translations(cell, &wrapped, cutoff);
    let cutoff_sq = cutoff * cutoff;
    let mut edges = Vec::new();

    for (source, p_i) in wrapped.iter().enumerate() {
        for (target, p_j) in wrapped.iter().enumerate() {
            let base = p_j - p_i;
            for (image, offset) in &images {
                let is_origin = *image == [0, 0, 0];
                if source == target && is_origin {
                    continue;
                }
                let distance_sq = (base + offset).norm_squared();
                if distance_sq > cutoff_sq {
                    continue;
                }
                // p_j + T(shift) - p_i with the caller's unwrapped positions
                let shift: [i32; 3] =
                    std::array::from_fn(|k| image[k] + offsets[source][k] - offsets[target][k]);
                if distance_sq == 0.0 {
                    warn!(source, target, ?shift, "skipping coincident atom pair");
                    continue;
                }
                edges.push(ImageEdge {
                    source,
                    target,
                    shift,
                    distance: distance_sq.sqrt(),
                });
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(side: f64) -> LatticeCell {
        let rows = vec![vec![side, 0.0, 0.0], vec![0.0, side, 0.0], vec![0.0, 0.0, side]];
        LatticeCell::new(&rows, 0).unwrap()
    }

    #[test]
    fn test_bounds_grow_with_unwrapped_atoms() {
        let cell = cube(5.0);
        let wrapped = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(4.9, 0.0, 0.0)];
        assert_eq!(image_bounds(&cell, &wrapped, 1.0), [2, 1, 1]);

        let unwrapped = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(14.9, 0.0, 0.0)];
        assert_eq!(image_bounds(&cell, &unwrapped, 1.0), [4, 1, 1]);
    }

    #[test]
    fn test_wrap_records_lattice_offsets() {
        let cell = cube(5.0);
        let (wrapped, offsets) = wrap(&cell, &[Vector3::new(-0.5, 12.0, 4.0)]);
        assert_eq!(offsets, vec![[-1, 2, 0]]);
        assert!((wrapped[0] - Vector3::new(4.5, 2.0, 4.0)).norm() < 1e-12);
    }

    #[test]
    fn test_far_out_atom_keeps_image_count_bounded() {
        let cell = cube(5.0);
        let positions = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(4.9 + 5.0 * 300.0, 0.0, -5.0 * 40.0),
        ];
        let (wrapped, offsets) = wrap(&cell, &positions);
        assert_eq!(offsets[1], [300, 0, -40]);
        assert!(translations(Some(&cell), &wrapped, 1.0).len() <= 5 * 3 * 3);

        // same edges as the wrapped pair, shifts relative to the raw positions
        let edges = search_structure(&positions, Some(&cell), 1.0);
        assert_eq!(edges.len(), 2);
        assert_eq!((edges[0].source, edges[0].target, edges[0].shift), (0, 1, [-301, 0, 40]));
        assert_eq!((edges[1].source, edges[1].target, edges[1].shift), (1, 0, [301, 0, -40]));
        for e in &edges {
            assert!((e.distance - 0.1).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_atom_sees_its_images() {
        // nearest images of a lone atom in a cube of side 2 lie on the 6 faces
        let cell = cube(2.0);
        let edges = search_structure(&[Vector3::new(0.3, 0.7, 1.1)], Some(&cell), 2.5);
        assert_eq!(edges.len(), 6);
        for e in &edges {
            assert_eq!((e.source, e.target), (0, 0));
            assert!((e.distance - 2.0).abs() < 1e-12);
            assert_eq!(e.shift.iter().map(|s| s.abs()).sum::<i32>(), 1);
        }
    }

    #[test]
    fn test_molecule_has_no_images() {
        let positions = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0), Vector3::new(5.0, 0.0, 0.0)];
        let edges = search_structure(&positions, None, 2.0);
        let pairs: Vec<_> = edges.iter().map(|e| (e.source, e.target)).collect();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
        assert!(edges.iter().all(|e| e.shift == [0, 0, 0]));
    }

    #[test]
    fn test_coincident_atoms_are_skipped() {
        let positions = [Vector3::new(1.0, 1.0, 1.0), Vector3::new(1.0, 1.0, 1.0)];
        assert!(search_structure(&positions, None, 2.0).is_empty());
    }
}
