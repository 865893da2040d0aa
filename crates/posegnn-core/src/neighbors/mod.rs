//! Batched periodic neighbor lists.
//!
//! Pairs are only ever formed inside a structure, so the cost is the sum of
//! per-structure costs rather than quadratic in the batch size. Structures are
//! searched in parallel; the result does not depend on scheduling because each
//! structure's edges are collected in structure order and shift indices are
//! assigned afterwards on a single thread.
pub(crate) mod cell;
mod search;

use crate::error::{PosEgnnError, Result};
use candle_core::{DType, Device, Tensor};
use cell::LatticeCell;
use nalgebra::Vector3;
use rayon::prelude::*;
use search::{search_structure, ImageEdge};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// One directed edge, in global atom indices.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicEdge {
    pub source: usize,
    pub target: usize,
    pub structure: usize,
    /// integer lattice translation applied to the target
    pub shift: [i32; 3],
    /// position of `shift` in [`EdgeList::translations`]
    pub shift_index: u32,
    /// `edge_distance` of this edge, read back from the positions' dtype
    pub distance: f64,
}

/// Cutoff-limited edges of a whole batch.
///
/// `edge_vector = pos[target] + shift · cell[structure] - pos[source]`, computed
/// with tensor ops so it stays differentiable w.r.t. positions and cell.
#[derive(Debug, Clone)]
pub struct EdgeList {
    /// `[2, n_edges]` u32, row 0 holds sources, row 1 targets
    pub edge_index: Tensor,
    /// `[n_edges]`
    pub edge_distance: Tensor,
    /// `[n_edges, 3]`
    pub edge_vector: Tensor,
    /// `[n_edges, 3]` integer translations, in the positions' dtype
    pub shifts: Tensor,
    /// `[n_edges]` u32 index into `translations`
    pub shift_index: Tensor,
    /// distinct translations; entry 0 is always the zero translation
    pub translations: Vec<[i32; 3]>,
    pub edges: Vec<PeriodicEdge>,
}

impl EdgeList {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Neighbor builder with a fixed cutoff radius.
#[derive(Debug, Clone, Copy)]
pub struct BatchedPeriodicDistance {
    cutoff: f64,
}

impl BatchedPeriodicDistance {
    pub fn new(cutoff: f64) -> Result<Self> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(PosEgnnError::InvalidCutoff(cutoff));
        }
        Ok(Self { cutoff })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Build the edge list for `positions [n_atoms, 3]`, `cell [n_structures, 3, 3]`
    /// and `batch [n_atoms]`.
    #[instrument(level = "debug", skip_all, fields(cutoff = self.cutoff))]
    pub fn forward(&self, positions: &Tensor, cell: &Tensor, batch: &Tensor) -> Result<EdgeList> {
        let (n_atoms, three) = positions.dims2()?;
        if three != 3 {
            return Err(PosEgnnError::shape("positions", "[n_atoms, 3]", format!("{:?}", positions.dims())));
        }
        if batch.dims() != [n_atoms] {
            return Err(PosEgnnError::shape("batch_index", format!("[{n_atoms}]"), format!("{:?}", batch.dims())));
        }
        let num_structures = match cell.dims() {
            [s, 3, 3] => *s,
            dims => return Err(PosEgnnError::shape("cell", "[n_structures, 3, 3]", format!("{dims:?}"))),
        };

        let host_positions: Vec<Vector3<f64>> = positions
            .to_dtype(DType::F64)?
            .to_vec2::<f64>()?
            .into_iter()
            .map(|p| Vector3::new(p[0], p[1], p[2]))
            .collect();
        if let Some(atom) = host_positions.iter().position(|p| !p.iter().all(|v| v.is_finite())) {
            return Err(PosEgnnError::NonFinitePosition { atom });
        }
        let host_cells = cell.to_dtype(DType::F64)?.to_vec3::<f64>()?;

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); num_structures];
        for (atom, id) in batch.to_dtype(DType::U32)?.to_vec1::<u32>()?.into_iter().enumerate() {
            let id = id as usize;
            if id >= num_structures {
                return Err(PosEgnnError::shape("batch_index", format!("structure ids < {num_structures}"), id));
            }
            members[id].push(atom);
        }

        let cutoff = self.cutoff;
        let per_structure: Vec<Result<Vec<ImageEdge>>> = members
            .par_iter()
            .enumerate()
            .map(|(structure, atoms)| {
                let lattice = if LatticeCell::is_null(&host_cells[structure]) {
                    None
                } else {
                    Some(LatticeCell::new(&host_cells[structure], structure)?)
                };
                let local: Vec<Vector3<f64>> = atoms.iter().map(|&a| host_positions[a]).collect();
                Ok(search_structure(&local, lattice.as_ref(), cutoff))
            })
            .collect();

        let mut candidates = Vec::new();
        for (structure, result) in per_structure.into_iter().enumerate() {
            let atoms = &members[structure];
            candidates.extend(result?.into_iter().map(|edge| PeriodicEdge {
                source: atoms[edge.source],
                target: atoms[edge.target],
                structure,
                shift: edge.shift,
                shift_index: 0,
                distance: edge.distance,
            }));
        }

        edge_list(positions, cell, candidates, cutoff)
    }
}

fn empty_edge_list(dtype: DType, device: &Device) -> Result<EdgeList> {
    Ok(EdgeList {
        edge_index: Tensor::zeros((2, 0), DType::U32, device)?,
        edge_distance: Tensor::zeros(0, dtype, device)?,
        edge_vector: Tensor::zeros((0, 3), dtype, device)?,
        shifts: Tensor::zeros((0, 3), dtype, device)?,
        shift_index: Tensor::zeros(0, DType::U32, device)?,
        translations: vec![[0, 0, 0]],
        edges: Vec::new(),
    })
}

/// Edge tensors for the host candidates.
///
/// Candidates are kept only if their distance in the positions' dtype lies in
/// `(0, cutoff]`; shift indices and `PeriodicEdge::distance` are taken from
/// the kept edges.
fn edge_list(
    positions: &Tensor,
    cell: &Tensor,
    candidates: Vec<PeriodicEdge>,
    cutoff: f64,
) -> Result<EdgeList> {
    let device = positions.device();
    let dtype = positions.dtype();
    let n_candidates = candidates.len();
    if candidates.is_empty() {
        return empty_edge_list(dtype, device);
    }

    let sources: Vec<u32> = candidates.iter().map(|e| e.source as u32).collect();
    let targets: Vec<u32> = candidates.iter().map(|e| e.target as u32).collect();
    let structures: Vec<u32> = candidates.iter().map(|e| e.structure as u32).collect();
    let shifts: Vec<f64> = candidates
        .iter()
        .flat_map(|e| e.shift.map(|s| s as f64))
        .collect();

    let src = Tensor::from_vec(sources, n_candidates, device)?;
    let tgt = Tensor::from_vec(targets, n_candidates, device)?;
    let structures = Tensor::from_vec(structures, n_candidates, device)?;
    let mut shifts = Tensor::from_vec(shifts, (n_candidates, 3), device)?.to_dtype(dtype)?;

    let offsets = shifts
        .unsqueeze(1)?
        .matmul(&cell.contiguous()?.index_select(&structures, 0)?)?
        .squeeze(1)?;
    let mut edge_vector = ((positions.index_select(&tgt, 0)? - positions.index_select(&src, 0)?)? + offsets)?;
    let mut edge_distance = edge_vector.sqr()?.sum(1)?.sqrt()?;

    let distances = edge_distance.to_dtype(DType::F64)?.to_vec1::<f64>()?;
    let mut translations: Vec<[i32; 3]> = vec![[0, 0, 0]];
    let mut lookup: HashMap<[i32; 3], u32> = HashMap::from([([0, 0, 0], 0)]);
    let mut kept = Vec::with_capacity(n_candidates);
    let mut edges = Vec::with_capacity(n_candidates);
    for (i, (mut edge, distance)) in candidates.into_iter().zip(distances).enumerate() {
        if !(distance > 0.0 && distance <= cutoff) {
            continue;
        }
        edge.shift_index = *lookup.entry(edge.shift).or_insert_with(|| {
            translations.push(edge.shift);
            (translations.len() - 1) as u32
        });
        edge.distance = distance;
        kept.push(i as u32);
        edges.push(edge);
    }

    let n_edges = edges.len();
    if n_edges < n_candidates {
        debug!(
            dropped = n_candidates - n_edges,
            ?dtype,
            "dropping candidates outside the cutoff after rounding"
        );
        if edges.is_empty() {
            return empty_edge_list(dtype, device);
        }
        let kept = Tensor::from_vec(kept, n_edges, device)?;
        edge_vector = edge_vector.index_select(&kept, 0)?;
        edge_distance = edge_distance.index_select(&kept, 0)?;
        shifts = shifts.index_select(&kept, 0)?;
    }
    debug!(
        num_edges = n_edges,
        num_translations = translations.len(),
        "built neighbor list"
    );

    let mut index: Vec<u32> = edges.iter().map(|e| e.source as u32).collect();
    index.extend(edges.iter().map(|e| e.target as u32));
    let shift_index: Vec<u32> = edges.iter().map(|e| e.shift_index).collect();
    Ok(EdgeList {
        edge_index: Tensor::from_vec(index, (2, n_edges), device)?,
        edge_distance,
        edge_vector,
        shifts,
        shift_index: Tensor::from_vec(shift_index, n_edges, device)?,
        translations,
        edges,
    })
}
