//! Packed batches of independently sized structures.
//!
//! Atoms of every structure are concatenated into one `[n_atoms, 3]` position
//! tensor; `batch` maps each atom to its owning structure and `cell` holds one
//! `[3, 3]` lattice matrix (rows are lattice vectors) per structure. A
//! non-periodic structure carries the all-zero cell.
use crate::error::{PosEgnnError, Result};
use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

/// One molecule or periodic unit cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub positions: Vec<[f64; 3]>,
    pub atomic_numbers: Vec<u32>,
    #[serde(default)]
    pub cell: Option<[[f64; 3]; 3]>,
}

impl Structure {
    pub fn molecule(positions: Vec<[f64; 3]>, atomic_numbers: Vec<u32>) -> Self {
        Self {
            positions,
            atomic_numbers,
            cell: None,
        }
    }

    pub fn periodic(
        positions: Vec<[f64; 3]>,
        atomic_numbers: Vec<u32>,
        cell: [[f64; 3]; 3],
    ) -> Self {
        Self {
            positions,
            atomic_numbers,
            cell: Some(cell),
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.positions.len()
    }

    pub fn is_periodic(&self) -> bool {
        self.cell.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct StructureBatch {
    positions: Tensor,
    atomic_numbers: Tensor,
    cell: Tensor,
    batch: Tensor,
    structure_sizes: Vec<usize>,
}

impl StructureBatch {
    /// Wrap pre-built tensors, checking that they describe a consistent batch.
    ///
    /// `batch` need not be sorted, but every structure id in `0..cell.dim(0)`
    /// must own at least one atom.
    pub fn new(positions: Tensor, atomic_numbers: Tensor, cell: Tensor, batch: Tensor) -> Result<Self> {
        let (n_atoms, three) = positions
            .dims2()
            .map_err(|_| PosEgnnError::shape("positions", "[n_atoms, 3]", format!("{:?}", positions.dims())))?;
        if three != 3 {
            return Err(PosEgnnError::shape("positions", "[n_atoms, 3]", format!("{:?}", positions.dims())));
        }
        if atomic_numbers.dims() != [n_atoms] {
            return Err(PosEgnnError::shape(
                "atomic_numbers",
                format!("[{n_atoms}]"),
                format!("{:?}", atomic_numbers.dims()),
            ));
        }
        if batch.dims() != [n_atoms] {
            return Err(PosEgnnError::shape(
                "batch_index",
                format!("[{n_atoms}]"),
                format!("{:?}", batch.dims()),
            ));
        }
        let num_structures = match cell.dims() {
            [s, 3, 3] => *s,
            dims => return Err(PosEgnnError::shape("cell", "[n_structures, 3, 3]", format!("{dims:?}"))),
        };

        let atomic_numbers = atomic_numbers.to_dtype(DType::U32)?;
        let batch = batch.to_dtype(DType::U32)?;
        let mut structure_sizes = vec![0usize; num_structures];
        for id in batch.to_vec1::<u32>()? {
            let id = id as usize;
            if id >= num_structures {
                return Err(PosEgnnError::shape(
                    "batch_index",
                    format!("structure ids < {num_structures}"),
                    id,
                ));
            }
            structure_sizes[id] += 1;
        }
        if let Some(empty) = structure_sizes.iter().position(|&n| n == 0) {
            return Err(PosEgnnError::shape(
                "batch_index",
                "at least one atom per structure",
                format!("no atoms for structure {empty}"),
            ));
        }

        Ok(Self {
            positions,
            atomic_numbers,
            cell,
            batch,
            structure_sizes,
        })
    }

    /// Pack structures back to back. Tensors are created as f64; the model
    /// casts them to its own dtype.
    pub fn from_structures(structures: &[Structure], device: &Device) -> Result<Self> {
        let n_atoms: usize = structures.iter().map(Structure::num_atoms).sum();
        let mut positions = Vec::with_capacity(n_atoms * 3);
        let mut atomic_numbers = Vec::with_capacity(n_atoms);
        let mut batch = Vec::with_capacity(n_atoms);
        let mut cells = Vec::with_capacity(structures.len() * 9);

        for (idx, structure) in structures.iter().enumerate() {
            if structure.atomic_numbers.len() != structure.num_atoms() {
                return Err(PosEgnnError::shape(
                    "atomic_numbers",
                    structure.num_atoms(),
                    structure.atomic_numbers.len(),
                ));
            }
            positions.extend(structure.positions.iter().flatten().copied());
            atomic_numbers.extend_from_slice(&structure.atomic_numbers);
            batch.extend(std::iter::repeat(idx as u32).take(structure.num_atoms()));
            let cell = structure.cell.unwrap_or([[0.0; 3]; 3]);
            cells.extend(cell.iter().flatten().copied());
        }

        Self::new(
            Tensor::from_vec(positions, (n_atoms, 3), device)?,
            Tensor::from_vec(atomic_numbers, n_atoms, device)?,
            Tensor::from_vec(cells, (structures.len(), 3, 3), device)?,
            Tensor::from_vec(batch, n_atoms, device)?,
        )
    }

    pub fn positions(&self) -> &Tensor {
        &self.positions
    }

    pub fn atomic_numbers(&self) -> &Tensor {
        &self.atomic_numbers
    }

    pub fn cell(&self) -> &Tensor {
        &self.cell
    }

    pub fn batch(&self) -> &Tensor {
        &self.batch
    }

    pub fn num_atoms(&self) -> usize {
        self.structure_sizes.iter().sum()
    }

    pub fn num_structures(&self) -> usize {
        self.structure_sizes.len()
    }

    pub fn structure_sizes(&self) -> &[usize] {
        &self.structure_sizes
    }

    pub fn device(&self) -> &Device {
        self.positions.device()
    }
}
