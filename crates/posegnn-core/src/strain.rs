//! Differentiable symmetric strain.
//!
//! Every structure `s` gets a displacement `D_s`; positions and cell rows of that
//! structure are multiplied by `I + (D_s + D_sᵀ) / 2`. With `D = 0` the geometry
//! is untouched, but the energy computed downstream becomes a function of `D`,
//! so `dE/dD` is the virial. Fractional coordinates are invariant under the
//! transform because atoms and lattice vectors move together.
use crate::error::{PosEgnnError, Result};
use candle_core::{Tensor, Var};

/// Geometry after the strain transform, plus the displacement leaf it hangs off.
#[derive(Debug, Clone)]
pub struct StrainedGeometry {
    pub positions: Tensor,
    pub cell: Tensor,
    /// `[n_structures, 3, 3]`, zero-initialised
    pub displacement: Var,
}

/// Attach a zero displacement to every structure of the batch.
pub fn symmetric_displacement(
    positions: &Tensor,
    cell: &Tensor,
    num_structures: usize,
    batch: &Tensor,
) -> Result<StrainedGeometry> {
    let displacement = Var::zeros(
        (num_structures, 3, 3),
        positions.dtype(),
        positions.device(),
    )?;
    let (positions, cell) = apply_displacement(positions, cell, batch, displacement.as_tensor())?;
    Ok(StrainedGeometry {
        positions,
        cell,
        displacement,
    })
}

/// Apply an arbitrary per-structure displacement `[n_structures, 3, 3]`.
///
/// Only the symmetric part of `displacement` has an effect. All structures are
/// handled by one gather and one batched matmul.
pub fn apply_displacement(
    positions: &Tensor,
    cell: &Tensor,
    batch: &Tensor,
    displacement: &Tensor,
) -> Result<(Tensor, Tensor)> {
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
    if displacement.dims() != [num_structures, 3, 3] {
        return Err(PosEgnnError::shape(
            "displacement",
            format!("[{num_structures}, 3, 3]"),
            format!("{:?}", displacement.dims()),
        ));
    }

    let symmetric = ((displacement + displacement.transpose(1, 2)?)? * 0.5)?;
    let identity = Tensor::eye(3, displacement.dtype(), displacement.device())?;
    let transform = symmetric.broadcast_add(&identity)?;

    let per_atom = transform.index_select(batch, 0)?;
    let positions = positions
        .contiguous()?
        .unsqueeze(1)?
        .matmul(&per_atom)?
        .squeeze(1)?;
    let cell = cell.contiguous()?.matmul(&transform)?;
    Ok((positions, cell))
}
