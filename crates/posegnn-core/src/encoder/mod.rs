//! The message-passing encoder seam.
//!
//! Any equivariant or invariant network can sit behind [`GraphEncoder`]; the rest
//! of the pipeline only relies on the shapes of [`EncoderOutput`].
mod radial;

pub use radial::RadialEncoder;

use crate::error::{PosEgnnError, Result};
use candle_core::Tensor;

/// Encoder results for one batch, in the atom order of the input.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// `[n_atoms, channels, 1, residues]`: one feature block per residue
    pub embedding_0: Tensor,
    /// per-layer node states `[n_atoms, channels]`, first layer first
    pub hidden_states: Vec<Tensor>,
}

impl EncoderOutput {
    /// Stack per-layer states into the `[n_atoms, channels, 1, residues]` block.
    pub fn from_hidden_states(hidden_states: Vec<Tensor>) -> Result<Self> {
        if hidden_states.is_empty() {
            return Err(PosEgnnError::InvalidConfig(
                "encoder produced no hidden states".into(),
            ));
        }
        let embedding_0 = Tensor::stack(&hidden_states, 2)?.unsqueeze(2)?;
        Ok(Self {
            embedding_0,
            hidden_states,
        })
    }
}

pub trait GraphEncoder {
    /// - `atomic_numbers`: `[n_atoms]` u32
    /// - `positions`: `[n_atoms, 3]`
    /// - `edge_index`: `[2, n_edges]` u32 (sources, targets)
    /// - `edge_distance`: `[n_edges]`
    /// - `edge_vector`: `[n_edges, 3]`
    fn encode(
        &self,
        atomic_numbers: &Tensor,
        positions: &Tensor,
        edge_index: &Tensor,
        edge_distance: &Tensor,
        edge_vector: &Tensor,
    ) -> Result<EncoderOutput>;
}
