//! Reference invariant encoder.
//!
//! Species embedding followed by continuous-filter convolutions over a Gaussian
//! radial basis with a cosine envelope. Each interaction block updates
//!
//! `h_i <- h_i + W_u · silu(Σ_{j→i} h_j ⊙ W_f · rbf(d_ij) · f_cut(d_ij))`
//!
//! The embedding and the output of every block form the residue stack, so a
//! network with `num_layers` blocks yields `num_layers + 1` residues.
use super::{EncoderOutput, GraphEncoder};
use crate::config::EncoderConfig;
use crate::error::{PosEgnnError, Result};
use candle_core::{DType, Module, Tensor};
use candle_nn::{embedding, linear, Embedding, Linear, VarBuilder};
use tracing::trace;

#[derive(Debug, Clone)]
struct GaussianSmearing {
    centers: Tensor,
    coeff: f64,
}

impl GaussianSmearing {
    fn new(cutoff: f64, num_rbf: usize, vb: &VarBuilder) -> Result<Self> {
        let spacing = if num_rbf > 1 {
            cutoff / (num_rbf - 1) as f64
        } else {
            cutoff
        };
        let centers = Tensor::arange(0u32, num_rbf as u32, vb.device())?
            .to_dtype(vb.dtype())?
            .affine(spacing, 0.0)?;
        Ok(Self {
            centers,
            coeff: -0.5 / (spacing * spacing),
        })
    }

    /// `[n_edges]` -> `[n_edges, num_rbf]`
    fn forward(&self, distances: &Tensor) -> Result<Tensor> {
        let diff = distances
            .unsqueeze(1)?
            .broadcast_sub(&self.centers.unsqueeze(0)?)?;
        Ok((diff.sqr()? * self.coeff)?.exp()?)
    }
}

fn cosine_cutoff(distances: &Tensor, cutoff: f64) -> Result<Tensor> {
    let scaled = (distances * (std::f64::consts::PI / cutoff))?;
    Ok(((scaled.cos()? + 1.0)? * 0.5)?)
}

#[derive(Debug, Clone)]
struct InteractionBlock {
    filter: Linear,
    update: Linear,
}

impl InteractionBlock {
    fn load(vb: VarBuilder, config: &EncoderConfig) -> Result<Self> {
        let filter = linear(config.num_rbf, config.hidden_channels, vb.pp("filter"))?;
        let update = linear(config.hidden_channels, config.hidden_channels, vb.pp("update"))?;
        Ok(Self { filter, update })
    }

    fn forward(&self, h: &Tensor, edges: Option<(&Tensor, &Tensor, &Tensor)>) -> Result<Tensor> {
        let aggregated = match edges {
            Some((sources, targets, basis)) => {
                let messages = (h.index_select(sources, 0)? * self.filter.forward(basis)?)?;
                h.zeros_like()?.index_add(targets, &messages, 0)?
            }
            None => h.zeros_like()?,
        };
        Ok((h + self.update.forward(&aggregated.silu()?)?)?)
    }
}

#[derive(Debug, Clone)]
pub struct RadialEncoder {
    embedding: Embedding,
    interactions: Vec<InteractionBlock>,
    smearing: GaussianSmearing,
    cutoff: f64,
    max_z: usize,
}

impl RadialEncoder {
    pub fn load(vb: VarBuilder, config: &EncoderConfig) -> Result<Self> {
        if !config.cutoff.is_finite() || config.cutoff <= 0.0 {
            return Err(PosEgnnError::InvalidCutoff(config.cutoff));
        }
        let embedding = embedding(config.max_z + 1, config.hidden_channels, vb.pp("embedding"))?;
        let interactions = (0..config.num_layers)
            .map(|i| InteractionBlock::load(vb.pp("interactions").pp(i), config))
            .collect::<Result<Vec<_>>>()?;
        let smearing = GaussianSmearing::new(config.cutoff, config.num_rbf, &vb)?;
        Ok(Self {
            embedding,
            interactions,
            smearing,
            cutoff: config.cutoff,
            max_z: config.max_z,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.interactions.len()
    }
}

impl GraphEncoder for RadialEncoder {
    fn encode(
        &self,
        atomic_numbers: &Tensor,
        _positions: &Tensor,
        edge_index: &Tensor,
        edge_distance: &Tensor,
        _edge_vector: &Tensor,
    ) -> Result<EncoderOutput> {
        let species = atomic_numbers.to_dtype(DType::U32)?;
        if let Some(&z) = species.to_vec1::<u32>()?.iter().max() {
            if z as usize > self.max_z {
                return Err(PosEgnnError::shape("atomic_numbers", format!("values <= {}", self.max_z), z));
            }
        }

        let mut h = self.embedding.forward(&species)?;
        let mut hidden_states = vec![h.clone()];

        let n_edges = edge_distance.dim(0)?;
        let edge_terms = if n_edges > 0 {
            let envelope = cosine_cutoff(edge_distance, self.cutoff)?;
            let basis = self
                .smearing
                .forward(edge_distance)?
                .broadcast_mul(&envelope.unsqueeze(1)?)?;
            Some((edge_index.get(0)?, edge_index.get(1)?, basis))
        } else {
            None
        };

        for (layer, block) in self.interactions.iter().enumerate() {
            h = block.forward(&h, edge_terms.as_ref().map(|(s, t, b)| (s, t, b)))?;
            trace!(layer, "interaction block done");
            hidden_states.push(h.clone());
        }
        EncoderOutput::from_hidden_states(hidden_states)
    }
}
