//! Multi-head residue readout.
//!
//! The encoder emits `num_residues` feature blocks per atom. All but the last
//! block go through their own linear projection; the last block goes through a
//! small MLP. The projections are summed per atom.
use crate::activation::Activation;
use crate::config::ReadoutConfig;
use crate::error::{PosEgnnError, Result};
use candle_core::{IndexOp, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

/// `in -> hidden -> activation -> out`
#[derive(Debug, Clone)]
struct NonLinearHead {
    in_proj: Linear,
    activation: Activation,
    out_proj: Linear,
}

impl Module for NonLinearHead {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.in_proj.forward(x)?;
        let x = self.activation.forward(&x)?;
        self.out_proj.forward(&x)
    }
}

#[derive(Debug, Clone)]
pub struct NodeInvariantReadout {
    linears: Vec<Linear>,
    non_linear: NonLinearHead,
    in_channels: usize,
    num_residues: usize,
}

impl NodeInvariantReadout {
    /// Parameters are read from `linears.{i}` and `non_linear.{0,2}`, matching
    /// the layout of the PyTorch checkpoints.
    pub fn load(vb: VarBuilder, config: &ReadoutConfig) -> Result<Self> {
        config.validate()?;
        let activation = config.activation()?;
        let linears = (0..config.num_residues - 1)
            .map(|i| linear(config.in_channels, config.out_channels, vb.pp("linears").pp(i)))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let non_linear = NonLinearHead {
            in_proj: linear(config.in_channels, config.hidden_channels, vb.pp("non_linear").pp(0))?,
            activation,
            out_proj: linear(config.hidden_channels, config.out_channels, vb.pp("non_linear").pp(2))?,
        };
        Ok(Self {
            linears,
            non_linear,
            in_channels: config.in_channels,
            num_residues: config.num_residues,
        })
    }

    pub fn num_residues(&self) -> usize {
        self.num_residues
    }

    /// Accepts `[n_atoms, channels, 1, residues]` or `[n_atoms, channels, residues]`.
    fn residue_block(&self, embedding_0: &Tensor) -> Result<Tensor> {
        let block = match embedding_0.dims() {
            [_, _, 1, _] => embedding_0.squeeze(2)?,
            [_, _, _] => embedding_0.clone(),
            dims => {
                return Err(PosEgnnError::shape(
                    "embedding_0",
                    "[n_atoms, channels, 1, residues]",
                    format!("{dims:?}"),
                ))
            }
        };
        let (_, channels, residues) = block.dims3()?;
        if channels != self.in_channels || residues != self.num_residues {
            return Err(PosEgnnError::shape(
                "embedding_0",
                format!("[n_atoms, {}, {}]", self.in_channels, self.num_residues),
                format!("{:?}", block.dims()),
            ));
        }
        Ok(block)
    }

    /// The individual projections, one `[n_atoms, out_channels]` tensor per residue.
    pub fn residue_outputs(&self, embedding_0: &Tensor) -> Result<Vec<Tensor>> {
        let block = self.residue_block(embedding_0)?;
        let mut outputs = Vec::with_capacity(self.num_residues);
        for (i, linear) in self.linears.iter().enumerate() {
            let slice = block.i((.., .., i))?.contiguous()?;
            outputs.push(linear.forward(&slice)?);
        }
        let last = block.i((.., .., self.num_residues - 1))?.contiguous()?;
        outputs.push(self.non_linear.forward(&last)?);
        Ok(outputs)
    }

    /// Per-atom output `[n_atoms]` (or `[n_atoms, out_channels]` when `out_channels > 1`).
    pub fn forward(&self, embedding_0: &Tensor) -> Result<Tensor> {
        let outputs = self.residue_outputs(embedding_0)?;
        let summed = Tensor::stack(&outputs, 0)?.sum(0)?;
        if summed.dim(1)? == 1 {
            Ok(summed.squeeze(1)?)
        } else {
            Ok(summed)
        }
    }
}
