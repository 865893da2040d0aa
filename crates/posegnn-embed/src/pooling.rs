use candle_core::{DType, Result, Tensor};
use strum::{Display, EnumString};

/// How a layer's per-atom rows collapse into one vector per structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Pooling {
    /// the summary position, which is the structure's first atom
    #[default]
    Cls,
    Mean,
}

impl Pooling {
    /// `layer` is `[n_atoms, channels]`.
    pub fn apply(&self, layer: &Tensor) -> Result<Vec<f32>> {
        let pooled = match self {
            Pooling::Cls => layer.get(0)?,
            Pooling::Mean => layer.mean(0)?,
        };
        pooled.to_dtype(DType::F32)?.to_vec1::<f32>()
    }
}
