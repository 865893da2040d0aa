//! Pooled per-layer embeddings, one structure at a time.
use crate::pooling::Pooling;
use crate::records::StructureRecord;
use anyhow::{anyhow, bail, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use posegnn_core::{PosEgnn, PosEgnnConfig, Structure, StructureBatch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::{info, warn};

pub trait LayerEmbedder {
    fn num_layers(&self) -> usize;
    fn hidden_dim(&self) -> usize;
    /// One pooled vector of length `hidden_dim` per layer, first layer first.
    fn embed_layers(&self, structure: &Structure) -> Result<Vec<Vec<f32>>>;
}

pub struct PosEgnnEmbedder {
    model: PosEgnn,
    device: Device,
    pooling: Pooling,
    // keeps randomly initialised weights alive
    _varmap: Option<VarMap>,
}

impl PosEgnnEmbedder {
    pub fn new(model: PosEgnn, pooling: Pooling) -> Self {
        let device = model.device().clone();
        Self {
            model,
            device,
            pooling,
            _varmap: None,
        }
    }

    /// Load from a config file and optional safetensors weights. Without
    /// weights every parameter is drawn from a seeded uniform distribution.
    pub fn load(
        config: &PosEgnnConfig,
        weights: Option<&Path>,
        device: &Device,
        pooling: Pooling,
        seed: u64,
    ) -> Result<Self> {
        match weights {
            Some(path) => {
                info!(weights = %path.display(), "loading weights");
                let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };
                let model = PosEgnn::load(vb, config)?;
                Ok(Self::new(model, pooling))
            }
            None => {
                warn!(seed, "no weights given, using a randomly initialised model");
                let varmap = VarMap::new();
                let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
                let model = PosEgnn::load(vb, config)?;
                reseed(&varmap, seed)?;
                let mut embedder = Self::new(model, pooling);
                embedder._varmap = Some(varmap);
                Ok(embedder)
            }
        }
    }

    pub fn pooling(&self) -> Pooling {
        self.pooling
    }
}

/// Overwrite every variable with `U(-b, b)`, `b = 1/sqrt(fan_in)`, visiting
/// variables by name so the draw order does not depend on hash order.
fn reseed(varmap: &VarMap, seed: u64) -> Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("parameter store lock poisoned"))?;
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();
    let mut rng = StdRng::seed_from_u64(seed);
    for name in names {
        let var = &data[name];
        let dims = var.dims();
        let fan_in = dims.last().copied().unwrap_or(1).max(1);
        let bound = if name.contains("embedding") {
            1.0
        } else {
            1.0 / (fan_in as f32).sqrt()
        };
        let values: Vec<f32> = (0..var.elem_count()).map(|_| rng.gen_range(-bound..bound)).collect();
        let tensor = Tensor::from_vec(values, dims, var.device())?.to_dtype(var.dtype())?;
        var.set(&tensor)?;
    }
    Ok(())
}

impl LayerEmbedder for PosEgnnEmbedder {
    fn num_layers(&self) -> usize {
        self.model.config().encoder.num_layers + 1
    }

    fn hidden_dim(&self) -> usize {
        self.model.config().encoder.hidden_channels
    }

    fn embed_layers(&self, structure: &Structure) -> Result<Vec<Vec<f32>>> {
        let batch = StructureBatch::from_structures(std::slice::from_ref(structure), &self.device)?;
        let output = self.model.forward(&batch)?;
        let mut pooled = Vec::with_capacity(output.num_layers());
        for layer in &output.hidden_states {
            pooled.push(self.pooling.apply(layer)?);
        }
        Ok(pooled)
    }
}

/// Embed every record. Rows of the result are indexed `[layer][record]`.
///
/// A record that fails, or whose layers do not have the expected shape, gets
/// a row of NaN in every layer and the run continues.
pub fn extract_layers<M: LayerEmbedder>(embedder: &M, records: &[StructureRecord]) -> Vec<Vec<Vec<f32>>> {
    let num_layers = embedder.num_layers();
    let hidden_dim = embedder.hidden_dim();
    let mut layers: Vec<Vec<Vec<f32>>> = vec![Vec::with_capacity(records.len()); num_layers];

    let mut failures = 0usize;
    for record in records {
        let embedded = embedder.embed_layers(&record.structure).and_then(|rows| {
            if rows.len() != num_layers || rows.iter().any(|r| r.len() != hidden_dim) {
                bail!("expected {num_layers} layers of width {hidden_dim}");
            }
            Ok(rows)
        });
        match embedded {
            Ok(rows) => {
                for (layer, row) in layers.iter_mut().zip(rows) {
                    layer.push(row);
                }
            }
            Err(e) => {
                warn!(id = %record.id, error = %e, "embedding failed, writing NaN row");
                failures += 1;
                for layer in layers.iter_mut() {
                    layer.push(vec![f32::NAN; hidden_dim]);
                }
            }
        }
    }
    info!(records = records.len(), failures, "extracted embeddings");
    layers
}
