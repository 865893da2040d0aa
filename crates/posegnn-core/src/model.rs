//! The full pipeline: strain -> neighbors -> encoder -> readout.
use crate::batch::StructureBatch;
use crate::config::PosEgnnConfig;
use crate::encoder::{GraphEncoder, RadialEncoder};
use crate::error::{PosEgnnError, Result};
use crate::neighbors::cell::LatticeCell;
use crate::neighbors::{BatchedPeriodicDistance, EdgeList};
use crate::readout::NodeInvariantReadout;
use crate::strain::symmetric_displacement;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::VarBuilder;
use tracing::{debug, instrument};

/// Everything one forward pass produces before the readout.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// strained positions `[n_atoms, 3]`
    pub positions: Tensor,
    /// strained cells `[n_structures, 3, 3]`
    pub cell: Tensor,
    /// zero displacement the geometry was strained with
    pub displacement: Var,
    pub edges: EdgeList,
    /// `[n_atoms, channels, 1, residues]`
    pub embedding_0: Tensor,
    /// per-layer node embeddings `[n_atoms, channels]`, input embedding first
    pub hidden_states: Vec<Tensor>,
}

impl ModelOutput {
    pub fn layer(&self, index: usize) -> Option<&Tensor> {
        self.hidden_states.get(index)
    }

    pub fn num_layers(&self) -> usize {
        self.hidden_states.len()
    }
}

/// Derived physical quantities for a batch, in the units of the training data.
#[derive(Debug, Clone)]
pub struct Properties {
    /// `[n_atoms]`
    pub per_atom_energy: Tensor,
    /// `[n_structures]`
    pub energy: Tensor,
    /// `-dE/dpositions`, `[n_atoms, 3]`
    pub forces: Tensor,
    /// `-dE/dD`, `[n_structures, 3, 3]`
    pub virial: Tensor,
    /// `dE/dD / volume`, all zero for structures without a cell
    pub stress: Tensor,
}

#[derive(Debug, Clone)]
pub struct PosEgnn<E = RadialEncoder> {
    distance: BatchedPeriodicDistance,
    encoder: E,
    readout: NodeInvariantReadout,
    e0_mean: Tensor,
    atomic_res_total_mean: f64,
    atomic_res_total_std: f64,
    config: PosEgnnConfig,
    dtype: DType,
    device: Device,
}

impl PosEgnn<RadialEncoder> {
    /// Load with the reference encoder under `encoder.*`.
    pub fn load(vb: VarBuilder, config: &PosEgnnConfig) -> Result<Self> {
        config.validate()?;
        let encoder = RadialEncoder::load(vb.pp("encoder"), &config.encoder)?;
        Self::with_encoder(vb, config, encoder)
    }
}

impl<E: GraphEncoder> PosEgnn<E> {
    /// Wrap an arbitrary encoder. Readout weights are read from `readout.*`.
    pub fn with_encoder(vb: VarBuilder, config: &PosEgnnConfig, encoder: E) -> Result<Self> {
        config.validate()?;
        let distance = BatchedPeriodicDistance::new(config.encoder.cutoff)?;
        let readout = NodeInvariantReadout::load(vb.pp("readout"), &config.decoder)?;
        let e0_mean = Tensor::new(config.e0_mean.as_slice(), vb.device())?.to_dtype(vb.dtype())?;
        Ok(Self {
            distance,
            encoder,
            readout,
            e0_mean,
            atomic_res_total_mean: config.atomic_res_total_mean,
            atomic_res_total_std: config.atomic_res_total_std,
            config: config.clone(),
            dtype: vb.dtype(),
            device: vb.device().clone(),
        })
    }

    pub fn config(&self) -> &PosEgnnConfig {
        &self.config
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn cutoff(&self) -> f64 {
        self.distance.cutoff()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn positions(&self, batch: &StructureBatch) -> Result<Tensor> {
        Ok(batch.positions().to_device(&self.device)?.to_dtype(self.dtype)?)
    }

    pub fn forward(&self, batch: &StructureBatch) -> Result<ModelOutput> {
        let positions = self.positions(batch)?;
        self.forward_positions(batch, &positions)
    }

    #[instrument(level = "debug", skip_all, fields(n_atoms = batch.num_atoms(), n_structures = batch.num_structures()))]
    fn forward_positions(&self, batch: &StructureBatch, positions: &Tensor) -> Result<ModelOutput> {
        let cell = batch.cell().to_device(&self.device)?.to_dtype(self.dtype)?;
        let batch_index = batch.batch().to_device(&self.device)?;
        let atomic_numbers = batch.atomic_numbers().to_device(&self.device)?;

        let strained = symmetric_displacement(positions, &cell, batch.num_structures(), &batch_index)?;
        let edges = self.distance.forward(&strained.positions, &strained.cell, &batch_index)?;
        let encoded = self.encoder.encode(
            &atomic_numbers,
            &strained.positions,
            &edges.edge_index,
            &edges.edge_distance,
            &edges.edge_vector,
        )?;

        let n_atoms = batch.num_atoms();
        if encoded.embedding_0.rank() < 3 || encoded.embedding_0.dim(0)? != n_atoms {
            return Err(PosEgnnError::shape(
                "embedding_0",
                format!("[{n_atoms}, channels, 1, residues]"),
                format!("{:?}", encoded.embedding_0.dims()),
            ));
        }
        debug!(num_edges = edges.len(), layers = encoded.hidden_states.len(), "encoded batch");

        Ok(ModelOutput {
            positions: strained.positions,
            cell: strained.cell,
            displacement: strained.displacement,
            edges,
            embedding_0: encoded.embedding_0,
            hidden_states: encoded.hidden_states,
        })
    }

    /// Residue readout of a forward pass, before de-normalisation.
    pub fn readout(&self, output: &ModelOutput) -> Result<Tensor> {
        self.readout.forward(&output.embedding_0)
    }

    /// Energies, forces, virial and stress for a batch.
    pub fn compute_properties(&self, batch: &StructureBatch) -> Result<Properties> {
        if self.config.decoder.out_channels != 1 {
            return Err(PosEgnnError::InvalidConfig(format!(
                "energy readout needs out_channels == 1, got {}",
                self.config.decoder.out_channels
            )));
        }
        let positions = Var::from_tensor(&self.positions(batch)?)?;
        let output = self.forward_positions(batch, positions.as_tensor())?;
        let raw = self.readout(&output)?;

        let atomic_numbers = batch.atomic_numbers().to_device(&self.device)?;
        let table_size = self.e0_mean.dim(0)?;
        if let Some(&z) = atomic_numbers.to_vec1::<u32>()?.iter().max() {
            if z as usize >= table_size {
                return Err(PosEgnnError::shape("atomic_numbers", format!("values < {table_size}"), z));
            }
        }
        let e0 = self.e0_mean.index_select(&atomic_numbers, 0)?;
        let per_atom_energy = (raw.affine(self.atomic_res_total_std, self.atomic_res_total_mean)? + e0)?;

        let batch_index = batch.batch().to_device(&self.device)?;
        let energy = Tensor::zeros(batch.num_structures(), self.dtype, &self.device)?.index_add(
            &batch_index,
            &per_atom_energy,
            0,
        )?;

        let grads = energy.sum_all()?.backward()?;
        let de_dpos = match grads.get(&positions) {
            Some(grad) => grad.clone(),
            None => positions.zeros_like()?,
        };
        let de_dd = match grads.get(&output.displacement) {
            Some(grad) => grad.clone(),
            None => output.displacement.zeros_like()?,
        };

        let inverse_volumes = batch
            .cell()
            .to_dtype(DType::F64)?
            .to_vec3::<f64>()?
            .iter()
            .enumerate()
            .map(|(structure, rows)| {
                if LatticeCell::is_null(rows) {
                    Ok(0.0)
                } else {
                    Ok(1.0 / LatticeCell::new(rows, structure)?.volume())
                }
            })
            .collect::<Result<Vec<f64>>>()?;
        let inverse_volumes = Tensor::from_vec(inverse_volumes, (batch.num_structures(), 1, 1), &self.device)?
            .to_dtype(self.dtype)?;

        Ok(Properties {
            per_atom_energy: per_atom_energy.detach(),
            energy: energy.detach(),
            forces: de_dpos.neg()?,
            virial: de_dd.neg()?,
            stress: de_dd.broadcast_mul(&inverse_volumes)?,
        })
    }
}
