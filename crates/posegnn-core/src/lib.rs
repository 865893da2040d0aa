//! # posegnn-core
//!
//! Graph assembly and readout for atomistic embedding models.
//!
//! __posegnn-core__ provides:
//! * Batching of independently sized molecules and periodic crystals ([`StructureBatch`])
//! * A differentiable symmetric strain transform for stress/virial derivatives
//! * A batched periodic neighbor builder with per-edge lattice shifts
//! * The encoder contract ([`GraphEncoder`]) and a reference radial encoder
//! * The multi-head residue readout that turns per-layer node features into per-atom scalars
//!
//! The main entry point is [`PosEgnn`], which chains these stages:
//!
//! ```ignore
//! use candle_core::{DType, Device};
//! use candle_nn::{VarBuilder, VarMap};
//! use posegnn_core::{PosEgnn, PosEgnnConfig, Structure, StructureBatch};
//!
//! let device = Device::Cpu;
//! let config = PosEgnnConfig::default();
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
//! let model = PosEgnn::load(vb, &config)?;
//! let batch = StructureBatch::from_structures(&structures, &device)?;
//! let output = model.forward(&batch)?;
//! let last_layer = output.layer(output.num_layers() - 1);
//! ```
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;

pub mod activation;
pub mod batch;
pub mod config;
pub mod encoder;
pub mod error;
pub mod model;
pub mod neighbors;
pub mod readout;
pub mod strain;

pub use activation::Activation;
pub use batch::{Structure, StructureBatch};
pub use config::{EncoderConfig, PosEgnnConfig, ReadoutConfig};
pub use encoder::{EncoderOutput, GraphEncoder, RadialEncoder};
pub use error::{PosEgnnError, Result};
pub use model::{ModelOutput, PosEgnn, Properties};
pub use neighbors::{BatchedPeriodicDistance, EdgeList, PeriodicEdge};
pub use readout::NodeInvariantReadout;
pub use strain::{apply_displacement, symmetric_displacement, StrainedGeometry};

pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            tracing::info!(
                "Running on CPU, to run on GPU(metal), build with `--features metal`"
            );
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            tracing::info!("Running on CPU, to run on GPU, build with `--features cuda`");
        }
        Ok(Device::Cpu)
    }
}
