//! Model configuration.
//!
//! Mirrors the JSON layout of the checkpoint configs: an `encoder` block, a
//! `decoder` block for the residue readout and the persisted normalisation
//! constants.
use crate::activation::Activation;
use crate::error::{PosEgnnError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub cutoff: f64,
    pub hidden_channels: usize,
    pub num_layers: usize,
    pub num_rbf: usize,
    /// largest atomic number the species embedding accepts
    pub max_z: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            cutoff: 5.0,
            hidden_channels: 32,
            num_layers: 3,
            num_rbf: 16,
            max_z: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadoutConfig {
    pub in_channels: usize,
    pub num_residues: usize,
    pub hidden_channels: usize,
    pub out_channels: usize,
    pub activation: String,
}

impl Default for ReadoutConfig {
    fn default() -> Self {
        Self {
            in_channels: 32,
            num_residues: 4,
            hidden_channels: 16,
            out_channels: 1,
            activation: "silu".to_string(),
        }
    }
}

impl ReadoutConfig {
    pub fn activation(&self) -> Result<Activation> {
        Activation::from_name(&self.activation)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_residues == 0 {
            return Err(PosEgnnError::InvalidConfig(
                "decoder.num_residues must be at least 1".into(),
            ));
        }
        if self.in_channels == 0 || self.hidden_channels == 0 || self.out_channels == 0 {
            return Err(PosEgnnError::InvalidConfig(
                "decoder channel sizes must be non-zero".into(),
            ));
        }
        self.activation()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosEgnnConfig {
    pub encoder: EncoderConfig,
    pub decoder: ReadoutConfig,
    /// reference energy per atomic number
    pub e0_mean: Vec<f64>,
    pub atomic_res_total_mean: f64,
    pub atomic_res_total_std: f64,
}

impl Default for PosEgnnConfig {
    fn default() -> Self {
        let encoder = EncoderConfig::default();
        Self {
            e0_mean: vec![0.0; encoder.max_z + 1],
            encoder,
            decoder: ReadoutConfig::default(),
            atomic_res_total_mean: 0.0,
            atomic_res_total_std: 1.0,
        }
    }
}

impl PosEgnnConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let cutoff = self.encoder.cutoff;
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(PosEgnnError::InvalidCutoff(cutoff));
        }
        if self.encoder.hidden_channels == 0 || self.encoder.num_rbf == 0 {
            return Err(PosEgnnError::InvalidConfig(
                "encoder channel sizes must be non-zero".into(),
            ));
        }
        self.decoder.validate()?;
        if self.decoder.num_residues != self.encoder.num_layers + 1 {
            return Err(PosEgnnError::shape(
                "decoder.num_residues",
                self.encoder.num_layers + 1,
                self.decoder.num_residues,
            ));
        }
        if self.decoder.in_channels != self.encoder.hidden_channels {
            return Err(PosEgnnError::shape(
                "decoder.in_channels",
                self.encoder.hidden_channels,
                self.decoder.in_channels,
            ));
        }
        if self.e0_mean.is_empty() {
            return Err(PosEgnnError::InvalidConfig("e0_mean must not be empty".into()));
        }
        let std = self.atomic_res_total_std;
        if !std.is_finite() || std == 0.0 || !self.atomic_res_total_mean.is_finite() {
            return Err(PosEgnnError::InvalidConfig(format!(
                "normalisation constants must be finite with non-zero std (std = {std})"
            )));
        }
        Ok(())
    }
}
