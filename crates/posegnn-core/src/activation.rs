//! Closed registry of nonlinearities addressable by name.
//!
//! Checkpoint configs name their activation with a string (`"silu"`, `"ssp"`, ...).
//! The name is resolved once, when the configuration is loaded; an unknown name is
//! a configuration error rather than a runtime lookup failure.
use crate::error::{PosEgnnError, Result};
use candle_core::{Module, Tensor};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Activation {
    #[strum(to_string = "identity", serialize = "linear")]
    Identity,
    #[strum(to_string = "relu")]
    Relu,
    #[strum(to_string = "silu", serialize = "swish")]
    Silu,
    #[strum(to_string = "gelu")]
    Gelu,
    #[strum(to_string = "tanh")]
    Tanh,
    #[strum(to_string = "sigmoid")]
    Sigmoid,
    #[strum(to_string = "softplus")]
    Softplus,
    /// softplus(x) - ln(2), zero at the origin
    #[strum(to_string = "ssp", serialize = "shifted_softplus")]
    ShiftedSoftplus,
}

impl Activation {
    /// Resolve an activation by its registry name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::from_str(name.trim()).map_err(|_| PosEgnnError::UnknownActivation(name.to_string()))
    }
}

// log(1 + exp(x)) written so large |x| neither overflows nor loses precision
fn softplus(xs: &Tensor) -> candle_core::Result<Tensor> {
    let tail = (xs.abs()?.neg()?.exp()? + 1.0)?.log()?;
    xs.relu()? + tail
}

impl Module for Activation {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Identity => Ok(xs.clone()),
            Self::Relu => xs.relu(),
            Self::Silu => xs.silu(),
            Self::Gelu => xs.gelu_erf(),
            Self::Tanh => xs.tanh(),
            Self::Sigmoid => candle_nn::ops::sigmoid(xs),
            Self::Softplus => softplus(xs),
            Self::ShiftedSoftplus => softplus(xs)? - std::f64::consts::LN_2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use strum::IntoEnumIterator;

    fn values(act: Activation, xs: &[f32]) -> Vec<f32> {
        let t = Tensor::new(xs, &Device::Cpu).unwrap();
        act.forward(&t).unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn test_names_resolve() {
        assert_eq!(Activation::from_name("silu").unwrap(), Activation::Silu);
        assert_eq!(Activation::from_name("Swish").unwrap(), Activation::Silu);
        assert_eq!(Activation::from_name("ssp").unwrap(), Activation::ShiftedSoftplus);
        assert_eq!(Activation::from_name("identity").unwrap(), Activation::Identity);
        for act in Activation::iter() {
            assert_eq!(Activation::from_name(&act.to_string()).unwrap(), act);
        }
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let err = Activation::from_name("mish").unwrap_err();
        assert!(matches!(err, PosEgnnError::UnknownActivation(ref n) if n == "mish"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_forward_values() {
        let xs = [-2.0f32, 0.0, 3.0];
        assert_eq!(values(Activation::Identity, &xs), vec![-2.0, 0.0, 3.0]);
        assert_eq!(values(Activation::Relu, &xs), vec![0.0, 0.0, 3.0]);

        let ssp = values(Activation::ShiftedSoftplus, &xs);
        assert!(ssp[1].abs() < 1e-6);

        let sp = values(Activation::Softplus, &[0.0, 50.0, -50.0]);
        assert!((sp[0] - std::f32::consts::LN_2).abs() < 1e-6);
        assert!((sp[1] - 50.0).abs() < 1e-4);
        assert!(sp[2] >= 0.0 && sp[2] < 1e-6);

        let silu = values(Activation::Silu, &[1.0]);
        assert!((silu[0] - 1.0 / (1.0 + (-1.0f32).exp())).abs() < 1e-6);
    }
}
