use thiserror::Error;

/// Failures raised by the graph-assembly and readout pipeline.
///
/// Configuration and numerical errors are always fatal for the call that
/// raised them; nothing in this crate retries or substitutes values.
#[derive(Debug, Error)]
pub enum PosEgnnError {
    #[error("Invalid cutoff {0}: must be finite and greater than zero")]
    InvalidCutoff(f64),

    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },

    #[error("Unknown activation '{0}'")]
    UnknownActivation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Structure {structure} has a singular cell (volume {volume:e})")]
    SingularCell { structure: usize, volume: f64 },

    #[error("Atom {atom} has a non-finite position")]
    NonFinitePosition { atom: usize },

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PosEgnnError {
    pub(crate) fn shape(what: &'static str, expected: impl ToString, found: impl ToString) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Errors caused by the caller's configuration or input shapes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidCutoff(_)
                | Self::ShapeMismatch { .. }
                | Self::UnknownActivation(_)
                | Self::InvalidConfig(_)
                | Self::Json(_)
        )
    }

    /// Errors caused by the numeric content of a structure.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            Self::SingularCell { .. } | Self::NonFinitePosition { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PosEgnnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(PosEgnnError::InvalidCutoff(0.0).is_configuration());
        assert!(PosEgnnError::UnknownActivation("mish".into()).is_configuration());
        assert!(!PosEgnnError::InvalidCutoff(-1.0).is_numerical());

        let singular = PosEgnnError::SingularCell {
            structure: 2,
            volume: 0.0,
        };
        assert!(singular.is_numerical());
        assert!(!singular.is_configuration());
        assert!(singular.to_string().contains("Structure 2"));
    }
}
