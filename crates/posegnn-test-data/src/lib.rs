use std::fs;
use tempfile::{Builder, NamedTempFile};

#[derive(Debug)]
pub struct TestFile {
    filebinary: &'static [u8],
    suffix: &'static str,
}

impl TestFile {
    /// Two interaction layers, eight channels, cutoff 4.0.
    pub fn config_small() -> Self {
        Self {
            filebinary: include_bytes!("../data/config/posegnn_small.json"),
            suffix: "json",
        }
    }

    /// Water, rock salt, a pair bonded only through the cell boundary and one
    /// record with a degenerate cell.
    pub fn structures_01() -> Self {
        Self {
            filebinary: include_bytes!("../data/structures/records_01.json"),
            suffix: "json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        std::str::from_utf8(self.filebinary).unwrap_or_default()
    }

    pub fn create_temp(&self) -> std::io::Result<(String, NamedTempFile)> {
        let temp = Builder::new()
            .suffix(&format!(".{}", self.suffix))
            .tempfile()?;

        fs::write(&temp, self.filebinary)?;
        let path = temp.path().to_string_lossy().into_owned();

        Ok((path, temp))
    }
}
