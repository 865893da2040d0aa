use anyhow::{Context, Result};
use posegnn_core::Structure;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One input item: an identifier, an optional label carried through to the
/// output tables, and the structure itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub id: String,
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(flatten)]
    pub structure: Structure,
}

pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<StructureRecord>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading records from {}", path.display()))?;
    let records = serde_json::from_str(&json)
        .with_context(|| format!("parsing records in {}", path.display()))?;
    Ok(records)
}
