//! Per-layer CSV tables.
use crate::pooling::Pooling;
use crate::records::StructureRecord;
use anyhow::{ensure, Context, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Feature column names, e.g. `posegnn_layer_2_cls_0`.
pub fn feature_columns(prefix: &str, layer: usize, pooling: Pooling, width: usize) -> Vec<String> {
    (0..width)
        .map(|k| format!("{prefix}_layer_{layer}_{pooling}_{k}"))
        .collect()
}

pub fn table_file_name(split: &str, prefix: &str, layer: usize) -> String {
    format!("{split}_{prefix}_layer{layer}_emb.csv")
}

/// `id`, then `target` when any record carries one, then one column per feature.
pub fn layer_frame(
    records: &[StructureRecord],
    rows: &[Vec<f32>],
    columns: &[String],
) -> Result<DataFrame> {
    ensure!(
        rows.len() == records.len(),
        "{} rows for {} records",
        rows.len(),
        records.len()
    );
    let mut frame = vec![Column::new(
        "id".into(),
        records.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
    )];
    if records.iter().any(|r| r.target.is_some()) {
        frame.push(Column::new(
            "target".into(),
            records.iter().map(|r| r.target).collect::<Vec<Option<f64>>>(),
        ));
    }
    for (k, name) in columns.iter().enumerate() {
        let values: Vec<f32> = rows.iter().map(|row| row[k]).collect();
        frame.push(Column::new(name.as_str().into(), values));
    }
    Ok(DataFrame::new(frame)?)
}

/// Write one CSV per layer into `output_dir` and return the paths written.
pub fn write_layer_tables(
    output_dir: &Path,
    split: &str,
    prefix: &str,
    pooling: Pooling,
    records: &[StructureRecord],
    layers: &[Vec<Vec<f32>>],
    width: usize,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let mut written = Vec::with_capacity(layers.len());
    for (layer, rows) in layers.iter().enumerate() {
        let columns = feature_columns(prefix, layer, pooling, width);
        let mut df = layer_frame(records, rows, &columns)?;
        let path = output_dir.join(table_file_name(split, prefix, layer));
        let mut file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        written.push(path);
    }
    Ok(written)
}
