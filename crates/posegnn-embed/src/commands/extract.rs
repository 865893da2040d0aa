use crate::cli::ExtractArgs;
use anyhow::{Context, Result};
use posegnn_core::{device, PosEgnnConfig};
use posegnn_embed::{extract_layers, load_records, write_layer_tables, LayerEmbedder, PosEgnnEmbedder};
use tracing::info;

pub fn execute(args: ExtractArgs) -> Result<()> {
    let config = PosEgnnConfig::from_file(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let device = device(args.cpu)?;
    let embedder = PosEgnnEmbedder::load(
        &config,
        args.weights.as_deref(),
        &device,
        args.pooling,
        args.seed,
    )?;

    let records = load_records(&args.input)?;
    info!(
        records = records.len(),
        layers = embedder.num_layers(),
        hidden_dim = embedder.hidden_dim(),
        pooling = %embedder.pooling(),
        "embedding structures"
    );
    let layers = extract_layers(&embedder, &records);

    let written = write_layer_tables(
        &args.output_dir,
        &args.split,
        &args.prefix,
        embedder.pooling(),
        &records,
        &layers,
        embedder.hidden_dim(),
    )?;
    for path in &written {
        info!(path = %path.display(), "wrote layer table");
    }
    Ok(())
}
