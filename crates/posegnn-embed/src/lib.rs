//! # posegnn-embed
//!
//! Extracts pooled per-layer embeddings for a list of structures and writes
//! one CSV table per layer. Items that fail to embed are kept as rows of NaN
//! so the tables stay aligned with the input.
pub mod embedder;
pub mod pooling;
pub mod records;
pub mod tables;

pub use embedder::{extract_layers, LayerEmbedder, PosEgnnEmbedder};
pub use pooling::Pooling;
pub use records::{load_records, StructureRecord};
pub use tables::{feature_columns, table_file_name, write_layer_tables};
