//! Handwriting image datasets for writer identification.
//!
//! This crate provides utilities for:
//! - Deriving writer identities from filename conventions
//! - A persisted identity -> class index table shared by train and test splits
//! - Aspect-preserving normalization onto a fixed canvas
//! - Burn-compatible batch iteration with optional worker threads

// Module declarations
pub mod batch;
pub mod dataset;
pub mod identity;
pub mod index_table;
pub mod normalize;
pub mod types;

// Re-export public API
pub use batch::{BatchIter, LoaderConfig, PassStats, WriterBatch, WriterLoader};
pub use dataset::{default_image_ext, list_images, DatasetConfig, WriterDataset};
pub use identity::{IdentityRule, MissingDelimiter};
pub use index_table::{table_file_name, IdentityIndexTable};
pub use normalize::{
    normalize, ContentRect, NormalizedImage, ScaleSize, DEFAULT_SCALE_SIZE,
    MIN_SCALE_SIDE,
};
pub use types::*;
