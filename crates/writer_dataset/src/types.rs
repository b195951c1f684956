//! Core types, error definitions, and data structures for writer_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Where the public writer identification datasets can be obtained.
pub const DATASET_SOURCE_URL: &str = "https://www.ai.rug.nl/~sheng/writeridataset.html";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset {dataset} not found at {path}; see {} for how to obtain it", DATASET_SOURCE_URL)]
    Config { dataset: String, path: PathBuf },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {path} has zero width or height")]
    EmptyImage { path: PathBuf },
    #[error("cannot derive writer identity from {filename}: {msg}")]
    Identity { filename: String, msg: String },
    #[error("writer identity {identity:?} is not present in the index table")]
    Lookup { identity: String },
    #[error("index table {path} does not cover {} identities (first: {:?})", .missing.len(), .missing.first())]
    Coverage { path: PathBuf, missing: Vec<String> },
    #[error("index table {path} is malformed: {msg}")]
    InvalidTable { path: PathBuf, msg: String },
    #[error("no images matching *.{ext} in {folder}")]
    EmptyDataset { folder: PathBuf, ext: String },
    #[error("scale size {height}x{width} is too small; both sides must be at least {min}")]
    InvalidScale { height: u32, width: u32, min: u32 },
    #[error("sample index {index} out of range for dataset of {len} images")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0}")]
    Other(String),
}

impl DatasetError {
    /// True for failures confined to one image file, which
    /// [`CorruptSamplePolicy::Skip`] may step over.
    pub fn is_corrupt_sample(&self) -> bool {
        matches!(self, DatasetError::Decode { .. } | DatasetError::EmptyImage { .. })
    }
}

/// How the normalizer places resized content on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Uniformly random offset per axis (training-time jitter).
    Random,
    /// Floor-centered offset (evaluation).
    Center,
}

impl Placement {
    pub fn for_training(is_training: bool) -> Self {
        if is_training {
            Placement::Random
        } else {
            Placement::Center
        }
    }
}

/// What to do when an image cannot be decoded while assembling a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptSamplePolicy {
    /// Fail the batch with the offending filename.
    #[default]
    Abort,
    /// Log a warning, count the sample as skipped and continue.
    Skip,
}

/// `(filename, identity, index)` derived from a dataset entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub filename: String,
    pub identity: String,
    pub index: usize,
}

/// One normalized sample as produced by [`crate::WriterDataset::get`].
#[derive(Debug, Clone)]
pub struct WriterSample {
    /// Row-major `height * width` pixels in [0, 1], background is 0.
    pub pixels: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub label: usize,
    pub filename: String,
    /// True when the height hit the canvas first during resizing.
    pub height_limited: bool,
}

impl WriterSample {
    /// Convert to a `[1, H, W]` tensor.
    pub fn to_tensor<B: burn::tensor::backend::Backend>(
        &self,
        device: &B::Device,
    ) -> burn::tensor::Tensor<B, 3> {
        burn::tensor::Tensor::<B, 3>::from_data(
            burn::tensor::TensorData::new(
                self.pixels.clone(),
                [1, self.height as usize, self.width as usize],
            ),
            device,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unreadable_images_count_as_corrupt() {
        let decode = DatasetError::Decode {
            path: "a-1.png".into(),
            source: image::ImageError::IoError(std::io::Error::other("truncated")),
        };
        assert!(decode.is_corrupt_sample());
        assert!(DatasetError::EmptyImage { path: "a-2.png".into() }.is_corrupt_sample());

        let fatal = [
            DatasetError::Identity {
                filename: "a.png".into(),
                msg: "no delimiter".into(),
            },
            DatasetError::Lookup {
                identity: "zz".into(),
            },
            DatasetError::IndexOutOfRange { index: 3, len: 2 },
            DatasetError::Io {
                path: "train".into(),
                source: std::io::Error::other("denied"),
            },
        ];
        for err in fatal {
            assert!(!err.is_corrupt_sample(), "{err}");
        }
    }
}
