//! Output layout of a training run: checkpoints, log file and loss plot.

use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use std::fs;
use std::path::PathBuf;

/// Run prefix shared by all artifacts of a dataset's run.
pub fn run_basedir(dataset: &str) -> String {
    format!("GRRNN_WriterIdentification_dataset_{dataset}_model_")
}

#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    output_dir: PathBuf,
    basedir: String,
}

impl CheckpointPaths {
    pub fn new(output_dir: impl Into<PathBuf>, dataset: &str) -> Self {
        Self {
            output_dir: output_dir.into(),
            basedir: run_basedir(dataset),
        }
    }

    pub fn model_dir(&self) -> PathBuf {
        self.output_dir.join("model")
    }

    /// Checkpoint path without the recorder's `.bin` extension.
    pub fn checkpoint_stem(&self, epoch: usize) -> PathBuf {
        self.model_dir()
            .join(format!("{}-model_epoch_{epoch}", self.basedir))
    }

    pub fn checkpoint(&self, epoch: usize) -> PathBuf {
        self.checkpoint_stem(epoch).with_extension("bin")
    }

    pub fn exists(&self, epoch: usize) -> bool {
        self.checkpoint(epoch).is_file()
    }

    pub fn log_file(&self) -> PathBuf {
        self.output_dir.join(format!("{}.log", self.basedir))
    }

    pub fn loss_plot(&self) -> PathBuf {
        self.output_dir.join(format!("{}loss_plot.svg", self.basedir))
    }

    /// Epochs with a checkpoint on disk, ascending.
    pub fn saved_epochs(&self) -> Vec<usize> {
        let prefix = format!("{}-model_epoch_", self.basedir);
        let Ok(entries) = fs::read_dir(self.model_dir()) else {
            return Vec::new();
        };
        let mut epochs: Vec<usize> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| {
                name.strip_prefix(&prefix)?
                    .strip_suffix(".bin")?
                    .parse()
                    .ok()
            })
            .collect();
        epochs.sort_unstable();
        epochs
    }

    pub fn save<B: Backend, M: Module<B>>(&self, model: &M, epoch: usize) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(self.model_dir())
            .with_context(|| format!("creating {}", self.model_dir().display()))?;
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let stem = self.checkpoint_stem(epoch);
        model
            .clone()
            .save_file(stem, &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save checkpoint for epoch {epoch}: {e}"))?;
        Ok(self.checkpoint(epoch))
    }

    /// Load checkpoint `epoch` into `model`; a missing file is an error.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        model: M,
        epoch: usize,
        device: &B::Device,
    ) -> anyhow::Result<M> {
        let path = self.checkpoint(epoch);
        if !path.is_file() {
            anyhow::bail!("checkpoint for epoch {epoch} not found at {}", path.display());
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .load_file(self.checkpoint_stem(epoch), &recorder, device)
            .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))
    }
}
