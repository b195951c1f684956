//! Run configuration: defaults, dataset presets and an optional TOML file.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use writer_dataset::{
    default_image_ext, CorruptSamplePolicy, DatasetConfig, IdentityRule, LoaderConfig,
    MissingDelimiter, DEFAULT_SCALE_SIZE, MIN_SCALE_SIDE,
};

pub const DEFAULT_DATASET: &str = "CERUG-EN";

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub dataset: String,
    /// Holds `<dataset>/train`, `<dataset>/test` and the index table.
    pub data_root: PathBuf,
    /// Checkpoints, run log and loss plot go here.
    pub output_dir: PathBuf,
    pub start_epoch: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub weight_decay: f64,
    pub smoothing: f32,
    pub num_workers: usize,
    pub seed: Option<u64>,
    /// `(height, width)`.
    pub scale_size: (u32, u32),
    pub image_ext: Option<String>,
    pub delimiter: Option<char>,
    pub missing_delimiter: MissingDelimiter,
    pub corrupt_policy: CorruptSamplePolicy,
    pub base_channels: usize,
    pub hidden: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DATASET.to_string(),
            data_root: PathBuf::from("datasets"),
            output_dir: PathBuf::from("."),
            start_epoch: 0,
            epochs: 100,
            batch_size: 16,
            lr: 1e-4,
            weight_decay: 1e-4,
            smoothing: crate::loss::DEFAULT_SMOOTHING,
            num_workers: 0,
            seed: None,
            scale_size: DEFAULT_SCALE_SIZE,
            image_ext: None,
            delimiter: None,
            missing_delimiter: MissingDelimiter::Reject,
            corrupt_policy: CorruptSamplePolicy::Abort,
            base_channels: 32,
            hidden: 128,
        }
    }
}

/// TOML shape; every field is optional and falls back to [`RunConfig::default`].
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RunConfigFile {
    dataset: Option<String>,
    data_root: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    training: Option<TrainingSection>,
    data: Option<DataSection>,
    model: Option<ModelSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainingSection {
    start_epoch: Option<usize>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    lr: Option<f64>,
    weight_decay: Option<f64>,
    smoothing: Option<f32>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DataSection {
    num_workers: Option<usize>,
    scale_height: Option<u32>,
    scale_width: Option<u32>,
    image_ext: Option<String>,
    delimiter: Option<char>,
    missing_delimiter: Option<MissingDelimiter>,
    corrupt_policy: Option<CorruptSamplePolicy>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelSection {
    base_channels: Option<usize>,
    hidden: Option<usize>,
}

impl RunConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let file: RunConfigFile = toml::from_str(raw)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: RunConfigFile) -> Self {
        let d = Self::default();
        let training = file.training.unwrap_or_default();
        let data = file.data.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        Self {
            dataset: file.dataset.unwrap_or(d.dataset),
            data_root: file.data_root.unwrap_or(d.data_root),
            output_dir: file.output_dir.unwrap_or(d.output_dir),
            start_epoch: training.start_epoch.unwrap_or(d.start_epoch),
            epochs: training.epochs.unwrap_or(d.epochs),
            batch_size: training.batch_size.unwrap_or(d.batch_size),
            lr: training.lr.unwrap_or(d.lr),
            weight_decay: training.weight_decay.unwrap_or(d.weight_decay),
            smoothing: training.smoothing.unwrap_or(d.smoothing),
            seed: training.seed.or(d.seed),
            num_workers: data.num_workers.unwrap_or(d.num_workers),
            scale_size: (
                data.scale_height.unwrap_or(d.scale_size.0),
                data.scale_width.unwrap_or(d.scale_size.1),
            ),
            image_ext: data.image_ext.or(d.image_ext),
            delimiter: data.delimiter.or(d.delimiter),
            missing_delimiter: data.missing_delimiter.unwrap_or(d.missing_delimiter),
            corrupt_policy: data.corrupt_policy.unwrap_or(d.corrupt_policy),
            base_channels: model.base_channels.unwrap_or(d.base_channels),
            hidden: model.hidden.unwrap_or(d.hidden),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }
        if self.scale_size.0 < MIN_SCALE_SIDE || self.scale_size.1 < MIN_SCALE_SIDE {
            anyhow::bail!(
                "scale size {:?} is too small; both sides must be at least {MIN_SCALE_SIDE}",
                self.scale_size
            );
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            anyhow::bail!("smoothing {} must be in [0, 1)", self.smoothing);
        }
        if self.start_epoch > self.epochs {
            anyhow::bail!(
                "start epoch {} is past the final epoch {}",
                self.start_epoch,
                self.epochs
            );
        }
        Ok(())
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.data_root.join(&self.dataset)
    }

    pub fn train_dir(&self) -> PathBuf {
        self.dataset_dir().join("train")
    }

    pub fn test_dir(&self) -> PathBuf {
        self.dataset_dir().join("test")
    }

    pub fn identity_rule(&self) -> IdentityRule {
        let mut rule = IdentityRule::for_dataset(&self.dataset).with_missing(self.missing_delimiter);
        if let Some(d) = self.delimiter {
            rule.delimiter = d;
        }
        rule
    }

    pub fn dataset_config(&self, is_training: bool) -> DatasetConfig {
        DatasetConfig {
            scale_size: self.scale_size,
            image_ext: self
                .image_ext
                .clone()
                .unwrap_or_else(|| default_image_ext(&self.dataset).to_string()),
            identity: self.identity_rule(),
            is_training,
        }
    }

    pub fn loader_config(&self, is_training: bool) -> LoaderConfig {
        let base = if is_training {
            LoaderConfig::training(self.batch_size)
        } else {
            LoaderConfig::evaluation(self.batch_size)
        };
        base.with_seed(self.seed)
            .with_workers(self.num_workers)
            .with_corrupt_policy(self.corrupt_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_follow_dataset_name() {
        let cfg = RunConfig {
            dataset: "CVL".into(),
            ..RunConfig::default()
        };
        let ds = cfg.dataset_config(true);
        assert_eq!(ds.image_ext, "tif");
        assert_eq!(ds.identity.delimiter, '-');

        let cerug = RunConfig::default().dataset_config(false);
        assert_eq!(cerug.image_ext, "png");
        assert_eq!(cerug.identity.delimiter, '_');
    }

    #[test]
    fn toml_overrides_defaults() {
        let cfg = RunConfig::from_toml_str(
            r#"
            dataset = "Firemaker"
            data_root = "/data"

            [training]
            epochs = 5
            seed = 9

            [data]
            delimiter = "+"
            missing_delimiter = "whole_name"
            corrupt_policy = "skip"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.dataset, "Firemaker");
        assert_eq!(cfg.train_dir(), PathBuf::from("/data/Firemaker/train"));
        assert_eq!(cfg.epochs, 5);
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.identity_rule().delimiter, '+');
        assert_eq!(cfg.identity_rule().on_missing, MissingDelimiter::WholeName);
        assert_eq!(cfg.corrupt_policy, CorruptSamplePolicy::Skip);
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(RunConfig::from_toml_str("epochz = 3").is_err());
    }

    #[test]
    fn validation_catches_bad_ranges() {
        let cfg = RunConfig {
            start_epoch: 5,
            epochs: 3,
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = RunConfig {
            batch_size: 0,
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = RunConfig::from_toml_str("[data]\nscale_height = 0").unwrap();
        assert_eq!(cfg.scale_size, (0, 128));
        assert!(cfg.validate().is_err());
    }
}
