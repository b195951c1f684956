use burn::backend::Autodiff;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, Optimizer};
use clap::{Parser, ValueEnum};
use models::{GrnnNet, GrnnNetConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use writer_dataset::{WriterDataset, WriterLoader};

use crate::checkpoint::CheckpointPaths;
use crate::config::RunConfig;
use crate::controller::{EpochController, EvalSummary};
use crate::loss::LabelSmoothingCrossEntropy;
use crate::run_log::FileReporter;
use crate::schedule::StepLr;
use crate::trainer::WriterTrainer;
use crate::TrainBackend;

pub type ADBackend = Autodiff<TrainBackend>;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

/// Options shared by `train` and `eval`; set values override the config file.
#[derive(clap::Args, Debug, Clone)]
pub struct CommonArgs {
    /// TOML run configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Dataset name, e.g. CERUG-EN, Firemaker, IAM, CVL.
    #[arg(long)]
    pub dataset: Option<String>,
    /// Folder holding `<dataset>/train` and `<dataset>/test`.
    #[arg(long)]
    pub data_root: Option<PathBuf>,
    /// Folder for checkpoints, the run log and the loss plot.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Loader worker threads (0 loads on the main thread).
    #[arg(long)]
    pub num_workers: Option<usize>,
    /// Seed for shuffling and placement jitter.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Skip unreadable images instead of aborting.
    #[arg(long)]
    pub skip_corrupt: bool,
}

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the writer identification network")]
pub struct TrainArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Resume from the checkpoint of the previous epoch.
    #[arg(long)]
    pub start_epoch: Option<usize>,
    /// Train up to (excluding) this epoch.
    #[arg(long)]
    pub epochs: Option<usize>,
    #[arg(long)]
    pub lr: Option<f64>,
}

#[derive(Parser, Debug)]
#[command(name = "eval", about = "Evaluate a saved epoch on the test split")]
pub struct EvalArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Epoch whose checkpoint is evaluated.
    #[arg(long)]
    pub epoch: usize,
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

impl CommonArgs {
    pub fn resolve(&self) -> anyhow::Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::from_path(path)?,
            None => RunConfig::default(),
        };
        if let Some(v) = &self.dataset {
            cfg.dataset = v.clone();
        }
        if let Some(v) = &self.data_root {
            cfg.data_root = v.clone();
        }
        if let Some(v) = &self.output_dir {
            cfg.output_dir = v.clone();
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.num_workers {
            cfg.num_workers = v;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.skip_corrupt {
            cfg.corrupt_policy = writer_dataset::CorruptSamplePolicy::Skip;
        }
        Ok(cfg)
    }
}

impl TrainArgs {
    pub fn resolve(&self) -> anyhow::Result<RunConfig> {
        let mut cfg = self.common.resolve()?;
        if let Some(v) = self.start_epoch {
            cfg.start_epoch = v;
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.lr {
            cfg.lr = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Open both splits, the model and Adam for `cfg`.
///
/// The training split is opened first so it creates the index table; the test
/// split reuses that table and must not introduce new writers.
pub fn build_trainer(
    cfg: &RunConfig,
    device: &<ADBackend as burn::tensor::backend::Backend>::Device,
) -> anyhow::Result<WriterTrainer<ADBackend, impl Optimizer<GrnnNet<ADBackend>, ADBackend>>> {
    let train = WriterDataset::open(
        &cfg.dataset,
        &cfg.train_dir(),
        &cfg.dataset_dir(),
        cfg.dataset_config(true),
    )?;
    let test = WriterDataset::open_with_table(
        &cfg.dataset,
        &cfg.test_dir(),
        train.table().clone(),
        cfg.dataset_config(false),
    )?;
    let num_classes = train.num_writers();
    info!(
        dataset = %cfg.dataset,
        train_images = train.len(),
        test_images = test.len(),
        writers = num_classes,
        "datasets ready"
    );

    let train_loader = WriterLoader::new(Arc::new(train), cfg.loader_config(true))?;
    let test_loader = WriterLoader::new(Arc::new(test), cfg.loader_config(false))?;

    let model = GrnnNet::<ADBackend>::new(
        GrnnNetConfig {
            in_channels: 1,
            num_classes,
            base_channels: cfg.base_channels,
            hidden: cfg.hidden,
        },
        device,
    );
    let optim = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as f32)))
        .init::<ADBackend, GrnnNet<ADBackend>>();

    Ok(WriterTrainer::new(
        model,
        optim,
        LabelSmoothingCrossEntropy::new(cfg.smoothing),
        train_loader,
        test_loader,
        CheckpointPaths::new(&cfg.output_dir, &cfg.dataset),
        device.clone(),
    ))
}

fn reporter_for(cfg: &RunConfig) -> FileReporter {
    let paths = CheckpointPaths::new(&cfg.output_dir, &cfg.dataset);
    FileReporter::new(paths.log_file(), paths.loss_plot())
}

/// Train `cfg.start_epoch..cfg.epochs` and return the final epoch's evaluation.
pub fn train_with_config(cfg: &RunConfig) -> anyhow::Result<Option<EvalSummary>> {
    cfg.validate()?;
    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let trainer = build_trainer(cfg, &device)?;
    let mut controller =
        EpochController::new(trainer, reporter_for(cfg), StepLr::halving(cfg.lr));
    let history = controller.train_loops(cfg.start_epoch, cfg.epochs)?;
    Ok(history.last().map(|r| r.eval))
}

/// Evaluate the saved checkpoint of `epoch` on the test split.
pub fn evaluate_with_config(cfg: &RunConfig, epoch: usize) -> anyhow::Result<EvalSummary> {
    cfg.validate()?;
    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let trainer = build_trainer(cfg, &device)?;
    let mut controller =
        EpochController::new(trainer, reporter_for(cfg), StepLr::halving(cfg.lr));
    if !controller.checkpoint_exists(epoch) {
        anyhow::bail!(
            "no checkpoint for epoch {epoch} in {}",
            CheckpointPaths::new(&cfg.output_dir, &cfg.dataset)
                .model_dir()
                .display()
        );
    }
    controller.evaluate_checkpoint(epoch)
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.common.backend)?;
    let cfg = args.resolve()?;
    info!(
        dataset = %cfg.dataset,
        start_epoch = cfg.start_epoch,
        epochs = cfg.epochs,
        output = %cfg.output_dir.display(),
        "starting training"
    );
    if let Some(eval) = train_with_config(&cfg)? {
        info!(top1 = eval.top1, top5 = eval.top5, "training finished");
    }
    Ok(())
}

pub fn run_eval(args: EvalArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.common.backend)?;
    let cfg = args.common.resolve()?;
    let eval = evaluate_with_config(&cfg, args.epoch)?;
    info!(
        epoch = args.epoch,
        top1 = eval.top1,
        top5 = eval.top5,
        samples = eval.samples,
        "evaluation finished"
    );
    Ok(())
}
