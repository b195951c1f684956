#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod loss;
pub mod metrics;
pub mod plot;
pub mod run_log;
pub mod schedule;
pub mod trainer;
pub mod util;

pub use checkpoint::{run_basedir, CheckpointPaths};
pub use config::RunConfig;
pub use controller::{
    ControllerState, EpochController, EpochRecord, EpochWorker, EvalSummary, RunReporter,
};
pub use loss::LabelSmoothingCrossEntropy;
pub use metrics::{top_k_hits, AccuracyTally};
pub use models::{GrnnNet, GrnnNetConfig};
pub use run_log::FileReporter;
pub use schedule::StepLr;
pub use trainer::WriterTrainer;
pub use util::{run_eval, run_train, EvalArgs, TrainArgs};
/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
