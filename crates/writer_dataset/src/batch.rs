//! Batch iteration for training and evaluation.

use crate::dataset::WriterDataset;
use crate::types::{CorruptSamplePolicy, DatasetError, DatasetResult, WriterSample};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// Reshuffle sample order at the start of every pass.
    pub shuffle: bool,
    /// Seed for shuffling and placement jitter; `None` draws from the process RNG.
    pub seed: Option<u64>,
    /// Drop the last partial batch.
    pub drop_last: bool,
    /// Worker threads decoding samples; 0 loads on the caller's thread.
    pub num_workers: usize,
    pub corrupt_policy: CorruptSamplePolicy,
}

impl LoaderConfig {
    pub fn training(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle: true,
            seed: None,
            drop_last: false,
            num_workers: 0,
            corrupt_policy: CorruptSamplePolicy::Abort,
        }
    }

    pub fn evaluation(batch_size: usize) -> Self {
        Self {
            shuffle: false,
            ..Self::training(batch_size)
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_corrupt_policy(mut self, policy: CorruptSamplePolicy) -> Self {
        self.corrupt_policy = policy;
        self
    }
}

pub struct WriterBatch<B: Backend> {
    /// `[N, 1, H, W]` in [0, 1].
    pub images: Tensor<B, 4>,
    /// `[N]` writer indices.
    pub labels: Tensor<B, 1, Int>,
    pub filenames: Vec<String>,
}

impl<B: Backend> WriterBatch<B> {
    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }
}

/// Counters for one pass over a loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassStats {
    pub batches: usize,
    pub samples: usize,
    pub skipped: usize,
    pub load_time: Duration,
}

pub struct WriterLoader {
    dataset: Arc<WriterDataset>,
    cfg: LoaderConfig,
    rng: StdRng,
    pool: Option<rayon::ThreadPool>,
}

impl WriterLoader {
    pub fn new(dataset: Arc<WriterDataset>, cfg: LoaderConfig) -> DatasetResult<Self> {
        if cfg.batch_size == 0 {
            return Err(DatasetError::Other("batch_size must be positive".to_string()));
        }
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let pool = if cfg.num_workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(cfg.num_workers)
                .thread_name(|i| format!("writer-loader-{i}"))
                .build()
                .map_err(|e| DatasetError::Other(format!("failed to start loader workers: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            dataset,
            cfg,
            rng,
            pool,
        })
    }

    /// Start a new pass over the dataset.
    pub fn iter(&mut self) -> BatchIter<'_> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.cfg.shuffle {
            order.shuffle(&mut self.rng);
        }
        let rng = StdRng::seed_from_u64(self.rng.random());
        BatchIter {
            dataset: &self.dataset,
            cfg: &self.cfg,
            pool: self.pool.as_ref(),
            order,
            cursor: 0,
            rng,
            stats: PassStats::default(),
        }
    }

    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        let b = self.cfg.batch_size;
        if self.cfg.drop_last {
            n / b
        } else {
            n.div_ceil(b)
        }
    }
}

pub struct BatchIter<'a> {
    dataset: &'a WriterDataset,
    cfg: &'a LoaderConfig,
    pool: Option<&'a rayon::ThreadPool>,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
    stats: PassStats,
}

impl BatchIter<'_> {
    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<WriterBatch<B>>> {
        loop {
            if self.cursor >= self.order.len() {
                return Ok(None);
            }
            let end = (self.cursor + self.cfg.batch_size).min(self.order.len());
            if self.cfg.drop_last && end - self.cursor < self.cfg.batch_size {
                self.cursor = self.order.len();
                return Ok(None);
            }
            let slice = &self.order[self.cursor..end];
            self.cursor = end;

            // Seeds are drawn in order so results do not depend on worker scheduling.
            let jobs: Vec<(usize, u64)> = slice.iter().map(|&i| (i, self.rng.random())).collect();
            let dataset = self.dataset;
            let load = |&(idx, seed): &(usize, u64)| {
                let mut rng = StdRng::seed_from_u64(seed);
                dataset.get(idx, &mut rng)
            };

            let t_load = Instant::now();
            let loaded: Vec<DatasetResult<WriterSample>> = match self.pool {
                Some(pool) => pool.install(|| jobs.par_iter().map(load).collect()),
                None => jobs.iter().map(load).collect(),
            };
            self.stats.load_time += t_load.elapsed();

            let mut samples = Vec::with_capacity(loaded.len());
            for res in loaded {
                match res {
                    Ok(sample) => samples.push(sample),
                    Err(e)
                        if e.is_corrupt_sample()
                            && self.cfg.corrupt_policy == CorruptSamplePolicy::Skip =>
                    {
                        warn!("skipping sample: {e}");
                        self.stats.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
            if samples.is_empty() {
                continue;
            }

            let batch = assemble::<B>(samples, device);
            self.stats.batches += 1;
            self.stats.samples += batch.len();
            debug!(
                batch = self.stats.batches,
                samples = self.stats.samples,
                skipped = self.stats.skipped,
                "loaded batch"
            );
            return Ok(Some(batch));
        }
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }
}

fn assemble<B: Backend>(samples: Vec<WriterSample>, device: &B::Device) -> WriterBatch<B> {
    let n = samples.len();
    let mut images = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    let mut filenames = Vec::with_capacity(n);
    for sample in samples {
        images.push(sample.to_tensor::<B>(device));
        labels.push(sample.label as i64);
        filenames.push(sample.filename);
    }
    let images = Tensor::<B, 3>::stack::<4>(images, 0);
    let labels = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [n]), device);
    WriterBatch {
        images,
        labels,
        filenames,
    }
}
