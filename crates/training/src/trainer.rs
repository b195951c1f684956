//! Burn-backed [`EpochWorker`] for `GrnnNet`.

use crate::checkpoint::CheckpointPaths;
use crate::controller::{EpochWorker, EvalSummary};
use crate::loss::LabelSmoothingCrossEntropy;
use crate::metrics::AccuracyTally;
use anyhow::Context;
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};
use models::GrnnNet;
use std::time::Instant;
use tracing::{debug, warn};
use writer_dataset::{PassStats, WriterLoader};

pub const TOP_K: [usize; 2] = [1, 5];

pub struct WriterTrainer<B: AutodiffBackend, O> {
    model: GrnnNet<B>,
    optim: O,
    loss: LabelSmoothingCrossEntropy,
    train_loader: WriterLoader,
    test_loader: WriterLoader,
    paths: CheckpointPaths,
    device: B::Device,
}

impl<B, O> WriterTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<GrnnNet<B>, B>,
{
    pub fn new(
        model: GrnnNet<B>,
        optim: O,
        loss: LabelSmoothingCrossEntropy,
        train_loader: WriterLoader,
        test_loader: WriterLoader,
        paths: CheckpointPaths,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            optim,
            loss,
            train_loader,
            test_loader,
            paths,
            device,
        }
    }
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> anyhow::Result<f64> {
    let values = t
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("reading loss value: {e:?}"))?;
    values
        .first()
        .map(|&v| v as f64)
        .ok_or_else(|| anyhow::anyhow!("loss tensor is empty"))
}

fn host_scores<B: Backend>(logits: Tensor<B, 2>) -> anyhow::Result<Vec<f32>> {
    logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("reading logits: {e:?}"))
}

fn host_labels(data: TensorData) -> anyhow::Result<Vec<usize>> {
    let labels = data
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow::anyhow!("reading labels: {e:?}"))?;
    Ok(labels.into_iter().map(|l| l as usize).collect())
}

fn report_pass(split: &str, epoch: usize, stats: PassStats) {
    if stats.skipped > 0 {
        warn!(split, epoch, skipped = stats.skipped, "skipped unreadable samples");
    }
    debug!(
        split,
        epoch,
        batches = stats.batches,
        samples = stats.samples,
        load_secs = stats.load_time.as_secs_f64(),
        "pass complete"
    );
}

impl<B, O> EpochWorker for WriterTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<GrnnNet<B>, B>,
{
    fn train_epoch(&mut self, epoch: usize, lr: f64) -> anyhow::Result<f64> {
        let t0 = Instant::now();
        let mut iter = self.train_loader.iter();
        let mut total = 0.0;
        let mut batches = 0usize;
        while let Some(batch) = iter
            .next_batch::<B>(&self.device)
            .with_context(|| format!("loading training batch in epoch {epoch}"))?
        {
            let logits = self.model.forward(batch.images);
            let loss = self.loss.forward(logits, batch.labels);
            let value = scalar(loss.clone().detach())?;
            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optim.step(lr, self.model.clone(), grads);
            total += value;
            batches += 1;
        }
        report_pass("train", epoch, iter.stats());
        if batches == 0 {
            warn!(epoch, "training split produced no batches");
            return Ok(0.0);
        }
        debug!(epoch, secs = t0.elapsed().as_secs_f64(), "training pass");
        Ok(total / batches as f64)
    }

    fn evaluate(&mut self, epoch: usize) -> anyhow::Result<EvalSummary> {
        let model = self.model.valid();
        let num_classes = model.num_classes();
        let mut tally = AccuracyTally::new(&TOP_K);
        let mut loss_total = 0.0;
        let mut batches = 0usize;
        let mut iter = self.test_loader.iter();
        while let Some(batch) = iter
            .next_batch::<B::InnerBackend>(&self.device)
            .with_context(|| format!("loading test batch in epoch {epoch}"))?
        {
            let targets = host_labels(batch.labels.clone().into_data())?;
            let logits = model.forward(batch.images);
            loss_total += scalar(self.loss.forward(logits.clone(), batch.labels))?;
            tally.update(&host_scores(logits)?, num_classes, &targets);
            batches += 1;
        }
        report_pass("test", epoch, iter.stats());
        let pct = tally.percentages();
        Ok(EvalSummary {
            loss: if batches == 0 { 0.0 } else { loss_total / batches as f64 },
            top1: pct[0],
            top5: pct[1],
            samples: tally.total(),
        })
    }

    fn save_checkpoint(&mut self, epoch: usize) -> anyhow::Result<()> {
        let path = self.paths.save::<B, _>(&self.model, epoch)?;
        debug!(epoch, path = %path.display(), "saved checkpoint");
        Ok(())
    }

    fn load_checkpoint(&mut self, epoch: usize) -> anyhow::Result<()> {
        self.model = self
            .paths
            .load::<B, _>(self.model.clone(), epoch, &self.device)?;
        Ok(())
    }

    fn checkpoint_exists(&self, epoch: usize) -> bool {
        self.paths.exists(epoch)
    }
}
