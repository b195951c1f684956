//! Epoch bookkeeping: train, checkpoint, evaluate, log, plot.
//!
//! The controller knows nothing about tensors or files. It drives an
//! [`EpochWorker`] for the model side and a [`RunReporter`] for the run log and
//! loss plot, so the schedule of side effects can be tested on its own.

use crate::schedule::StepLr;
use anyhow::Context;
use tracing::info;

/// Result of evaluating one epoch on the test split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalSummary {
    /// Mean per-batch loss.
    pub loss: f64,
    /// Top-1 accuracy in percent.
    pub top1: f64,
    /// Top-5 accuracy in percent.
    pub top5: f64,
    pub samples: usize,
}

/// Model-side capabilities used by the controller.
pub trait EpochWorker {
    /// Run one pass over the training split and return the mean batch loss.
    fn train_epoch(&mut self, epoch: usize, lr: f64) -> anyhow::Result<f64>;
    fn evaluate(&mut self, epoch: usize) -> anyhow::Result<EvalSummary>;
    fn save_checkpoint(&mut self, epoch: usize) -> anyhow::Result<()>;
    /// Replace the current parameters with checkpoint `epoch`; missing is an error.
    fn load_checkpoint(&mut self, epoch: usize) -> anyhow::Result<()>;
    fn checkpoint_exists(&self, epoch: usize) -> bool;
}

/// Run log and loss plot sink.
pub trait RunReporter {
    fn log_line(&mut self, line: &str) -> anyhow::Result<()>;
    fn render_losses(&mut self, train: &[f64], test: &[f64]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Ready,
    TrainingEpoch(usize),
    CheckpointedEpoch(usize),
    EvaluatingEpoch(usize),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub lr: f64,
    pub train_loss: f64,
    pub eval: EvalSummary,
}

pub fn train_line(epoch: usize, loss: f64) -> String {
    format!("Training epoch {epoch} avg loss is: {loss:.6}")
}

pub fn test_line(epoch: usize, eval: &EvalSummary) -> String {
    format!(
        "Testing epoch {epoch} accuracy is: top1: {:.2} top5: {:.2}",
        eval.top1, eval.top5
    )
}

pub struct EpochController<W, R> {
    worker: W,
    reporter: R,
    schedule: StepLr,
    state: ControllerState,
    train_losses: Vec<f64>,
    test_losses: Vec<f64>,
    history: Vec<EpochRecord>,
}

impl<W: EpochWorker, R: RunReporter> EpochController<W, R> {
    pub fn new(worker: W, reporter: R, schedule: StepLr) -> Self {
        Self {
            worker,
            reporter,
            schedule,
            state: ControllerState::Uninitialized,
            train_losses: Vec::new(),
            test_losses: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Load the checkpoint preceding `start_epoch`, if any.
    ///
    /// Only parameters are restored. Optimizer moments and the learning rate
    /// schedule start fresh.
    pub fn prepare(&mut self, start_epoch: usize) -> anyhow::Result<()> {
        if start_epoch > 0 {
            let resume_from = start_epoch - 1;
            self.worker
                .load_checkpoint(resume_from)
                .with_context(|| format!("resuming at epoch {start_epoch}"))?;
            info!(epoch = resume_from, "resumed from checkpoint");
        }
        self.state = ControllerState::Ready;
        Ok(())
    }

    /// Train epochs `start_epoch..num_epoch`.
    pub fn train_loops(&mut self, start_epoch: usize, num_epoch: usize) -> anyhow::Result<&[EpochRecord]> {
        if start_epoch > num_epoch {
            anyhow::bail!("start epoch {start_epoch} is past the final epoch {num_epoch}");
        }
        self.prepare(start_epoch)?;
        for epoch in start_epoch..num_epoch {
            let record = self.run_epoch(epoch)?;
            self.history.push(record);
        }
        self.state = ControllerState::Done;
        Ok(&self.history)
    }

    fn run_epoch(&mut self, epoch: usize) -> anyhow::Result<EpochRecord> {
        self.state = ControllerState::TrainingEpoch(epoch);
        let lr = self.schedule.current();
        let train_loss = self
            .worker
            .train_epoch(epoch, lr)
            .with_context(|| format!("training epoch {epoch}"))?;
        self.reporter.log_line(&train_line(epoch, train_loss))?;
        info!(epoch, lr, train_loss, "finished training epoch");

        self.worker
            .save_checkpoint(epoch)
            .with_context(|| format!("saving checkpoint for epoch {epoch}"))?;
        self.state = ControllerState::CheckpointedEpoch(epoch);

        self.state = ControllerState::EvaluatingEpoch(epoch);
        let eval = self
            .worker
            .evaluate(epoch)
            .with_context(|| format!("evaluating epoch {epoch}"))?;
        self.reporter.log_line(&test_line(epoch, &eval))?;
        info!(epoch, top1 = eval.top1, top5 = eval.top5, test_loss = eval.loss, "evaluated epoch");

        self.schedule.step();
        self.train_losses.push(train_loss);
        self.test_losses.push(eval.loss);
        self.reporter
            .render_losses(&self.train_losses, &self.test_losses)?;

        Ok(EpochRecord {
            epoch,
            lr,
            train_loss,
            eval,
        })
    }

    /// Evaluate a saved epoch without training.
    pub fn evaluate_checkpoint(&mut self, epoch: usize) -> anyhow::Result<EvalSummary> {
        self.worker
            .load_checkpoint(epoch)
            .with_context(|| format!("evaluating saved epoch {epoch}"))?;
        self.state = ControllerState::EvaluatingEpoch(epoch);
        let eval = self.worker.evaluate(epoch)?;
        self.reporter.log_line(&test_line(epoch, &eval))?;
        info!(epoch, top1 = eval.top1, top5 = eval.top5, "evaluated checkpoint");
        self.state = ControllerState::Done;
        Ok(eval)
    }

    pub fn checkpoint_exists(&self, epoch: usize) -> bool {
        self.worker.checkpoint_exists(epoch)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }
}
