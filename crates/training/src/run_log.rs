//! File-backed run reporter: appended text log plus a loss plot.

use crate::controller::RunReporter;
use crate::plot::render_loss_plot;
use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct FileReporter {
    log_path: PathBuf,
    plot_path: PathBuf,
}

impl FileReporter {
    /// Nothing is created on disk until the first line or plot is written.
    pub fn new(log_path: impl Into<PathBuf>, plot_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            plot_path: plot_path.into(),
        }
    }
}

impl RunReporter for FileReporter {
    fn log_line(&mut self, line: &str) -> anyhow::Result<()> {
        if let Some(dir) = self.log_path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("opening run log {}", self.log_path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("appending to run log {}", self.log_path.display()))?;
        Ok(())
    }

    fn render_losses(&mut self, train: &[f64], test: &[f64]) -> anyhow::Result<()> {
        render_loss_plot(&self.plot_path, train, test)
    }
}
