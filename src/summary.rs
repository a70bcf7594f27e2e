use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use tracing::{debug, error};

use crate::extract::ScrapedMetrics;
use crate::jobs::JobDescriptor;
use crate::schema::SUMMARY_HEADER;

/// Outcome of one attempt, as written to the summary.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub config_name: String,
    pub strategy: String,
    pub timeframe: String,
    pub hyperopt_loss: String,
    pub config_file: PathBuf,
    pub pairs_file: PathBuf,
    pub run_number: u32,
    pub elapsed: Duration,
    pub metrics: ScrapedMetrics,
    pub output_dir: PathBuf,
}

impl AttemptResult {
    pub fn new(
        job: &JobDescriptor,
        run_number: u32,
        elapsed: Duration,
        metrics: ScrapedMetrics,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            config_name: job.name.clone(),
            strategy: job.strategy.clone(),
            timeframe: job.timeframe.clone(),
            hyperopt_loss: job.hyperopt_loss.clone(),
            config_file: job.config_file.clone(),
            pairs_file: job.pairs_file.clone(),
            run_number,
            elapsed,
            metrics,
            output_dir,
        }
    }

    pub fn record(&self) -> [String; 15] {
        let [epoch, total_profit, trade_count, win_ratio, profit_factor, max_drawdown] =
            self.metrics.columns();
        [
            self.config_name.clone(),
            self.strategy.clone(),
            self.timeframe.clone(),
            self.hyperopt_loss.clone(),
            self.config_file.display().to_string(),
            self.pairs_file.display().to_string(),
            self.run_number.to_string(),
            epoch,
            total_profit,
            trade_count,
            win_ratio,
            profit_factor,
            max_drawdown,
            format_elapsed(self.elapsed),
            self.output_dir.display().to_string(),
        ]
    }
}

/// `H:MM:SS`, hours unbounded.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Appends attempt rows to the session summary CSV.
///
/// The file is opened and closed per row so rows already written survive a crash.
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    path: PathBuf,
}

impl SummaryWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row. Failures are logged, never returned.
    pub fn append(&self, result: &AttemptResult) -> bool {
        match self.try_append(result) {
            Ok(()) => {
                debug!(
                    path = %self.path.display(),
                    job = %result.config_name,
                    run = result.run_number,
                    "summary row written"
                );
                true
            }
            Err(err) => {
                error!(
                    path = %self.path.display(),
                    job = %result.config_name,
                    run = result.run_number,
                    error = %format!("{err:#}"),
                    "failed to write summary row"
                );
                false
            }
        }
    }

    fn try_append(&self, result: &AttemptResult) -> anyhow::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;

        let is_empty = file
            .metadata()
            .with_context(|| format!("stat {}", self.path.display()))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if is_empty {
            writer
                .write_record(SUMMARY_HEADER)
                .with_context(|| format!("write header {}", self.path.display()))?;
        }
        writer
            .write_record(result.record())
            .with_context(|| format!("write row {}", self.path.display()))?;
        writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        Ok(())
    }
}
