use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use chrono::{Days, Local, NaiveDate};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::extract::{self, ScrapedMetrics};
use crate::jobs::{JobDescriptor, Space};
use crate::locator::ToolPath;
use crate::process::{self, ExecOutcome};
use crate::schema::{run_dir_name, run_snapshot_file};
use crate::summary::{AttemptResult, SummaryWriter};

/// Per-session knobs the runner needs from the settings file and CLI.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub tool_root: PathBuf,
    pub hyperopt_timeout: Duration,
    pub show_timeout: Duration,
    pub dry_run: bool,
}

impl RunnerSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            tool_root: settings.paths.tool_root.clone(),
            hyperopt_timeout: Duration::from_secs(settings.runner.hyperopt_timeout_secs),
            show_timeout: Duration::from_secs(settings.tool.show_timeout_secs),
            dry_run: settings.runner.dry_run,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every attempt produced a summary row.
    Completed,
    /// At least one attempt was abandoned.
    PartiallyCompleted,
    /// A referenced file was missing; nothing ran.
    Skipped,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobOutcome::Completed => "completed",
            JobOutcome::PartiallyCompleted => "partially_completed",
            JobOutcome::Skipped => "skipped",
        })
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub name: String,
    pub outcome: JobOutcome,
    pub attempts: Vec<AttemptResult>,
    pub failed_attempts: u32,
    pub rows_written: u32,
}

impl JobReport {
    fn skipped(job: &JobDescriptor) -> Self {
        Self {
            name: job.name.clone(),
            outcome: JobOutcome::Skipped,
            attempts: Vec::new(),
            failed_attempts: 0,
            rows_written: 0,
        }
    }
}

/// `<session>/<timeframe>/<loss>/<strategy>`
pub fn job_dir(session_dir: &Path, job: &JobDescriptor) -> PathBuf {
    session_dir
        .join(&job.timeframe)
        .join(&job.hyperopt_loss)
        .join(&job.strategy)
}

/// Open-ended range starting `days_back` days before `today`, e.g. `20250101-`.
///
/// `None` when the start date falls outside the calendar chrono can represent.
pub fn timerange(today: NaiveDate, days_back: u32) -> Option<String> {
    let start = today.checked_sub_days(Days::new(u64::from(days_back)))?;
    Some(format!("{}-", start.format("%Y%m%d")))
}

/// Pause owed before attempt `run`. Only repetitions after the first wait.
pub fn delay_before_run(job: &JobDescriptor, run: u32, dry_run: bool) -> Option<Duration> {
    if run <= 1 || dry_run || job.sleep_between_runs_secs == 0 {
        return None;
    }
    Some(Duration::from_secs(job.sleep_between_runs_secs))
}

pub fn hyperopt_args(job: &JobDescriptor, timerange: &str) -> Vec<String> {
    let mut args = vec![
        "hyperopt".to_string(),
        "-s".to_string(),
        job.strategy.clone(),
        "--hyperopt-loss".to_string(),
        job.hyperopt_loss.clone(),
        "-e".to_string(),
        job.epochs.to_string(),
        "--max-open-trades".to_string(),
        job.max_open_trades.to_string(),
        "-c".to_string(),
        job.config_file.display().to_string(),
        "-c".to_string(),
        job.pairs_file.display().to_string(),
    ];

    let spaces = job.spaces();
    if !spaces.is_empty() {
        args.push("--spaces".to_string());
        args.extend(spaces.iter().map(|s| s.as_str().to_string()));
    }

    args.push("--timerange".to_string());
    args.push(timerange.to_string());

    if job.enable_protections {
        args.push("--enable-protections".to_string());
    }
    args
}

/// What was launched for one attempt, written next to its results.
#[derive(Debug, Serialize)]
struct RunSnapshot<'a> {
    name: &'a str,
    strategy: &'a str,
    hyperopt_loss: &'a str,
    epochs: u32,
    max_open_trades: u32,
    timeframe: &'a str,
    timerange: &'a str,
    spaces: Vec<Space>,
    enable_protections: bool,
    config_file: String,
    pairs_file: String,
    run_number: u32,
    command: Vec<String>,
}

impl RunSnapshot<'_> {
    fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self).context("serialize run snapshot")?;
        std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

/// Runs every attempt of `job` in order, appending one summary row per finished attempt.
pub async fn run_job(
    job: &JobDescriptor,
    session_dir: &Path,
    tool: &ToolPath,
    settings: &RunnerSettings,
    summary: &SummaryWriter,
) -> JobReport {
    let missing = job.missing_files();
    if !missing.is_empty() {
        for path in missing {
            error!(job = %job.name, path = %path.display(), "config file missing; skipping job");
        }
        return JobReport::skipped(job);
    }
    if timerange(Local::now().date_naive(), job.days_back).is_none() {
        error!(job = %job.name, days_back = job.days_back, "days_back out of range; skipping job");
        return JobReport::skipped(job);
    }

    let dir = job_dir(session_dir, job);
    if let Err(err) = std::fs::create_dir_all(&dir) {
        error!(job = %job.name, dir = %dir.display(), error = %err, "create job dir failed; skipping job");
        return JobReport::skipped(job);
    }

    let mut report = JobReport {
        name: job.name.clone(),
        outcome: JobOutcome::Completed,
        attempts: Vec::with_capacity(job.num_runs as usize),
        failed_attempts: 0,
        rows_written: 0,
    };

    for run in 1..=job.num_runs {
        if let Some(delay) = delay_before_run(job, run, settings.dry_run) {
            info!(job = %job.name, secs = delay.as_secs(), "sleeping between runs");
            tokio::time::sleep(delay).await;
        }

        match run_attempt(job, run, &dir, tool, settings).await {
            Some(result) => {
                if summary.append(&result) {
                    report.rows_written += 1;
                }
                report.attempts.push(result);
            }
            None => report.failed_attempts += 1,
        }
    }

    if report.failed_attempts > 0 {
        report.outcome = JobOutcome::PartiallyCompleted;
    }
    report
}

async fn run_attempt(
    job: &JobDescriptor,
    run: u32,
    job_dir: &Path,
    tool: &ToolPath,
    settings: &RunnerSettings,
) -> Option<AttemptResult> {
    let run_dir = job_dir.join(run_dir_name(run));
    if let Err(err) = std::fs::create_dir_all(&run_dir) {
        error!(job = %job.name, run, dir = %run_dir.display(), error = %err, "create run dir failed");
        return None;
    }

    let Some(range) = timerange(Local::now().date_naive(), job.days_back) else {
        error!(job = %job.name, run, days_back = job.days_back, "days_back out of range");
        return None;
    };
    let args = hyperopt_args(job, &range);
    let command_line = std::iter::once(tool.path.display().to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>();
    info!(job = %job.name, run, command = %command_line.join(" "), "starting run");

    let snapshot = RunSnapshot {
        name: &job.name,
        strategy: &job.strategy,
        hyperopt_loss: &job.hyperopt_loss,
        epochs: job.epochs,
        max_open_trades: job.max_open_trades,
        timeframe: &job.timeframe,
        timerange: &range,
        spaces: job.spaces(),
        enable_protections: job.enable_protections,
        config_file: job.config_file.display().to_string(),
        pairs_file: job.pairs_file.display().to_string(),
        run_number: run,
        command: command_line,
    };
    if let Err(err) = snapshot.write_to(&run_dir.join(run_snapshot_file(run))) {
        warn!(job = %job.name, run, error = %format!("{err:#}"), "failed to write run snapshot");
    }

    if settings.dry_run {
        info!(job = %job.name, run, "dry run; not launching");
        return Some(AttemptResult::new(
            job,
            run,
            Duration::ZERO,
            ScrapedMetrics::default(),
            run_dir,
        ));
    }

    let started = Instant::now();
    let cmd = process::command(&tool.path, &args, Some(settings.tool_root.as_path()));
    let outcome = match process::run_foreground(cmd, settings.hyperopt_timeout).await {
        Ok(o) => o,
        Err(err) => {
            error!(job = %job.name, run, error = %format!("{err:#}"), "failed to launch hyperopt");
            return None;
        }
    };
    let elapsed = started.elapsed();

    match outcome {
        ExecOutcome::Success => {}
        ExecOutcome::TimedOut => {
            error!(
                job = %job.name,
                run,
                timeout_secs = settings.hyperopt_timeout.as_secs(),
                "hyperopt timed out; run abandoned"
            );
            return None;
        }
        ExecOutcome::NonZeroExit(_) => {
            error!(job = %job.name, run, outcome = %outcome, "hyperopt failed; run abandoned");
            return None;
        }
    }

    let metrics = extract::dump_results(
        tool,
        job,
        run,
        &run_dir,
        &settings.tool_root,
        settings.show_timeout,
    )
    .await;

    info!(
        job = %job.name,
        run,
        elapsed_secs = elapsed.as_secs(),
        epoch = metrics.epoch.as_deref().unwrap_or("-"),
        total_profit = metrics.total_profit.as_deref().unwrap_or("-"),
        "run finished"
    );

    Some(AttemptResult::new(job, run, elapsed, metrics, run_dir))
}
