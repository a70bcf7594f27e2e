use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use crate::jobs::JobDescriptor;
use crate::locator::ToolPath;
use crate::runner::{self, JobOutcome, RunnerSettings};
use crate::schema::{FILE_SESSION_LOG, FILE_SUMMARY, LATEST_LINK};
use crate::summary::SummaryWriter;

/// One invocation of the batch runner: a timestamped directory holding the log and summary.
#[derive(Clone, Debug)]
pub struct Session {
    pub timestamp: String,
    pub dir: PathBuf,
}

impl Session {
    /// Allocates `<output_root>/<YYYYMMDD_HHMMSS>` (suffixed `_N` on collision).
    pub fn create(output_root: &Path, now: DateTime<Local>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(output_root)
            .with_context(|| format!("create {}", output_root.display()))?;

        let base = format_timestamp(now);
        for attempt in 0..1000u32 {
            let timestamp = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let dir = output_root.join(&timestamp);
            match std::fs::create_dir(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("create {}", dir.display()));
                }
            }
            if let Err(err) = update_latest_symlink(output_root, &dir) {
                warn!(error = %format!("{err:#}"), "failed to update latest symlink");
            }
            return Ok(Self { timestamp, dir });
        }

        anyhow::bail!("failed to allocate unique session dir after many attempts")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(FILE_SUMMARY)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(FILE_SESSION_LOG)
    }
}

pub fn format_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

fn update_latest_symlink(output_root: &Path, session_dir: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::symlink;

        let link_path = output_root.join(LATEST_LINK);
        let target = session_dir.strip_prefix(output_root).unwrap_or(session_dir);
        if let Ok(meta) = std::fs::symlink_metadata(&link_path) {
            if !meta.file_type().is_symlink() {
                anyhow::bail!("refusing to overwrite non-symlink {}", link_path.display());
            }
            std::fs::remove_file(&link_path)?;
        }

        symlink(target, link_path)?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = (output_root, session_dir, LATEST_LINK);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub jobs_total: usize,
    pub jobs_completed: usize,
    pub jobs_partial: usize,
    pub jobs_skipped: usize,
    pub attempts_failed: u32,
    pub rows_written: u32,
    pub summary_exists: bool,
}

/// Runs every job in file order. Per-job and per-attempt failures are logged, never returned.
pub async fn run_session(
    jobs: &[JobDescriptor],
    session: &Session,
    tool: &ToolPath,
    settings: &RunnerSettings,
) -> SessionReport {
    let summary = SummaryWriter::new(session.summary_path());
    let mut report = SessionReport {
        jobs_total: jobs.len(),
        ..SessionReport::default()
    };

    for (i, job) in jobs.iter().enumerate() {
        info!(
            job = %job.name,
            index = i + 1,
            total = jobs.len(),
            runs = job.num_runs,
            strategy = %job.strategy,
            "job start"
        );

        let job_report = runner::run_job(job, &session.dir, tool, settings, &summary).await;

        report.attempts_failed += job_report.failed_attempts;
        report.rows_written += job_report.rows_written;
        match job_report.outcome {
            JobOutcome::Completed => report.jobs_completed += 1,
            JobOutcome::PartiallyCompleted => report.jobs_partial += 1,
            JobOutcome::Skipped => report.jobs_skipped += 1,
        }

        match job_report.outcome {
            JobOutcome::Skipped => error!(job = %job.name, "job skipped"),
            outcome => info!(
                job = %job.name,
                %outcome,
                runs = job_report.attempts.len(),
                failed = job_report.failed_attempts,
                "completed {} runs for {}",
                job_report.attempts.len(),
                job.name
            ),
        }
    }

    report.summary_exists = summary.path().exists();
    if report.summary_exists {
        info!(
            path = %summary.path().display(),
            rows = report.rows_written,
            "summary written"
        );
    } else {
        warn!(path = %summary.path().display(), "no summary file produced");
    }

    info!(
        jobs = report.jobs_total,
        completed = report.jobs_completed,
        partial = report.jobs_partial,
        skipped = report.jobs_skipped,
        attempts_failed = report.attempts_failed,
        "session done"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn tmp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "hyperbatch_session_{name}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn timestamp_format_is_stable() {
        let now = Local
            .with_ymd_and_hms(2025, 7, 4, 9, 5, 3)
            .single()
            .expect("local time");
        assert_eq!(format_timestamp(now), "20250704_090503");
    }

    #[test]
    fn same_second_sessions_get_distinct_dirs() {
        let root = tmp_root("collide");
        let now = Local::now();
        let a = Session::create(&root, now).expect("first");
        let b = Session::create(&root, now).expect("second");
        assert_ne!(a.dir, b.dir);
        assert!(b.timestamp.starts_with(&a.timestamp));
        assert_eq!(a.summary_path(), a.dir.join("hyperopt_summary.csv"));

        #[cfg(unix)]
        {
            let link = std::fs::read_link(root.join(LATEST_LINK)).expect("latest link");
            assert_eq!(link, PathBuf::from(&b.timestamp));
        }

        let _ = std::fs::remove_dir_all(&root);
    }
}
