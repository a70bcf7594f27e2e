use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use chrono::Local;
use clap::Parser;
use tracing::{error, info};

use hyperbatch::config::Settings;
use hyperbatch::jobs::{self, PathResolver};
use hyperbatch::locator;
use hyperbatch::logging::SessionLog;
use hyperbatch::runner::RunnerSettings;
use hyperbatch::session::{self, Session};

#[derive(Parser, Debug)]
#[command(
    name = "hyperbatch",
    version,
    about = "Run freqtrade hyperopt for every row of a jobs CSV and collect a summary"
)]
struct Args {
    /// Jobs CSV (default: paths.jobs_csv from settings).
    #[arg(long)]
    jobs: Option<PathBuf>,

    /// Optional TOML settings file; built-in defaults apply otherwise.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Root for session directories (default: paths.output_dir from settings).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Probe this executable before the configured candidates.
    #[arg(long)]
    tool: Option<PathBuf>,

    /// Log commands and write run snapshots without launching hyperopt.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _console = SessionLog::console();

    let mut settings = match load_settings(&args) {
        Ok(s) => s,
        Err(err) => {
            error!(error = %format!("{err:#}"), "fatal: settings");
            return ExitCode::FAILURE;
        }
    };
    if let Some(dir) = &args.output_dir {
        settings.paths.output_dir = dir.clone();
    }
    if let Some(jobs) = &args.jobs {
        settings.paths.jobs_csv = jobs.clone();
    }
    settings.runner.dry_run |= args.dry_run;

    let session = match Session::create(&settings.paths.output_dir, Local::now()) {
        Ok(s) => s,
        Err(err) => {
            error!(error = %format!("{err:#}"), "fatal: create session dir");
            return ExitCode::FAILURE;
        }
    };

    let _log = match SessionLog::with_file(&session.log_path()) {
        Ok(l) => l,
        Err(err) => {
            error!(error = %format!("{err:#}"), "fatal: open session log");
            return ExitCode::FAILURE;
        }
    };

    match run(&args, &settings, &session).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "fatal error");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    match &args.settings {
        Some(path) => Settings::load(path).context("load settings"),
        None => Ok(Settings::default()),
    }
}

async fn run(args: &Args, settings: &Settings, session: &Session) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        session = %session.timestamp,
        dir = %session.dir.display(),
        dry_run = settings.runner.dry_run,
        "hyperbatch starting"
    );

    let candidates = locator::candidate_paths(&settings.tool, args.tool.as_deref());
    let tool = locator::locate_tool(&settings.tool, &candidates)
        .await
        .context("locate external tool")?;

    let resolver = PathResolver::from_paths(&settings.paths);
    let jobs = jobs::load_jobs(&settings.paths.jobs_csv, &resolver).context("load jobs")?;
    info!(count = jobs.len(), path = %settings.paths.jobs_csv.display(), "loaded jobs");

    let runner_settings = RunnerSettings::from_settings(settings);
    session::run_session(&jobs, session, &tool, &runner_settings).await;
    Ok(())
}
