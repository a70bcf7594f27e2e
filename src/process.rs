use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context as _;
use tokio::io::AsyncReadExt as _;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Success,
    /// `None` when the process was terminated by a signal.
    NonZeroExit(Option<i32>),
    TimedOut,
}

impl ExecOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, ExecOutcome::Success)
    }
}

impl fmt::Display for ExecOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecOutcome::Success => f.write_str("success"),
            ExecOutcome::NonZeroExit(Some(code)) => write!(f, "exit code {code}"),
            ExecOutcome::NonZeroExit(None) => f.write_str("terminated by signal"),
            ExecOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Captured {
    pub outcome: ExecOutcome,
    pub stdout: String,
}

/// Builds a command for `program args...`, optionally bound to `cwd`.
pub fn command<I, S>(program: &Path, args: I, cwd: Option<&Path>) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd
}

/// Runs with stdout/stderr inherited from this process.
pub async fn run_foreground(mut cmd: Command, timeout: Duration) -> anyhow::Result<ExecOutcome> {
    cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    let mut child = cmd.spawn().context("spawn child process")?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status.context("wait for child process")?;
            Ok(outcome_of(status))
        }
        Err(_) => {
            kill(&mut child).await;
            Ok(ExecOutcome::TimedOut)
        }
    }
}

/// Runs with stdout collected; stderr is drained and logged at debug level.
///
/// On timeout whatever stdout arrived before the kill is returned.
pub async fn run_captured(mut cmd: Command, timeout: Duration) -> anyhow::Result<Captured> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().context("spawn child process")?;

    let mut stdout_pipe = child.stdout.take().context("child stdout not piped")?;
    let mut stderr_pipe = child.stderr.take().context("child stderr not piped")?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let finished = tokio::time::timeout(timeout, async {
        let (out, err) = tokio::join!(
            stdout_pipe.read_to_end(&mut stdout),
            stderr_pipe.read_to_end(&mut stderr)
        );
        out.context("read child stdout")?;
        err.context("read child stderr")?;
        child.wait().await.context("wait for child process")
    })
    .await;

    let outcome = match finished {
        Ok(status) => outcome_of(status?),
        Err(_) => {
            kill(&mut child).await;
            ExecOutcome::TimedOut
        }
    };

    if !stderr.is_empty() {
        debug!(stderr = %String::from_utf8_lossy(&stderr).trim_end(), "child stderr");
    }

    Ok(Captured {
        outcome,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
    })
}

fn outcome_of(status: std::process::ExitStatus) -> ExecOutcome {
    if status.success() {
        ExecOutcome::Success
    } else {
        ExecOutcome::NonZeroExit(status.code())
    }
}

async fn kill(child: &mut Child) {
    if let Err(err) = child.kill().await {
        warn!(error = %err, "failed to kill timed-out process");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        command(Path::new("/bin/sh"), ["-c", script], None)
    }

    #[tokio::test]
    async fn captures_stdout_of_successful_run() {
        let res = run_captured(sh("echo hello; echo oops 1>&2"), Duration::from_secs(5))
            .await
            .expect("run");
        assert_eq!(res.outcome, ExecOutcome::Success);
        assert_eq!(res.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn reports_non_zero_exit_code() {
        let outcome = run_foreground(sh("exit 3"), Duration::from_secs(5))
            .await
            .expect("run");
        assert_eq!(outcome, ExecOutcome::NonZeroExit(Some(3)));
        assert_eq!(outcome.to_string(), "exit code 3");
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let started = std::time::Instant::now();
        let outcome = run_foreground(sh("sleep 5"), Duration::from_millis(200))
            .await
            .expect("run");
        assert_eq!(outcome, ExecOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn captured_run_times_out() {
        let res = run_captured(sh("echo early; sleep 5"), Duration::from_millis(300))
            .await
            .expect("run");
        assert_eq!(res.outcome, ExecOutcome::TimedOut);
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let cmd = command(Path::new("/definitely/not/here"), ["--version"], None);
        assert!(run_foreground(cmd, Duration::from_secs(1)).await.is_err());
    }
}
