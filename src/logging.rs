use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context as _;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Scoped log sink for one session.
///
/// Events go to the console and, once attached, to the session log file. The
/// subscriber is installed as the thread's default only while this handle lives,
/// so nothing global is reconfigured.
pub struct SessionLog {
    _guard: DefaultGuard,
}

impl SessionLog {
    /// Console only, for work done before the session directory exists.
    pub fn console() -> Self {
        let subscriber = Registry::default()
            .with(env_filter())
            .with(fmt::layer().with_target(false));
        Self {
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    /// Console plus an appended, timestamped file at `log_path`.
    pub fn with_file(log_path: &Path) -> anyhow::Result<Self> {
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("open log {}", log_path.display()))?;

        let subscriber = Registry::default()
            .with(env_filter())
            .with(fmt::layer().with_target(false))
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            );
        Ok(Self {
            _guard: tracing::subscriber::set_default(subscriber),
        })
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_receives_events() {
        let path = std::env::temp_dir().join(format!(
            "hyperbatch_log_{}_{}.log",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));

        {
            let _log = SessionLog::with_file(&path).expect("log");
            tracing::error!(job = "t1", "config file missing; skipping job");
        }

        let text = std::fs::read_to_string(&path).expect("read log");
        assert!(text.contains("config file missing"));
        assert!(text.contains("t1"));
        assert!(!text.contains('\u{1b}'));
        let _ = std::fs::remove_file(&path);
    }
}
