use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::ToolConfig;
use crate::process::{self, ExecOutcome};

/// A located external tool that passed the version gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPath {
    pub path: PathBuf,
    pub version: String,
}

/// Dotted numeric version, e.g. `2025.10`.
///
/// Components compare numerically, so `2025.10 > 2025.9`. Each component only
/// keeps its leading digits (`6-dev` reads as `6`); a missing component is `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersion(Vec<u64>);

impl ToolVersion {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_start_matches(['v', 'V']);
        if raw.is_empty() {
            return None;
        }
        let mut parts = Vec::new();
        for part in raw.split('.') {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            parts.push(digits.parse::<u64>().ok()?);
        }
        if parts.is_empty() {
            None
        } else {
            Some(Self(parts))
        }
    }
}

impl Ord for ToolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let n = self.0.len().max(other.0.len());
        for i in 0..n {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for ToolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

/// Last whitespace token of the first line starting with `prefix`.
pub fn parse_version_line(output: &str, prefix: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(prefix))
        .and_then(|line| line.split_whitespace().last())
        .map(str::to_string)
}

/// Candidate executables in probe order, deduplicated.
///
/// `explicit` (from the command line) goes first, then the configured list, then the
/// first match on `PATH`.
pub fn candidate_paths(cfg: &ToolConfig, explicit: Option<&Path>) -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);

    let mut out: Vec<PathBuf> = Vec::new();
    let mut push = |p: PathBuf| {
        if !out.contains(&p) {
            out.push(p);
        }
    };

    if let Some(p) = explicit {
        push(p.to_path_buf());
    }
    for raw in &cfg.candidates {
        push(expand_home(raw, home.as_deref()));
    }
    if cfg.search_path {
        if let Some(p) = which(&cfg.binary_name) {
            push(p);
        }
    }
    out
}

fn expand_home(raw: &str, home: Option<&Path>) -> PathBuf {
    match (raw.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

fn which(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|p| p.is_file())
}

/// Probes `candidates` in order and returns the first whose version meets `cfg.min_version`.
///
/// The error lists every probed candidate.
pub async fn locate_tool(cfg: &ToolConfig, candidates: &[PathBuf]) -> anyhow::Result<ToolPath> {
    let min = ToolVersion::parse(&cfg.min_version)
        .ok_or_else(|| anyhow::anyhow!("invalid tool.min_version {:?}", cfg.min_version))?;
    let timeout = Duration::from_secs(cfg.version_timeout_secs);

    for path in candidates {
        if !path.exists() {
            debug!(path = %path.display(), "candidate does not exist");
            continue;
        }

        let version = match probe_version(path, &cfg.version_prefix, timeout).await {
            Ok(v) => v,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "candidate check failed");
                continue;
            }
        };

        match ToolVersion::parse(&version) {
            Some(v) if v >= min => {
                info!(path = %path.display(), version = %version, "external tool located");
                return Ok(ToolPath {
                    path: path.clone(),
                    version,
                });
            }
            Some(_) => {
                debug!(path = %path.display(), version = %version, min = %min, "candidate too old");
            }
            None => {
                debug!(path = %path.display(), version = %version, "unparseable version");
            }
        }
    }

    let tried: Vec<String> = candidates
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect();
    anyhow::bail!(
        "external tool not found (need version >= {}). Tried:\n{}",
        cfg.min_version,
        tried.join("\n")
    )
}

async fn probe_version(path: &Path, prefix: &str, timeout: Duration) -> anyhow::Result<String> {
    let cmd = process::command(path, ["--version"], None);
    let res = process::run_captured(cmd, timeout).await?;
    if res.outcome != ExecOutcome::Success {
        anyhow::bail!("--version {}", res.outcome);
    }
    parse_version_line(&res.stdout, prefix)
        .ok_or_else(|| anyhow::anyhow!("no {prefix:?} line in --version output"))
}
