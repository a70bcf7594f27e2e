use serde::Deserialize;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl Settings {
    /// Reads a TOML settings file. Every section is optional.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let settings: Settings =
            toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tool.version_timeout_secs == 0 {
            anyhow::bail!("invalid tool.version_timeout_secs=0 (must be > 0)");
        }
        if self.tool.show_timeout_secs == 0 {
            anyhow::bail!("invalid tool.show_timeout_secs=0 (must be > 0)");
        }
        if self.runner.hyperopt_timeout_secs == 0 {
            anyhow::bail!("invalid runner.hyperopt_timeout_secs=0 (must be > 0)");
        }
        if self.tool.min_version.trim().is_empty() {
            anyhow::bail!("tool.min_version must not be empty");
        }
        if self.tool.version_prefix.trim().is_empty() {
            anyhow::bail!("tool.version_prefix must not be empty");
        }
        if self.paths.known_prefix.trim().is_empty() {
            anyhow::bail!("paths.known_prefix must not be empty");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PathsConfig {
    /// Jobs CSV used when `--jobs` is not given.
    #[serde(default = "default_jobs_csv")]
    pub jobs_csv: PathBuf,
    /// Root under which one directory per session is created.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Relative job file paths without the known prefix resolve here by file name.
    #[serde(default = "default_user_data_dir")]
    pub user_data_dir: PathBuf,
    /// Working directory of the external tool; prefixed relative paths resolve here.
    #[serde(default = "default_tool_root")]
    pub tool_root: PathBuf,
    #[serde(default = "default_known_prefix")]
    pub known_prefix: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            jobs_csv: default_jobs_csv(),
            output_dir: default_output_dir(),
            user_data_dir: default_user_data_dir(),
            tool_root: default_tool_root(),
            known_prefix: default_known_prefix(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/home/facepipe/freqtrade/hyperopt-automation")
}

fn default_jobs_csv() -> PathBuf {
    default_base_dir().join("configs").join("hyperopt_configs.csv")
}

fn default_output_dir() -> PathBuf {
    default_base_dir().join("outputs")
}

fn default_user_data_dir() -> PathBuf {
    PathBuf::from("/home/facepipe/freqtrade/user_data")
}

fn default_tool_root() -> PathBuf {
    PathBuf::from("/home/facepipe/freqtrade")
}

fn default_known_prefix() -> String {
    "user_data/".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct ToolConfig {
    /// Probed in order; `~/` expands to `$HOME`. The first `freqtrade` on `PATH` is probed last.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
    #[serde(default = "default_search_path")]
    pub search_path: bool,
    #[serde(default = "default_binary_name")]
    pub binary_name: String,
    #[serde(default = "default_min_version")]
    pub min_version: String,
    /// Line prefix of the `--version` output that carries the version token.
    #[serde(default = "default_version_prefix")]
    pub version_prefix: String,
    #[serde(default = "default_version_timeout_secs")]
    pub version_timeout_secs: u64,
    /// Timeout for each `hyperopt-show` result dump.
    #[serde(default = "default_show_timeout_secs")]
    pub show_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            search_path: default_search_path(),
            binary_name: default_binary_name(),
            min_version: default_min_version(),
            version_prefix: default_version_prefix(),
            version_timeout_secs: default_version_timeout_secs(),
            show_timeout_secs: default_show_timeout_secs(),
        }
    }
}

fn default_candidates() -> Vec<String> {
    vec![
        "/home/facepipe/freqtrade/.venv/bin/freqtrade".to_string(),
        "~/.local/bin/freqtrade".to_string(),
        "/usr/local/bin/freqtrade".to_string(),
    ]
}

fn default_search_path() -> bool {
    true
}

fn default_binary_name() -> String {
    "freqtrade".to_string()
}

fn default_min_version() -> String {
    "2025.6".to_string()
}

fn default_version_prefix() -> String {
    "Freqtrade Version:".to_string()
}

fn default_version_timeout_secs() -> u64 {
    10
}

fn default_show_timeout_secs() -> u64 {
    60
}

#[derive(Clone, Debug, Deserialize)]
pub struct RunnerConfig {
    /// Hard limit for one optimization attempt (24h).
    #[serde(default = "default_hyperopt_timeout_secs")]
    pub hyperopt_timeout_secs: u64,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            hyperopt_timeout_secs: default_hyperopt_timeout_secs(),
            dry_run: false,
        }
    }
}

fn default_hyperopt_timeout_secs() -> u64 {
    86_400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let s: Settings = toml::from_str("").expect("parse");
        s.validate().expect("valid");
        assert_eq!(s.tool.min_version, "2025.6");
        assert_eq!(s.tool.version_timeout_secs, 10);
        assert_eq!(s.tool.show_timeout_secs, 60);
        assert_eq!(s.runner.hyperopt_timeout_secs, 86_400);
        assert_eq!(s.paths.known_prefix, "user_data/");
        assert!(!s.runner.dry_run);
    }

    #[test]
    fn partial_sections_override_only_named_keys() {
        let s: Settings = toml::from_str(
            "[tool]\nmin_version = \"2025.9\"\ncandidates = [\"/opt/ft\"]\n\n[runner]\nhyperopt_timeout_secs = 60\n",
        )
        .expect("parse");
        assert_eq!(s.tool.min_version, "2025.9");
        assert_eq!(s.tool.candidates, vec!["/opt/ft".to_string()]);
        assert_eq!(s.tool.show_timeout_secs, 60);
        assert_eq!(s.runner.hyperopt_timeout_secs, 60);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let s: Settings = toml::from_str("[runner]\nhyperopt_timeout_secs = 0\n").expect("parse");
        assert!(s.validate().is_err());
    }
}
