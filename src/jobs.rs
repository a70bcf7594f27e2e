use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Serialize;

use crate::config::PathsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Space {
    Buy,
    Sell,
    Roi,
    Stoploss,
    Trailing,
}

impl Space {
    pub const ALL: [Space; 5] = [
        Space::Buy,
        Space::Sell,
        Space::Roi,
        Space::Stoploss,
        Space::Trailing,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Space::Buy => "buy",
            Space::Sell => "sell",
            Space::Roi => "roi",
            Space::Stoploss => "stoploss",
            Space::Trailing => "trailing",
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Space::Buy => "space_buy",
            Space::Sell => "space_sell",
            Space::Roi => "space_roi",
            Space::Stoploss => "space_stoploss",
            Space::Trailing => "space_trailing",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the jobs CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub name: String,
    pub strategy: String,
    pub config_file: PathBuf,
    pub pairs_file: PathBuf,
    pub hyperopt_loss: String,
    pub epochs: u32,
    pub max_open_trades: u32,
    pub timeframe: String,
    pub days_back: u32,
    /// Indexed like `Space::ALL`.
    pub space_flags: [bool; 5],
    pub enable_protections: bool,
    pub num_runs: u32,
    pub sleep_between_runs_secs: u64,
}

impl JobDescriptor {
    /// Enabled spaces in fixed buy, sell, roi, stoploss, trailing order.
    pub fn spaces(&self) -> Vec<Space> {
        Space::ALL
            .iter()
            .zip(self.space_flags.iter())
            .filter(|(_, on)| **on)
            .map(|(s, _)| *s)
            .collect()
    }

    /// Referenced files that do not exist on disk.
    pub fn missing_files(&self) -> Vec<&Path> {
        [self.config_file.as_path(), self.pairs_file.as_path()]
            .into_iter()
            .filter(|p| !p.exists())
            .collect()
    }
}

/// Maps job file columns onto absolute locations.
#[derive(Debug, Clone)]
pub struct PathResolver {
    pub user_data_dir: PathBuf,
    pub tool_root: PathBuf,
    pub known_prefix: String,
}

impl PathResolver {
    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self {
            user_data_dir: paths.user_data_dir.clone(),
            tool_root: paths.tool_root.clone(),
            known_prefix: paths.known_prefix.clone(),
        }
    }

    pub fn resolve(&self, raw: &str) -> PathBuf {
        let raw = raw.trim();
        let path = Path::new(raw);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        if raw.starts_with(&self.known_prefix) {
            return self.tool_root.join(path);
        }
        match path.file_name() {
            Some(name) => self.user_data_dir.join(name),
            None => self.user_data_dir.join(path),
        }
    }
}

struct Columns {
    name: usize,
    strategy: usize,
    config: usize,
    pairs: usize,
    hyperopt_loss: usize,
    epochs: usize,
    max_open_trades: usize,
    timeframe: usize,
    days_back: usize,
    spaces: [usize; 5],
    enable_protections: usize,
    num_runs: usize,
    sleep_between_runs: usize,
}

impl Columns {
    fn new(header: &csv::StringRecord) -> anyhow::Result<Self> {
        let col = |name: &str| find_col(header, name).with_context(|| format!("missing column: {name}"));

        let config = match find_col(header, "config") {
            Some(i) => i,
            None => col("config_file").context("missing column: config")?,
        };

        let mut spaces = [0usize; 5];
        for (slot, space) in spaces.iter_mut().zip(Space::ALL) {
            *slot = col(space.column())?;
        }

        Ok(Self {
            name: col("name")?,
            strategy: col("strategy")?,
            config,
            pairs: col("pairs")?,
            hyperopt_loss: col("hyperopt_loss")?,
            epochs: col("epochs")?,
            max_open_trades: col("max_open_trades")?,
            timeframe: col("timeframe")?,
            days_back: col("days_back")?,
            spaces,
            enable_protections: col("enable_protections")?,
            num_runs: col("num_runs")?,
            sleep_between_runs: col("sleep_between_runs")?,
        })
    }
}

fn find_col(header: &csv::StringRecord, name: &str) -> Option<usize> {
    header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Loads every row or nothing: the first bad row fails the whole file.
pub fn load_jobs(path: &Path, resolver: &PathResolver) -> anyhow::Result<Vec<JobDescriptor>> {
    if !path.exists() {
        anyhow::bail!("jobs csv missing at {}", path.display());
    }

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;

    let header = rdr
        .headers()
        .with_context(|| format!("read header {}", path.display()))?
        .clone();
    let cols = Columns::new(&header).with_context(|| format!("jobs csv {}", path.display()))?;

    let mut out = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let row = i + 1;
        let record = record.with_context(|| format!("read row {row} of {}", path.display()))?;
        let job = parse_row(&record, &cols, resolver)
            .with_context(|| format!("invalid row {row} in {}", path.display()))?;
        out.push(job);
    }
    Ok(out)
}

fn parse_row(
    record: &csv::StringRecord,
    cols: &Columns,
    resolver: &PathResolver,
) -> anyhow::Result<JobDescriptor> {
    let text = |idx: usize, name: &str| -> anyhow::Result<String> {
        record
            .get(idx)
            .map(|v| v.trim().to_string())
            .with_context(|| format!("missing value for {name}"))
    };
    let flag = |idx: usize, name: &str| -> anyhow::Result<bool> {
        Ok(text(idx, name)?.eq_ignore_ascii_case("true"))
    };

    let mut space_flags = [false; 5];
    for ((slot, idx), space) in space_flags.iter_mut().zip(cols.spaces).zip(Space::ALL) {
        *slot = flag(idx, space.column())?;
    }

    let num_runs: u32 = parse_int(&text(cols.num_runs, "num_runs")?, "num_runs")?;
    if num_runs == 0 {
        anyhow::bail!("num_runs must be >= 1");
    }

    Ok(JobDescriptor {
        name: text(cols.name, "name")?,
        strategy: text(cols.strategy, "strategy")?,
        config_file: resolver.resolve(&text(cols.config, "config")?),
        pairs_file: resolver.resolve(&text(cols.pairs, "pairs")?),
        hyperopt_loss: text(cols.hyperopt_loss, "hyperopt_loss")?,
        epochs: parse_int(&text(cols.epochs, "epochs")?, "epochs")?,
        max_open_trades: parse_int(&text(cols.max_open_trades, "max_open_trades")?, "max_open_trades")?,
        timeframe: text(cols.timeframe, "timeframe")?,
        days_back: parse_int(&text(cols.days_back, "days_back")?, "days_back")?,
        space_flags,
        enable_protections: flag(cols.enable_protections, "enable_protections")?,
        num_runs,
        sleep_between_runs_secs: parse_int(
            &text(cols.sleep_between_runs, "sleep_between_runs")?,
            "sleep_between_runs",
        )?,
    })
}

fn parse_int<T>(raw: &str, name: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("{name}: expected integer, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver {
            user_data_dir: PathBuf::from("/ft/user_data"),
            tool_root: PathBuf::from("/ft"),
            known_prefix: "user_data/".to_string(),
        }
    }

    #[test]
    fn absolute_path_is_kept() {
        assert_eq!(resolver().resolve("/etc/cfg.json"), PathBuf::from("/etc/cfg.json"));
    }

    #[test]
    fn relative_path_keeps_only_file_name() {
        let r = resolver();
        assert_eq!(r.resolve("configs/deep/a.json"), PathBuf::from("/ft/user_data/a.json"));
        assert_eq!(r.resolve("a.json"), PathBuf::from("/ft/user_data/a.json"));
    }

    #[test]
    fn known_prefix_joins_under_tool_root() {
        assert_eq!(
            resolver().resolve("user_data/pairs/btc.json"),
            PathBuf::from("/ft/user_data/pairs/btc.json")
        );
    }

    #[test]
    fn spaces_follow_fixed_order() {
        let job = JobDescriptor {
            name: "n".to_string(),
            strategy: "S".to_string(),
            config_file: PathBuf::from("/c"),
            pairs_file: PathBuf::from("/p"),
            hyperopt_loss: "L".to_string(),
            epochs: 1,
            max_open_trades: 1,
            timeframe: "5m".to_string(),
            days_back: 1,
            space_flags: [false, true, false, true, true],
            enable_protections: false,
            num_runs: 1,
            sleep_between_runs_secs: 0,
        };
        assert_eq!(job.spaces(), vec![Space::Sell, Space::Stoploss, Space::Trailing]);
    }
}
