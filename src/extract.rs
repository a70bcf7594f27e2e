use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{debug, error, warn};

use crate::jobs::JobDescriptor;
use crate::locator::ToolPath;
use crate::process::{self, ExecOutcome};
use crate::schema::{results_file, NOT_AVAILABLE};

const DETAILS_TRADES_MARKER: &str = "trades.";
const DETAILS_WDL_MARKER: &str = "Wins/Draws/Losses";
const TOTAL_PROFIT_MARKER: &str = "Total profit";

const TABLE_DELIMITERS: [char; 2] = ['|', '│'];
const TABLE_LABEL_COL: usize = 1;
const TABLE_VALUE_COL: usize = 2;

const PROFIT_FACTOR_LABEL: &str = "Profit factor";
/// Checked in order; the first label present in the table wins.
const DRAWDOWN_LABELS: [&str; 3] = [
    "Max % of account underwater",
    "Absolute Drawdown (Account)",
    "Max Drawdown",
];

/// `hyperopt-show` views dumped after each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultView {
    Best,
    Profitable,
}

impl ResultView {
    pub const ALL: [ResultView; 2] = [ResultView::Best, ResultView::Profitable];

    pub const fn as_str(self) -> &'static str {
        match self {
            ResultView::Best => "best",
            ResultView::Profitable => "profitable",
        }
    }

    pub const fn flag(self) -> &'static str {
        match self {
            ResultView::Best => "--best",
            ResultView::Profitable => "--profitable",
        }
    }
}

/// Metrics scraped from the `--best` view. `None` means not found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedMetrics {
    pub epoch: Option<String>,
    pub total_profit: Option<String>,
    pub trade_count: Option<String>,
    pub win_ratio: Option<String>,
    pub profit_factor: Option<String>,
    pub max_drawdown: Option<String>,
}

impl ScrapedMetrics {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Values in summary column order (epoch through max_drawdown), `N/A` for gaps.
    pub fn columns(&self) -> [String; 6] {
        [
            &self.epoch,
            &self.total_profit,
            &self.trade_count,
            &self.win_ratio,
            &self.profit_factor,
            &self.max_drawdown,
        ]
        .map(|v| v.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()))
    }
}

/// `wins / (wins + draws + losses) * 100`, or `None` with no trades or an overflowing total.
pub fn win_ratio_pct(wins: u64, draws: u64, losses: u64) -> Option<f64> {
    let total = wins.checked_add(draws)?.checked_add(losses)?;
    if total == 0 {
        return None;
    }
    Some(wins as f64 / total as f64 * 100.0)
}

/// Scrapes the metric set from captured `hyperopt-show --best` text.
pub fn parse_best_output(text: &str) -> ScrapedMetrics {
    let mut m = ScrapedMetrics::default();
    let mut drawdown_rank: Option<usize> = None;
    let mut details_seen = false;

    for line in text.lines() {
        if !details_seen
            && line.contains(DETAILS_TRADES_MARKER)
            && line.contains(DETAILS_WDL_MARKER)
        {
            parse_details_line(line, &mut m);
            details_seen = true;
            continue;
        }

        if !line.contains(TABLE_DELIMITERS) {
            continue;
        }
        let cells: Vec<&str> = line.split(TABLE_DELIMITERS).map(str::trim).collect();
        let (Some(label), Some(value)) = (cells.get(TABLE_LABEL_COL), cells.get(TABLE_VALUE_COL))
        else {
            continue;
        };
        if value.is_empty() {
            continue;
        }

        if m.profit_factor.is_none() && label.eq_ignore_ascii_case(PROFIT_FACTOR_LABEL) {
            m.profit_factor = Some(value.to_string());
            continue;
        }
        if let Some(rank) = DRAWDOWN_LABELS
            .iter()
            .position(|l| label.eq_ignore_ascii_case(l))
        {
            if drawdown_rank.map_or(true, |r| rank < r) {
                drawdown_rank = Some(rank);
                m.max_drawdown = Some(value.to_string());
            }
        }
    }

    m
}

fn parse_details_line(line: &str, m: &mut ScrapedMetrics) {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    // "*   188/1000:" or "Best result:   188/1000:"
    m.epoch = tokens
        .iter()
        .find(|t| t.ends_with(':') && t.contains('/'))
        .and_then(|t| t.trim_end_matches(':').split('/').next())
        .map(|e| e.trim_start_matches('*'))
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string);

    if let Some(i) = tokens.iter().position(|t| *t == DETAILS_TRADES_MARKER) {
        m.trade_count = i
            .checked_sub(1)
            .and_then(|j| tokens.get(j))
            .filter(|t| t.parse::<u64>().is_ok())
            .map(|t| t.to_string());
    }

    if let Some(i) = tokens.iter().position(|t| t.starts_with(DETAILS_WDL_MARKER)) {
        m.win_ratio = i
            .checked_sub(1)
            .and_then(|j| tokens.get(j))
            .and_then(|t| parse_wdl(t))
            .and_then(|(w, d, l)| win_ratio_pct(w, d, l))
            .map(|r| format!("{r:.1}"));
    }

    m.total_profit = parse_total_profit_pct(line);
}

fn parse_wdl(token: &str) -> Option<(u64, u64, u64)> {
    let mut it = token.split('/').map(|p| p.trim().parse::<u64>().ok());
    let w = it.next()??;
    let d = it.next()??;
    let l = it.next()??;
    if it.next().is_some() {
        return None;
    }
    Some((w, d, l))
}

/// `Total profit 7.53 USDT (   7.53%)` -> `7.53%`.
fn parse_total_profit_pct(line: &str) -> Option<String> {
    let start = line.find(TOTAL_PROFIT_MARKER)? + TOTAL_PROFIT_MARKER.len();
    let rest = &line[start..];
    let open = rest.find('(')?;
    let inner = &rest[open + 1..];
    let close = inner.find(')')?;
    let pct = inner[..close].trim();
    if pct.ends_with('%') && pct.len() > 1 {
        Some(pct.to_string())
    } else {
        None
    }
}

/// Dumps both result views for one attempt and scrapes the best one.
///
/// Never fails: errors are logged and the missing metrics stay `None`.
pub async fn dump_results(
    tool: &ToolPath,
    job: &JobDescriptor,
    run: u32,
    run_dir: &Path,
    cwd: &Path,
    timeout: Duration,
) -> ScrapedMetrics {
    let mut metrics = ScrapedMetrics::default();

    for view in ResultView::ALL {
        let out_path = run_dir.join(results_file(view.as_str(), run));
        match dump_view(tool, job, view, &out_path, cwd, timeout).await {
            Ok(text) => {
                if view == ResultView::Best {
                    metrics = parse_best_output(&text);
                    if metrics.is_empty() {
                        warn!(job = %job.name, run, "no metrics recognized in best results");
                    } else {
                        debug!(job = %job.name, run, ?metrics, "scraped best results");
                    }
                }
            }
            Err(err) => {
                error!(
                    job = %job.name,
                    run,
                    view = view.as_str(),
                    error = %format!("{err:#}"),
                    "failed to generate results"
                );
            }
        }
    }

    metrics
}

pub fn show_args(job: &JobDescriptor, view: ResultView) -> Vec<String> {
    vec![
        "hyperopt-show".to_string(),
        view.flag().to_string(),
        "-c".to_string(),
        job.config_file.display().to_string(),
        "-c".to_string(),
        job.pairs_file.display().to_string(),
    ]
}

async fn dump_view(
    tool: &ToolPath,
    job: &JobDescriptor,
    view: ResultView,
    out_path: &Path,
    cwd: &Path,
    timeout: Duration,
) -> anyhow::Result<String> {
    let cmd = process::command(&tool.path, show_args(job, view), Some(cwd));
    let res = process::run_captured(cmd, timeout)
        .await
        .with_context(|| format!("hyperopt-show {}", view.flag()))?;

    std::fs::write(out_path, &res.stdout)
        .with_context(|| format!("write {}", out_path.display()))?;

    match res.outcome {
        ExecOutcome::Success => Ok(res.stdout),
        ExecOutcome::TimedOut => anyhow::bail!("hyperopt-show {} timed out", view.flag()),
        other => {
            // A failing dump can still carry a usable report.
            warn!(job = %job.name, view = view.as_str(), outcome = %other, "hyperopt-show failed");
            Ok(res.stdout)
        }
    }
}
