pub const FILE_SUMMARY: &str = "hyperopt_summary.csv";
pub const FILE_SESSION_LOG: &str = "hyperopt_automation.log";
pub const LATEST_LINK: &str = "latest";

/// Placeholder for any metric the result dump did not yield.
pub const NOT_AVAILABLE: &str = "N/A";

pub const SUMMARY_HEADER: [&str; 15] = [
    "config_name",
    "strategy",
    "timeframe",
    "hyperopt_loss",
    "config_file",
    "pairs_file",
    "run_number",
    "epoch",
    "total_profit",
    "trade_count",
    "win_ratio",
    "profit_factor",
    "max_drawdown",
    "elapsed_time",
    "output_dir",
];

pub fn run_dir_name(run: u32) -> String {
    format!("run_{run}")
}

pub fn run_snapshot_file(run: u32) -> String {
    format!("config_run{run}.json")
}

pub fn results_file(view: &str, run: u32) -> String {
    format!("results_{view}_run{run}.txt")
}
