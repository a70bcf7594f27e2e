use std::fs;
use std::path::{Path, PathBuf};

use hyperbatch::jobs::{load_jobs, PathResolver, Space};

const HEADER: &str = "name,strategy,config,pairs,hyperopt_loss,epochs,max_open_trades,timeframe,days_back,space_buy,space_sell,space_roi,space_stoploss,space_trailing,enable_protections,num_runs,sleep_between_runs\n";

fn tmp_csv(name: &str, contents: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!(
        "hyperbatch_jobs_{name}_{}_{}.csv",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));
    fs::write(&p, contents).expect("write tmp csv");
    p
}

fn resolver() -> PathResolver {
    PathResolver {
        user_data_dir: PathBuf::from("/ft/user_data"),
        tool_root: PathBuf::from("/ft"),
        known_prefix: "user_data/".to_string(),
    }
}

#[test]
fn rows_load_in_file_order() {
    let csv = format!(
        "{HEADER}\
alpha,StratA,configs/config.json,user_data/pairs_a.json,SharpeHyperOptLoss,100,3,5m,30,TRUE,true,False,false,no,True,2,10\n\
beta,StratB,/abs/config.json,pairs_b.json,CalmarHyperOptLoss,50,1,1h,90,false,false,true,true,true,false,1,0\n\
gamma,StratC,config.json,pairs_c.json,OnlyProfitHyperOptLoss,10,5,15m,7,false,false,false,false,false,false,3,0\n"
    );
    let path = tmp_csv("order", &csv);
    let jobs = load_jobs(&path, &resolver()).expect("load");

    let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);

    let a = &jobs[0];
    assert_eq!(a.strategy, "StratA");
    assert_eq!(a.config_file, PathBuf::from("/ft/user_data/config.json"));
    assert_eq!(a.pairs_file, PathBuf::from("/ft/user_data/pairs_a.json"));
    assert_eq!(a.epochs, 100);
    assert_eq!(a.max_open_trades, 3);
    assert_eq!(a.timeframe, "5m");
    assert_eq!(a.days_back, 30);
    assert_eq!(a.spaces(), vec![Space::Buy, Space::Sell]);
    assert!(a.enable_protections);
    assert_eq!(a.num_runs, 2);
    assert_eq!(a.sleep_between_runs_secs, 10);

    let b = &jobs[1];
    assert_eq!(b.config_file, PathBuf::from("/abs/config.json"));
    assert_eq!(b.pairs_file, PathBuf::from("/ft/user_data/pairs_b.json"));
    assert_eq!(b.spaces(), vec![Space::Roi, Space::Stoploss, Space::Trailing]);
    assert!(!b.enable_protections);

    assert!(jobs[2].spaces().is_empty());
    let _ = fs::remove_file(&path);
}

#[test]
fn missing_column_fails_whole_load() {
    let header = HEADER.replace(",pairs", "");
    let csv = format!(
        "{header}alpha,StratA,config.json,SharpeHyperOptLoss,100,3,5m,30,true,true,false,false,false,false,1,0\n"
    );
    let path = tmp_csv("missing_col", &csv);
    let err = load_jobs(&path, &resolver()).expect_err("must fail");
    assert!(format!("{err:#}").contains("missing column: pairs"));
    let _ = fs::remove_file(&path);
}

#[test]
fn bad_integer_on_a_later_row_returns_no_jobs() {
    let csv = format!(
        "{HEADER}\
ok,StratA,config.json,pairs.json,L,100,3,5m,30,true,true,false,false,false,false,1,0\n\
bad,StratB,config.json,pairs.json,L,many,3,5m,30,true,true,false,false,false,false,1,0\n"
    );
    let path = tmp_csv("bad_int", &csv);
    let err = load_jobs(&path, &resolver()).expect_err("must fail");
    let msg = format!("{err:#}");
    assert!(msg.contains("row 2"), "{msg}");
    assert!(msg.contains("epochs"), "{msg}");
    let _ = fs::remove_file(&path);
}

#[test]
fn zero_runs_is_rejected() {
    let csv = format!("{HEADER}z,S,c.json,p.json,L,1,1,5m,1,true,false,false,false,false,false,0,0\n");
    let path = tmp_csv("zero_runs", &csv);
    assert!(load_jobs(&path, &resolver()).is_err());
    let _ = fs::remove_file(&path);
}

#[test]
fn short_row_is_rejected() {
    let csv = format!("{HEADER}short,S,c.json\n");
    let path = tmp_csv("short_row", &csv);
    assert!(load_jobs(&path, &resolver()).is_err());
    let _ = fs::remove_file(&path);
}

#[test]
fn config_file_column_alias() {
    let header = HEADER.replace(",config,", ",config_file,");
    let csv = format!("{header}a,S,c.json,p.json,L,1,1,5m,1,true,false,false,false,false,false,1,0\n");
    let path = tmp_csv("alias", &csv);
    let jobs = load_jobs(&path, &resolver()).expect("load");
    assert_eq!(jobs[0].config_file, PathBuf::from("/ft/user_data/c.json"));
    let _ = fs::remove_file(&path);
}

#[test]
fn header_only_file_is_empty_and_missing_file_fails() {
    let path = tmp_csv("header_only", HEADER);
    assert!(load_jobs(&path, &resolver()).expect("load").is_empty());
    let _ = fs::remove_file(&path);

    assert!(load_jobs(Path::new("/nonexistent/jobs.csv"), &resolver()).is_err());
}

#[test]
fn resolution_ignores_other_rows() {
    let r = resolver();
    let first = r.resolve("a/b/config.json");
    let _ = r.resolve("/elsewhere/config.json");
    assert_eq!(r.resolve("a/b/config.json"), first);
    assert_eq!(r.resolve("x/y/config.json"), first);
}
