use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn tmp_dir(name: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "hyperbatch_cli_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));
    fs::create_dir_all(&p).expect("create tmp dir");
    p
}

#[test]
fn tool_not_found_is_fatal_and_logged() {
    let work = tmp_dir("no_tool");
    let settings = work.join("settings.toml");
    fs::write(
        &settings,
        "[tool]\ncandidates = [\"/nonexistent/one/freqtrade\", \"/nonexistent/two/freqtrade\"]\nsearch_path = false\n",
    )
    .expect("write settings");
    let output_dir = work.join("outputs");

    let out = Command::new(env!("CARGO_BIN_EXE_hyperbatch"))
        .arg("--settings")
        .arg(&settings)
        .arg("--output-dir")
        .arg(&output_dir)
        .arg("--jobs")
        .arg(work.join("jobs.csv"))
        .env("RUST_LOG", "info")
        .output()
        .expect("run hyperbatch");

    assert!(!out.status.success());

    let session_dir = fs::read_dir(&output_dir)
        .expect("read outputs")
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| p.is_dir() && p.file_name().map_or(false, |n| n != "latest"))
        .expect("session dir");
    let log = fs::read_to_string(session_dir.join("hyperopt_automation.log")).expect("read log");
    assert!(log.contains("/nonexistent/one/freqtrade"), "{log}");
    assert!(log.contains("/nonexistent/two/freqtrade"), "{log}");
    assert!(!session_dir.join("hyperopt_summary.csv").exists());

    let _ = fs::remove_dir_all(&work);
}

#[test]
fn invalid_settings_exit_non_zero() {
    let work = tmp_dir("bad_settings");
    let settings = work.join("settings.toml");
    fs::write(&settings, "[runner]\nhyperopt_timeout_secs = 0\n").expect("write settings");

    let status = Command::new(env!("CARGO_BIN_EXE_hyperbatch"))
        .arg("--settings")
        .arg(&settings)
        .arg("--output-dir")
        .arg(work.join("outputs"))
        .status()
        .expect("run hyperbatch");
    assert!(!status.success());

    let _ = fs::remove_dir_all(&work);
}
