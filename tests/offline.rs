#![cfg(feature = "http-source")]

use anyhow::Result;
use pixelbeam::config::ApiConfig;
use pixelbeam::engine::Stage;
use pixelbeam::runner::Runner;
use pixelbeam::source::HttpSourceClient;
use pixelbeam::testing::*;
use pixelbeam::{RunContext, RunState, pipelines};
use std::fs;
use std::process::Command;
use std::sync::Arc;

/// Populate the raw cache for `names` through a mock source.
fn warm_cache(ws: &TestWorkspace, names: &[&str]) -> Result<()> {
    let selected: Vec<_> = names.iter().filter_map(|n| pipelines::find(n)).collect();
    let outcomes = Runner::default().run_all(&ws.context(builtin_source(12)), &selected)?;
    assert!(outcomes.iter().all(|o| o.state == RunState::Reported));
    Ok(())
}

fn offline_context(ws: &TestWorkspace) -> RunContext {
    let client = HttpSourceClient::new(&ApiConfig {
        endpoint: String::new(),
        ..ApiConfig::default()
    });
    RunContext::new(ws.config(), Arc::new(client))
}

#[test]
fn cached_event_types_run_without_an_endpoint() -> Result<()> {
    let ws = TestWorkspace::new()?;
    warm_cache(&ws, &["battles"])?;

    let selected: Vec<_> = ["battles", "captures"].iter().filter_map(|n| pipelines::find(n)).collect();
    let outcomes = Runner::default().run_all(&offline_context(&ws), &selected)?;

    assert_state(&outcomes[0], RunState::Reported);
    assert_eq!(outcomes[0].rows(), Some(12));
    assert_state(&outcomes[1], RunState::Failed(Stage::Extract));
    assert!(format!("{:?}", outcomes[1].error).contains("NotConfigured"));
    Ok(())
}

#[test]
fn binary_exits_zero_when_everything_is_cached() -> Result<()> {
    let ws = TestWorkspace::new()?;
    warm_cache(&ws, &["battles"])?;

    let paths = &ws.config().paths;
    let config_path = ws.path().join("pixelbeam.toml");
    fs::write(
        &config_path,
        format!(
            "pipelines = [\"battles\"]\n\n[paths]\nraw_dir = {:?}\nclean_dir = {:?}\nreport_path = {:?}\n",
            paths.raw_dir.display().to_string(),
            paths.clean_dir.display().to_string(),
            paths.report_path.display().to_string(),
        ),
    )?;

    let output = Command::new(env!("CARGO_BIN_EXE_pixelbeam"))
        .args(["run", "--config"])
        .arg(&config_path)
        .env_remove("API_URL")
        .env_remove("API_KEY")
        .env_remove("RAW_DATA_DIR")
        .env_remove("CLEAN_DATA_DIR")
        .env_remove("REPORT_DIR")
        .env_remove("PIXELBEAM_CONFIG")
        .output()?;

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(paths.report_path.exists());
    Ok(())
}
