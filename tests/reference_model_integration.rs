//! Integration tests for the reference model and its CSV output.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use partition_sched::config::ScenarioConfig;
use partition_sched::io::export::CsvRecorder;
use partition_sched::model::ClocksModel;
use partition_sched::runner::{RunOutcome, run_scenario};
use partition_sched::sim::dispatch::InlineDispatcher;

fn run_to_dir(cfg: &ScenarioConfig, dir: &Path) -> RunOutcome {
    let topology = cfg.topology().expect("preset should be valid");
    let recorder = CsvRecorder::create(dir, &cfg.experiment.output_prefix, &topology)
        .expect("output files should be created");
    run_scenario(
        cfg,
        Arc::new(ClocksModel::new(cfg.model.seed, 0)),
        Arc::new(recorder),
        Arc::new(InlineDispatcher::new()),
    )
}

fn read_lines(dir: &Path, name: &str) -> Vec<String> {
    let text = fs::read_to_string(dir.join(name)).expect("csv file should exist");
    text.lines().map(str::to_string).collect()
}

#[test]
fn clocks_preset_writes_one_file_per_partition() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outcome = run_to_dir(&common::quick_preset("clocks"), dir.path());
    assert!(outcome.is_success(), "{:?}", outcome.result);

    let part1 = read_lines(dir.path(), "Scheduled_part_1_out.csv");
    let part2 = read_lines(dir.path(), "Scheduled_part_2_out.csv");
    let part3 = read_lines(dir.path(), "Scheduled_part_3_out.csv");

    assert_eq!(part1[0], "time,InClock_1_Ticks,total_InClock_Ticks");
    assert_eq!(part2[0], "time,InClock_2_Ticks,result");
    assert_eq!(part3[0], "time,InClock_3_Ticks,output_3");
    assert_eq!(part1.len(), 11);
    assert_eq!(part2.len(), 5);
    assert_eq!(part3.len(), 5);
}

#[test]
fn clocks_preset_rows_follow_the_cascade() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outcome = run_to_dir(&common::quick_preset("clocks"), dir.path());
    assert!(outcome.is_success());

    // InClock_3 runs inside InClock_2's activation; its output reaches
    // InClock_2 on the next activation.
    assert_eq!(
        read_lines(dir.path(), "Scheduled_part_2_out.csv")[1..],
        ["0,1,0", "1,2,10", "8,3,20", "9,4,30"]
    );
    assert_eq!(
        read_lines(dir.path(), "Scheduled_part_3_out.csv")[1..],
        ["0,1,10", "1,2,20", "8,3,30", "9,4,40"]
    );
    // Shared total: three activations at t=0, then InClock_1 at t=1.
    let part1 = read_lines(dir.path(), "Scheduled_part_1_out.csv");
    assert_eq!(part1[1], "0,1,1");
    assert_eq!(part1[2], "1,2,4");
}

#[test]
fn out_clock_2_is_observed_every_fifth_tick() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outcome = run_to_dir(&common::quick_preset("clocks"), dir.path());
    assert!(outcome.is_success());

    let observed: Vec<f64> = outcome
        .report
        .events
        .iter()
        .filter(|e| e.is_observed_only())
        .map(|e| e.time)
        .collect();
    assert_eq!(observed, vec![4.0, 9.0]);
}

#[test]
fn every_tick_preset_runs_all_partitions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outcome = run_to_dir(&common::quick_preset("every_tick"), dir.path());
    assert!(outcome.is_success());
    assert_eq!(outcome.report.scheduled, 30);
    assert_eq!(outcome.report.cascaded, 0);
    for n in 1..=3 {
        let lines = read_lines(dir.path(), &format!("Scheduled_part_{n}_out.csv"));
        assert_eq!(lines.len(), 11);
    }
    // No hand-off: result stays at the neutral value.
    assert!(
        read_lines(dir.path(), "Scheduled_part_2_out.csv")[1..]
            .iter()
            .all(|l| l.ends_with(",0"))
    );
}

#[test]
fn report_json_round_trips_through_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outcome = run_to_dir(&common::quick_preset("clocks"), dir.path());
    let path = dir.path().join("report.json");
    outcome.report.write_json(&path).expect("report written");

    let text = fs::read_to_string(&path).expect("report readable");
    let json: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(json["success"], true);
    assert_eq!(json["ticks"], 10);
    assert_eq!(json["cascaded"], 4);
    assert_eq!(
        json["activations"][2]["trigger"]["kind"],
        "dependency"
    );
}

#[test]
fn scenario_file_overrides_the_preset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("short.toml");
    fs::write(
        &path,
        "[experiment]\nstop_time = 2.0\npacing_ms = 0\noutput_prefix = \"short\"\n",
    )
    .expect("scenario written");
    let cfg = ScenarioConfig::from_toml_file(&path).expect("scenario should load");

    let outcome = run_to_dir(&cfg, dir.path());
    assert!(outcome.is_success());
    assert_eq!(outcome.report.ticks, 2);
    assert_eq!(read_lines(dir.path(), "short_part_1_out.csv").len(), 3);
}
