//! Scheduler entry point: CLI wiring and config-driven run construction.

use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use partition_sched::cli::CliOptions;
use partition_sched::config::ScenarioConfig;
use partition_sched::io::export::CsvRecorder;
use partition_sched::model::ClocksModel;
use partition_sched::reporting::print_run_report;
use partition_sched::runner::run_scenario;
use partition_sched::sim::dispatch::ThreadDispatcher;
use partition_sched::telemetry::init_tracing;

fn main() {
    let cli = CliOptions::parse();
    init_tracing();

    // --scenario takes priority, then --preset, then the clocks preset
    let loaded = match &cli.scenario {
        Some(path) => ScenarioConfig::from_toml_file(path),
        None => ScenarioConfig::from_preset(cli.preset_name()),
    };
    let mut scenario = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    if let Some(seed) = cli.seed {
        scenario.model.seed = seed;
    }
    if cli.no_pacing {
        scenario.experiment.pacing_ms = 0;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let topology = match scenario.topology() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    let recorder = match CsvRecorder::create(
        &cli.output_dir,
        &scenario.experiment.output_prefix,
        &topology,
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: failed to create output files: {e}");
            process::exit(1);
        }
    };

    let model = ClocksModel::new(scenario.model.seed, scenario.model.work_jitter_ms);
    let dispatcher = ThreadDispatcher::new(scenario.dispatch.pin_threads);
    let outcome = run_scenario(
        &scenario,
        Arc::new(model),
        Arc::new(recorder),
        Arc::new(dispatcher),
    );

    print_run_report(&outcome.report);

    let mut exit_code = i32::from(!outcome.is_success());
    if let Some(path) = &cli.report_json {
        if let Err(e) = outcome.report.write_json(path) {
            error!(path = %path.display(), error = %e, "failed to write run report");
            exit_code = 1;
        } else {
            eprintln!("Run report written to {}", path.display());
        }
    }
    process::exit(exit_code);
}
