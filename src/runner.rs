//! Full-run lifecycle: collaborator setup, the time loop, and shutdown.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{ExperimentConfig, ScenarioConfig};
use crate::error::SchedError;
use crate::io::export::OutputSink;
use crate::sim::clock::SimulationClock;
use crate::sim::collaborator::Collaborator;
use crate::sim::context::{ActivationRecord, SchedulerContext};
use crate::sim::dispatch::Dispatcher;
use crate::sim::event::OutputClockEvent;
use crate::sim::request::{ActivationStatus, Trigger};
use crate::sim::scheduler::{ClockScheduler, LoopSummary};

/// Serializable summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub instance_name: String,
    pub start_time: f64,
    pub stop_time: f64,
    /// `true` only if every lifecycle stage succeeded.
    pub success: bool,
    pub error: Option<String>,
    pub ticks: u64,
    /// Activations started by time predicates.
    pub scheduled: u64,
    /// Activations started by output-clock dependencies.
    pub cascaded: usize,
    pub completed: usize,
    pub failed: usize,
    /// Activations whose result cell was still empty when the report was built.
    pub unfinished: usize,
    pub activations: Vec<ActivationRecord>,
    pub events: Vec<OutputClockEvent>,
}

impl RunReport {
    fn new(
        experiment: &ExperimentConfig,
        summary: LoopSummary,
        activations: Vec<ActivationRecord>,
        events: Vec<OutputClockEvent>,
        result: &Result<(), SchedError>,
    ) -> Self {
        let count = |pred: fn(&ActivationRecord) -> bool| activations.iter().filter(|a| pred(a)).count();
        let cascaded = count(|a| matches!(a.trigger, Trigger::Dependency { .. }));
        let completed = count(|a| matches!(a.status, Some(ActivationStatus::Completed)));
        let failed = count(|a| matches!(a.status, Some(ActivationStatus::Failed { .. })));
        let unfinished = count(|a| a.status.is_none());
        Self {
            instance_name: experiment.instance_name.clone(),
            start_time: experiment.start_time,
            stop_time: experiment.stop_time,
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            ticks: summary.ticks,
            scheduled: summary.scheduled,
            cascaded,
            completed,
            failed,
            unfinished,
            activations,
            events,
        }
    }

    /// Writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or written.
    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

/// Result of [`run_scenario`]: the report is produced even for failed runs.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub result: Result<(), SchedError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs one scenario from instantiation to disposal.
///
/// Stages: instantiate, enter initialization, clear output clocks, exit
/// initialization, run the time loop, then shut down. Shutdown always runs
/// once the collaborator exists: it waits for in-flight activations, closes
/// the dispatcher, terminates the collaborator unless the run failed, closes
/// the preemption lock, disposes the collaborator and flushes the sink.
///
/// # Arguments
///
/// * `config` - Scenario to run; validated before anything starts
/// * `collaborator` - The simulated entity
/// * `sink` - Receives one row per completed activation
/// * `dispatcher` - Starts activations on execution units
pub fn run_scenario(
    config: &ScenarioConfig,
    collaborator: Arc<dyn Collaborator>,
    sink: Arc<dyn OutputSink>,
    dispatcher: Arc<dyn Dispatcher>,
) -> RunOutcome {
    let e = &config.experiment;
    let topology = match config.topology() {
        Ok(topology) => topology,
        Err(err) => {
            error!(error = %err, "scenario rejected");
            let result = Err(err);
            let report = RunReport::new(e, LoopSummary::default(), vec![], vec![], &result);
            return RunOutcome { report, result };
        }
    };

    let ctx = Arc::new(SchedulerContext::new(
        topology,
        Arc::clone(&collaborator),
        sink,
        dispatcher,
        e.start_time,
    ));

    info!(instance = %e.instance_name, start = e.start_time, stop = e.stop_time, step = e.step_size, "run starting");
    let mut summary = LoopSummary::default();
    let instantiated = collaborator
        .instantiate(&e.instance_name)
        .map_err(SchedError::Instantiate);

    let result = match instantiated {
        Err(err) => Err(err),
        Ok(()) => {
            let run = initialize(&ctx, e).and_then(|()| {
                let clock = SimulationClock::new(e.start_time, e.stop_time, e.step_size);
                let mut scheduler =
                    ClockScheduler::new(Arc::clone(&ctx), clock).with_pacing(e.pacing());
                summary = scheduler.run()?;
                Ok(())
            });
            shutdown(&ctx, run)
        }
    };

    match &result {
        Ok(()) => info!(ticks = summary.ticks, scheduled = summary.scheduled, "run finished"),
        Err(err) => error!(error = %err, "run failed"),
    }
    let report = RunReport::new(e, summary, ctx.activations(), ctx.events.snapshot(), &result);
    RunOutcome { report, result }
}

fn initialize(ctx: &SchedulerContext, e: &ExperimentConfig) -> Result<(), SchedError> {
    let collaborator = &ctx.collaborator;
    collaborator
        .enter_initialization(e.start_time, e.stop_time)
        .map_err(|source| SchedError::Lifecycle {
            stage: "enter initialization",
            source,
        })?;
    // Reading resets output clocks ticked during setup.
    collaborator
        .get_clocks(&ctx.topology.output_clock_ids())
        .map_err(|source| SchedError::Lifecycle {
            stage: "clear output clocks",
            source,
        })?;
    collaborator
        .exit_initialization()
        .map_err(|source| SchedError::Lifecycle {
            stage: "exit initialization",
            source,
        })
}

fn shutdown(ctx: &SchedulerContext, run: Result<(), SchedError>) -> Result<(), SchedError> {
    ctx.dispatcher.quiesce();
    ctx.dispatcher.close();

    let mut result = run;
    if let Some(fatal) = ctx.take_fatal() {
        match result {
            Ok(()) => result = Err(fatal),
            Err(_) => warn!(error = %fatal, "additional fatal error after run failure"),
        }
    }

    if result.is_ok() {
        if let Err(source) = ctx.collaborator.terminate() {
            result = Err(SchedError::Lifecycle {
                stage: "terminate",
                source,
            });
        }
    }
    ctx.lock.close();
    ctx.collaborator.dispose();

    if let Err(err) = ctx.sink.flush() {
        if result.is_ok() {
            result = Err(err.into());
        } else {
            error!(error = %err, "flushing output failed");
        }
    }
    result
}
