//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use partition_sched::config::ScenarioConfig;
use partition_sched::error::{CollaboratorError, DispatchError};
use partition_sched::sim::collaborator::{Collaborator, HostCallbacks};
use partition_sched::sim::dispatch::{Dispatcher, InlineDispatcher, Job};
use partition_sched::sim::types::{ClockId, ClockState, NEUTRAL_VALUE, Placement, Value, VariableId};

pub const A: ClockId = ClockId(1);
pub const B: ClockId = ClockId(2);
pub const C: ClockId = ClockId(3);
/// Output clock targeting `C`.
pub const TO_C: ClockId = ClockId(10);
/// Output clock without a target.
pub const OBSERVED: ClockId = ClockId(11);

pub const A_OUT: VariableId = 101;
pub const B_IN: VariableId = 201;
pub const B_OUT: VariableId = 202;
pub const C_OUT: VariableId = 301;

/// Three-partition scenario over [0, 10) with step 1 and no pacing.
///
/// - `A` (id 1) every tick, may tick `OBSERVED`
/// - `B` (id 2) at {0, 1, 8, 9}, may tick `TO_C`
/// - `C` (id 3) triggered by `TO_C`; its output feeds `B`'s input
pub fn abc_config() -> ScenarioConfig {
    ScenarioConfig::from_toml_str(
        r#"
[experiment]
start_time = 0.0
stop_time = 10.0
step_size = 1.0
pacing_ms = 0
instance_name = "abc"

[[input_clocks]]
id = 1
name = "A"
priority = 1
predicate = { kind = "always" }

[[input_clocks]]
id = 2
name = "B"
priority = 2
predicate = { kind = "periodic", period = 8, offsets = [0, 1] }

[[input_clocks]]
id = 3
name = "C"
priority = 3
predicate = { kind = "triggered" }

[[output_clocks]]
id = 10
name = "to_c"
target = 3

[[output_clocks]]
id = 11
name = "observed"

[[partitions]]
clock = 1
outputs = [{ id = 101, name = "a_count" }]
emits = [11]

[[partitions]]
clock = 2
inputs = [{ id = 201, name = "b_in" }]
outputs = [{ id = 202, name = "b_count" }]
emits = [10]

[[partitions]]
clock = 3
outputs = [{ id = 301, name = "c_out" }]

[[handoffs]]
from_clock = 3
output = 301
to_clock = 2
input = 201
"#,
    )
    .expect("abc scenario should parse")
}

/// A built-in preset with pacing disabled.
pub fn quick_preset(name: &str) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::from_preset(name).expect("preset should exist");
    cfg.experiment.pacing_ms = 0;
    cfg
}

/// How a scripted partition misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Activate,
    Panic,
    /// Takes the host's preemption lock, then panics before releasing it.
    PanicHoldingLock,
    /// Releases the preemption lock without having taken it.
    StrayUnlock,
    GetOutputs,
    SetInputs,
}

/// Behavior of one scripted partition.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub inputs: Vec<VariableId>,
    pub outputs: Vec<VariableId>,
    /// Output clocks ticked on every activation.
    pub ticks: Vec<ClockId>,
    /// Work time inside the activation.
    pub delay: Duration,
    pub failure: Option<Failure>,
    /// Bump the shared counter inside the host's preemption lock.
    pub locked_increment: bool,
}

/// One observed activation: clock, time and the input values it saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub clock: ClockId,
    pub time: f64,
    pub inputs: Vec<Value>,
}

#[derive(Debug, Default)]
struct ScriptState {
    vars: BTreeMap<VariableId, Value>,
    out_clocks: BTreeMap<ClockId, ClockState>,
    counts: BTreeMap<ClockId, Value>,
    seen: Vec<Seen>,
    running: BTreeMap<ClockId, usize>,
    max_running: BTreeMap<ClockId, usize>,
    calls: Vec<&'static str>,
}

/// Collaborator whose partitions follow fixed scripts.
///
/// Each activation counts itself, writes `10 * count` into every output and
/// ticks its configured output clocks.
#[derive(Debug, Default)]
pub struct Scripted {
    scripts: BTreeMap<ClockId, Script>,
    state: Mutex<ScriptState>,
    fail_call: Option<&'static str>,
    fail_clock_query: bool,
    counter: AtomicU64,
    inside: AtomicUsize,
    interleaved: AtomicUsize,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, clock: ClockId, script: Script) -> Self {
        self.scripts.insert(clock, script);
        self
    }

    /// Fails the named lifecycle call.
    pub fn failing_call(mut self, call: &'static str) -> Self {
        self.fail_call = Some(call);
        self
    }

    /// Fails every clock query after initialization.
    pub fn failing_clock_query(mut self) -> Self {
        self.fail_clock_query = true;
        self
    }

    /// Scripts matching [`abc_config`]: `B` ticks `TO_C` and `A` ticks
    /// nothing.
    pub fn abc() -> Self {
        Self::new()
            .with(
                A,
                Script {
                    outputs: vec![A_OUT],
                    ..Script::default()
                },
            )
            .with(
                B,
                Script {
                    inputs: vec![B_IN],
                    outputs: vec![B_OUT],
                    ticks: vec![TO_C],
                    ..Script::default()
                },
            )
            .with(
                C,
                Script {
                    outputs: vec![C_OUT],
                    ..Script::default()
                },
            )
    }

    pub fn script_mut(&mut self, clock: ClockId) -> &mut Script {
        self.scripts.entry(clock).or_default()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.state.lock().seen.clone()
    }

    pub fn seen_for(&self, clock: ClockId) -> Vec<Seen> {
        let mut seen: Vec<_> = self
            .seen()
            .into_iter()
            .filter(|s| s.clock == clock)
            .collect();
        seen.sort_by(|a, b| a.time.total_cmp(&b.time));
        seen
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn max_running(&self, clock: ClockId) -> usize {
        self.state
            .lock()
            .max_running
            .get(&clock)
            .copied()
            .unwrap_or(0)
    }

    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Number of critical sections entered while another was still open.
    pub fn interleavings(&self) -> usize {
        self.interleaved.load(Ordering::SeqCst)
    }

    fn lifecycle(&self, call: &'static str) -> Result<(), CollaboratorError> {
        self.state.lock().calls.push(call);
        if self.fail_call == Some(call) {
            return Err(CollaboratorError::Failed(format!("{call} refused")));
        }
        Ok(())
    }

    /// Non-atomic read-modify-write, only correct under mutual exclusion.
    fn bump_counter(&self) {
        if self.inside.fetch_add(1, Ordering::SeqCst) > 0 {
            self.interleaved.fetch_add(1, Ordering::SeqCst);
        }
        let value = self.counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        self.counter.store(value + 1, Ordering::SeqCst);
        self.inside.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Collaborator for Scripted {
    fn instantiate(&self, _instance_name: &str) -> Result<(), CollaboratorError> {
        self.lifecycle("instantiate")
    }

    fn enter_initialization(&self, _start: f64, _stop: f64) -> Result<(), CollaboratorError> {
        self.lifecycle("enter_initialization")
    }

    fn exit_initialization(&self) -> Result<(), CollaboratorError> {
        self.lifecycle("exit_initialization")
    }

    fn activate_partition(
        &self,
        clock: ClockId,
        time: f64,
        host: &dyn HostCallbacks,
    ) -> Result<(), CollaboratorError> {
        let script = self
            .scripts
            .get(&clock)
            .ok_or(CollaboratorError::UnknownClock(clock))?;

        {
            let mut state = self.state.lock();
            let inputs = script
                .inputs
                .iter()
                .map(|v| state.vars.get(v).copied().unwrap_or(NEUTRAL_VALUE))
                .collect();
            state.seen.push(Seen { clock, time, inputs });
            let running = state.running.entry(clock).or_default();
            *running += 1;
            let now = *running;
            let max = state.max_running.entry(clock).or_default();
            *max = (*max).max(now);
        }

        match script.failure {
            Some(Failure::Activate) => {
                *self.state.lock().running.entry(clock).or_default() -= 1;
                return Err(CollaboratorError::Failed("scripted failure".to_string()));
            }
            Some(Failure::Panic) => panic!("scripted panic in {clock}"),
            Some(Failure::PanicHoldingLock) => {
                host.lock_preemption()
                    .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
                panic!("scripted panic holding the lock in {clock}");
            }
            Some(Failure::StrayUnlock) => {
                if let Err(e) = host.unlock_preemption() {
                    *self.state.lock().running.entry(clock).or_default() -= 1;
                    return Err(CollaboratorError::Failed(e.to_string()));
                }
            }
            _ => {}
        }

        if !script.delay.is_zero() {
            thread::sleep(script.delay);
        }
        if script.locked_increment {
            host.lock_preemption()
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
            self.bump_counter();
            host.unlock_preemption()
                .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
        }

        {
            let mut state = self.state.lock();
            let count = {
                let c = state.counts.entry(clock).or_default();
                *c += 1;
                *c
            };
            for out in &script.outputs {
                state.vars.insert(*out, count * 10);
            }
            for input in &script.inputs {
                state.vars.insert(*input, NEUTRAL_VALUE);
            }
            for oc in &script.ticks {
                state.out_clocks.insert(*oc, ClockState::Active);
            }
            *state.running.entry(clock).or_default() -= 1;
        }

        if !script.ticks.is_empty() {
            host.intermediate_update(true);
        }
        Ok(())
    }

    fn get_clocks(&self, clocks: &[ClockId]) -> Result<Vec<ClockState>, CollaboratorError> {
        let mut state = self.state.lock();
        if self.fail_clock_query && state.calls.contains(&"exit_initialization") {
            return Err(CollaboratorError::Failed("clock query refused".to_string()));
        }
        Ok(clocks
            .iter()
            .map(|c| state.out_clocks.remove(c).unwrap_or_default())
            .collect())
    }

    fn set_variables(&self, vars: &[VariableId], values: &[Value]) -> Result<(), CollaboratorError> {
        let refused = self.scripts.values().any(|s| {
            s.failure == Some(Failure::SetInputs) && vars.iter().any(|v| s.inputs.contains(v))
        });
        if refused {
            return Err(CollaboratorError::NotSettable(vars[0]));
        }
        let mut state = self.state.lock();
        for (var, value) in vars.iter().zip(values) {
            state.vars.insert(*var, *value);
        }
        Ok(())
    }

    fn get_variables(&self, vars: &[VariableId]) -> Result<Vec<Value>, CollaboratorError> {
        let refused = self.scripts.values().any(|s| {
            s.failure == Some(Failure::GetOutputs) && vars.iter().any(|v| s.outputs.contains(v))
        });
        if refused {
            return Err(CollaboratorError::Failed("outputs unavailable".to_string()));
        }
        let state = self.state.lock();
        Ok(vars
            .iter()
            .map(|v| state.vars.get(v).copied().unwrap_or(NEUTRAL_VALUE))
            .collect())
    }

    fn terminate(&self) -> Result<(), CollaboratorError> {
        self.lifecycle("terminate")
    }

    fn dispose(&self) {
        self.state.lock().calls.push("dispose");
    }
}

/// Runs jobs inline until `limit` dispatches succeeded, then refuses.
#[derive(Debug)]
pub struct RefusingDispatcher {
    inner: InlineDispatcher,
    limit: u64,
    attempts: AtomicU64,
}

impl RefusingDispatcher {
    pub fn after(limit: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: InlineDispatcher::new(),
            limit,
            attempts: AtomicU64::new(0),
        })
    }
}

impl Dispatcher for RefusingDispatcher {
    fn dispatch(&self, label: &str, placement: Placement, job: Job) -> Result<(), DispatchError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Err(DispatchError::Spawn {
                name: label.to_string(),
                source: std::io::Error::other("no execution units left"),
            });
        }
        self.inner.dispatch(label, placement, job)
    }

    fn quiesce(&self) {
        self.inner.quiesce();
    }

    fn close(&self) {
        self.inner.close();
    }

    fn dispatched(&self) -> u64 {
        self.inner.dispatched()
    }
}
