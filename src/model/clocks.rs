use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::error::CollaboratorError;
use crate::sim::collaborator::{Collaborator, HostCallbacks};
use crate::sim::types::{ClockId, ClockState, NEUTRAL_VALUE, Value, VariableId};

pub const IN_CLOCK_1: u32 = 1001;
pub const IN_CLOCK_2: u32 = 1002;
pub const IN_CLOCK_3: u32 = 1003;
pub const OUT_CLOCK_1: u32 = 1004;
pub const OUT_CLOCK_2: u32 = 1005;

pub const IN_CLOCK_1_TICKS: VariableId = 2001;
pub const IN_CLOCK_2_TICKS: VariableId = 2002;
pub const IN_CLOCK_3_TICKS: VariableId = 2003;
pub const TOTAL_TICKS: VariableId = 2004;
pub const RESULT_2: VariableId = 2005;
pub const INPUT_2: VariableId = 2006;
pub const OUTPUT_3: VariableId = 2007;

/// `InClock_1` ticks `OutClock_2` on every n-th activation.
const OUT_CLOCK_2_EVERY: i32 = 5;
/// `output_3` is this multiple of `InClock_3_Ticks`.
const OUTPUT_3_SCALE: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Instantiated,
    Initialization,
    Running,
    Terminated,
    Disposed,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Created => "created",
            Phase::Instantiated => "instantiated",
            Phase::Initialization => "initialization",
            Phase::Running => "running",
            Phase::Terminated => "terminated",
            Phase::Disposed => "disposed",
        }
    }
}

#[derive(Debug)]
struct ModelState {
    phase: Phase,
    instance: Option<String>,
    in_clock_1_ticks: Value,
    in_clock_2_ticks: Value,
    in_clock_3_ticks: Value,
    total_ticks: Value,
    result_2: Value,
    input_2: Value,
    output_3: Value,
    out_clock_1: ClockState,
    out_clock_2: ClockState,
    rng: StdRng,
}

impl ModelState {
    fn require(&self, call: &'static str, allowed: &[Phase]) -> Result<(), CollaboratorError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(CollaboratorError::InvalidState {
                call,
                state: self.phase.name(),
            })
        }
    }

    fn value(&self, var: VariableId) -> Result<Value, CollaboratorError> {
        Ok(match var {
            IN_CLOCK_1_TICKS => self.in_clock_1_ticks,
            IN_CLOCK_2_TICKS => self.in_clock_2_ticks,
            IN_CLOCK_3_TICKS => self.in_clock_3_ticks,
            TOTAL_TICKS => self.total_ticks,
            RESULT_2 => self.result_2,
            INPUT_2 => self.input_2,
            OUTPUT_3 => self.output_3,
            other => return Err(CollaboratorError::UnknownVariable(other)),
        })
    }

    fn out_clock(&mut self, clock: ClockId) -> Result<&mut ClockState, CollaboratorError> {
        match clock.0 {
            OUT_CLOCK_1 => Ok(&mut self.out_clock_1),
            OUT_CLOCK_2 => Ok(&mut self.out_clock_2),
            _ => Err(CollaboratorError::UnknownClock(clock)),
        }
    }
}

/// Reference model with three partitions.
///
/// - `InClock_1` counts its activations and ticks `OutClock_2` on every
///   fifth one.
/// - `InClock_2` echoes `input_2` as `result`, consumes the input and ticks
///   `OutClock_1`.
/// - `InClock_3` publishes `output_3 = 10 * InClock_3_Ticks`.
///
/// Every activation also bumps `total_InClock_Ticks` inside the host's
/// preemption lock. Output clocks reset when read.
///
/// # Examples
///
/// ```
/// use partition_sched::model::ClocksModel;
/// use partition_sched::sim::collaborator::Collaborator;
///
/// let model = ClocksModel::new(42, 0);
/// assert!(model.instantiate("demo").is_ok());
/// assert!(model.enter_initialization(0.0, 10.0).is_ok());
/// assert!(model.exit_initialization().is_ok());
/// ```
#[derive(Debug)]
pub struct ClocksModel {
    state: Mutex<ModelState>,
    /// Upper bound of the simulated work time per activation.
    work_jitter: Duration,
}

impl ClocksModel {
    /// Creates a model in its pre-instantiation state.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed for the work-jitter generator
    /// * `work_jitter_ms` - Upper bound of the random sleep inside each
    ///   activation; 0 disables it
    pub fn new(seed: u64, work_jitter_ms: u64) -> Self {
        Self {
            state: Mutex::new(ModelState {
                phase: Phase::Created,
                instance: None,
                in_clock_1_ticks: 0,
                in_clock_2_ticks: 0,
                in_clock_3_ticks: 0,
                total_ticks: 0,
                result_2: 0,
                input_2: NEUTRAL_VALUE,
                output_3: 0,
                out_clock_1: ClockState::Inactive,
                out_clock_2: ClockState::Inactive,
                rng: StdRng::seed_from_u64(seed),
            }),
            work_jitter: Duration::from_millis(work_jitter_ms),
        }
    }

    /// Name given at instantiation.
    pub fn instance_name(&self) -> Option<String> {
        self.state.lock().instance.clone()
    }

    /// Current lifecycle phase, for diagnostics.
    pub fn phase(&self) -> &'static str {
        self.state.lock().phase.name()
    }

    fn transition(
        &self,
        call: &'static str,
        from: &[Phase],
        to: Phase,
    ) -> Result<(), CollaboratorError> {
        let mut state = self.state.lock();
        state.require(call, from)?;
        state.phase = to;
        Ok(())
    }

    fn simulate_work(&self) {
        if self.work_jitter.is_zero() {
            return;
        }
        let max = self.work_jitter.as_millis() as u64;
        let delay = self.state.lock().rng.random_range(0..=max);
        thread::sleep(Duration::from_millis(delay));
    }
}

impl Collaborator for ClocksModel {
    fn instantiate(&self, instance_name: &str) -> Result<(), CollaboratorError> {
        let mut state = self.state.lock();
        state.require("instantiate", &[Phase::Created])?;
        state.instance = Some(instance_name.to_string());
        state.phase = Phase::Instantiated;
        Ok(())
    }

    fn enter_initialization(
        &self,
        start_time: f64,
        stop_time: f64,
    ) -> Result<(), CollaboratorError> {
        if stop_time <= start_time {
            return Err(CollaboratorError::Failed(format!(
                "stop time {stop_time} must be after start time {start_time}"
            )));
        }
        self.transition(
            "enter_initialization",
            &[Phase::Instantiated],
            Phase::Initialization,
        )
    }

    fn exit_initialization(&self) -> Result<(), CollaboratorError> {
        self.transition("exit_initialization", &[Phase::Initialization], Phase::Running)
    }

    fn activate_partition(
        &self,
        clock: ClockId,
        time: f64,
        host: &dyn HostCallbacks,
    ) -> Result<(), CollaboratorError> {
        self.state
            .lock()
            .require("activate_partition", &[Phase::Running])?;
        if !matches!(clock.0, IN_CLOCK_1 | IN_CLOCK_2 | IN_CLOCK_3) {
            return Err(CollaboratorError::UnknownClock(clock));
        }

        self.simulate_work();

        // Neither the model state nor the preemption lock may be held across
        // intermediate_update: the host can run dependent partitions from it.
        host.lock_preemption()
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;
        let ticked = {
            let mut state = self.state.lock();
            state.total_ticks += 1;
            match clock.0 {
                IN_CLOCK_1 => {
                    state.in_clock_1_ticks += 1;
                    let fire = state.in_clock_1_ticks % OUT_CLOCK_2_EVERY == 0;
                    if fire {
                        state.out_clock_2 = ClockState::Active;
                    }
                    fire
                }
                IN_CLOCK_2 => {
                    state.in_clock_2_ticks += 1;
                    state.result_2 = state.input_2;
                    state.input_2 = NEUTRAL_VALUE;
                    state.out_clock_1 = ClockState::Active;
                    true
                }
                _ => {
                    state.in_clock_3_ticks += 1;
                    state.output_3 = state.in_clock_3_ticks * OUTPUT_3_SCALE;
                    false
                }
            }
        };
        host.unlock_preemption()
            .map_err(|e| CollaboratorError::Failed(e.to_string()))?;

        debug!(%clock, time, ticked, "model partition step");
        if ticked {
            host.intermediate_update(true);
        }
        Ok(())
    }

    fn get_clocks(&self, clocks: &[ClockId]) -> Result<Vec<ClockState>, CollaboratorError> {
        let mut state = self.state.lock();
        state.require("get_clocks", &[Phase::Initialization, Phase::Running])?;
        clocks
            .iter()
            .map(|id| Ok(std::mem::take(state.out_clock(*id)?)))
            .collect()
    }

    fn set_variables(&self, vars: &[VariableId], values: &[Value]) -> Result<(), CollaboratorError> {
        if vars.len() != values.len() {
            return Err(CollaboratorError::LengthMismatch {
                variables: vars.len(),
                values: values.len(),
            });
        }
        let mut state = self.state.lock();
        state.require(
            "set_variables",
            &[Phase::Instantiated, Phase::Initialization, Phase::Running],
        )?;
        for (var, value) in vars.iter().zip(values) {
            match *var {
                INPUT_2 => state.input_2 = *value,
                other => {
                    state.value(other)?;
                    return Err(CollaboratorError::NotSettable(other));
                }
            }
        }
        Ok(())
    }

    fn get_variables(&self, vars: &[VariableId]) -> Result<Vec<Value>, CollaboratorError> {
        let state = self.state.lock();
        state.require(
            "get_variables",
            &[
                Phase::Instantiated,
                Phase::Initialization,
                Phase::Running,
                Phase::Terminated,
            ],
        )?;
        vars.iter().map(|v| state.value(*v)).collect()
    }

    fn terminate(&self) -> Result<(), CollaboratorError> {
        self.transition(
            "terminate",
            &[Phase::Initialization, Phase::Running],
            Phase::Terminated,
        )
    }

    fn dispose(&self) {
        self.state.lock().phase = Phase::Disposed;
    }
}
