//! TOML-based scenario configuration and preset definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SchedError;
use crate::model::clocks as refs;
use crate::sim::predicate::ActivationPredicate;
use crate::sim::types::{
    AffinityGroup, ClockId, Handoff, InputClock, OutputClock, Partition, Placement, Priority,
    Topology, Variable,
};

/// Top-level scenario configuration parsed from TOML.
///
/// Every section has a default; the clock and partition tables default to
/// the reference three-partition model. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or use [`ScenarioConfig::clocks`] for
/// the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Time range, step and pacing.
    #[serde(default)]
    pub experiment: ExperimentConfig,
    /// Execution-unit placement.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Parameters of the reference model.
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default = "default_input_clocks")]
    pub input_clocks: Vec<InputClockConfig>,
    #[serde(default = "default_output_clocks")]
    pub output_clocks: Vec<OutputClockConfig>,
    #[serde(default = "default_partitions")]
    pub partitions: Vec<PartitionConfig>,
    #[serde(default = "default_handoffs")]
    pub handoffs: Vec<HandoffConfig>,
}

/// Time range, step and pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// First tick time.
    pub start_time: f64,
    /// Stop time (excluded).
    pub stop_time: f64,
    /// Fixed step between ticks (must be > 0).
    pub step_size: f64,
    /// Wall-clock sleep after each tick in milliseconds; 0 disables pacing.
    pub pacing_ms: u64,
    /// Name handed to the collaborator on instantiation.
    pub instance_name: String,
    /// Prefix of the per-partition CSV files.
    pub output_prefix: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            stop_time: 10.0,
            step_size: 1.0,
            pacing_ms: 950,
            instance_name: "instance".to_string(),
            output_prefix: "Scheduled".to_string(),
        }
    }
}

impl ExperimentConfig {
    pub fn pacing(&self) -> Option<Duration> {
        (self.pacing_ms > 0).then(|| Duration::from_millis(self.pacing_ms))
    }
}

/// Execution-unit placement.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Pin activation threads to their affinity group's core. Needs the
    /// `affinity` feature.
    pub pin_threads: bool,
}

/// Parameters of the reference model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Seed for the work-jitter generator.
    pub seed: u64,
    /// Upper bound of the random delay inside each activation (ms).
    pub work_jitter_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            work_jitter_ms: 0,
        }
    }
}

/// An input clock and its activation predicate.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputClockConfig {
    pub id: u32,
    pub name: String,
    /// Smaller values mean higher priority.
    pub priority: i32,
    #[serde(default)]
    pub affinity: usize,
    pub predicate: ActivationPredicate,
}

/// An output clock and its optional dependency target.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputClockConfig {
    pub id: u32,
    pub name: String,
    /// Input clock triggered when this clock ticks.
    #[serde(default)]
    pub target: Option<u32>,
}

/// A named variable.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    pub id: u32,
    pub name: String,
}

/// A partition bound to an input clock.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionConfig {
    pub clock: u32,
    #[serde(default)]
    pub inputs: Vec<VariableConfig>,
    #[serde(default)]
    pub outputs: Vec<VariableConfig>,
    /// Output clocks this partition may tick.
    #[serde(default)]
    pub emits: Vec<u32>,
}

/// Output of one partition fed to an input of another.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandoffConfig {
    pub from_clock: u32,
    pub output: u32,
    pub to_clock: u32,
    pub input: u32,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"experiment.step_size"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn var(id: u32, name: &str) -> VariableConfig {
    VariableConfig {
        id,
        name: name.to_string(),
    }
}

fn default_input_clocks() -> Vec<InputClockConfig> {
    vec![
        InputClockConfig {
            id: refs::IN_CLOCK_1,
            name: "InClock_1".to_string(),
            priority: 3,
            affinity: 0,
            predicate: ActivationPredicate::Always,
        },
        InputClockConfig {
            id: refs::IN_CLOCK_2,
            name: "InClock_2".to_string(),
            priority: 33,
            affinity: 0,
            predicate: ActivationPredicate::Periodic {
                period: 8,
                offsets: vec![0, 1],
            },
        },
        InputClockConfig {
            id: refs::IN_CLOCK_3,
            name: "InClock_3".to_string(),
            priority: 63,
            affinity: 0,
            predicate: ActivationPredicate::Triggered,
        },
    ]
}

fn default_output_clocks() -> Vec<OutputClockConfig> {
    vec![
        OutputClockConfig {
            id: refs::OUT_CLOCK_1,
            name: "OutClock_1".to_string(),
            target: Some(refs::IN_CLOCK_3),
        },
        OutputClockConfig {
            id: refs::OUT_CLOCK_2,
            name: "OutClock_2".to_string(),
            target: None,
        },
    ]
}

fn default_partitions() -> Vec<PartitionConfig> {
    vec![
        PartitionConfig {
            clock: refs::IN_CLOCK_1,
            inputs: vec![],
            outputs: vec![
                var(refs::IN_CLOCK_1_TICKS, "InClock_1_Ticks"),
                var(refs::TOTAL_TICKS, "total_InClock_Ticks"),
            ],
            emits: vec![refs::OUT_CLOCK_2],
        },
        PartitionConfig {
            clock: refs::IN_CLOCK_2,
            inputs: vec![var(refs::INPUT_2, "input_2")],
            outputs: vec![
                var(refs::IN_CLOCK_2_TICKS, "InClock_2_Ticks"),
                var(refs::RESULT_2, "result"),
            ],
            emits: vec![refs::OUT_CLOCK_1],
        },
        PartitionConfig {
            clock: refs::IN_CLOCK_3,
            inputs: vec![],
            outputs: vec![
                var(refs::IN_CLOCK_3_TICKS, "InClock_3_Ticks"),
                var(refs::OUTPUT_3, "output_3"),
            ],
            emits: vec![],
        },
    ]
}

fn default_handoffs() -> Vec<HandoffConfig> {
    vec![HandoffConfig {
        from_clock: refs::IN_CLOCK_3,
        output: refs::OUTPUT_3,
        to_clock: refs::IN_CLOCK_2,
        input: refs::INPUT_2,
    }]
}

impl ScenarioConfig {
    /// The reference scenario: three partitions, one dependency edge, one
    /// observed-only output clock and one hand-off.
    pub fn clocks() -> Self {
        Self {
            experiment: ExperimentConfig::default(),
            dispatch: DispatchConfig::default(),
            model: ModelConfig::default(),
            input_clocks: default_input_clocks(),
            output_clocks: default_output_clocks(),
            partitions: default_partitions(),
            handoffs: default_handoffs(),
        }
    }

    /// Every partition on every tick; output clocks are only observed.
    pub fn every_tick() -> Self {
        let mut cfg = Self::clocks();
        for clock in &mut cfg.input_clocks {
            clock.predicate = ActivationPredicate::Always;
        }
        for clock in &mut cfg.output_clocks {
            clock.target = None;
        }
        cfg.handoffs.clear();
        cfg
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["clocks", "every_tick"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "clocks" => Ok(Self::clocks()),
            "every_tick" => Ok(Self::every_tick()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let e = &self.experiment;

        if !(e.step_size > 0.0) {
            errors.push(ConfigError::new("experiment.step_size", "must be > 0"));
        }
        if !(e.stop_time > e.start_time) {
            errors.push(ConfigError::new(
                "experiment.stop_time",
                "must be > experiment.start_time",
            ));
        }
        if self.input_clocks.is_empty() {
            errors.push(ConfigError::new("input_clocks", "at least one input clock is required"));
        }

        let mut clock_ids = BTreeSet::new();
        for c in &self.input_clocks {
            if !clock_ids.insert(c.id) {
                errors.push(ConfigError::new(
                    "input_clocks.id",
                    format!("duplicate clock id {}", c.id),
                ));
            }
            if let ActivationPredicate::Periodic { period, offsets } = &c.predicate {
                if *period == 0 {
                    errors.push(ConfigError::new(
                        format!("input_clocks.{}.predicate.period", c.name),
                        "must be > 0",
                    ));
                }
                if offsets.is_empty() {
                    errors.push(ConfigError::new(
                        format!("input_clocks.{}.predicate.offsets", c.name),
                        "must not be empty",
                    ));
                }
            }
        }
        let input_ids: BTreeSet<u32> = self.input_clocks.iter().map(|c| c.id).collect();
        let output_ids: BTreeSet<u32> = self.output_clocks.iter().map(|c| c.id).collect();

        for c in &self.output_clocks {
            if !clock_ids.insert(c.id) {
                errors.push(ConfigError::new(
                    "output_clocks.id",
                    format!("duplicate clock id {}", c.id),
                ));
            }
            if let Some(target) = c.target {
                if !input_ids.contains(&target) {
                    errors.push(ConfigError::new(
                        format!("output_clocks.{}.target", c.name),
                        format!("{target} is not an input clock"),
                    ));
                }
            }
        }

        let mut bound = BTreeSet::new();
        let mut var_ids = BTreeSet::new();
        for p in &self.partitions {
            if !input_ids.contains(&p.clock) {
                errors.push(ConfigError::new(
                    "partitions.clock",
                    format!("{} is not an input clock", p.clock),
                ));
            }
            if !bound.insert(p.clock) {
                errors.push(ConfigError::new(
                    "partitions.clock",
                    format!("more than one partition bound to clock {}", p.clock),
                ));
            }
            for v in p.inputs.iter().chain(&p.outputs) {
                if !var_ids.insert(v.id) {
                    errors.push(ConfigError::new(
                        format!("partitions.{}.variables", p.clock),
                        format!("variable {} declared more than once", v.id),
                    ));
                }
            }
            for o in &p.emits {
                if !output_ids.contains(o) {
                    errors.push(ConfigError::new(
                        format!("partitions.{}.emits", p.clock),
                        format!("{o} is not an output clock"),
                    ));
                }
            }
        }
        for id in input_ids.difference(&bound) {
            errors.push(ConfigError::new(
                "partitions",
                format!("no partition bound to input clock {id}"),
            ));
        }

        for h in &self.handoffs {
            let from = self.partitions.iter().find(|p| p.clock == h.from_clock);
            let to = self.partitions.iter().find(|p| p.clock == h.to_clock);
            if !from.is_some_and(|p| p.outputs.iter().any(|v| v.id == h.output)) {
                errors.push(ConfigError::new(
                    "handoffs.output",
                    format!("{} is not an output of partition {}", h.output, h.from_clock),
                ));
            }
            if !to.is_some_and(|p| p.inputs.iter().any(|v| v.id == h.input)) {
                errors.push(ConfigError::new(
                    "handoffs.input",
                    format!("{} is not an input of partition {}", h.input, h.to_clock),
                ));
            }
        }

        if let Some(cycle) = self.dependency_cycle() {
            let path: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            errors.push(ConfigError::new(
                "output_clocks.target",
                format!("dependency cycle {}", path.join(" -> ")),
            ));
        }

        errors
    }

    /// Finds a cycle in the static dependency graph: input clock → output
    /// clocks its partition emits → their targets. Returns the input clocks
    /// along the cycle, first one repeated at the end.
    pub fn dependency_cycle(&self) -> Option<Vec<u32>> {
        let targets: BTreeMap<u32, u32> = self
            .output_clocks
            .iter()
            .filter_map(|o| o.target.map(|t| (o.id, t)))
            .collect();
        let edges: BTreeMap<u32, Vec<u32>> = self
            .partitions
            .iter()
            .map(|p| {
                let next = p.emits.iter().filter_map(|o| targets.get(o).copied()).collect();
                (p.clock, next)
            })
            .collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Open,
            Done,
        }
        let mut marks: BTreeMap<u32, Mark> = BTreeMap::new();

        for &root in edges.keys() {
            if marks.contains_key(&root) {
                continue;
            }
            // Explicit work-list: (node, next edge index), plus the current path.
            let mut stack: Vec<(u32, usize)> = vec![(root, 0)];
            let mut path: Vec<u32> = vec![root];
            marks.insert(root, Mark::Open);

            while let Some((node, idx)) = stack.pop() {
                let next = edges.get(&node).and_then(|n| n.get(idx)).copied();
                match next {
                    Some(child) => {
                        stack.push((node, idx + 1));
                        match marks.get(&child) {
                            Some(Mark::Open) => {
                                let start = path.iter().position(|c| *c == child).unwrap_or(0);
                                let mut cycle = path[start..].to_vec();
                                cycle.push(child);
                                return Some(cycle);
                            }
                            Some(Mark::Done) => {}
                            None => {
                                marks.insert(child, Mark::Open);
                                path.push(child);
                                stack.push((child, 0));
                            }
                        }
                    }
                    None => {
                        marks.insert(node, Mark::Done);
                        path.pop();
                    }
                }
            }
        }
        None
    }

    /// Builds the runtime topology.
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::InvalidConfig`] with every validation error.
    pub fn topology(&self) -> Result<Topology, SchedError> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(SchedError::InvalidConfig(errors));
        }

        let inputs = self
            .input_clocks
            .iter()
            .map(|c| InputClock {
                id: ClockId(c.id),
                name: c.name.clone(),
                placement: Placement {
                    priority: Priority(c.priority),
                    affinity: AffinityGroup(c.affinity),
                },
                predicate: c.predicate.clone(),
            })
            .collect();
        let outputs = self
            .output_clocks
            .iter()
            .map(|c| OutputClock {
                id: ClockId(c.id),
                name: c.name.clone(),
                target: c.target.map(ClockId),
            })
            .collect();
        let to_vars = |vars: &[VariableConfig]| -> Vec<Variable> {
            vars.iter()
                .map(|v| Variable {
                    id: v.id,
                    name: v.name.clone(),
                })
                .collect()
        };
        let partitions = self
            .partitions
            .iter()
            .enumerate()
            .map(|(i, p)| Partition {
                clock: ClockId(p.clock),
                index: i + 1,
                name: self
                    .input_clocks
                    .iter()
                    .find(|c| c.id == p.clock)
                    .map_or_else(|| format!("partition_{}", i + 1), |c| c.name.clone()),
                inputs: to_vars(&p.inputs),
                outputs: to_vars(&p.outputs),
                emits: p.emits.iter().copied().map(ClockId).collect(),
            })
            .collect();
        let handoffs = self
            .handoffs
            .iter()
            .map(|h| Handoff {
                from_clock: ClockId(h.from_clock),
                output: h.output,
                to_clock: ClockId(h.to_clock),
                input: h.input,
            })
            .collect();

        Ok(Topology::new(inputs, outputs, partitions, handoffs))
    }
}
