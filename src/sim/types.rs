//! Core scheduling types: clock and variable identities, placement, and the
//! static topology the scheduler runs against.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::predicate::ActivationPredicate;

/// Identity of a clock (input or output), as declared by the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClockId(pub u32);

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clock#{}", self.0)
    }
}

/// Identity of a partition input or output variable.
pub type VariableId = u32;

/// Value carried by partition variables.
pub type Value = i32;

/// Neutral value an input takes when nothing was handed off to it.
pub const NEUTRAL_VALUE: Value = 0;

/// Boolean gate state of a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ClockState {
    #[default]
    Inactive,
    Active,
}

impl ClockState {
    pub fn is_active(self) -> bool {
        matches!(self, ClockState::Active)
    }
}

/// Static scheduling priority of an input clock.
///
/// Smaller values mean higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

/// Processor-affinity group. Activations in the same group share one
/// execution unit when pinning is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AffinityGroup(pub usize);

/// Where and how urgently an activation should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub priority: Priority,
    pub affinity: AffinityGroup,
}

/// An input clock: drives exactly one partition.
#[derive(Debug, Clone)]
pub struct InputClock {
    pub id: ClockId,
    pub name: String,
    pub placement: Placement,
    pub predicate: ActivationPredicate,
}

/// An output clock and its dependency edge.
///
/// `target` is the input clock triggered when this clock ticks; `None`
/// means the tick is only observed.
#[derive(Debug, Clone)]
pub struct OutputClock {
    pub id: ClockId,
    pub name: String,
    pub target: Option<ClockId>,
}

/// A named partition variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
}

/// The unit of work bound to one input clock.
#[derive(Debug, Clone)]
pub struct Partition {
    pub clock: ClockId,
    /// 1-based position in declaration order, used for output naming.
    pub index: usize,
    pub name: String,
    pub inputs: Vec<Variable>,
    pub outputs: Vec<Variable>,
    /// Output clocks this partition may tick.
    pub emits: Vec<ClockId>,
}

impl Partition {
    pub fn input_ids(&self) -> Vec<VariableId> {
        self.inputs.iter().map(|v| v.id).collect()
    }

    pub fn output_ids(&self) -> Vec<VariableId> {
        self.outputs.iter().map(|v| v.id).collect()
    }
}

/// Static data-dependency edge: an output of one partition becomes an input
/// of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    pub from_clock: ClockId,
    pub output: VariableId,
    pub to_clock: ClockId,
    pub input: VariableId,
}

/// Immutable clock/partition layout for one run.
///
/// Input clocks are kept in ascending id order, which is the order they are
/// evaluated in each tick.
#[derive(Debug, Clone)]
pub struct Topology {
    input_clocks: Vec<InputClock>,
    output_clocks: Vec<OutputClock>,
    partitions: BTreeMap<ClockId, Partition>,
    handoffs: Vec<Handoff>,
}

impl Topology {
    /// Builds a topology from already-validated parts.
    pub fn new(
        mut input_clocks: Vec<InputClock>,
        mut output_clocks: Vec<OutputClock>,
        partitions: Vec<Partition>,
        handoffs: Vec<Handoff>,
    ) -> Self {
        input_clocks.sort_by_key(|c| c.id);
        output_clocks.sort_by_key(|c| c.id);
        Self {
            input_clocks,
            output_clocks,
            partitions: partitions.into_iter().map(|p| (p.clock, p)).collect(),
            handoffs,
        }
    }

    pub fn input_clocks(&self) -> &[InputClock] {
        &self.input_clocks
    }

    pub fn output_clocks(&self) -> &[OutputClock] {
        &self.output_clocks
    }

    pub fn output_clock_ids(&self) -> Vec<ClockId> {
        self.output_clocks.iter().map(|c| c.id).collect()
    }

    pub fn input_clock(&self, id: ClockId) -> Option<&InputClock> {
        self.input_clocks.iter().find(|c| c.id == id)
    }

    pub fn output_clock(&self, id: ClockId) -> Option<&OutputClock> {
        self.output_clocks.iter().find(|c| c.id == id)
    }

    pub fn partition(&self, clock: ClockId) -> Option<&Partition> {
        self.partitions.get(&clock)
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    pub fn handoffs(&self) -> &[Handoff] {
        &self.handoffs
    }
}
