use serde::{Deserialize, Serialize};

/// Activation predicate of an input clock, evaluated from simulation time
/// alone.
///
/// # Examples
///
/// ```
/// use partition_sched::sim::predicate::ActivationPredicate;
///
/// let p = ActivationPredicate::Periodic { period: 8, offsets: vec![0, 1] };
/// let hits: Vec<u32> = (0..10).filter(|t| p.is_active(f64::from(*t))).collect();
/// assert_eq!(hits, vec![0, 1, 8, 9]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ActivationPredicate {
    /// Active at every tick.
    Always,
    /// Active when `(floor(time) - offset) % period == 0` for any offset.
    ///
    /// The remainder truncates toward zero: a negative difference matches
    /// only when it is an exact multiple of `period`.
    Periodic { period: u32, offsets: Vec<u32> },
    /// Never active from time alone; only a dependency edge starts it.
    Triggered,
}

impl ActivationPredicate {
    pub fn is_active(&self, time: f64) -> bool {
        match self {
            ActivationPredicate::Always => true,
            ActivationPredicate::Periodic { period, offsets } => {
                if *period == 0 {
                    return false;
                }
                let t = time.floor() as i64;
                let period = i64::from(*period);
                offsets.iter().any(|o| (t - i64::from(*o)) % period == 0)
            }
            ActivationPredicate::Triggered => false,
        }
    }

    /// Returns `true` if the clock is driven only by dependency edges.
    pub fn is_triggered(&self) -> bool {
        matches!(self, ActivationPredicate::Triggered)
    }
}
