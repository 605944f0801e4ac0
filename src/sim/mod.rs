pub mod activator;
/// Simulation time stepping.
pub mod clock;
pub mod collaborator;
pub mod context;
/// Starting activations on execution units.
pub mod dispatch;
/// Observed output-clock ticks.
pub mod event;
pub mod handoff;
pub mod lock;
/// Time-based clock activation predicates.
pub mod predicate;
pub mod request;
pub mod resolver;
pub mod scheduler;
pub mod types;
