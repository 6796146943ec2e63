//! Debounce and dispatch engine.
//!
//! Takes the desired-object catalog, resolves each feature's trigger
//! patterns into concrete per-device bindings, then listens to the
//! registry's change stream. Changes are coalesced per device inside a
//! debounce window; once a burst settles, the owning features' decision
//! logic runs exactly once against the current values. Edge watches
//! bypass the window: a matched transition runs its observers right
//! away, serialized with the device's decisions on its worker.

mod debounce;
mod engine;
mod resolver;

pub use debounce::DebounceWindow;
pub use engine::{DispatchConfig, DispatchEngine, EngineState, PlanSource};
pub use resolver::{resolve, AutomationBinding, EdgeWatch, PendingBinding, WatchPlan};
