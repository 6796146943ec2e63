//! Host boundary for steward.
//!
//! Everything steward knows about the surrounding home automation host
//! goes through two traits: [`Registry`] for object lifecycle and state,
//! and [`HostSignals`] for the startup readiness latch. The engine never
//! talks to a host API directly, so any backend that implements the pair
//! can drive it. [`MemoryRegistry`] is the in-process reference
//! implementation used by the runtime's tests and the simulation binary.

mod memory;
mod registry;
mod snapshot;

pub use memory::MemoryRegistry;
pub use registry::{HostSignals, Registry, RegistryError};
pub use snapshot::{RegistryEntry, RegistryFilter, RegistrySnapshot};

/// Default capacity for the state change broadcast channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
