//! Command-level DRAM controller model with a row-copy cache.
//!
//! A cycle-driven controller picks one DRAM command per cycle from its request
//! queues, checks it against the device timing state and, when row-copy caching
//! is on, decides whether an activation hits a restored copy, needs a full
//! restore of an evicted copy first, or creates a new copy.

pub mod crow;
pub mod ctrl;
pub mod dram;
pub mod memory;
pub mod sim;

/// Memory-controller clock cycle.
pub type Cycle = u64;
