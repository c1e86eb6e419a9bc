//! Row-copy caching: the per-subarray copy table, the timing profiles that
//! copy hits and copy creation run under, and the full-restore heuristic.

pub mod policy;
pub mod profile;
pub mod restore;
pub mod table;

pub use policy::{CrowConfig, CrowTimingFactors};
pub use profile::{CrowHit, TimingProfile, TimingProfiles};
pub use restore::{RefreshRotation, RestoreCheck, RestoreHeuristic};
pub use table::{CrowEntry, CrowTable};
