pub mod channel;
pub mod mapping;
pub mod standard;
pub mod timing;

use serde::Serialize;
use smallvec::SmallVec;

pub use channel::{Channel, TimingChecker};
pub use mapping::{AddressMapper, MappingScheme};
pub use standard::{Command, Level, OrgPreset, SpeedPreset, Standard, StandardKind};
pub use timing::{TimingEntry, TimingTable};

/// Level-indexed address: one coordinate per level of the standard, `-1`
/// for levels a command does not target (e.g. banks of a rank refresh).
pub type AddrVec = SmallVec<[i64; 8]>;

/// Where a pending access stands against the open row of its bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowStatus {
    /// The target row is open.
    Hit,
    /// Another row is open.
    Conflict,
    /// No row is open.
    Miss,
}
