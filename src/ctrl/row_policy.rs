use serde::{Deserialize, Serialize};

use crate::ctrl::scheduler::SchedView;
use crate::dram::{AddrVec, Command};
use crate::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicyKind {
    #[default]
    Opened,
    Closed,
    Timeout,
}

impl RowPolicyKind {
    pub fn build(self, timeout: Cycle) -> Box<dyn RowPolicy> {
        match self {
            RowPolicyKind::Opened => Box::new(OpenedPolicy),
            RowPolicyKind::Closed => Box::new(ClosedPolicy),
            RowPolicyKind::Timeout => Box::new(TimeoutPolicy { timeout }),
        }
    }
}

/// Chooses an open row to close speculatively on an otherwise idle cycle.
pub trait RowPolicy {
    fn get_victim(&self, cmd: Command, view: &SchedView) -> Option<AddrVec>;
}

pub struct OpenedPolicy;

impl RowPolicy for OpenedPolicy {
    fn get_victim(&self, _cmd: Command, _view: &SchedView) -> Option<AddrVec> {
        None
    }
}

pub struct ClosedPolicy;

impl RowPolicy for ClosedPolicy {
    fn get_victim(&self, cmd: Command, view: &SchedView) -> Option<AddrVec> {
        view.row_table
            .iter()
            .map(|(addr, _)| addr)
            .find(|addr| view.channel.is_ready(cmd, addr, view.clk))
    }
}

/// Closes rows left idle for at least `timeout` cycles.
pub struct TimeoutPolicy {
    pub timeout: Cycle,
}

impl RowPolicy for TimeoutPolicy {
    fn get_victim(&self, cmd: Command, view: &SchedView) -> Option<AddrVec> {
        view.row_table
            .iter()
            .filter(|(_, entry)| view.clk.saturating_sub(entry.timestamp) >= self.timeout)
            .map(|(addr, _)| addr)
            .find(|addr| view.channel.is_ready(cmd, addr, view.clk))
    }
}
