use std::collections::VecDeque;
use std::sync::Arc;

use crate::dram::standard::{Command, Level, Standard, NUM_COMMANDS};
use crate::dram::timing::TimingTable;
use crate::dram::RowStatus;
use crate::Cycle;

/// The device-side legality oracle the controller talks to. It knows the
/// topology and the spacing state; the controller only asks and issues.
pub trait TimingChecker {
    fn id(&self) -> usize;

    fn spec(&self) -> &Standard;

    /// The command that must issue next to make progress on `cmd` at `addr`
    /// (e.g. ACT for a read to a closed bank).
    fn decode(&self, cmd: Command, addr: &[i64]) -> Command;

    fn is_ready(&self, cmd: Command, addr: &[i64], clk: Cycle) -> bool;

    /// Apply `cmd` at `clk`, spacing successors according to `timing`.
    fn issue(&mut self, cmd: Command, addr: &[i64], clk: Cycle, timing: &TimingTable);

    fn row_status(&self, cmd: Command, addr: &[i64]) -> RowStatus;

    fn update_serving_requests(&mut self, addr: &[i64], delta: i64);

    fn serving_requests(&self) -> i64;

    fn end_of_refreshing(&self) -> Cycle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Stateless,
    PowerUp,
    ActPowerDown,
    PrePowerDown,
    SelfRefresh,
    Opened,
    Closed,
}

#[derive(Debug, Clone)]
struct Node {
    level: usize,
    kind: Level,
    id: usize,
    state: NodeState,
    open_row: Option<i64>,
    next: [Cycle; NUM_COMMANDS],
    prev: Vec<VecDeque<Option<Cycle>>>,
    children: Vec<Node>,
}

impl Node {
    fn new(spec: &Standard, level: usize, id: usize) -> Self {
        let kind = spec.levels[level];
        let state = match kind {
            Level::Rank => NodeState::PowerUp,
            Level::Bank => NodeState::Closed,
            _ => NodeState::Stateless,
        };
        let prev = Command::ALL
            .iter()
            .map(|&cmd| VecDeque::from(vec![None; spec.timing.max_dist(level, cmd)]))
            .collect();
        let children = if kind == Level::Bank {
            Vec::new()
        } else {
            (0..spec.count[level + 1])
                .map(|child| Node::new(spec, level + 1, child))
                .collect()
        };
        Self {
            level,
            kind,
            id,
            state,
            open_row: None,
            next: [0; NUM_COMMANDS],
            prev,
            children,
        }
    }

    fn child_index(&self, addr: &[i64]) -> Option<usize> {
        if self.children.is_empty() {
            return None;
        }
        let coord = *addr.get(self.level + 1)?;
        (coord >= 0).then_some(coord as usize)
    }

    fn any_bank_open(&self) -> bool {
        match self.kind {
            Level::Bank => self.state == NodeState::Opened,
            _ => self.children.iter().any(Node::any_bank_open),
        }
    }

    fn close_all_banks(&mut self) {
        if self.kind == Level::Bank {
            self.state = NodeState::Closed;
            self.open_row = None;
            return;
        }
        self.children.iter_mut().for_each(Node::close_all_banks);
    }

    fn prereq(&self, cmd: Command, addr: &[i64]) -> Option<Command> {
        use Command::*;
        match self.kind {
            Level::Rank => match (cmd, self.state) {
                (Pdx | Srx, _) => Some(cmd),
                (_, NodeState::ActPowerDown | NodeState::PrePowerDown) if cmd != Pde => Some(Pdx),
                (Pde, NodeState::SelfRefresh) => Some(Srx),
                (Pde, _) => Some(Pde),
                (Sre, NodeState::SelfRefresh) => Some(Sre),
                (_, NodeState::SelfRefresh) => Some(Srx),
                (Ref | Sre, _) if self.any_bank_open() => Some(Prea),
                (Ref | Sre | Prea, _) => Some(cmd),
                _ => None,
            },
            Level::Bank => match cmd {
                Rd | Wr | Rda | Wra => match self.state {
                    NodeState::Closed => Some(Act),
                    _ if self.open_row == addr.get(self.level + 1).copied() => Some(cmd),
                    _ => Some(Pre),
                },
                _ => None,
            },
            _ => None,
        }
    }

    fn decode(&self, cmd: Command, addr: &[i64]) -> Command {
        if let Some(prereq) = self.prereq(cmd, addr) {
            return prereq;
        }
        match self.child_index(addr) {
            Some(child) => self.children[child].decode(cmd, addr),
            None => cmd,
        }
    }

    fn check(&self, cmd: Command, addr: &[i64], clk: Cycle) -> bool {
        if self.next[cmd.index()] > clk {
            return false;
        }
        if self.kind == cmd.scope() {
            return true;
        }
        match self.child_index(addr) {
            Some(child) => self.children[child].check(cmd, addr, clk),
            None => true,
        }
    }

    fn bank(&self, addr: &[i64]) -> Option<&Node> {
        if self.kind == Level::Bank {
            return Some(self);
        }
        let child = self.child_index(addr)?;
        self.children[child].bank(addr)
    }

    fn update_state(&mut self, cmd: Command, addr: &[i64]) {
        use Command::*;
        match (self.kind, cmd) {
            (Level::Rank, Prea) => self.close_all_banks(),
            (Level::Rank, Pde) => {
                self.state = if self.any_bank_open() {
                    NodeState::ActPowerDown
                } else {
                    NodeState::PrePowerDown
                };
            }
            (Level::Rank, Pdx | Srx) => self.state = NodeState::PowerUp,
            (Level::Rank, Sre) => self.state = NodeState::SelfRefresh,
            (Level::Bank, Act) => {
                self.state = NodeState::Opened;
                self.open_row = addr.get(self.level + 1).copied();
            }
            (Level::Bank, Pre | Rda | Wra) => {
                self.state = NodeState::Closed;
                self.open_row = None;
            }
            _ => {}
        }
        if self.kind == cmd.scope() {
            return;
        }
        if let Some(child) = self.child_index(addr) {
            self.children[child].update_state(cmd, addr);
        }
    }

    fn update_timing(&mut self, cmd: Command, addr: &[i64], clk: Cycle, timing: &TimingTable) {
        if addr.get(self.level).copied() != Some(self.id as i64) {
            for t in timing.entries(self.level, cmd).iter().filter(|t| t.sibling) {
                let slot = &mut self.next[t.cmd.index()];
                *slot = (*slot).max(clk + t.val);
            }
            return;
        }

        let history = &mut self.prev[cmd.index()];
        if !history.is_empty() {
            history.pop_back();
            history.push_front(Some(clk));
        }
        for t in timing.entries(self.level, cmd).iter().filter(|t| !t.sibling) {
            let Some(past) = history.get(t.dist - 1).copied().flatten() else {
                continue;
            };
            let slot = &mut self.next[t.cmd.index()];
            *slot = (*slot).max(past + t.val);
        }

        for child in self.children.iter_mut() {
            child.update_timing(cmd, addr, clk, timing);
        }
    }
}

/// Reference timing checker: one channel's node tree down to banks.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: usize,
    spec: Arc<Standard>,
    root: Node,
    serving_requests: i64,
    end_of_refreshing: Cycle,
}

impl Channel {
    pub fn new(spec: Arc<Standard>, id: usize) -> Self {
        let root = Node::new(&spec, 0, id);
        Self {
            id,
            spec,
            root,
            serving_requests: 0,
            end_of_refreshing: 0,
        }
    }

    pub fn spec_arc(&self) -> Arc<Standard> {
        Arc::clone(&self.spec)
    }

    pub fn open_row(&self, addr: &[i64]) -> Option<i64> {
        self.root.bank(addr).and_then(|bank| bank.open_row)
    }
}

impl TimingChecker for Channel {
    fn id(&self) -> usize {
        self.id
    }

    fn spec(&self) -> &Standard {
        &self.spec
    }

    fn decode(&self, cmd: Command, addr: &[i64]) -> Command {
        self.root.decode(cmd, addr)
    }

    fn is_ready(&self, cmd: Command, addr: &[i64], clk: Cycle) -> bool {
        self.root.check(cmd, addr, clk)
    }

    fn issue(&mut self, cmd: Command, addr: &[i64], clk: Cycle, timing: &TimingTable) {
        self.root.update_state(cmd, addr);
        self.root.update_timing(cmd, addr, clk, timing);
        if cmd.is_refreshing() {
            self.end_of_refreshing = self.end_of_refreshing.max(clk + self.spec.speed.n_rfc);
        }
    }

    fn row_status(&self, cmd: Command, addr: &[i64]) -> RowStatus {
        if !cmd.is_accessing() {
            return RowStatus::Miss;
        }
        let row = addr.get(self.spec.level_index(Level::Row)).copied();
        match self.root.bank(addr) {
            Some(bank) if bank.state == NodeState::Opened && bank.open_row == row => RowStatus::Hit,
            Some(bank) if bank.state == NodeState::Opened => RowStatus::Conflict,
            _ => RowStatus::Miss,
        }
    }

    fn update_serving_requests(&mut self, _addr: &[i64], delta: i64) {
        self.serving_requests += delta;
        debug_assert!(self.serving_requests >= 0, "serving request count went negative");
    }

    fn serving_requests(&self) -> i64 {
        self.serving_requests
    }

    fn end_of_refreshing(&self) -> Cycle {
        self.end_of_refreshing
    }
}
