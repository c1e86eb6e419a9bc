use crate::Cycle;

/// Periodic refresh cadence, one countdown per rank. The trigger only says
/// which ranks are due; the controller acknowledges a rank once its refresh
/// request is queued.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    interval: Cycle,
    clk: Cycle,
    last: Vec<Cycle>,
}

impl RefreshTrigger {
    pub fn new(interval: Cycle, ranks: usize) -> Self {
        assert!(interval > 0, "refresh interval must be > 0");
        Self {
            interval,
            clk: 0,
            last: vec![0; ranks],
        }
    }

    pub fn interval(&self) -> Cycle {
        self.interval
    }

    /// Advances one cycle and returns the ranks whose refresh is due.
    pub fn tick(&mut self) -> Vec<usize> {
        self.clk += 1;
        self.last
            .iter()
            .enumerate()
            .filter(|(_, &last)| self.clk - last >= self.interval)
            .map(|(rank, _)| rank)
            .collect()
    }

    pub fn acknowledge(&mut self, rank: usize) {
        self.last[rank] = self.clk;
    }
}
