use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::Serialize;

use crate::dram::RowStatus;
use crate::Cycle;

/// Row-copy cache activity of one channel.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CrowStats {
    pub full_restore: u64,
    pub skip_full_restore: u64,
    pub hits: u64,
    pub all_hits: u64,
    pub misses: u64,
    pub copies: u64,
    pub fr_set: u64,
    pub fr_notset: u64,
    pub fr_ref: u64,
    pub fr_restore: u64,
    pub hits_with_fr: u64,
    pub bypass_copying: u64,
    pub tl_dram_invalidate_due_to_write: u64,
    pub tl_dram_precharge_cached_row_due_to_write: u64,
    pub tl_dram_precharge_failed_due_to_timing: u64,
}

impl AddAssign<&CrowStats> for CrowStats {
    fn add_assign(&mut self, o: &CrowStats) {
        self.full_restore = self.full_restore.saturating_add(o.full_restore);
        self.skip_full_restore = self.skip_full_restore.saturating_add(o.skip_full_restore);
        self.hits = self.hits.saturating_add(o.hits);
        self.all_hits = self.all_hits.saturating_add(o.all_hits);
        self.misses = self.misses.saturating_add(o.misses);
        self.copies = self.copies.saturating_add(o.copies);
        self.fr_set = self.fr_set.saturating_add(o.fr_set);
        self.fr_notset = self.fr_notset.saturating_add(o.fr_notset);
        self.fr_ref = self.fr_ref.saturating_add(o.fr_ref);
        self.fr_restore = self.fr_restore.saturating_add(o.fr_restore);
        self.hits_with_fr = self.hits_with_fr.saturating_add(o.hits_with_fr);
        self.bypass_copying = self.bypass_copying.saturating_add(o.bypass_copying);
        self.tl_dram_invalidate_due_to_write = self
            .tl_dram_invalidate_due_to_write
            .saturating_add(o.tl_dram_invalidate_due_to_write);
        self.tl_dram_precharge_cached_row_due_to_write = self
            .tl_dram_precharge_cached_row_due_to_write
            .saturating_add(o.tl_dram_precharge_cached_row_due_to_write);
        self.tl_dram_precharge_failed_due_to_timing = self
            .tl_dram_precharge_failed_due_to_timing
            .saturating_add(o.tl_dram_precharge_failed_due_to_timing);
    }
}

/// Hit/miss/conflict counts for one access direction of one core.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RowOutcomes {
    pub hits: u64,
    pub misses: u64,
    pub conflicts: u64,
}

impl RowOutcomes {
    pub fn record(&mut self, status: RowStatus) {
        let slot = match status {
            RowStatus::Hit => &mut self.hits,
            RowStatus::Miss => &mut self.misses,
            RowStatus::Conflict => &mut self.conflicts,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn total(&self) -> u64 {
        self.hits + self.misses + self.conflicts
    }
}

impl AddAssign<&RowOutcomes> for RowOutcomes {
    fn add_assign(&mut self, o: &RowOutcomes) {
        self.hits = self.hits.saturating_add(o.hits);
        self.misses = self.misses.saturating_add(o.misses);
        self.conflicts = self.conflicts.saturating_add(o.conflicts);
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CoreStats {
    pub read: RowOutcomes,
    pub write: RowOutcomes,
    pub read_latency_sum: u64,
}

/// Activations per local row, per subarray, per flat bank.
pub type RowActHistogram = BTreeMap<i64, BTreeMap<usize, BTreeMap<usize, u64>>>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerStats {
    pub cycles: Cycle,
    pub read_transaction_bytes: u64,
    pub write_transaction_bytes: u64,
    pub row: RowOutcomes,
    pub per_core: Vec<CoreStats>,
    pub useless_activates: u64,
    pub reads_served: u64,
    pub read_latency_sum: u64,
    pub req_queue_length_sum: u64,
    pub read_req_queue_length_sum: u64,
    pub write_req_queue_length_sum: u64,
    pub crow: CrowStats,
    pub row_act_hist: RowActHistogram,
}

impl ControllerStats {
    pub fn new(cores: usize) -> Self {
        Self {
            per_core: vec![CoreStats::default(); cores],
            ..Self::default()
        }
    }

    fn core(&mut self, core_id: usize) -> &mut CoreStats {
        if core_id >= self.per_core.len() {
            self.per_core.resize(core_id + 1, CoreStats::default());
        }
        &mut self.per_core[core_id]
    }

    pub fn record_queue_lengths(&mut self, reads: usize, writes: usize, pending: usize) {
        self.cycles += 1;
        self.req_queue_length_sum += (reads + writes + pending) as u64;
        self.read_req_queue_length_sum += (reads + pending) as u64;
        self.write_req_queue_length_sum += writes as u64;
    }

    pub fn record_first_read(&mut self, core_id: usize, status: RowStatus, bytes: u64) {
        self.row.record(status);
        self.core(core_id).read.record(status);
        self.read_transaction_bytes += bytes;
    }

    pub fn record_first_write(&mut self, core_id: usize, status: RowStatus, bytes: u64) {
        self.row.record(status);
        self.core(core_id).write.record(status);
        self.write_transaction_bytes += bytes;
    }

    pub fn record_read_latency(&mut self, core_id: usize, latency: Cycle) {
        self.reads_served += 1;
        self.read_latency_sum += latency;
        let core = self.core(core_id);
        core.read_latency_sum = core.read_latency_sum.saturating_add(latency);
    }

    pub fn record_activation(&mut self, bank: i64, sa: usize, local_row: usize) {
        *self
            .row_act_hist
            .entry(bank)
            .or_default()
            .entry(sa)
            .or_default()
            .entry(local_row)
            .or_default() += 1;
    }

    pub fn summary(&self) -> ControllerSummary {
        let avg = |sum: u64, n: u64| if n == 0 { 0.0 } else { sum as f64 / n as f64 };
        ControllerSummary {
            read_latency_avg: avg(self.read_latency_sum, self.reads_served),
            read_latency_avg_per_core: self
                .per_core
                .iter()
                .map(|c| avg(c.read_latency_sum, c.read.total()))
                .collect(),
            req_queue_length_avg: avg(self.req_queue_length_sum, self.cycles),
            read_req_queue_length_avg: avg(self.read_req_queue_length_sum, self.cycles),
            write_req_queue_length_avg: avg(self.write_req_queue_length_sum, self.cycles),
            stats: self.clone(),
        }
    }
}

impl AddAssign<&ControllerStats> for ControllerStats {
    fn add_assign(&mut self, o: &ControllerStats) {
        self.cycles = self.cycles.max(o.cycles);
        self.read_transaction_bytes += o.read_transaction_bytes;
        self.write_transaction_bytes += o.write_transaction_bytes;
        self.row += &o.row;
        for (id, c) in o.per_core.iter().enumerate() {
            let mine = self.core(id);
            mine.read += &c.read;
            mine.write += &c.write;
            mine.read_latency_sum += c.read_latency_sum;
        }
        self.useless_activates += o.useless_activates;
        self.reads_served += o.reads_served;
        self.read_latency_sum += o.read_latency_sum;
        self.req_queue_length_sum += o.req_queue_length_sum;
        self.read_req_queue_length_sum += o.read_req_queue_length_sum;
        self.write_req_queue_length_sum += o.write_req_queue_length_sum;
        self.crow += &o.crow;
        for (bank, sas) in &o.row_act_hist {
            for (sa, rows) in sas {
                for (row, n) in rows {
                    *self
                        .row_act_hist
                        .entry(*bank)
                        .or_default()
                        .entry(*sa)
                        .or_default()
                        .entry(*row)
                        .or_default() += n;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerSummary {
    pub read_latency_avg: f64,
    pub read_latency_avg_per_core: Vec<f64>,
    pub req_queue_length_avg: f64,
    pub read_req_queue_length_avg: f64,
    pub write_req_queue_length_avg: f64,
    #[serde(flatten)]
    pub stats: ControllerStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_command_outcomes_are_exclusive() {
        let mut s = ControllerStats::new(2);
        s.record_first_read(0, RowStatus::Hit, 64);
        s.record_first_read(1, RowStatus::Conflict, 64);
        s.record_first_write(1, RowStatus::Miss, 64);
        assert_eq!(s.row, RowOutcomes { hits: 1, misses: 1, conflicts: 1 });
        assert_eq!(s.per_core[1].read.conflicts, 1);
        assert_eq!(s.per_core[1].write.misses, 1);
        assert_eq!(s.read_transaction_bytes, 128);
        assert_eq!(s.write_transaction_bytes, 64);
    }

    #[test]
    fn summary_averages_guard_zero() {
        let mut s = ControllerStats::new(1);
        assert_eq!(s.summary().read_latency_avg, 0.0);
        s.record_first_read(0, RowStatus::Miss, 64);
        s.record_read_latency(0, 30);
        s.record_queue_lengths(2, 1, 1);
        s.record_queue_lengths(0, 3, 0);
        let sum = s.summary();
        assert_eq!(sum.read_latency_avg, 30.0);
        assert_eq!(sum.read_latency_avg_per_core, vec![30.0]);
        assert_eq!(sum.req_queue_length_avg, 3.5);
        assert_eq!(sum.write_req_queue_length_avg, 2.0);
    }

    #[test]
    fn aggregation_merges_histograms_and_cores() {
        let mut a = ControllerStats::new(1);
        a.record_activation(3, 1, 17);
        a.crow.copies = 2;
        let mut b = ControllerStats::new(2);
        b.record_activation(3, 1, 17);
        b.record_activation(0, 0, 1);
        b.record_first_write(1, RowStatus::Hit, 64);
        b.crow.copies = 1;
        a += &b;
        assert_eq!(a.row_act_hist[&3][&1][&17], 2);
        assert_eq!(a.row_act_hist[&0][&0][&1], 1);
        assert_eq!(a.per_core.len(), 2);
        assert_eq!(a.crow.copies, 3);
    }
}
