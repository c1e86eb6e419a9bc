use serde::{Deserialize, Serialize};

/// Scaling applied to the baseline timing when an activation is served from
/// (or creates) a row copy.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrowTimingFactors {
    pub trcd_partial_hit: f64,
    pub trcd_full_hit: f64,
    pub tras_partial_hit_partial_restore: f64,
    pub tras_partial_hit_full_restore: f64,
    pub tras_full_hit_partial_restore: f64,
    pub tras_full_hit_full_restore: f64,
    pub tras_copy_partial_restore: f64,
    pub tras_copy_full_restore: f64,
    pub twr_partial_restore: f64,
    pub twr_full_restore: f64,
}

impl Default for CrowTimingFactors {
    fn default() -> Self {
        Self {
            trcd_partial_hit: 1.0,
            trcd_full_hit: 1.0,
            tras_partial_hit_partial_restore: 1.0,
            tras_partial_hit_full_restore: 1.0,
            tras_full_hit_partial_restore: 1.0,
            tras_full_hit_full_restore: 1.0,
            tras_copy_partial_restore: 1.0,
            tras_copy_full_restore: 1.0,
            twr_partial_restore: 1.0,
            twr_full_restore: 1.0,
        }
    }
}

impl CrowTimingFactors {
    fn all(&self) -> [(&'static str, f64); 10] {
        [
            ("trcd_partial_hit", self.trcd_partial_hit),
            ("trcd_full_hit", self.trcd_full_hit),
            ("tras_partial_hit_partial_restore", self.tras_partial_hit_partial_restore),
            ("tras_partial_hit_full_restore", self.tras_partial_hit_full_restore),
            ("tras_full_hit_partial_restore", self.tras_full_hit_partial_restore),
            ("tras_full_hit_full_restore", self.tras_full_hit_full_restore),
            ("tras_copy_partial_restore", self.tras_copy_partial_restore),
            ("tras_copy_full_restore", self.tras_copy_full_restore),
            ("twr_partial_restore", self.twr_partial_restore),
            ("twr_full_restore", self.twr_full_restore),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrowConfig {
    /// Copy rows per subarray; zero disables the row-copy cache.
    pub copy_rows_per_sa: usize,
    /// Copy rows per subarray held back for low-retention rows.
    pub weak_rows_per_sa: usize,
    /// Subarrays sharing one table set.
    pub table_grouped_sas: usize,
    /// Entries with more hits than this are never evicted.
    pub evict_hit_threshold: u64,
    pub evict_fully_restored: bool,
    /// Treat every activation as a hit on a fully restored copy.
    pub upperbound: bool,
    /// Timing-gain caching mode: writes invalidate or close cached rows.
    pub tl_dram: bool,
    /// Refresh interval multiplier applied while copy timing is in effect.
    pub refresh_mult: f64,
    pub weak_row_seed: u64,
    pub timing: CrowTimingFactors,
}

impl Default for CrowConfig {
    fn default() -> Self {
        Self {
            copy_rows_per_sa: 0,
            weak_rows_per_sa: 0,
            table_grouped_sas: 1,
            evict_hit_threshold: 0,
            evict_fully_restored: false,
            upperbound: false,
            tl_dram: false,
            refresh_mult: 1.0,
            weak_row_seed: 0,
            timing: CrowTimingFactors::default(),
        }
    }
}

impl CrowConfig {
    /// The row-copy table is kept. Upper-bound mode models hits without one.
    pub fn table_enabled(&self) -> bool {
        self.copy_rows_per_sa > 0 && !self.upperbound
    }

    /// Copy timing profiles and the refresh multiplier apply.
    pub fn timing_enabled(&self) -> bool {
        self.table_enabled() || self.upperbound
    }

    pub fn ensure_valid(&self) {
        assert!(
            !self.evict_fully_restored,
            "evict_fully_restored is not supported"
        );
        assert!(self.table_grouped_sas > 0, "table_grouped_sas must be > 0");
        assert!(self.refresh_mult > 0.0, "refresh_mult must be > 0");
        if self.copy_rows_per_sa > 0 {
            assert!(
                self.weak_rows_per_sa < self.copy_rows_per_sa,
                "weak_rows_per_sa ({}) must leave at least one copy row of {}",
                self.weak_rows_per_sa,
                self.copy_rows_per_sa
            );
        }
        for (name, factor) in self.timing.all() {
            assert!(factor > 0.0, "{name} must be > 0");
        }
    }
}
