use serde::Deserialize;

use crate::crow::CrowConfig;
use crate::ctrl::row_policy::RowPolicyKind;
use crate::ctrl::scheduler::SchedulerKind;
use crate::sim::config::Config;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Capacity of each of the read, write and other queues.
    pub queue_capacity: usize,
    pub scheduler: SchedulerKind,
    pub scheduler_cap: u64,
    pub row_policy: RowPolicyKind,
    pub row_policy_timeout: u64,
    pub disable_refresh: bool,
    pub record_cmd_trace: bool,
    pub cmd_trace_prefix: String,
    pub print_cmd_trace: bool,
    pub collect_row_activation_histogram: bool,
    pub cores: usize,
    /// Write-queue occupancy that switches to write priority.
    pub write_high_watermark: f64,
    /// Write-queue occupancy at or below which reads take over again.
    pub write_low_watermark: f64,
    pub crow: CrowConfig,
}

impl Config for ControllerConfig {}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            scheduler: SchedulerKind::default(),
            scheduler_cap: 16,
            row_policy: RowPolicyKind::default(),
            row_policy_timeout: 50,
            disable_refresh: false,
            record_cmd_trace: false,
            cmd_trace_prefix: "cmd-trace-".to_string(),
            print_cmd_trace: false,
            collect_row_activation_histogram: false,
            cores: 1,
            write_high_watermark: 0.8,
            write_low_watermark: 0.2,
            crow: CrowConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn ensure_valid(&self) {
        assert!(self.queue_capacity > 0, "queue_capacity must be > 0");
        assert!(self.cores > 0, "cores must be > 0");
        assert!(
            (0.0..=1.0).contains(&self.write_low_watermark)
                && (0.0..=1.0).contains(&self.write_high_watermark),
            "write watermarks must lie in [0, 1]"
        );
        assert!(
            self.write_low_watermark < self.write_high_watermark,
            "write_low_watermark must be below write_high_watermark"
        );
        self.crow.ensure_valid();
    }

    /// Write-queue lengths at which write priority is entered and left.
    pub fn write_thresholds(&self) -> (usize, usize) {
        let cap = self.queue_capacity as f64;
        (
            (self.write_high_watermark * cap) as usize,
            (self.write_low_watermark * cap) as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_capacity() {
        let c = ControllerConfig::default();
        c.ensure_valid();
        assert_eq!(c.write_thresholds(), (51, 12));
    }

    #[test]
    fn section_parses_nested_crow() {
        let section: toml::Value = toml::from_str(
            r#"
            queue_capacity = 32
            scheduler = "frfcfs_cap"
            row_policy = "timeout"
            [crow]
            copy_rows_per_sa = 8
            evict_hit_threshold = 2
            "#,
        )
        .unwrap();
        let c = ControllerConfig::from_section(Some(&section));
        assert_eq!(c.queue_capacity, 32);
        assert_eq!(c.scheduler, SchedulerKind::FrfcfsCap);
        assert_eq!(c.row_policy, RowPolicyKind::Timeout);
        assert!(c.crow.table_enabled());
        assert_eq!(c.crow.evict_hit_threshold, 2);
        assert_eq!(c.cmd_trace_prefix, "cmd-trace-");
    }
}
