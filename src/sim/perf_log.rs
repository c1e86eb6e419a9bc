use std::fs;
use std::ops::AddAssign;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::memory::MemorySummary;
use crate::Cycle;

/// Read latencies in power-of-two buckets from 32 cycles up.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct LatencyHistogram {
    pub buckets: [u64; 6],
}

impl LatencyHistogram {
    pub fn record(&mut self, latency: Cycle) {
        let idx = match latency {
            0..=31 => 0,
            32..=63 => 1,
            64..=127 => 2,
            128..=255 => 3,
            256..=511 => 4,
            _ => 5,
        };
        self.buckets[idx] = self.buckets[idx].saturating_add(1);
    }

    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }
}

impl AddAssign<&LatencyHistogram> for LatencyHistogram {
    fn add_assign(&mut self, other: &LatencyHistogram) {
        for (dst, src) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *dst = dst.saturating_add(*src);
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub cycles: Cycle,
    pub requests_sent: u64,
    pub timed_out: bool,
    pub read_latency_hist: LatencyHistogram,
    pub memory: MemorySummary,
}

pub fn write_summary<T: Serialize>(path: &Path, summary: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    let payload = serde_json::to_string_pretty(summary).context("cannot serialize summary")?;
    fs::write(path, payload).with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_buckets() {
        let mut h = LatencyHistogram::default();
        for lat in [20, 37, 64, 300, 5000] {
            h.record(lat);
        }
        assert_eq!(h.buckets, [1, 1, 1, 0, 1, 1]);
        let mut sum = LatencyHistogram::default();
        sum += &h;
        sum += &h;
        assert_eq!(sum.total(), 10);
    }
}
