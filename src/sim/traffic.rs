use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::ctrl::request::ReqKind;
use crate::sim::trace::RequestSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrafficPattern {
    /// Sequential cache lines.
    #[default]
    Stream,
    /// Uniform over the footprint.
    Random,
    /// Mostly a handful of fixed rows, otherwise random.
    HotRow,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub pattern: TrafficPattern,
    pub requests: u64,
    /// Fraction of requests that are writes.
    pub write_ratio: f64,
    pub seed: u64,
    pub footprint_bytes: u64,
    pub stride_bytes: u64,
    pub hot_rows: usize,
    /// Fraction of requests that go to a hot row.
    pub hot_fraction: f64,
    /// Bytes around each hot address that count as the same row.
    pub hot_span_bytes: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            pattern: TrafficPattern::Stream,
            requests: 100000,
            write_ratio: 0.25,
            seed: 0,
            footprint_bytes: 1 << 30,
            stride_bytes: 64,
            hot_rows: 8,
            hot_fraction: 0.9,
            hot_span_bytes: 1024,
        }
    }
}

impl TrafficConfig {
    pub fn ensure_valid(&self) {
        assert!((0.0..=1.0).contains(&self.write_ratio), "write_ratio must lie in [0, 1]");
        assert!((0.0..=1.0).contains(&self.hot_fraction), "hot_fraction must lie in [0, 1]");
        assert!(self.footprint_bytes >= 64, "footprint_bytes must cover a cache line");
        assert!(self.stride_bytes > 0, "stride_bytes must be > 0");
        assert!(self.hot_span_bytes >= 64, "hot_span_bytes must cover a cache line");
        if self.pattern == TrafficPattern::HotRow {
            assert!(self.hot_rows > 0, "hot_row traffic needs hot_rows > 0");
        }
    }
}

/// Seeded synthetic request stream.
pub struct TrafficGen {
    config: TrafficConfig,
    rng: StdRng,
    sent: u64,
    hot: Vec<u64>,
}

const LINE: u64 = 64;

impl TrafficGen {
    pub fn new(config: TrafficConfig) -> Self {
        config.ensure_valid();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let lines = config.footprint_bytes / LINE;
        let hot = (0..config.hot_rows)
            .map(|_| rng.gen_range(0..lines) * LINE)
            .collect();
        Self {
            config,
            rng,
            sent: 0,
            hot,
        }
    }

    fn random_line(&mut self) -> u64 {
        self.rng.gen_range(0..self.config.footprint_bytes / LINE) * LINE
    }

    fn next_addr(&mut self) -> u64 {
        match self.config.pattern {
            TrafficPattern::Stream => (self.sent * self.config.stride_bytes) % self.config.footprint_bytes,
            TrafficPattern::Random => self.random_line(),
            TrafficPattern::HotRow => {
                if self.rng.gen_bool(self.config.hot_fraction) {
                    let base = self.hot[self.rng.gen_range(0..self.hot.len())];
                    let offset = self.rng.gen_range(0..self.config.hot_span_bytes / LINE) * LINE;
                    (base + offset) % self.config.footprint_bytes
                } else {
                    self.random_line()
                }
            }
        }
    }
}

impl RequestSource for TrafficGen {
    fn next_request(&mut self) -> Result<Option<(u64, ReqKind)>> {
        if self.sent >= self.config.requests {
            return Ok(None);
        }
        let addr = self.next_addr();
        let kind = if self.rng.gen_bool(self.config.write_ratio) {
            ReqKind::Write
        } else {
            ReqKind::Read
        };
        self.sent += 1;
        Ok(Some((addr, kind)))
    }
}
