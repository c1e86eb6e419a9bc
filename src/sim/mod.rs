pub mod config;
pub mod perf_log;
pub mod phase;
pub mod top;
pub mod trace;
pub mod traffic;
