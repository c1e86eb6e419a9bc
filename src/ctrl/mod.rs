pub mod cmd_trace;
pub mod config;
pub mod controller;
pub mod queue;
pub mod refresh;
pub mod request;
pub mod row_policy;
pub mod row_table;
pub mod scheduler;
pub mod stats;

#[cfg(test)]
mod unit_tests;

pub use cmd_trace::CmdTrace;
pub use config::ControllerConfig;
pub use controller::Controller;
pub use queue::{ReqHandle, RequestQueue};
pub use refresh::RefreshTrigger;
pub use request::{Callback, ReqKind, Request};
pub use row_policy::{RowPolicy, RowPolicyKind};
pub use row_table::{RowEntry, RowTable};
pub use scheduler::{SchedView, Scheduler, SchedulerKind};
pub use stats::{ControllerStats, ControllerSummary, CrowStats};
