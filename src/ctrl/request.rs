use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::dram::AddrVec;
use crate::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReqKind {
    Read,
    Write,
    Refresh,
    PowerDown,
    SelfRefresh,
    Extension,
    Prefetch,
}

impl ReqKind {
    pub fn is_read_like(self) -> bool {
        matches!(self, ReqKind::Read | ReqKind::Prefetch)
    }
}

/// Completion hook. Invoked once, on the cycle a read retires.
pub type Callback = Rc<dyn Fn(&Request)>;

#[derive(Clone)]
pub struct Request {
    pub addr: u64,
    pub addr_vec: AddrVec,
    pub kind: ReqKind,
    pub core_id: usize,
    pub arrive: Cycle,
    pub depart: Cycle,
    /// Set once the first DRAM command on behalf of this request issues.
    pub is_first_command: bool,
    pub callback: Option<Callback>,
    /// Demand-read callback a prefetch switches to when upgraded.
    pub proc_callback: Option<Callback>,
}

impl Request {
    pub fn new(addr: u64, kind: ReqKind, core_id: usize) -> Self {
        Self {
            addr,
            addr_vec: AddrVec::new(),
            kind,
            core_id,
            arrive: 0,
            depart: 0,
            is_first_command: true,
            callback: None,
            proc_callback: None,
        }
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_proc_callback(mut self, callback: Callback) -> Self {
        self.proc_callback = Some(callback);
        self
    }

    /// Rank-scoped control request (refresh, power-down); levels below the
    /// rank are left untargeted.
    pub fn for_rank(kind: ReqKind, channel: usize, rank: usize, num_levels: usize) -> Self {
        let mut addr_vec: AddrVec = smallvec::smallvec![-1; num_levels];
        addr_vec[0] = channel as i64;
        addr_vec[1] = rank as i64;
        Self {
            addr_vec,
            ..Self::new(0, kind, 0)
        }
    }

    pub fn latency(&self) -> Cycle {
        self.depart.saturating_sub(self.arrive)
    }

    pub(crate) fn complete(&self) {
        if let Some(cb) = &self.callback {
            cb(self);
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("addr_vec", &self.addr_vec.as_slice())
            .field("kind", &self.kind)
            .field("core_id", &self.core_id)
            .field("arrive", &self.arrive)
            .field("depart", &self.depart)
            .field("is_first_command", &self.is_first_command)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
