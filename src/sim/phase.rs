use serde::Serialize;

/// Simulation phase every component is told about explicitly. Statistics
/// gathered during warm-up are discarded at the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SimPhase {
    Warmup,
    #[default]
    Measure,
}

impl SimPhase {
    pub fn is_measuring(self) -> bool {
        self == SimPhase::Measure
    }
}
