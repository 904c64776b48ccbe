use crate::config::CombinationSize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerPhase {
    Idle,
    Precomputing,
    Searching(CombinationSize),
    Done,
}

/// Shared, advisory view of a running optimization: current phase, unit
/// progress, and a cooperative cancellation flag checked at the optimizer's
/// yield points. Cloning hands out another handle to the same state.
#[derive(Clone)]
pub struct OptimizerStatus {
    inner: Arc<Mutex<OptimizerStatusData>>,
    cancel_requested: Arc<AtomicBool>,
}

struct OptimizerStatusData {
    phase: OptimizerPhase,
    units_completed: usize,
    units_total: usize,
}

#[derive(Clone, Debug)]
pub struct OptimizerStatusSnapshot {
    pub phase: OptimizerPhase,
    pub units_completed: usize,
    pub units_total: usize,
}

impl Default for OptimizerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(OptimizerStatusData {
                phase: OptimizerPhase::Idle,
                units_completed: 0,
                units_total: 0,
            })),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_phase(&self, phase: OptimizerPhase) {
        if let Ok(mut data) = self.inner.lock() {
            data.phase = phase;
        }
    }

    pub fn set_progress(&self, units_completed: usize, units_total: usize) {
        if let Ok(mut data) = self.inner.lock() {
            data.units_completed = units_completed;
            data.units_total = units_total;
        }
    }

    pub fn snapshot(&self) -> OptimizerStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            OptimizerStatusSnapshot {
                phase: data.phase,
                units_completed: data.units_completed,
                units_total: data.units_total,
            }
        } else {
            OptimizerStatusSnapshot {
                phase: OptimizerPhase::Idle,
                units_completed: 0,
                units_total: 0,
            }
        }
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Relaxed);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_state() {
        let status = OptimizerStatus::new();
        let other = status.clone();
        status.set_phase(OptimizerPhase::Precomputing);
        status.set_progress(3, 10);
        let snapshot = other.snapshot();
        assert_eq!(snapshot.phase, OptimizerPhase::Precomputing);
        assert_eq!(snapshot.units_completed, 3);
        assert_eq!(snapshot.units_total, 10);

        assert!(!other.is_cancel_requested());
        status.request_cancel();
        assert!(other.is_cancel_requested());
    }
}
