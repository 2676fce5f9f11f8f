//! Per-operation fault injection for in-memory adapters

use crate::error::{PortError, PortResult};
use dashmap::DashMap;
use std::sync::Arc;

/// How an armed operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Always,
    Times(u32),
}

/// Shared set of operations that should fail
///
/// Operation names match the trait method names (`move_file`, `commit`, ...).
/// Clones share the same plan.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Arc<DashMap<String, Fault>>,
}

impl FaultPlan {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of `operation`
    pub fn fail(&self, operation: &str) {
        self.faults.insert(operation.to_string(), Fault::Always);
    }

    /// Fail the next `times` calls of `operation`
    pub fn fail_times(&self, operation: &str, times: u32) {
        if times > 0 {
            self.faults.insert(operation.to_string(), Fault::Times(times));
        }
    }

    pub fn clear(&self, operation: &str) {
        self.faults.remove(operation);
    }

    pub fn clear_all(&self) {
        self.faults.clear();
    }

    /// Consume one armed failure for `operation`, if any
    ///
    /// # Errors
    /// Returns [`PortError::Failed`] when `operation` is armed.
    pub fn check(&self, operation: &'static str) -> PortResult<()> {
        let Some(mut fault) = self.faults.get_mut(operation) else {
            return Ok(());
        };
        let exhausted = match &mut *fault {
            Fault::Always => false,
            Fault::Times(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
        };
        drop(fault);
        if exhausted {
            self.faults.remove(operation);
        }
        tracing::debug!(operation, "injected fault");
        Err(PortError::failed(operation, "injected fault"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_fault_expires() {
        let plan = FaultPlan::new();
        plan.fail_times("move_file", 2);
        assert!(plan.check("move_file").is_err());
        assert!(plan.check("move_file").is_err());
        assert!(plan.check("move_file").is_ok());
    }

    #[test]
    fn clones_share_state() {
        let plan = FaultPlan::new();
        let other = plan.clone();
        other.fail("commit");
        assert!(plan.check("commit").is_err());
        assert!(plan.check("commit").is_err());
        plan.clear("commit");
        assert!(other.check("commit").is_ok());
    }
}
