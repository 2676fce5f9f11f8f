//! Compensating-action saga runner
//!
//! A saga records one compensation per external side effect as the side
//! effect succeeds. On failure the recorded compensations run in reverse
//! registration order. A failing compensation does not stop the others;
//! failures are collected and reported next to the original error.

use crate::error::WorkflowError;
use docflow_ports::{PortError, PortResult};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

type CompensationFn = Box<dyn FnOnce() -> BoxFuture<'static, PortResult<()>> + Send>;

struct Compensation {
    step: &'static str,
    action: CompensationFn,
}

/// A compensation that failed to undo its step
#[derive(Debug)]
pub struct CompensationFailure {
    pub step: &'static str,
    pub error: PortError,
}

impl fmt::Display for CompensationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.error)
    }
}

/// Original error of a failed saga plus any compensation failures
#[derive(Debug)]
pub struct SagaFailure {
    pub error: WorkflowError,
    pub compensation_failures: Vec<CompensationFailure>,
}

impl SagaFailure {
    #[inline]
    #[must_use]
    pub fn is_fully_compensated(&self) -> bool {
        self.compensation_failures.is_empty()
    }

    /// Log the compensation report and keep only the original error
    #[must_use]
    pub fn into_error(self) -> WorkflowError {
        if !self.compensation_failures.is_empty() {
            let failures: Vec<String> = self
                .compensation_failures
                .iter()
                .map(ToString::to_string)
                .collect();
            tracing::error!(
                error = %self.error,
                count = failures.len(),
                failures = ?failures,
                "saga compensation incomplete; datastore and external systems may diverge"
            );
        }
        self.error
    }
}

/// Ordered list of registered compensations
pub struct Saga {
    name: &'static str,
    compensations: Vec<Compensation>,
}

impl fmt::Debug for Saga {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<&str> = self.compensations.iter().map(|c| c.step).collect();
        f.debug_struct("Saga")
            .field("name", &self.name)
            .field("compensations", &steps)
            .finish()
    }
}

impl Saga {
    #[inline]
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            compensations: Vec::new(),
        }
    }

    /// Register the compensation for a step that just succeeded
    pub fn register<F, Fut>(&mut self, step: &'static str, compensation: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PortResult<()>> + Send + 'static,
    {
        tracing::debug!(saga = self.name, step, "registered compensation");
        self.compensations.push(Compensation {
            step,
            action: Box::new(move || Box::pin(compensation())),
        });
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.compensations.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compensations.is_empty()
    }

    /// Registered steps, in registration order
    #[must_use]
    pub fn steps(&self) -> Vec<&'static str> {
        self.compensations.iter().map(|c| c.step).collect()
    }

    /// Run every compensation in reverse order, collecting failures
    pub async fn compensate(self) -> Vec<CompensationFailure> {
        let mut failures = Vec::new();
        for compensation in self.compensations.into_iter().rev() {
            match (compensation.action)().await {
                Ok(()) => {
                    tracing::info!(saga = self.name, step = compensation.step, "compensated");
                }
                Err(error) => {
                    tracing::error!(
                        saga = self.name,
                        step = compensation.step,
                        %error,
                        "compensation failed"
                    );
                    failures.push(CompensationFailure {
                        step: compensation.step,
                        error,
                    });
                }
            }
        }
        failures
    }

    /// Compensate after `error` and bundle the outcome
    pub async fn fail(self, error: WorkflowError) -> SagaFailure {
        tracing::warn!(saga = self.name, %error, steps = self.len(), "saga failed, compensating");
        let compensation_failures = self.compensate().await;
        SagaFailure {
            error,
            compensation_failures,
        }
    }

    /// Finish successfully, discarding compensations
    pub fn complete(self) {
        tracing::debug!(saga = self.name, steps = self.len(), "saga completed");
    }
}
