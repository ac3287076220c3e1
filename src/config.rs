//! Reconciler configuration
//!
//! Defaults match the published simple-service deployment.
//! The binary overrides them from command-line flags and environment variables.

use std::time::Duration;

use crate::workload::WorkloadTemplate;

/// Delay before re-inspecting a Deployment whose replica count was just changed
pub const DEFAULT_RESIZE_REQUEUE: Duration = Duration::from_secs(60);

/// Delay before retrying a pass that failed with a transient error
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Delay before retrying a pass that lost an optimistic-concurrency race
pub const DEFAULT_CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Tunables for the Simple reconciler
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcilerConfig {
    /// Pod template stamped into every managed Deployment
    pub template: WorkloadTemplate,
    /// Requeue delay after a resize, giving the Deployment controller time to
    /// converge the pod population
    pub resize_requeue: Duration,
    /// Requeue delay after a failed pass
    pub error_requeue: Duration,
    /// Requeue delay after an update conflict
    pub conflict_requeue: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            template: WorkloadTemplate::default(),
            resize_requeue: DEFAULT_RESIZE_REQUEUE,
            error_requeue: DEFAULT_ERROR_REQUEUE,
            conflict_requeue: DEFAULT_CONFLICT_REQUEUE,
        }
    }
}

impl ReconcilerConfig {
    /// Replace the workload template and return self for chaining
    pub fn template(mut self, template: WorkloadTemplate) -> Self {
        self.template = template;
        self
    }

    /// Set the resize requeue delay and return self for chaining
    pub fn resize_requeue(mut self, delay: Duration) -> Self {
        self.resize_requeue = delay;
        self
    }

    /// Set the error requeue delay and return self for chaining
    pub fn error_requeue(mut self, delay: Duration) -> Self {
        self.error_requeue = delay;
        self
    }

    /// Set the conflict requeue delay and return self for chaining
    pub fn conflict_requeue(mut self, delay: Duration) -> Self {
        self.conflict_requeue = delay;
        self
    }
}
