//! Pipeline step records.
//!
//! A release run holds one [`PipelineStep`] per stage, in execution order.
//! Steps accumulate attempt counts and the last error seen, which is where
//! the retry loop leaves its audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Acquire registry credentials
    Authenticate,
    /// Build the image from its manifest
    Build,
    /// Apply the fully qualified reference locally
    Tag,
    /// Upload the image to the registry
    Push,
    /// Confirm the registry lists the pushed reference
    Verify,
}

impl StepKind {
    /// All stages in execution order
    pub const ALL: [StepKind; 5] = [
        StepKind::Authenticate,
        StepKind::Build,
        StepKind::Tag,
        StepKind::Push,
        StepKind::Verify,
    ];

    /// Human-readable stage name
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Authenticate => "Authenticate",
            StepKind::Build => "Build",
            StepKind::Tag => "Tag",
            StepKind::Push => "Push",
            StepKind::Verify => "Verify",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle status of a step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Not dispatched yet
    Pending,
    /// Currently executing
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Execution record for a single pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Which stage this record tracks
    pub kind: StepKind,
    /// Current lifecycle status
    pub status: StepStatus,
    /// Number of attempts dispatched so far
    pub attempt_count: u32,
    /// Message of the most recent failure, if any
    pub last_error: Option<String>,
    /// When the step first started running
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a final status
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineStep {
    /// Create a pending record for `kind`.
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            status: StepStatus::Pending,
            attempt_count: 0,
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark the step as running. The start time is set once.
    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Count one dispatched attempt.
    pub fn record_attempt(&mut self) {
        self.attempt_count = self.attempt_count.saturating_add(1);
    }

    /// Record a failed attempt without finalizing the step.
    pub fn record_attempt_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    /// Mark the step as succeeded.
    pub fn mark_succeeded(&mut self) {
        self.status = StepStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the step as failed with its final error.
    pub fn mark_failed(&mut self, error: &str) {
        self.status = StepStatus::Failed;
        self.last_error = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock duration between start and finish, when both are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_step_is_pending_with_zero_attempts() {
        let step = PipelineStep::new(StepKind::Push);
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.attempt_count, 0);
        assert!(step.last_error.is_none());
    }

    #[test]
    fn start_time_is_set_once_across_retries() {
        let mut step = PipelineStep::new(StepKind::Push);
        step.mark_running();
        let first_start = step.started_at;
        step.record_attempt();
        step.mark_running();
        assert_eq!(step.started_at, first_start);
    }

    #[test]
    fn failure_records_final_error() {
        let mut step = PipelineStep::new(StepKind::Build);
        step.mark_running();
        step.record_attempt();
        step.mark_failed("base image not found");
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.last_error.as_deref(), Some("base image not found"));
        assert!(step.finished_at.is_some());
    }

    #[test]
    fn step_order_is_stable() {
        let names: Vec<&str> = StepKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, ["Authenticate", "Build", "Tag", "Push", "Verify"]);
    }
}
