//! Release run tracking.
//!
//! A [`ReleaseRun`] is the in-memory record of one release attempt for one
//! target. It lives for the duration of the process and is never persisted;
//! a failed release is re-run from the start rather than resumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pipeline::step::{PipelineStep, StepKind, StepStatus};
use crate::reference::{ImageDigest, ImageReference};

/// Phase of a release run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Created, nothing dispatched yet
    Pending,
    /// Acquiring registry credentials
    Authenticating,
    /// Building the image
    Building,
    /// Applying the local tag
    Tagging,
    /// Uploading to the registry
    Pushing,
    /// Confirming the registry listing
    Verifying,
    /// Release completed successfully
    Completed,
    /// Release failed at the named step
    Failed(StepKind),
}

impl RunPhase {
    /// Whether the run has reached a final phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed(_))
    }

    /// The phase a run enters while `step` executes
    pub fn running(step: StepKind) -> Self {
        match step {
            StepKind::Authenticate => RunPhase::Authenticating,
            StepKind::Build => RunPhase::Building,
            StepKind::Tag => RunPhase::Tagging,
            StepKind::Push => RunPhase::Pushing,
            StepKind::Verify => RunPhase::Verifying,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Pending => write!(f, "Pending"),
            RunPhase::Authenticating => write!(f, "Authenticating"),
            RunPhase::Building => write!(f, "Building"),
            RunPhase::Tagging => write!(f, "Tagging"),
            RunPhase::Pushing => write!(f, "Pushing"),
            RunPhase::Verifying => write!(f, "Verifying"),
            RunPhase::Completed => write!(f, "Completed"),
            RunPhase::Failed(step) => write!(f, "Failed at {step}"),
        }
    }
}

/// In-memory record of one release attempt for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRun {
    /// Unique id for this run
    pub run_id: String,
    /// Target reference in display form
    pub reference: String,
    /// Timestamp when the run started
    pub started_at: DateTime<Utc>,
    /// Timestamp when the run was last updated
    pub updated_at: DateTime<Utc>,
    /// Current phase of the run
    pub phase: RunPhase,
    /// Step records in execution order
    pub steps: Vec<PipelineStep>,
    /// Digest produced by the build step
    pub built_digest: Option<ImageDigest>,
    /// Digest reported by the registry on push
    pub remote_digest: Option<ImageDigest>,
    /// Warning emitted when verification could not confirm the release
    pub verify_warning: Option<String>,
}

impl ReleaseRun {
    /// Create a new run for `reference` with all steps pending.
    pub fn new(reference: &ImageReference) -> Self {
        let now = Utc::now();
        let run_id = format!(
            "release-{}-{}-{}",
            reference.image(),
            reference.version(),
            now.timestamp()
        );

        Self {
            run_id,
            reference: reference.to_string(),
            started_at: now,
            updated_at: now,
            phase: RunPhase::Pending,
            steps: StepKind::ALL.iter().map(|k| PipelineStep::new(*k)).collect(),
            built_digest: None,
            remote_digest: None,
            verify_warning: None,
        }
    }

    /// Step record for `kind`.
    pub fn step(&self, kind: StepKind) -> &PipelineStep {
        self.steps
            .iter()
            .find(|s| s.kind == kind)
            .unwrap_or_else(|| unreachable!("run initialized with all step kinds"))
    }

    /// Mutable step record for `kind`.
    pub fn step_mut(&mut self, kind: StepKind) -> &mut PipelineStep {
        self.steps
            .iter_mut()
            .find(|s| s.kind == kind)
            .unwrap_or_else(|| unreachable!("run initialized with all step kinds"))
    }

    /// Set the current phase.
    pub fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    /// Enter `step`: phase moves to its running phase and the record starts.
    pub fn begin_step(&mut self, step: StepKind) {
        self.set_phase(RunPhase::running(step));
        self.step_mut(step).mark_running();
    }

    /// Finish `step` successfully.
    pub fn finish_step(&mut self, step: StepKind) {
        self.step_mut(step).mark_succeeded();
        self.updated_at = Utc::now();
    }

    /// Mark the run as completed.
    pub fn complete(&mut self) {
        self.set_phase(RunPhase::Completed);
    }

    /// Mark the run as failed at `step` with its final error message.
    pub fn fail(&mut self, step: StepKind, error: &str) {
        self.step_mut(step).mark_failed(error);
        self.set_phase(RunPhase::Failed(step));
    }

    /// Whether the run has reached a final phase.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether the run completed successfully.
    pub fn succeeded(&self) -> bool {
        self.phase == RunPhase::Completed
    }

    /// Get progress percentage
    pub fn progress_percentage(&self) -> f64 {
        match self.phase {
            RunPhase::Pending => 0.0,
            RunPhase::Authenticating => 10.0,
            RunPhase::Building => 30.0,
            RunPhase::Tagging => 55.0,
            RunPhase::Pushing => 70.0,
            RunPhase::Verifying => 90.0,
            RunPhase::Completed => 100.0,
            RunPhase::Failed(_) => 0.0,
        }
    }

    /// Get elapsed time
    pub fn elapsed_time(&self) -> chrono::Duration {
        self.updated_at - self.started_at
    }

    /// Create a one-line summary of the run
    pub fn summary(&self) -> String {
        format!(
            "{} ({}) - {:.1}% complete - {} elapsed",
            self.reference,
            self.phase,
            self.progress_percentage(),
            format_duration(self.elapsed_time())
        )
    }

    /// Total attempts dispatched across all steps.
    pub fn total_attempts(&self) -> u32 {
        self.steps.iter().map(|s| s.attempt_count).sum()
    }

    /// Steps that never reached a final status.
    pub fn unfinished_steps(&self) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Pending | StepStatus::Running))
            .map(|s| s.kind)
            .collect()
    }
}

fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
