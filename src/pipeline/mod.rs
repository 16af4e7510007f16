//! Release pipeline orchestration.
//!
//! The pipeline runs five steps in a fixed order: Authenticate, Build, Tag,
//! Push, Verify. The [`ReleaseOrchestrator`] drives them against pluggable
//! collaborators and records everything in a [`ReleaseRun`].

mod orchestrator;
mod retry;
mod run;
mod step;

pub use orchestrator::{ReleaseOrchestrator, ReleaseOutcome, ReleaseRequest};
pub use run::{ReleaseRun, RunPhase};
pub use step::{PipelineStep, StepKind, StepStatus};
