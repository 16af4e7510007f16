//! Retry logic with exponential backoff for registry operations.

use std::future::Future;
use tokio::time::Duration;

use crate::cli::OutputManager;
use crate::error::Result;
use crate::pipeline::step::PipelineStep;

/// Maximum backoff time between attempts
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Retry an async operation with exponential backoff.
///
/// Only transient errors are re-attempted; permanent errors return on the
/// first failure. Every dispatched attempt is counted on `step`, so after
/// exhaustion `step.attempt_count` equals `max_attempts`.
///
/// # Arguments
/// * `operation` - Async closure that returns Result<T>
/// * `max_attempts` - Maximum total attempts (clamped to at least 1)
/// * `backoff_base` - Wait before the second attempt; doubles per retry
/// * `operation_name` - Human-readable name for logging
/// * `output` - Output manager for user messaging
/// * `step` - Step record that accumulates the attempt trail
pub(crate) async fn retry_with_backoff<F, T, Fut>(
    mut operation: F,
    max_attempts: u32,
    backoff_base: Duration,
    operation_name: &str,
    output: &OutputManager,
    step: &mut PipelineStep,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts_allowed = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        step.record_attempt();

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    output.success(&format!(
                        "{} succeeded on attempt {}/{}",
                        operation_name, attempt, attempts_allowed
                    ));
                }
                return Ok(value);
            }
            Err(e) => {
                step.record_attempt_error(&e.to_string());

                if !e.is_transient() {
                    return Err(e);
                }

                if attempt >= attempts_allowed {
                    output.error(&format!(
                        "❌ {} failed after {} attempt(s)",
                        operation_name, attempt
                    ));
                    return Err(e);
                }

                // Exponential backoff: base, 2x, 4x, 8x, capped.
                let exponent = (attempt - 1).min(16);
                let wait = backoff_base
                    .saturating_mul(2u32.saturating_pow(exponent))
                    .min(MAX_BACKOFF);

                output.warn(&format!(
                    "⚠️  {} failed (attempt {}/{}): {}",
                    operation_name, attempt, attempts_allowed, e
                ));
                output.indent(&format!("Retrying in {:.1}s...", wait.as_secs_f64()));

                tokio::time::sleep(wait).await;
            }
        }
    }
}
