//! Command execution functions coordinating the release pipeline.
//!
//! This module wires parsed arguments to the pipeline and maps terminal
//! run states to process exit codes.

// Submodules
mod doctor;
mod release;
mod setup;

use crate::cli::{Args, Command, OutputManager};
use crate::error::{CliError, ReleaseError, Result};

// Import command executors
use doctor::execute_doctor;
use release::execute_release;
use setup::execute_setup;

/// Exit code: run completed (verification warnings included)
pub const EXIT_COMPLETED: i32 = 0;
/// Exit code: generic command failure
pub const EXIT_FAILURE: i32 = 1;
/// Exit code: arguments or target reference failed validation
pub const EXIT_VALIDATION: i32 = 2;
/// Exit code: authentication failed
pub const EXIT_AUTH_FAILED: i32 = 10;
/// Exit code: image build failed
pub const EXIT_BUILD_FAILED: i32 = 11;
/// Exit code: local tagging failed
pub const EXIT_TAG_FAILED: i32 = 12;
/// Exit code: registry push failed
pub const EXIT_PUSH_FAILED: i32 = 13;

/// Execute the main command based on parsed arguments
pub async fn execute_command(args: Args) -> Result<i32> {
    // Validate arguments before anything else runs
    if let Err(validation_error) = args.validate() {
        // Create output for validation errors (never quiet)
        let output = OutputManager::new(false, false);
        output.error(&format!("Invalid arguments: {}", validation_error));
        return Ok(EXIT_VALIDATION);
    }

    let output = OutputManager::new(args.verbose, args.quiet);

    let result = match &args.command {
        Command::Release(release_args) => execute_release(release_args, &output).await,
        Command::Doctor(doctor_args) => execute_doctor(doctor_args, &output).await,
        Command::Setup(setup_args) => execute_setup(setup_args, &output).await,
    };

    match result {
        Ok(exit_code) => Ok(exit_code),
        Err(e) => {
            output.error(&format!("Command '{}' failed: {}", args.command.name(), e));

            // Show recovery suggestions if available
            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    output.println(&format!("  • {}", suggestion));
                }
            }

            if matches!(e, ReleaseError::Cli(CliError::InvalidArguments { .. })) {
                Ok(EXIT_VALIDATION)
            } else {
                Ok(EXIT_FAILURE)
            }
        }
    }
}
