//! Command line interface for imageship.
//!
//! This module provides the CLI for image release operations, with argument
//! parsing, command execution, and user feedback.

mod args;
pub mod commands;
mod output;
mod retry_config;

pub use args::{Args, Command, CredentialKind, DoctorArgs, ReleaseArgs, SetupArgs};
pub use commands::execute_command;
pub use output::OutputManager;
pub use retry_config::RetryConfig;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
