pub mod build;
pub mod check;

use crate::cli::CompileArgs;
use crate::config::{PartialCompilerConfig, SEARCH_PATH_ENV};
use crate::error::{CliError, Result};
use crate::utils::progress::CompileProgress;
use tracing::info;
use ttree::engine::config::CompilerConfig;

/// Validates the input path and merges the config file, the command line and
/// the environment into a compiler configuration.
fn resolve_config(args: &CompileArgs) -> Result<CompilerConfig> {
    if !args.input.is_file() {
        return Err(CliError::MissingInput(args.input.clone()));
    }
    let partial = match &args.config {
        Some(path) => PartialCompilerConfig::from_file(path)?,
        None => PartialCompilerConfig::default(),
    };
    info!("Merging configuration from file, CLI arguments and {}...", SEARCH_PATH_ENV);
    partial.merge_with_cli(args, std::env::var_os(SEARCH_PATH_ENV))
}

fn compile_progress(quiet: bool) -> CompileProgress {
    if quiet {
        CompileProgress::hidden()
    } else {
        CompileProgress::new()
    }
}

/// Clears the display and logs each phase's duration.
fn finish_progress(progress: &CompileProgress) {
    for (phase, elapsed) in progress.finish() {
        info!(phase, elapsed_ms = elapsed.as_millis() as u64, "Phase finished.");
    }
}
