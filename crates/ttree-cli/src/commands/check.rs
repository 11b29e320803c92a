use super::{compile_progress, finish_progress, resolve_config};
use crate::cli::CheckArgs;
use crate::error::Result;
use tracing::info;
use ttree::workflows::compile::{CompileOutput, compile_file};

pub fn run(args: CheckArgs, quiet: bool) -> Result<()> {
    let config = resolve_config(&args.compile)?;
    let progress = compile_progress(quiet);

    info!("Checking {:?}", &args.compile.input);
    let output = compile_file(&args.compile.input, &config, &progress.reporter());
    finish_progress(&progress);
    let output = output?;

    if !quiet {
        println!("{}", summarize(&output));
    }
    Ok(())
}

/// One line per section with its non-blank line count, then the binding total.
fn summarize(output: &CompileOutput) -> String {
    let mut lines: Vec<String> = output
        .channels
        .iter()
        .map(|(name, text)| {
            let count = text.lines().filter(|l| !l.trim().is_empty()).count();
            format!("  {:<24} {} line(s)", name, count)
        })
        .collect();
    lines.push(format!("✓ {} variable(s) bound", output.bindings.len()));
    lines.join("\n")
}
