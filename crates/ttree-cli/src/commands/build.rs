use super::{compile_progress, finish_progress, resolve_config};
use crate::cli::BuildArgs;
use crate::error::Result;
use tracing::info;
use ttree::engine::error::CompileError;
use ttree::workflows::compile::{compile_file, write_outputs};

pub fn run(args: BuildArgs, quiet: bool) -> Result<()> {
    let config = resolve_config(&args.compile)?;
    let progress = compile_progress(quiet);

    info!("Compiling {:?}", &args.compile.input);
    let output = compile_file(&args.compile.input, &config, &progress.reporter());
    finish_progress(&progress);
    let output = output?;

    let written = write_outputs(&args.output_dir, &output).map_err(CompileError::from)?;
    for path in &written {
        info!("Wrote {:?}", path);
    }
    if !quiet {
        println!(
            "✓ Wrote {} file(s) to {}",
            written.len(),
            args.output_dir.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::error::CliError;
    use clap::Parser;
    use serial_test::serial;
    use std::fs;
    use tempfile::tempdir;

    fn build_args(argv: &[&str]) -> BuildArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Build(args) => args,
            Commands::Check(_) => panic!("expected the build command"),
        }
    }

    #[test]
    #[serial]
    fn writes_every_section_and_the_report() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("system.lt");
        fs::write(
            &input,
            "write_once(\"In Init\") { units real\n}\nwrite(\"Data Atoms\") {$atom:a 0.0 0.0 0.0\n}\n",
        )
        .unwrap();
        let out = dir.path().join("out");
        let args = build_args(&[
            "ttree",
            "build",
            input.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--atom-style",
            "atom-ID x y z",
        ]);

        run(args, true).unwrap();

        assert_eq!(fs::read_to_string(out.join("In Init")).unwrap(), " units real\n");
        assert_eq!(
            fs::read_to_string(out.join("Data Atoms")).unwrap().trim(),
            "1 0.0 0.0 0.0"
        );
        assert!(out.join("ttree_assignments.txt").is_file());
    }

    #[test]
    #[serial]
    fn missing_input_is_reported_with_its_path() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("absent.lt");
        let args = build_args(&["ttree", "build", input.to_str().unwrap()]);
        assert!(matches!(run(args, true), Err(CliError::MissingInput(p)) if p == input));
    }

    #[test]
    #[serial]
    fn compile_errors_are_propagated() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("broken.lt");
        fs::write(&input, "pop()\n").unwrap();
        let args = build_args(&[
            "ttree",
            "build",
            input.to_str().unwrap(),
            "-o",
            dir.path().join("out").to_str().unwrap(),
        ]);
        assert!(matches!(run(args, true), Err(CliError::Compile(_))));
        assert!(!dir.path().join("out").exists());
    }
}
