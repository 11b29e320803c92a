use crate::core::io::IoError;
use crate::core::io::parser::{parse_file, parse_str};
use crate::core::io::report::{BindingRecord, REPORT_FILE_NAME, write_binding_report};
use crate::core::models::command::Command;
use crate::core::models::definition::DefinitionTree;
use crate::engine::binding::{BindingTable, NodeRef, bind_commands, bind_static};
use crate::engine::config::{CompilerConfig, RenderMode};
use crate::engine::error::CompileError;
use crate::engine::executor::execute;
use crate::engine::instantiate::instantiate;
use crate::engine::output::ChannelSet;
use crate::engine::progress::ProgressReporter;
use crate::engine::render;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Suffix of channel files written in [`RenderMode::Names`].
pub const TEMPLATE_SUFFIX: &str = ".template";

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub channels: ChannelSet,
    /// Live bindings in creation order.
    pub bindings: Vec<BindingRecord>,
    pub render_mode: RenderMode,
}

#[instrument(skip_all, name = "compile_file", fields(path = %path.display()))]
pub fn compile_file(
    path: &Path,
    config: &CompilerConfig,
    reporter: &ProgressReporter,
) -> Result<CompileOutput, CompileError> {
    let defs = reporter.phase("Parsing", || parse_file(path, &config.search_path))?;
    run(&defs, config, reporter)
}

pub fn compile_str(
    name: &str,
    text: &str,
    config: &CompilerConfig,
    reporter: &ProgressReporter,
) -> Result<CompileOutput, CompileError> {
    let defs = reporter.phase("Parsing", || parse_str(name, text, &config.search_path))?;
    run(&defs, config, reporter)
}

/// Compiles an already parsed definition tree.
#[instrument(skip_all, name = "compile_workflow")]
pub fn run(
    defs: &DefinitionTree,
    config: &CompilerConfig,
    reporter: &ProgressReporter,
) -> Result<CompileOutput, CompileError> {
    info!(classes = defs.len(), "Starting compilation.");

    // === Phase 1: Build the instance tree ===
    let expansion = reporter.phase("Instantiating", || {
        instantiate(defs, config.default_push_side)
    })?;
    let instances = &expansion.instances;

    // === Phase 2: Bind variables and assign counters ===
    let (mut table, commands) = reporter.phase("Binding", || -> Result<_, CompileError> {
        let mut table = BindingTable::new(config.auto_categories);
        bind_static(defs, instances, &mut table)?;
        for category in &expansion.categories {
            table.declare_category(
                NodeRef::Instance(category.instance),
                instances.path_segments(category.instance),
                &category.name,
                (category.start, category.incr),
                category.loc.clone(),
            )?;
        }
        let mut commands = instances.flatten();
        bind_commands(&mut commands, defs, instances, &mut table)?;

        let deleted: usize = expansion
            .deleted
            .iter()
            .map(|path| table.delete_under(path))
            .sum();
        if deleted > 0 {
            debug!(bindings = deleted, "Marked bindings inside deleted instances.");
        }
        // Lines that die with a deleted binding must not consume counter values.
        for command in commands.iter_mut() {
            if let Command::WriteFile { template, .. } = command {
                render::delete_lines_with_deleted_vars(template, &mut table);
            }
        }
        table.assign_counters();
        Ok((table, commands))
    })?;

    // === Phase 3: Render every scope ===
    let channels = reporter.phase("Rendering", || {
        execute(&commands, instances, &mut table, config, reporter)
    })?;

    let bindings = table.records();
    info!(
        channels = channels.len(),
        bindings = bindings.len(),
        "Compilation complete."
    );
    Ok(CompileOutput {
        channels,
        bindings,
        render_mode: config.render_mode,
    })
}

/// Writes one file per channel into `dir`, plus the binding report, and returns
/// the paths written.
#[instrument(skip_all, name = "write_outputs", fields(dir = %dir.display()))]
pub fn write_outputs(dir: &Path, output: &CompileOutput) -> Result<Vec<PathBuf>, IoError> {
    let suffix = match output.render_mode {
        RenderMode::Values => "",
        RenderMode::Names => TEMPLATE_SUFFIX,
    };
    fs::create_dir_all(dir).map_err(|e| IoError::new(dir, e))?;

    let mut written = Vec::with_capacity(output.channels.len() + 1);
    for (channel, text) in output.channels.iter() {
        let path = dir.join(format!("{channel}{suffix}"));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| IoError::new(parent, e))?;
        }
        fs::write(&path, text).map_err(|e| IoError::new(&path, e))?;
        debug!(path = %path.display(), "Wrote channel.");
        written.push(path);
    }

    let report_path = dir.join(REPORT_FILE_NAME);
    let file = File::create(&report_path).map_err(|e| IoError::new(&report_path, e))?;
    let mut writer = BufWriter::new(file);
    write_binding_report(&output.bindings, &mut writer)
        .map_err(|e| IoError::new(&report_path, e))?;
    written.push(report_path);
    Ok(written)
}
