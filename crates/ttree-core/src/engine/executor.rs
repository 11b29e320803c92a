use super::binding::BindingTable;
use super::config::CompilerConfig;
use super::error::{CompileError, ScopeError};
use super::output::{ChannelSet, DATA_ATOMS, DATA_ELLIPSOIDS, DATA_MASSES};
use super::progress::{Progress, ProgressReporter};
use super::render;
use super::transform_stack::{Deferred, TransformStack};
use crate::core::io::columns::{
    DataFormatError, read_atoms, read_masses, transform_atom_text, transform_ellipsoid_text,
};
use crate::core::models::command::Command;
use crate::core::models::ids::{DefId, InstanceId};
use crate::core::models::instance::InstanceTree;
use crate::core::models::template::{SrcLoc, Template};
use crate::core::models::transform::TransformError;
use crate::core::utils::geometry::{self, AffineTransform};
use nalgebra::Point3;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, trace};

struct Executor<'a, 'r> {
    commands: &'a [Command],
    instances: &'a InstanceTree,
    table: &'a mut BindingTable,
    config: &'a CompilerConfig,
    reporter: &'a ProgressReporter<'r>,
    stack: TransformStack,
    written_once: HashSet<(DefId, String)>,
    /// Masses by atom type, from every `Data Masses` line rendered so far.
    masses: HashMap<String, f64>,
}

/// Replays a flattened command list and returns the text of every channel.
#[instrument(skip_all, name = "execute")]
pub(crate) fn execute(
    commands: &[Command],
    instances: &InstanceTree,
    table: &mut BindingTable,
    config: &CompilerConfig,
    reporter: &ProgressReporter,
) -> Result<ChannelSet, CompileError> {
    let total_scopes = commands
        .iter()
        .filter(|c| matches!(c, Command::ScopeBegin(_)))
        .count();
    reporter.report(Progress::ScopesStart {
        total_scopes: total_scopes as u64,
    });

    let mut exec = Executor {
        commands,
        instances,
        table,
        config,
        reporter,
        stack: TransformStack::new(),
        written_once: HashSet::new(),
        masses: HashMap::new(),
    };
    let mut output = ChannelSet::new();
    let mut index = 0;
    while index < commands.len() {
        match &commands[index] {
            Command::ScopeBegin(id) => {
                index += 1;
                exec.stack.begin_scope();
                let scope = exec.exec_scope(&mut index, *id)?;
                output.absorb(scope);
            }
            other => {
                return Err(ScopeError::Internal(format!(
                    "command outside of any scope: {other:?}"
                ))
                .into());
            }
        }
    }

    reporter.report(Progress::ScopesFinish);
    debug!(channels = output.len(), "Rendered all scopes.");
    Ok(output)
}

impl Executor<'_, '_> {
    /// Runs the commands of one scope, up to and including its `ScopeEnd`. The
    /// scope's frame must already be on the stack.
    fn exec_scope(&mut self, index: &mut usize, scope: InstanceId) -> Result<ChannelSet, CompileError> {
        let commands = self.commands;
        let mut out = ChannelSet::new();

        while *index < commands.len() {
            let command = &commands[*index];
            *index += 1;
            match command {
                Command::ScopeBegin(child) => {
                    self.stack.begin_scope();
                    let child_out = self.exec_scope(index, *child)?;
                    out.absorb(child_out);
                }
                Command::ScopeEnd(id) => {
                    if *id != scope {
                        return Err(ScopeError::Internal(format!(
                            "scope {} closed while {} is open",
                            self.instances.path(*id),
                            self.instances.path(scope)
                        ))
                        .into());
                    }
                    self.finish_scope(scope, &mut out)?;
                    return Ok(out);
                }
                Command::Push {
                    side,
                    chain,
                    implicit,
                    loc,
                } => self.stack.push(*side, chain, *implicit, loc)?,
                Command::Pop { side, loc } => self.stack.pop(*side, loc)?,
                Command::WriteFile {
                    channel,
                    once,
                    definition,
                    template,
                    loc,
                } => {
                    if *once && !self.written_once.insert((*definition, channel.clone())) {
                        trace!(channel = %channel, "Skipping repeated write_once.");
                        continue;
                    }
                    let text = self.render_write(channel, template, loc)?;
                    out.push(channel, text);
                }
                Command::CreateVar { .. } | Command::Assign { .. } => {}
            }
        }
        Err(ScopeError::Internal(format!(
            "scope {} was never closed",
            self.instances.path(scope)
        ))
        .into())
    }

    fn render_write(
        &mut self,
        channel: &str,
        template: &Template,
        loc: &SrcLoc,
    ) -> Result<String, CompileError> {
        let text = match channel {
            DATA_MASSES => render::render_with_type_comments(
                template,
                self.table,
                self.config.render_mode,
                self.config.mass_comments,
            )?,
            _ => render::render(template, self.table, self.config.render_mode)?,
        };
        let text = match channel {
            DATA_ATOMS => transform_atom_text(
                &text,
                &self.stack.composite(),
                &self.config.atom_layout,
                channel,
                loc,
            )?,
            DATA_ELLIPSOIDS => {
                transform_ellipsoid_text(&text, &self.stack.composite(), channel, loc)?
            }
            DATA_MASSES => {
                self.masses.extend(read_masses(&text, channel, loc)?);
                text
            }
            _ => text,
        };
        Ok(text)
    }

    /// Applies the scope's centroid-relative blocks to the positional text the
    /// scope produced, then closes its frame.
    fn finish_scope(&mut self, scope: InstanceId, out: &mut ChannelSet) -> Result<(), CompileError> {
        let loc = self
            .instances
            .get(scope)
            .map(|n| n.loc.clone())
            .ok_or_else(|| ScopeError::Internal("dangling instance id".into()))?;
        let path = self.instances.path(scope);
        let pending = self.stack.take_pending();

        if !pending.is_empty() {
            if !out.has_content(DATA_ATOMS) {
                return Err(ScopeError::UnanchoredDeferred {
                    loc: pending[0].loc.clone(),
                    scope: path,
                }
                .into());
            }
            let outer = self.stack.outer_composite();
            for block in &pending {
                let global = self.resolve_deferred(block, &outer, out, &path)?;
                apply_to_positional_text(out, &global, self.config, &block.loc)?;
            }
            debug!(scope = %path, blocks = pending.len(), "Applied centroid-relative transforms.");
        }

        self.stack.end_scope(&path, &loc)?;
        self.reporter.report(Progress::ScopeDone);
        Ok(())
    }

    /// Turns one deferred block into a map on output coordinates.
    ///
    /// The block is written in the frame enclosing the scope, so it is evaluated
    /// there (`P * D * P^-1`) with the centroid pulled back into that frame.
    fn resolve_deferred(
        &self,
        block: &Deferred,
        outer: &AffineTransform,
        out: &ChannelSet,
        scope: &str,
    ) -> Result<AffineTransform, CompileError> {
        let outer_inverse = outer
            .inverse()
            .ok_or_else(|| TransformError::Singular {
                loc: block.loc.clone(),
            })?;
        let centroid = self.centroid(out, &block.loc, scope)?;
        let local = outer_inverse.transform_point(&centroid);
        let deferred = block.chain.to_affine(Some(&local), &block.loc)?;
        Ok(*outer * deferred * outer_inverse)
    }

    fn centroid(
        &self,
        out: &ChannelSet,
        loc: &SrcLoc,
        scope: &str,
    ) -> Result<Point3<f64>, CompileError> {
        let text = out.text(DATA_ATOMS).unwrap_or_default();
        let rows = read_atoms(&text, &self.config.atom_layout, DATA_ATOMS, loc)?;
        let points: Vec<Point3<f64>> = rows.iter().map(|r| r.position).collect();

        let weights = if self.config.mass_weighted_centroid {
            let mut weights = Vec::with_capacity(rows.len());
            for row in &rows {
                let atom_type = row
                    .atom_type
                    .as_ref()
                    .ok_or_else(|| DataFormatError::NoTypeColumn { loc: loc.clone() })?;
                let mass = self.masses.get(atom_type).copied().ok_or_else(|| {
                    DataFormatError::MissingMass {
                        loc: loc.clone(),
                        atom_type: atom_type.clone(),
                    }
                })?;
                weights.push(mass);
            }
            Some(weights)
        } else {
            None
        };

        geometry::centroid(&points, weights.as_deref()).ok_or_else(|| {
            ScopeError::UnanchoredDeferred {
                loc: loc.clone(),
                scope: scope.to_string(),
            }
            .into()
        })
    }
}

fn apply_to_positional_text(
    out: &mut ChannelSet,
    transform: &AffineTransform,
    config: &CompilerConfig,
    loc: &SrcLoc,
) -> Result<(), DataFormatError> {
    if let Some(fragments) = out.fragments_mut(DATA_ATOMS) {
        for fragment in fragments.iter_mut() {
            *fragment =
                transform_atom_text(fragment, transform, &config.atom_layout, DATA_ATOMS, loc)?;
        }
    }
    if let Some(fragments) = out.fragments_mut(DATA_ELLIPSOIDS) {
        for fragment in fragments.iter_mut() {
            *fragment = transform_ellipsoid_text(fragment, transform, DATA_ELLIPSOIDS, loc)?;
        }
    }
    Ok(())
}
