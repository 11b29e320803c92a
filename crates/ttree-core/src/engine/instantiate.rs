use super::error::ScopeError;
use crate::core::models::command::{Command, Side};
use crate::core::models::definition::{DefCommand, DefinitionTree, Instantiation};
use crate::core::models::ids::{DefId, InstanceId};
use crate::core::models::instance::InstanceTree;
use crate::core::models::template::{SrcLoc, VarKind};
use crate::core::models::transform::TransformChain;
use std::collections::HashMap;
use tracing::{debug, instrument, trace};

/// An instance-level `category $cat(start, incr)` statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InstanceCategory {
    pub instance: InstanceId,
    pub name: String,
    pub start: i64,
    pub incr: i64,
    pub loc: SrcLoc,
}

/// The instance tree together with what it implies for the binding pass.
#[derive(Debug)]
pub(crate) struct Expansion {
    pub instances: InstanceTree,
    pub categories: Vec<InstanceCategory>,
    /// Paths of deleted instances, relative to the root.
    pub deleted: Vec<Vec<String>>,
}

struct Instantiator<'a> {
    defs: &'a DefinitionTree,
    tree: InstanceTree,
    default_side: Side,
    /// Classes currently being instantiated, outermost first.
    active: Vec<DefId>,
    /// Classes whose bodies are being expanded through `inherits`.
    inheriting: Vec<DefId>,
    anonymous: HashMap<(InstanceId, DefId), usize>,
    categories: Vec<InstanceCategory>,
    deleted: Vec<Vec<String>>,
}

/// Walks the definition tree from the root and creates every instance named by a
/// `new` statement, along with each instance's command list.
#[instrument(skip_all, name = "instantiate")]
pub(crate) fn instantiate(
    defs: &DefinitionTree,
    default_side: Side,
) -> Result<Expansion, ScopeError> {
    let root_loc = defs
        .get(defs.root())
        .map(|n| n.loc.clone())
        .unwrap_or_default();
    let mut this = Instantiator {
        defs,
        tree: InstanceTree::new(defs.root(), root_loc),
        default_side,
        active: Vec::new(),
        inheriting: Vec::new(),
        anonymous: HashMap::new(),
        categories: Vec::new(),
        deleted: Vec::new(),
    };
    let root = this.tree.root();
    this.expand(root, defs.root())?;
    debug!(
        instances = this.tree.len(),
        deleted = this.deleted.len(),
        "Built the instance tree."
    );
    Ok(Expansion {
        instances: this.tree,
        categories: this.categories,
        deleted: this.deleted,
    })
}

impl Instantiator<'_> {
    fn class_name(&self, id: DefId) -> String {
        self.defs
            .get(id)
            .map(|n| n.name.clone())
            .unwrap_or_default()
    }

    fn emit(&mut self, instance: InstanceId, command: Command) {
        if let Some(node) = self.tree.get_mut(instance) {
            node.commands.push(command);
        }
    }

    /// Appends the statements of `def`, preceded by those of its base classes, to
    /// the command list of `instance`.
    fn expand(&mut self, instance: InstanceId, def: DefId) -> Result<(), ScopeError> {
        let defs = self.defs;
        let node = defs
            .get(def)
            .ok_or_else(|| ScopeError::Internal("dangling definition id".into()))?;

        if self.inheriting.contains(&def) {
            return Err(ScopeError::InheritanceCycle {
                loc: node.loc.clone(),
                class: defs.path(def),
            });
        }
        self.inheriting.push(def);
        let lookup_from = node.parent.unwrap_or(def);
        for base in &node.bases {
            let base_id = defs.resolve_class(lookup_from, &base.class).ok_or_else(|| {
                ScopeError::UnknownClass {
                    loc: base.loc.clone(),
                    class: base.class.clone(),
                }
            })?;
            self.expand(instance, base_id)?;
        }
        self.inheriting.pop();

        for command in &node.commands {
            match command {
                DefCommand::Write {
                    channel,
                    once,
                    template,
                    loc,
                } => self.emit(
                    instance,
                    Command::WriteFile {
                        channel: channel.clone(),
                        once: *once,
                        definition: def,
                        template: template.clone(),
                        loc: loc.clone(),
                    },
                ),
                DefCommand::CreateVar { template, loc } => self.emit(
                    instance,
                    Command::CreateVar {
                        definition: def,
                        template: template.clone(),
                        loc: loc.clone(),
                    },
                ),
                DefCommand::Category {
                    kind: VarKind::Instance,
                    name,
                    start,
                    incr,
                    loc,
                } => self.categories.push(InstanceCategory {
                    instance,
                    name: name.clone(),
                    start: *start,
                    incr: *incr,
                    loc: loc.clone(),
                }),
                DefCommand::Assign { var, value, loc } if var.kind() == VarKind::Instance => {
                    self.emit(
                        instance,
                        Command::Assign {
                            definition: def,
                            var: var.clone(),
                            value: value.clone(),
                            loc: loc.clone(),
                        },
                    )
                }
                // Static categories and assignments are handled once per class.
                DefCommand::Category { .. } | DefCommand::Assign { .. } => {}
                DefCommand::Push { side, chain, loc } => self.emit(
                    instance,
                    Command::Push {
                        side: side.unwrap_or(self.default_side),
                        chain: chain.clone(),
                        implicit: false,
                        loc: loc.clone(),
                    },
                ),
                DefCommand::Pop { side, loc } => self.emit(
                    instance,
                    Command::Pop {
                        side: *side,
                        loc: loc.clone(),
                    },
                ),
                DefCommand::Delete { target, loc } => self.delete(instance, target, loc)?,
                DefCommand::Instantiate(stmt) => self.create_instances(instance, def, stmt)?,
            }
        }
        Ok(())
    }

    fn create_instances(
        &mut self,
        parent: InstanceId,
        def: DefId,
        stmt: &Instantiation,
    ) -> Result<(), ScopeError> {
        let class = self
            .defs
            .resolve_class(def, &stmt.class)
            .ok_or_else(|| ScopeError::UnknownClass {
                loc: stmt.loc.clone(),
                class: stmt.class.clone(),
            })?;
        if self.active.contains(&class) {
            return Err(ScopeError::RecursiveInstantiation {
                loc: stmt.loc.clone(),
                class: self.defs.path(class),
            });
        }

        let base_name = match &stmt.name {
            Some(name) => name.clone(),
            None => {
                let k = {
                    let count = self.anonymous.entry((parent, class)).or_insert(0);
                    *count += 1;
                    *count
                };
                format!("__{}_{}", self.class_name(class), k)
            }
        };

        for (name, chain) in array_elements(&base_name, &stmt.chain, stmt) {
            if let Some(existing) = self.tree.child_named(parent, &name) {
                if self.tree.get(existing).is_some_and(|n| !n.deleted) {
                    return Err(ScopeError::DuplicateInstance {
                        loc: stmt.loc.clone(),
                        name,
                        scope: self.tree.path(parent),
                    });
                }
            }
            let child = self.tree.add_child(parent, name, class, stmt.loc.clone());
            trace!(path = %self.tree.path(child), "Created instance.");
            if !chain.is_empty() {
                self.emit(
                    child,
                    Command::Push {
                        side: Side::Right,
                        chain,
                        implicit: true,
                        loc: stmt.loc.clone(),
                    },
                );
            }
            self.active.push(class);
            self.expand(child, class)?;
            if let Some(body) = stmt.body {
                self.expand(child, body)?;
            }
            self.active.pop();
            self.emit(parent, Command::ScopeBegin(child));
        }
        Ok(())
    }

    /// `delete x` removes instance `x`, or every element of array `x`.
    fn delete(&mut self, instance: InstanceId, target: &str, loc: &SrcLoc) -> Result<(), ScopeError> {
        let unknown = || ScopeError::UnknownInstance {
            loc: loc.clone(),
            target: target.to_string(),
        };
        let (dir, leaf) = match target.rsplit_once('/') {
            Some((dir, leaf)) => (self.tree.resolve(instance, dir).ok_or_else(unknown)?, leaf),
            None => (instance, target),
        };
        let element_prefix = format!("{leaf}[");
        let victims: Vec<InstanceId> = self
            .tree
            .get(dir)
            .ok_or_else(unknown)?
            .children
            .iter()
            .copied()
            .filter(|&c| {
                self.tree.get(c).is_some_and(|n| {
                    !n.deleted && (n.name == leaf || n.name.starts_with(&element_prefix))
                })
            })
            .collect();
        if victims.is_empty() {
            return Err(unknown());
        }
        for victim in victims {
            debug!(path = %self.tree.path(victim), "Deleting instance.");
            self.tree.mark_deleted(victim);
            self.deleted.push(self.tree.path_segments(victim));
        }
        Ok(())
    }
}

/// Names and transform chains of every element created by one `new` statement.
///
/// Element `x[i][j]` gets the instance chain, then the first dimension's step
/// `i` times, then the second dimension's step `j` times.
fn array_elements(
    base_name: &str,
    chain: &TransformChain,
    stmt: &Instantiation,
) -> Vec<(String, TransformChain)> {
    let mut elements = vec![(base_name.to_string(), chain.clone())];
    for dim in &stmt.dims {
        let mut next = Vec::with_capacity(elements.len() * dim.count);
        for (name, chain) in &elements {
            let mut element_chain = chain.clone();
            for i in 0..dim.count {
                next.push((format!("{name}[{i}]"), element_chain.clone()));
                element_chain = element_chain.then(&dim.step);
            }
        }
        elements = next;
    }
    elements
}
