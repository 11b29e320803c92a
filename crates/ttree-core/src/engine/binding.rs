//! Variable binding: category lookup, canonical naming, explicit assignment and
//! counter allocation.
//!
//! Every `$`/`@` reference in a template is resolved to exactly one [`VarBinding`].
//! A binding belongs to the category found by searching outward from the node the
//! reference appears in, and its canonical name is its leaf path relative to that
//! category's root, e.g. `$/atom:mols[1]/C1`.

use super::error::BindingError;
use crate::core::io::report::BindingRecord;
use crate::core::models::command::Command;
use crate::core::models::definition::{DefCommand, DefinitionTree};
use crate::core::models::ids::{BindingId, DefId, InstanceId};
use crate::core::models::instance::InstanceTree;
use crate::core::models::template::{SrcLoc, Template, TemplateItem, VarKind, VarRef};
use slotmap::SlotMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, warn};

/// A node of either tree, used as the root of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Static(DefId),
    Instance(InstanceId),
}

#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub root: NodeRef,
    pub root_path: Vec<String>,
    pub start: i64,
    pub incr: i64,
    pub loc: SrcLoc,
    members: Vec<BindingId>,
    by_leaf: HashMap<String, BindingId>,
    taken: HashSet<i64>,
}

#[derive(Debug, Clone)]
pub struct VarBinding {
    pub full_name: String,
    pub kind: VarKind,
    /// Absolute leaf path in the owning tree.
    pub leaf: Vec<String>,
    pub value: Option<String>,
    /// Location of the `assign` statement, if the value was given explicitly.
    pub explicit: Option<SrcLoc>,
    /// Every place the variable is referenced.
    pub refs: Vec<SrcLoc>,
    pub order: usize,
    /// Set when the binding lies inside a deleted instance.
    pub deleted: bool,
    /// References that still appear in some template or statement.
    live_refs: usize,
    category: usize,
}

impl VarBinding {
    /// Not deleted and still referenced by something that will be rendered.
    pub fn is_live(&self) -> bool {
        !self.deleted && self.live_refs > 0
    }
}

/// Read-only view of both trees plus the node a reference is resolved from.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub defs: &'a DefinitionTree,
    pub instances: &'a InstanceTree,
    pub definition: DefId,
    pub instance: InstanceId,
}

impl Scope<'_> {
    fn current(&self, kind: VarKind) -> NodeRef {
        match kind {
            VarKind::Static => NodeRef::Static(self.definition),
            VarKind::Instance => NodeRef::Instance(self.instance),
        }
    }

    fn root(&self, kind: VarKind) -> NodeRef {
        match kind {
            VarKind::Static => NodeRef::Static(self.defs.root()),
            VarKind::Instance => NodeRef::Instance(self.instances.root()),
        }
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        match node {
            NodeRef::Static(id) => self.defs.get(id)?.parent.map(NodeRef::Static),
            NodeRef::Instance(id) => self.instances.get(id)?.parent.map(NodeRef::Instance),
        }
    }

    fn child(&self, node: NodeRef, name: &str) -> Option<NodeRef> {
        match node {
            NodeRef::Static(id) => self.defs.child_named(id, name).map(NodeRef::Static),
            NodeRef::Instance(id) => self.instances.child_named(id, name).map(NodeRef::Instance),
        }
    }

    fn segments(&self, node: NodeRef) -> Vec<String> {
        match node {
            NodeRef::Static(id) => self.defs.path_segments(id),
            NodeRef::Instance(id) => self.instances.path_segments(id),
        }
    }

    /// Follows a category path such as `..`, `/` or `../poly` from `from`.
    fn follow(&self, from: NodeRef, path: &str, kind: VarKind) -> Option<NodeRef> {
        let mut node = if path.starts_with('/') {
            self.root(kind)
        } else {
            from
        };
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            node = match seg {
                "." => node,
                ".." => self.parent(node)?,
                name => self.child(node, name)?,
            };
        }
        Some(node)
    }
}

/// Resolves `path` against `base`, honoring `.`, `..` and a leading `/`.
fn normalize(base: &[String], path: &str) -> Option<Vec<String>> {
    let mut out: Vec<String> = if path.starts_with('/') {
        Vec::new()
    } else {
        base.to_vec()
    };
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        match seg {
            "." => {}
            ".." => {
                out.pop()?;
            }
            name => out.push(name.to_string()),
        }
    }
    Some(out)
}

#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: SlotMap<BindingId, VarBinding>,
    categories: Vec<Category>,
    index: HashMap<(NodeRef, String), usize>,
    auto_categories: bool,
}

impl BindingTable {
    pub fn new(auto_categories: bool) -> Self {
        Self {
            auto_categories,
            ..Self::default()
        }
    }

    pub fn get(&self, id: BindingId) -> Option<&VarBinding> {
        self.bindings.get(id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn category(&self, root: NodeRef, name: &str) -> Option<&Category> {
        self.index
            .get(&(root, name.to_string()))
            .map(|&i| &self.categories[i])
    }

    pub fn declare_category(
        &mut self,
        root: NodeRef,
        root_path: Vec<String>,
        name: &str,
        (start, incr): (i64, i64),
        loc: SrcLoc,
    ) -> Result<(), BindingError> {
        if incr == 0 {
            return Err(BindingError::ZeroIncrement {
                loc,
                category: name.to_string(),
            });
        }
        let key = (root, name.to_string());
        if self.index.contains_key(&key) {
            return Err(BindingError::DuplicateCategory {
                loc,
                category: name.to_string(),
                scope: format!("/{}", root_path.join("/")),
            });
        }
        self.index.insert(key, self.categories.len());
        self.categories.push(Category {
            name: name.to_string(),
            root,
            root_path,
            start,
            incr,
            loc,
            members: Vec::new(),
            by_leaf: HashMap::new(),
            taken: HashSet::new(),
        });
        Ok(())
    }

    fn find_category(&self, start: NodeRef, name: &str, scope: &Scope) -> Option<usize> {
        let mut node = Some(start);
        while let Some(n) = node {
            if let Some(&i) = self.index.get(&(n, name.to_string())) {
                return Some(i);
            }
            node = scope.parent(n);
        }
        None
    }

    /// Resolves a reference to its binding, creating the binding on first use.
    pub fn bind(&mut self, var: &VarRef, scope: &Scope) -> Result<BindingId, BindingError> {
        let kind = var.kind();
        let descriptor = var.descriptor();
        if descriptor.category.is_empty() {
            return Err(BindingError::InvalidDescriptor {
                loc: var.loc.clone(),
                var: var.source_text(),
            });
        }

        let current = scope.current(kind);
        let search_from = match &descriptor.cat_path {
            Some(path) => scope.follow(current, path, kind).ok_or_else(|| {
                BindingError::UnknownCategoryPath {
                    loc: var.loc.clone(),
                    var: var.source_text(),
                }
            })?,
            None => current,
        };

        let cat_idx = match self.find_category(search_from, &descriptor.category, scope) {
            Some(i) => i,
            None if self.auto_categories => {
                let root = scope.root(kind);
                debug!(category = %descriptor.category, "Creating undeclared category at the root.");
                self.declare_category(root, Vec::new(), &descriptor.category, (1, 1), var.loc.clone())?;
                self.categories.len() - 1
            }
            None => {
                return Err(BindingError::UnresolvedCategory {
                    loc: var.loc.clone(),
                    category: descriptor.category,
                    var: var.source_text(),
                });
            }
        };

        let leaf = normalize(&scope.segments(current), &descriptor.leaf_path).ok_or_else(|| {
            BindingError::PathEscapesRoot {
                loc: var.loc.clone(),
                var: var.source_text(),
            }
        })?;

        let category = &self.categories[cat_idx];
        let Some(relative) = leaf.strip_prefix(category.root_path.as_slice()) else {
            return Err(BindingError::OutsideCategory {
                loc: var.loc.clone(),
                var: var.source_text(),
                category: category.name.clone(),
                root: format!("/{}", category.root_path.join("/")),
            });
        };
        let relative = relative.join("/");

        if let Some(&id) = category.by_leaf.get(&relative) {
            if let Some(b) = self.bindings.get_mut(id) {
                b.refs.push(var.loc.clone());
                b.live_refs += 1;
            }
            return Ok(id);
        }

        let mut root_prefix = String::from("/");
        for seg in &category.root_path {
            root_prefix.push_str(seg);
            root_prefix.push('/');
        }
        let full_name = format!(
            "{}{}{}:{}",
            kind.delim(),
            root_prefix,
            category.name,
            relative
        );
        let order = self.bindings.len();
        let id = self.bindings.insert(VarBinding {
            full_name,
            kind,
            leaf,
            value: None,
            explicit: None,
            refs: vec![var.loc.clone()],
            order,
            deleted: false,
            live_refs: 1,
            category: cat_idx,
        });
        let category = &mut self.categories[cat_idx];
        category.members.push(id);
        category.by_leaf.insert(relative, id);
        Ok(id)
    }

    /// Binds `var` to a literal value given by an `assign` statement.
    pub fn assign(
        &mut self,
        var: &VarRef,
        value: &str,
        scope: &Scope,
        loc: &SrcLoc,
    ) -> Result<BindingId, BindingError> {
        let id = self.bind(var, scope)?;
        let Some(binding) = self.bindings.get_mut(id) else {
            return Err(BindingError::Unbound {
                loc: loc.clone(),
                var: var.source_text(),
            });
        };
        if let Some(first) = &binding.explicit {
            return Err(BindingError::ConflictingExplicitBinding {
                loc: loc.clone(),
                name: binding.full_name.clone(),
                first: first.clone(),
            });
        }
        binding.explicit = Some(loc.clone());
        binding.value = Some(value.to_string());
        if let Ok(n) = value.parse::<i64>() {
            self.categories[binding.category].taken.insert(n);
        }
        Ok(id)
    }

    pub fn mark_deleted(&mut self, id: BindingId) {
        if let Some(b) = self.bindings.get_mut(id) {
            b.deleted = true;
        }
    }

    /// Forgets one reference to `id` whose line was dropped. A binding left with
    /// no references gets no counter value and is not reported.
    pub fn release(&mut self, id: BindingId) {
        if let Some(b) = self.bindings.get_mut(id) {
            b.live_refs = b.live_refs.saturating_sub(1);
        }
    }

    /// Marks every instance binding whose leaf lies at or below `prefix` as deleted.
    pub fn delete_under(&mut self, prefix: &[String]) -> usize {
        let mut count = 0;
        for b in self.bindings.values_mut() {
            if b.kind == VarKind::Instance && !b.deleted && b.leaf.starts_with(prefix) {
                b.deleted = true;
                count += 1;
            }
        }
        count
    }

    /// Gives every live binding without an explicit value the next counter value
    /// of its category, in creation order, skipping values already taken by
    /// explicit numeric assignments.
    #[instrument(skip_all, name = "assign_counters")]
    pub fn assign_counters(&mut self) {
        for category in &mut self.categories {
            let mut counter = category.start;
            for &id in &category.members {
                let Some(b) = self.bindings.get_mut(id) else {
                    continue;
                };
                if !b.is_live() || b.explicit.is_some() {
                    continue;
                }
                while category.taken.contains(&counter) {
                    counter += category.incr;
                }
                b.value = Some(counter.to_string());
                category.taken.insert(counter);
                counter += category.incr;
            }
        }
        debug!(
            bindings = self.bindings.len(),
            categories = self.categories.len(),
            "Assigned counter values."
        );
    }

    /// Live bindings in creation order.
    pub fn records(&self) -> Vec<BindingRecord> {
        let mut live: Vec<&VarBinding> = self.bindings.values().filter(|b| b.is_live()).collect();
        live.sort_by_key(|b| b.order);
        live.into_iter()
            .filter_map(|b| {
                Some(BindingRecord {
                    name: b.full_name.clone(),
                    value: b.value.clone()?,
                    order: b.order,
                    loc: b.refs.first().cloned().unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// Declares every `@` category and applies every `@` assignment found anywhere in
/// the definition tree. Static statements run once, however many times their
/// class is instantiated.
#[instrument(skip_all, name = "bind_static")]
pub fn bind_static(
    defs: &DefinitionTree,
    instances: &InstanceTree,
    table: &mut BindingTable,
) -> Result<(), BindingError> {
    let mut order = Vec::new();
    collect_preorder(defs, defs.root(), &mut order);

    for &id in &order {
        let Some(node) = defs.get(id) else { continue };
        for cmd in &node.commands {
            if let DefCommand::Category {
                kind: VarKind::Static,
                name,
                start,
                incr,
                loc,
            } = cmd
            {
                table.declare_category(
                    NodeRef::Static(id),
                    defs.path_segments(id),
                    name,
                    (*start, *incr),
                    loc.clone(),
                )?;
            }
        }
    }

    for &id in &order {
        let Some(node) = defs.get(id) else { continue };
        let scope = Scope {
            defs,
            instances,
            definition: id,
            instance: instances.root(),
        };
        for cmd in &node.commands {
            if let DefCommand::Assign { var, value, loc } = cmd {
                if var.kind() == VarKind::Static {
                    table.assign(var, value, &scope, loc)?;
                }
            }
        }
    }
    Ok(())
}

fn collect_preorder(defs: &DefinitionTree, id: DefId, out: &mut Vec<DefId>) {
    out.push(id);
    if let Some(node) = defs.get(id) {
        for &child in &node.children {
            collect_preorder(defs, child, out);
        }
    }
}

fn bind_template(
    template: &mut Template,
    table: &mut BindingTable,
    scope: &Scope,
) -> Result<(), BindingError> {
    for item in template.iter_mut() {
        if let TemplateItem::Var(var) = item {
            var.binding = Some(table.bind(var, scope)?);
        }
    }
    Ok(())
}

/// Walks the flattened command list in execution order and binds every variable
/// reference it will render, so counters follow first-reference order.
#[instrument(skip_all, name = "bind_commands")]
pub fn bind_commands(
    commands: &mut [Command],
    defs: &DefinitionTree,
    instances: &InstanceTree,
    table: &mut BindingTable,
) -> Result<(), BindingError> {
    let mut scopes: Vec<InstanceId> = Vec::new();
    let mut written_once: HashSet<(DefId, String)> = HashSet::new();

    for cmd in commands.iter_mut() {
        let instance = scopes.last().copied().unwrap_or_else(|| instances.root());
        match cmd {
            Command::ScopeBegin(id) => scopes.push(*id),
            Command::ScopeEnd(_) => {
                scopes.pop();
            }
            Command::WriteFile {
                channel,
                once,
                definition,
                template,
                ..
            } => {
                if *once && !written_once.insert((*definition, channel.clone())) {
                    continue;
                }
                let scope = Scope {
                    defs,
                    instances,
                    definition: *definition,
                    instance,
                };
                bind_template(template, table, &scope)?;
            }
            Command::CreateVar {
                definition,
                template,
                ..
            } => {
                let scope = Scope {
                    defs,
                    instances,
                    definition: *definition,
                    instance,
                };
                bind_template(template, table, &scope)?;
            }
            Command::Assign {
                definition,
                var,
                value,
                loc,
            } => {
                let scope = Scope {
                    defs,
                    instances,
                    definition: *definition,
                    instance,
                };
                var.binding = Some(table.assign(var, value, &scope, loc)?);
            }
            Command::Push { .. } | Command::Pop { .. } => {}
        }
    }
    if !scopes.is_empty() {
        warn!("Command list ended with {} open scope(s).", scopes.len());
    }
    Ok(())
}
