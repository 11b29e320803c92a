use super::command::Command;
use super::ids::{DefId, InstanceId};
use super::template::SrcLoc;
use slotmap::SlotMap;

#[derive(Debug, Clone)]
pub struct InstanceNode {
    pub name: String,
    pub parent: Option<InstanceId>,
    pub children: Vec<InstanceId>,
    pub definition: DefId,
    /// Commands of this instance in source order. A child's position in the list
    /// is marked by `Command::ScopeBegin(child)`.
    pub commands: Vec<Command>,
    pub deleted: bool,
    pub loc: SrcLoc,
}

#[derive(Debug, Clone)]
pub struct InstanceTree {
    nodes: SlotMap<InstanceId, InstanceNode>,
    root: InstanceId,
}

impl InstanceTree {
    pub fn new(root_definition: DefId, loc: SrcLoc) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(InstanceNode {
            name: String::new(),
            parent: None,
            children: Vec::new(),
            definition: root_definition,
            commands: Vec::new(),
            deleted: false,
            loc,
        });
        Self { nodes, root }
    }

    pub fn root(&self) -> InstanceId {
        self.root
    }

    pub fn get(&self, id: InstanceId) -> Option<&InstanceNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut InstanceNode> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_child(
        &mut self,
        parent: InstanceId,
        name: String,
        definition: DefId,
        loc: SrcLoc,
    ) -> InstanceId {
        let id = self.nodes.insert(InstanceNode {
            name,
            parent: Some(parent),
            children: Vec::new(),
            definition,
            commands: Vec::new(),
            deleted: false,
            loc,
        });
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(id);
        }
        id
    }

    pub fn child_named(&self, parent: InstanceId, name: &str) -> Option<InstanceId> {
        self.nodes
            .get(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes.get(c).is_some_and(|n| n.name == name))
    }

    pub fn ancestors(&self, id: InstanceId) -> impl Iterator<Item = InstanceId> + '_ {
        std::iter::successors(Some(id), move |&cur| self.nodes.get(cur)?.parent)
    }

    pub fn path_segments(&self, id: InstanceId) -> Vec<String> {
        let mut segments: Vec<String> = self
            .ancestors(id)
            .filter_map(|a| self.nodes.get(a))
            .filter(|n| n.parent.is_some())
            .map(|n| n.name.clone())
            .collect();
        segments.reverse();
        segments
    }

    pub fn path(&self, id: InstanceId) -> String {
        format!("/{}", self.path_segments(id).join("/"))
    }

    /// Follows a relative (or `/`-rooted) instance path from `from`.
    pub fn resolve(&self, from: InstanceId, path: &str) -> Option<InstanceId> {
        let mut node = if path.starts_with('/') {
            self.root
        } else {
            from
        };
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            node = match seg {
                "." => node,
                ".." => self.nodes.get(node)?.parent?,
                name => self.child_named(node, name)?,
            };
        }
        Some(node)
    }

    pub fn mark_deleted(&mut self, id: InstanceId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.deleted = true;
        }
    }

    /// True unless the instance or one of its ancestors was deleted.
    pub fn is_live(&self, id: InstanceId) -> bool {
        self.ancestors(id)
            .all(|a| self.nodes.get(a).is_some_and(|n| !n.deleted))
    }

    /// Expands the per-instance command lists into one depth-first list bracketed
    /// by `ScopeBegin`/`ScopeEnd`, leaving out deleted subtrees.
    pub fn flatten(&self) -> Vec<Command> {
        let mut out = Vec::new();
        if self.is_live(self.root) {
            self.flatten_into(self.root, &mut out);
        }
        out
    }

    fn flatten_into(&self, id: InstanceId, out: &mut Vec<Command>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        out.push(Command::ScopeBegin(id));
        for cmd in &node.commands {
            match cmd {
                Command::ScopeBegin(child) => {
                    if self.nodes.get(*child).is_some_and(|n| !n.deleted) {
                        self.flatten_into(*child, out);
                    }
                }
                other => out.push(other.clone()),
            }
        }
        out.push(Command::ScopeEnd(id));
    }
}
