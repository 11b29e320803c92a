use super::command::Side;
use super::ids::DefId;
use super::template::{SrcLoc, Template, VarKind, VarRef};
use super::transform::TransformChain;
use slotmap::SlotMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDim {
    pub count: usize,
    /// Applied once per index step along this dimension, after the base chain.
    pub step: TransformChain,
}

/// A `new` statement: `name = new Class.chain [N].step { body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Instantiation {
    /// `None` for anonymous instances (`new Class`).
    pub name: Option<String>,
    pub class: String,
    pub chain: TransformChain,
    pub dims: Vec<ArrayDim>,
    /// Extra statements executed inside the new instance, after the class body.
    pub body: Option<DefId>,
    pub loc: SrcLoc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefCommand {
    Write {
        channel: String,
        once: bool,
        template: Template,
        loc: SrcLoc,
    },
    CreateVar {
        template: Template,
        loc: SrcLoc,
    },
    Instantiate(Instantiation),
    Category {
        kind: VarKind,
        name: String,
        start: i64,
        incr: i64,
        loc: SrcLoc,
    },
    Assign {
        var: VarRef,
        value: String,
        loc: SrcLoc,
    },
    Delete {
        target: String,
        loc: SrcLoc,
    },
    Push {
        side: Option<Side>,
        chain: TransformChain,
        loc: SrcLoc,
    },
    Pop {
        side: Option<Side>,
        loc: SrcLoc,
    },
}

#[derive(Debug, Clone)]
pub struct BaseRef {
    pub class: String,
    pub loc: SrcLoc,
}

#[derive(Debug, Clone)]
pub struct DefinitionNode {
    pub name: String,
    pub parent: Option<DefId>,
    pub children: Vec<DefId>,
    pub bases: Vec<BaseRef>,
    pub commands: Vec<DefCommand>,
    /// Instance bodies are definitions too, but cannot be named by `new`.
    pub anonymous: bool,
    pub loc: SrcLoc,
}

/// The static class tree. Nodes are created by the parser and never change once
/// parsing is finished.
#[derive(Debug, Clone)]
pub struct DefinitionTree {
    nodes: SlotMap<DefId, DefinitionNode>,
    root: DefId,
}

impl DefinitionTree {
    pub fn new(loc: SrcLoc) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(DefinitionNode {
            name: String::new(),
            parent: None,
            children: Vec::new(),
            bases: Vec::new(),
            commands: Vec::new(),
            anonymous: false,
            loc,
        });
        Self { nodes, root }
    }

    pub fn root(&self) -> DefId {
        self.root
    }

    pub fn get(&self, id: DefId) -> Option<&DefinitionNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: DefId) -> Option<&mut DefinitionNode> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = DefId> + '_ {
        self.nodes.keys()
    }

    /// Opens class `name` under `parent`. A class defined twice in the same scope
    /// is reopened, and the new statements are appended to it.
    pub fn open_class(&mut self, parent: DefId, name: &str, loc: SrcLoc) -> DefId {
        if let Some(existing) = self.child_named(parent, name) {
            return existing;
        }
        self.insert_child(parent, name, false, loc)
    }

    pub fn add_instance_body(&mut self, parent: DefId, name: &str, loc: SrcLoc) -> DefId {
        self.insert_child(parent, name, true, loc)
    }

    fn insert_child(&mut self, parent: DefId, name: &str, anonymous: bool, loc: SrcLoc) -> DefId {
        let id = self.nodes.insert(DefinitionNode {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            bases: Vec::new(),
            commands: Vec::new(),
            anonymous,
            loc,
        });
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(id);
        }
        id
    }

    pub fn child_named(&self, parent: DefId, name: &str) -> Option<DefId> {
        self.nodes.get(parent)?.children.iter().copied().find(|&c| {
            self.nodes
                .get(c)
                .is_some_and(|n| !n.anonymous && n.name == name)
        })
    }

    /// `id` followed by each of its ancestors up to the root.
    pub fn ancestors(&self, id: DefId) -> impl Iterator<Item = DefId> + '_ {
        std::iter::successors(Some(id), move |&cur| self.nodes.get(cur)?.parent)
    }

    pub fn path_segments(&self, id: DefId) -> Vec<String> {
        let mut segments: Vec<String> = self
            .ancestors(id)
            .filter_map(|a| self.nodes.get(a))
            .filter(|n| n.parent.is_some())
            .map(|n| n.name.clone())
            .collect();
        segments.reverse();
        segments
    }

    pub fn path(&self, id: DefId) -> String {
        format!("/{}", self.path_segments(id).join("/"))
    }

    /// Resolves a class path as written after `new` or `inherits`.
    ///
    /// The first segment of a relative path is looked up in `from` and then in
    /// each enclosing scope; the remaining segments descend from there.
    pub fn resolve_class(&self, from: DefId, path: &str) -> Option<DefId> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let mut node = if path.starts_with('/') {
            self.root
        } else {
            let first = segments.next()?;
            match first {
                "." | ".." => self.step(from, first)?,
                name => self
                    .ancestors(from)
                    .find_map(|scope| self.child_named(scope, name))?,
            }
        };
        for seg in segments {
            node = self.step(node, seg)?;
        }
        Some(node)
    }

    fn step(&self, node: DefId, seg: &str) -> Option<DefId> {
        match seg {
            "." => Some(node),
            ".." => self.nodes.get(node)?.parent,
            name => self.child_named(node, name),
        }
    }
}
