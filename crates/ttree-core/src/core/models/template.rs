use super::ids::BindingId;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const INSTANCE_DELIM: char = '$';
pub const STATIC_DELIM: char = '@';

/// Location of a token or template fragment in the input, used as the leader of
/// every diagnostic (`"file", line N`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SrcLoc {
    pub file: String,
    pub line: usize,
}

impl SrcLoc {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SrcLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\", line {}", self.file, self.line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarKind {
    /// `@` variables, scoped by the definition tree.
    Static,
    /// `$` variables, scoped by the instance tree.
    Instance,
}

impl VarKind {
    pub fn from_delim(c: char) -> Option<Self> {
        match c {
            STATIC_DELIM => Some(VarKind::Static),
            INSTANCE_DELIM => Some(VarKind::Instance),
            _ => None,
        }
    }

    pub fn delim(self) -> char {
        match self {
            VarKind::Static => STATIC_DELIM,
            VarKind::Instance => INSTANCE_DELIM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatModifier {
    RightJustify(usize),
    LeftJustify(usize),
}

impl FormatModifier {
    pub fn apply(&self, value: &str) -> String {
        match *self {
            FormatModifier::RightJustify(width) => format!("{:>width$}", value),
            FormatModifier::LeftJustify(width) => format!("{:<width$}", value),
        }
    }
}

impl fmt::Display for FormatModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatModifier::RightJustify(n) => write!(f, ".rjust({})", n),
            FormatModifier::LeftJustify(n) => write!(f, ".ljust({})", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub text: String,
    pub loc: SrcLoc,
}

/// A reference to a variable inside a template, e.g. `$atom:C1` or `${../mol}`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    /// The delimiter plus an optional opening brace: `$`, `${`, `@` or `@{`.
    pub prefix: String,
    /// The descriptor with escapes already removed.
    pub descr: String,
    /// `}` for braced references, empty otherwise.
    pub suffix: String,
    pub modifier: Option<FormatModifier>,
    pub loc: SrcLoc,
    pub binding: Option<BindingId>,
}

impl VarRef {
    pub fn kind(&self) -> VarKind {
        self.prefix
            .chars()
            .next()
            .and_then(VarKind::from_delim)
            .unwrap_or(VarKind::Instance)
    }

    pub fn is_braced(&self) -> bool {
        self.prefix.ends_with('{')
    }

    pub fn descriptor(&self) -> VarDescriptor {
        VarDescriptor::parse(&self.descr)
    }

    /// The reference exactly as it would be written in a template.
    pub fn source_text(&self) -> String {
        let modifier = self.modifier.map(|m| m.to_string()).unwrap_or_default();
        format!("{}{}{}{}", self.prefix, self.descr, modifier, self.suffix)
    }
}

/// A variable descriptor split into its `cpath/cat:lpath` parts.
///
/// Without a colon the leaf path is `.`, so `$mol` names the category `mol` bound
/// to the current node itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDescriptor {
    pub cat_path: Option<String>,
    pub category: String,
    pub leaf_path: String,
}

impl VarDescriptor {
    pub fn parse(descr: &str) -> Self {
        let (head, leaf) = match descr.find(':') {
            Some(i) => (&descr[..i], &descr[i + 1..]),
            None => (descr, "."),
        };
        let (cat_path, category) = match head.rfind('/') {
            Some(0) => (Some("/".to_string()), &head[1..]),
            Some(i) => (Some(head[..i].to_string()), &head[i + 1..]),
            None => (None, head),
        };
        Self {
            cat_path,
            category: category.to_string(),
            leaf_path: if leaf.is_empty() { "." } else { leaf }.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateItem {
    Text(TextBlock),
    Var(VarRef),
}

impl TemplateItem {
    pub fn as_var(&self) -> Option<&VarRef> {
        match self {
            TemplateItem::Var(v) => Some(v),
            TemplateItem::Text(_) => None,
        }
    }
}

pub type Template = Vec<TemplateItem>;

#[cfg(test)]
mod tests {
    use super::*;

    fn var(prefix: &str, descr: &str) -> VarRef {
        VarRef {
            prefix: prefix.to_string(),
            descr: descr.to_string(),
            suffix: if prefix.ends_with('{') { "}" } else { "" }.to_string(),
            modifier: None,
            loc: SrcLoc::new("t.lt", 1),
            binding: None,
        }
    }

    #[test]
    fn src_loc_displays_with_file_and_line_leader() {
        assert_eq!(SrcLoc::new("a.lt", 12).to_string(), "\"a.lt\", line 12");
    }

    #[test]
    fn descriptor_without_colon_defaults_leaf_to_current_node() {
        let d = VarDescriptor::parse("mol");
        assert_eq!(d.cat_path, None);
        assert_eq!(d.category, "mol");
        assert_eq!(d.leaf_path, ".");
    }

    #[test]
    fn descriptor_with_category_path_and_leaf() {
        let d = VarDescriptor::parse("../poly/atom:C1");
        assert_eq!(d.cat_path.as_deref(), Some("../poly"));
        assert_eq!(d.category, "atom");
        assert_eq!(d.leaf_path, "C1");
    }

    #[test]
    fn descriptor_with_absolute_root_category_path() {
        let d = VarDescriptor::parse("/atom:x/y");
        assert_eq!(d.cat_path.as_deref(), Some("/"));
        assert_eq!(d.category, "atom");
        assert_eq!(d.leaf_path, "x/y");
    }

    #[test]
    fn var_kind_follows_the_delimiter() {
        assert_eq!(var("$", "atom:C").kind(), VarKind::Instance);
        assert_eq!(var("@{", "atom:C").kind(), VarKind::Static);
        assert!(var("@{", "atom:C").is_braced());
    }

    #[test]
    fn source_text_reassembles_braced_reference_with_modifier() {
        let mut v = var("${", "atom:C");
        v.modifier = Some(FormatModifier::RightJustify(5));
        assert_eq!(v.source_text(), "${atom:C.rjust(5)}");
    }

    #[test]
    fn justify_modifiers_pad_with_spaces() {
        assert_eq!(FormatModifier::RightJustify(4).apply("7"), "   7");
        assert_eq!(FormatModifier::LeftJustify(4).apply("7"), "7   ");
        assert_eq!(FormatModifier::LeftJustify(1).apply("123"), "123");
    }
}
