use super::config::ConfigError;
use crate::core::io::IoError;
use crate::core::io::columns::DataFormatError;
use crate::core::io::lexer::LexError;
use crate::core::io::parser::ParseError;
use crate::core::models::template::SrcLoc;
use crate::core::models::transform::TransformError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScopeError {
    #[error("{loc}: pop() without a matching push() in this scope")]
    UnbalancedPop { loc: SrcLoc },

    #[error("{loc}: {count} push() command(s) in \"{scope}\" were never popped")]
    UnbalancedPush {
        loc: SrcLoc,
        scope: String,
        count: usize,
    },

    #[error(
        "{loc}: centroid-relative transformation in \"{scope}\" has no atom coordinates to act on"
    )]
    UnanchoredDeferred { loc: SrcLoc, scope: String },

    #[error("{loc}: unknown class \"{class}\"")]
    UnknownClass { loc: SrcLoc, class: String },

    #[error("{loc}: cannot delete \"{target}\": no such instance")]
    UnknownInstance { loc: SrcLoc, target: String },

    #[error("{loc}: an instance named \"{name}\" already exists in \"{scope}\"")]
    DuplicateInstance {
        loc: SrcLoc,
        name: String,
        scope: String,
    },

    #[error("{loc}: class \"{class}\" contains an instance of itself")]
    RecursiveInstantiation { loc: SrcLoc, class: String },

    #[error("{loc}: class \"{class}\" inherits from itself")]
    InheritanceCycle { loc: SrcLoc, class: String },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindingError {
    #[error("{loc}: unknown category \"{category}\" in \"{var}\"; declare it with \"category\"")]
    UnresolvedCategory {
        loc: SrcLoc,
        category: String,
        var: String,
    },

    #[error("{loc}: \"{name}\" was already assigned at {first}")]
    ConflictingExplicitBinding {
        loc: SrcLoc,
        name: String,
        first: SrcLoc,
    },

    #[error("{loc}: category \"{category}\" is declared twice in \"{scope}\"")]
    DuplicateCategory {
        loc: SrcLoc,
        category: String,
        scope: String,
    },

    #[error("{loc}: category \"{category}\" must have a non-zero increment")]
    ZeroIncrement { loc: SrcLoc, category: String },

    #[error("{loc}: \"{var}\" has no category name")]
    InvalidDescriptor { loc: SrcLoc, var: String },

    #[error("{loc}: the category path in \"{var}\" does not name an existing node")]
    UnknownCategoryPath { loc: SrcLoc, var: String },

    #[error("{loc}: \"{var}\" refers above the root of the tree")]
    PathEscapesRoot { loc: SrcLoc, var: String },

    #[error("{loc}: \"{var}\" lies outside category \"{category}\" rooted at \"{root}\"")]
    OutsideCategory {
        loc: SrcLoc,
        var: String,
        category: String,
        root: String,
    },

    #[error("{loc}: \"{var}\" was never bound to a value")]
    Unbound { loc: SrcLoc, var: String },
}

/// Every way a compilation can fail. All of them are fatal.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    DataFormat(#[from] DataFormatError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Lex(e) => CompileError::Lex(e),
            ParseError::Transform(e) => CompileError::Transform(e),
            ParseError::Io(e) => CompileError::Io(e),
        }
    }
}
