//! # Input/Output Module
//!
//! Everything that touches text on its way in or out of the compiler.
//!
//! - [`lexer`] - Character-level reader with a stack of sources, `import`/`include`
//!   handling and the template state machine that splits text from variable references.
//! - [`parser`] - Statement parser that builds the definition tree.
//! - [`columns`] - Whitespace-column codec that re-parses rendered positional sections
//!   (`Data Atoms`, `Data Ellipsoids`, `Data Masses`) and applies coordinate transforms.
//! - [`layout`] - Column layouts for the supported atom styles.
//! - [`report`] - Writer for the variable binding report.

use crate::core::models::template::SrcLoc;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub mod columns;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod report;

#[derive(Debug, Error)]
#[error("{}cannot access \"{path}\"", Leader(.loc), path = .path.display())]
pub struct IoError {
    pub loc: Option<SrcLoc>,
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl IoError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            loc: None,
            path: path.into(),
            source,
        }
    }

    pub fn at(mut self, loc: SrcLoc) -> Self {
        self.loc = Some(loc);
        self
    }
}

struct Leader<'a>(&'a Option<SrcLoc>);

impl fmt::Display for Leader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(loc) => write!(f, "{}: ", loc),
            None => Ok(()),
        }
    }
}
