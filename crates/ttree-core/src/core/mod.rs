//! # Core Module
//!
//! Stateless building blocks of the compiler.
//!
//! - **Data Models** ([`models`]) - Definition tree, instance tree, templates, commands
//!   and transform primitives, all addressed through arena identifiers.
//! - **Input/Output** ([`io`]) - The character-level lexer, the statement parser, the
//!   whitespace-column codec for positional sections, atom-style layouts and the binding
//!   report writer.
//! - **Utilities** ([`utils`]) - Affine geometry on top of `nalgebra`.

pub mod io;
pub mod models;
pub mod utils;
