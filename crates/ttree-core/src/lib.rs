//! # ttree Core Library
//!
//! A template compiler that turns a hierarchical, class-based description of molecules
//! into the flat, consistently numbered text sections of a molecular-simulation input deck.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (definition and instance trees,
//!   templates, transform primitives), the lexer/parser for the template language, the
//!   positional-text codec and the affine geometry helpers.
//!
//! - **[`engine`]: The Logic Core.** The stateful machinery: instantiation of the class
//!   tree, variable binding and counter assignment, the transform stack with deferred
//!   centroid-relative operations, rendering, and the per-scope output buffers.
//!
//! - **[`workflows`]: The Public API.** Ties parsing, binding and execution into a single
//!   compile entry point and writes the resulting output files.

pub mod core;
pub mod engine;
pub mod workflows;
