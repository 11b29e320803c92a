//! # Workflows Module
//!
//! High-level entry points that run the whole compiler: parse a template file, build
//! the instance tree, bind every variable, render every channel and hand back the
//! results.
//!
//! ## Overview
//!
//! - **Compile Workflow** ([`compile`]) - `parse -> instantiate -> bind -> render`,
//!   reporting each phase through a [`ProgressReporter`](crate::engine::progress::ProgressReporter),
//!   plus [`compile::write_outputs`] to store the channels and the binding report on disk.
//!
//! Every failure is fatal and surfaces as a single
//! [`CompileError`](crate::engine::error::CompileError); nothing is written unless the
//! whole compilation succeeded.

pub mod compile;
