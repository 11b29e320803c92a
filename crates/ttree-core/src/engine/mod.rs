//! # Engine Module
//!
//! The stateful half of the compiler. Given a parsed definition tree it
//!
//! - builds the instance tree and each instance's command list ([`instantiate`]),
//! - resolves every variable reference to a binding and assigns counter values
//!   ([`binding`]),
//! - replays the commands depth-first ([`executor`]) on top of the per-scope
//!   transform stack ([`transform_stack`]), the template renderer ([`render`]) and
//!   the per-scope output buffers ([`output`]).
//!
//! Configuration ([`config`]), progress callbacks ([`progress`]) and the error
//! taxonomy ([`error`]) are shared with the workflows layer.

pub mod binding;
pub mod config;
pub mod error;
pub(crate) mod executor;
pub(crate) mod instantiate;
pub mod output;
pub mod progress;
pub(crate) mod render;
pub(crate) mod transform_stack;
