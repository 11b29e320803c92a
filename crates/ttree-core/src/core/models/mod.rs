//! # Data Models
//!
//! Both trees of the compiler live in `slotmap` arenas and refer to each other only
//! through the typed keys in [`ids`]. Definitions are immutable once parsed; instances
//! carry the command lists the executor replays.

pub mod command;
pub mod definition;
pub mod ids;
pub mod instance;
pub mod template;
pub mod transform;
