use super::ids::{DefId, InstanceId};
use super::template::{SrcLoc, Template, VarRef};
use super::transform::TransformChain;
use serde::{Deserialize, Serialize};

/// Which end of a scope's transform stack a push or pop acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    /// Pre-multiplies the scope's composite (acts after everything already pushed).
    Left,
    /// Post-multiplies the scope's composite (acts before everything already pushed).
    Right,
}

/// An executable step produced by instantiation, replayed by the executor in
/// depth-first order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ScopeBegin(InstanceId),
    ScopeEnd(InstanceId),
    Push {
        side: Side,
        chain: TransformChain,
        /// Set for the transform attached to a `new` statement, which is owned by
        /// the scope and released when it ends.
        implicit: bool,
        loc: SrcLoc,
    },
    Pop {
        side: Option<Side>,
        loc: SrcLoc,
    },
    WriteFile {
        channel: String,
        once: bool,
        definition: DefId,
        template: Template,
        loc: SrcLoc,
    },
    CreateVar {
        definition: DefId,
        template: Template,
        loc: SrcLoc,
    },
    Assign {
        definition: DefId,
        var: VarRef,
        value: String,
        loc: SrcLoc,
    },
}
