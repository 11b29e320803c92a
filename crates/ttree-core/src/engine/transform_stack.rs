use super::error::{CompileError, ScopeError};
use crate::core::models::command::Side;
use crate::core::models::template::SrcLoc;
use crate::core::models::transform::TransformChain;
use crate::core::utils::geometry::AffineTransform;

#[derive(Debug, Clone)]
struct Entry {
    affine: AffineTransform,
    implicit: bool,
}

/// A centroid-relative block waiting for its scope to end.
#[derive(Debug, Clone)]
pub(crate) struct Deferred {
    pub chain: TransformChain,
    pub loc: SrcLoc,
}

#[derive(Debug, Default)]
struct Frame {
    left: Vec<Entry>,
    right: Vec<Entry>,
    /// Sides of the explicit pushes still on this frame, oldest first.
    history: Vec<Side>,
    pending: Vec<Deferred>,
}

impl Frame {
    /// `L_k ... L_1 * R_1 ... R_m`
    fn composite(&self) -> AffineTransform {
        let inner = self
            .right
            .iter()
            .fold(AffineTransform::identity(), |acc, e| acc * e.affine);
        self.left.iter().fold(inner, |acc, e| e.affine * acc)
    }

    fn remove_last_explicit(&mut self, side: Side) -> bool {
        let entries = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        match entries.iter().rposition(|e| !e.implicit) {
            Some(i) => {
                entries.remove(i);
                true
            }
            None => false,
        }
    }
}

/// One frame of pushed transforms per open instance scope.
///
/// A point written in the innermost scope is mapped by the innermost frame's
/// composite first and by the outermost frame's last.
#[derive(Debug, Default)]
pub(crate) struct TransformStack {
    frames: Vec<Frame>,
}

impl TransformStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_scope(&mut self) {
        self.frames.push(Frame::default());
    }

    fn top(&mut self, loc: &SrcLoc) -> Result<&mut Frame, ScopeError> {
        self.frames
            .last_mut()
            .ok_or_else(|| ScopeError::Internal(format!("{loc}: transform pushed outside any scope")))
    }

    /// Folds the ordinary prefix of `chain` into the current frame and queues
    /// everything from its first centroid-relative primitive onward.
    pub fn push(
        &mut self,
        side: Side,
        chain: &TransformChain,
        implicit: bool,
        loc: &SrcLoc,
    ) -> Result<(), CompileError> {
        let (immediate, blocks) = chain.split_deferred();
        let affine = immediate.to_affine(None, loc)?;
        let frame = self.top(loc)?;
        frame.pending.extend(blocks.into_iter().map(|chain| Deferred {
            chain,
            loc: loc.clone(),
        }));
        let entry = Entry { affine, implicit };
        match side {
            Side::Left => frame.left.push(entry),
            Side::Right => frame.right.push(entry),
        }
        if !implicit {
            frame.history.push(side);
        }
        Ok(())
    }

    /// Pops the latest explicit push on `side`, or the latest explicit push of
    /// either side when `side` is `None`.
    pub fn pop(&mut self, side: Option<Side>, loc: &SrcLoc) -> Result<(), ScopeError> {
        let frame = self.top(loc)?;
        let unbalanced = || ScopeError::UnbalancedPop { loc: loc.clone() };
        let position = match side {
            Some(s) => frame.history.iter().rposition(|&h| h == s),
            None => frame.history.len().checked_sub(1),
        }
        .ok_or_else(unbalanced)?;
        let side = frame.history.remove(position);
        if frame.remove_last_explicit(side) {
            Ok(())
        } else {
            Err(unbalanced())
        }
    }

    /// The map from the innermost scope's coordinates to output coordinates.
    pub fn composite(&self) -> AffineTransform {
        self.frames
            .iter()
            .fold(AffineTransform::identity(), |acc, f| acc * f.composite())
    }

    /// Like [`composite`](Self::composite) but without the innermost frame.
    pub fn outer_composite(&self) -> AffineTransform {
        let n = self.frames.len().saturating_sub(1);
        self.frames[..n]
            .iter()
            .fold(AffineTransform::identity(), |acc, f| acc * f.composite())
    }

    pub fn take_pending(&mut self) -> Vec<Deferred> {
        self.frames
            .last_mut()
            .map(|f| std::mem::take(&mut f.pending))
            .unwrap_or_default()
    }

    /// Closes the innermost frame. Explicit pushes still on it are an error.
    pub fn end_scope(&mut self, scope: &str, loc: &SrcLoc) -> Result<(), ScopeError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| ScopeError::Internal(format!("{loc}: scope ended twice")))?;
        if !frame.history.is_empty() {
            return Err(ScopeError::UnbalancedPush {
                loc: loc.clone(),
                scope: scope.to_string(),
                count: frame.history.len(),
            });
        }
        Ok(())
    }
}
