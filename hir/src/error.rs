//! Error types
//!
//! Two families of failure come out of the HIR core. Merge conflicts and
//! unsupported subroutine shapes are bailouts: the method is abandoned with a
//! "bytecode too complex" diagnostic and the driver falls back to a simpler
//! strategy. Structural errors mean the graph handed to a pass is malformed,
//! which is a bug in whoever built it.

use crate::ir::BlockId;
use std::fmt;

/// A violated graph invariant, reported with the phase that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralError {
    pub phase: &'static str,
    pub block: Option<BlockId>,
    pub message: String,
}

impl StructuralError {
    pub fn new(phase: &'static str, block: Option<BlockId>, message: impl Into<String>) -> Self {
        Self {
            phase,
            block,
            message: message.into(),
        }
    }

    pub fn at(phase: &'static str, block: BlockId, message: impl Into<String>) -> Self {
        Self::new(phase, Some(block), message)
    }
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block {
            Some(block) => write!(f, "[{}] {}: {}", self.phase, block, self.message),
            None => write!(f, "[{}] {}", self.phase, self.message),
        }
    }
}

impl std::error::Error for StructuralError {}

/// Errors surfaced while building and merging the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HirError {
    /// Incompatible abstract states meet at a join point.
    MergeConflict {
        block: BlockId,
        bci: i32,
        reason: String,
    },
    /// A jsr/ret shape that state merging cannot represent.
    UnsupportedControlFlow { block: BlockId, reason: String },
    /// Internal error: the graph is malformed.
    Structural(StructuralError),
}

impl HirError {
    pub fn merge_conflict(block: BlockId, bci: i32, reason: impl Into<String>) -> Self {
        HirError::MergeConflict {
            block,
            bci,
            reason: reason.into(),
        }
    }

    pub fn unsupported(block: BlockId, reason: impl Into<String>) -> Self {
        HirError::UnsupportedControlFlow {
            block,
            reason: reason.into(),
        }
    }

    /// True for failures that abandon the method rather than indicate a bug.
    pub fn is_bailout(&self) -> bool {
        !matches!(self, HirError::Structural(_))
    }

    /// The block the failure was detected at, if known.
    pub fn block(&self) -> Option<BlockId> {
        match self {
            HirError::MergeConflict { block, .. } => Some(*block),
            HirError::UnsupportedControlFlow { block, .. } => Some(*block),
            HirError::Structural(err) => err.block,
        }
    }
}

impl fmt::Display for HirError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HirError::MergeConflict { block, bci, reason } => {
                write!(
                    f,
                    "bytecode too complex: merge conflict at {} (bci {}): {}",
                    block, bci, reason
                )
            }
            HirError::UnsupportedControlFlow { block, reason } => {
                write!(f, "bytecode too complex: {} at {}", reason, block)
            }
            HirError::Structural(err) => write!(f, "internal error: {}", err),
        }
    }
}

impl std::error::Error for HirError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HirError::Structural(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StructuralError> for HirError {
    fn from(err: StructuralError) -> Self {
        HirError::Structural(err)
    }
}

pub type HirResult<T> = Result<T, HirError>;
