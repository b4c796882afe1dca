//! High-level IR
//!
//! Values and blocks live in flat arenas owned by a [`HirGraph`] and refer to
//! each other by index. Block edges are edited only through
//! [`HirGraph::set_end`], which keeps successor and predecessor lists in sync.
//!
//! - `types` / `flags` - value kinds, constants, opcodes and flag sets
//! - `instructions` - the closed instruction set and its visitor
//! - `value` / `graph` - node records and the arena
//! - `blocks` - block headers, terminators and CFG traversal
//! - `state` / `scope` / `merge` - abstract state, inlining scopes and joins
//! - `linear_scan_order` - loop detection, dominators and block ordering
//! - `substitution` / `validation` / `dump` - resolver, checker and printer
//! - `builder` / `description` - graph construction and its JSON form

pub mod types;
pub mod flags;
pub mod instructions;
pub mod value;
pub mod graph;
pub mod scope;
pub mod state;
pub mod blocks;
pub mod merge;
pub mod linear_scan_order;
pub mod substitution;
pub mod validation;
pub mod dump;
pub mod builder;
pub mod description;

pub use types::*;
pub use flags::*;
pub use instructions::*;
pub use value::*;
pub use graph::*;
pub use scope::*;
pub use state::*;
pub use blocks::*;
pub use linear_scan_order::{ComputeLinearScanOrder, LinearScanOrder};
pub use builder::HirBuilder;
pub use description::{BlockDescription, DescribedGraph, DescriptionError, GraphDescription, TerminatorKind};
pub use substitution::SubstitutionStats;
pub use validation::{validate_graph, ValidationError, ValidationErrorKind};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a value in the graph's value arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl ValueId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Block id. Ids are dense, so they index bit maps directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Index of an inlining scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope{}", self.0)
    }
}
