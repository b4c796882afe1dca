//! High-level IR for a method JIT
//!
//! The graph model (values, blocks, terminators), abstract-state merging at
//! join points, and the loop detection / dominator / linear-scan block
//! ordering pass that hands blocks to the register allocator.

pub mod error;
pub mod ir;
pub mod logging;
pub mod options;
pub mod util;

pub use error::{HirError, HirResult, StructuralError};
pub use options::HirOptions;
