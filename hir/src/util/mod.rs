//! Shared utilities

pub mod bitmap;

pub use bitmap::{BitMap, BitMap2D};
