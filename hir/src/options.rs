//! Per-compilation options
//!
//! Every [`HirGraph`](crate::ir::HirGraph) owns one of these; nothing here is
//! process-wide.

/// Options controlling merging and block ordering for one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HirOptions {
    /// Skip stack tag and lock shape checks at join points.
    pub assume_verified_bytecode: bool,

    /// Re-validate installed phis when a loop header is merged again.
    pub extra_phi_checking: bool,

    /// Treat distinct constant nodes with equal values as the same value when
    /// merging, so they don't force a phi.
    pub merge_equivalent_constants: bool,

    /// Trace level for the ordering pass (0 = silent, 1 = final order,
    /// 2 = loops and phases, 3 = per-block events, 4 = dominator updates)
    pub trace_linear_scan_level: u8,

    /// Invert worklist priority to expose ordering assumptions downstream.
    pub stress_linear_scan: bool,

    /// Run the order verifier after the ordering pass.
    pub verify_linear_scan_order: bool,
}

impl Default for HirOptions {
    fn default() -> Self {
        Self {
            assume_verified_bytecode: false,
            extra_phi_checking: false,
            merge_equivalent_constants: false,
            trace_linear_scan_level: 0,
            stress_linear_scan: false,
            verify_linear_scan_order: cfg!(debug_assertions),
        }
    }
}

impl HirOptions {
    /// Development configuration (all checks on, order table traced)
    pub fn development() -> Self {
        Self {
            assume_verified_bytecode: false,
            extra_phi_checking: true,
            merge_equivalent_constants: false,
            trace_linear_scan_level: 1,
            stress_linear_scan: false,
            verify_linear_scan_order: true,
        }
    }

    /// Production configuration (verified input, no checking overhead)
    pub fn production() -> Self {
        Self {
            assume_verified_bytecode: true,
            extra_phi_checking: false,
            merge_equivalent_constants: true,
            trace_linear_scan_level: 0,
            stress_linear_scan: false,
            verify_linear_scan_order: false,
        }
    }

    /// Stress configuration for shaking out order-dependent bugs
    pub fn stress() -> Self {
        Self {
            stress_linear_scan: true,
            verify_linear_scan_order: true,
            ..Self::development()
        }
    }

    pub fn with_trace_level(mut self, level: u8) -> Self {
        self.trace_linear_scan_level = level;
        self
    }
}
