//! Flag sets for values, pin reasons and blocks

bitflags::bitflags! {
    /// Per-value property flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ValueFlags: u32 {
        /// Value is known to be non-null.
        const NON_NULL = 1 << 0;
        /// The implicit null check was already performed.
        const NO_NULL_CHECK = 1 << 1;
        const NO_STORE_CHECK = 1 << 2;
        const NO_RANGE_CHECK = 1 << 3;
        const NO_ZERO_CHECK = 1 << 4;
        const NO_DIV_SPECIAL_CASE = 1 << 5;
        const IS_LOADED = 1 << 6;
        const IS_INITIALIZED = 1 << 7;
        const IS_SAFEPOINT = 1 << 8;
        const IS_STATIC = 1 << 9;
        const IS_STRICT_FP = 1 << 10;
        const PRESERVES_STATE = 1 << 11;
        const UNORDERED_IS_TRUE = 1 << 12;
        const NEEDS_PATCHING = 1 << 13;
        const LIVE_VALUE = 1 << 14;
        const LIVE_DEOPT = 1 << 15;
        const LIVE_CONTROL = 1 << 16;
        const LIVE_SIDE_EFFECT = 1 << 17;
        const LIVE_STORE = 1 << 18;

        const LIVE_MASK = Self::LIVE_VALUE.bits()
            | Self::LIVE_DEOPT.bits()
            | Self::LIVE_CONTROL.bits()
            | Self::LIVE_SIDE_EFFECT.bits()
            | Self::LIVE_STORE.bits();
    }
}

impl Default for ValueFlags {
    fn default() -> Self {
        ValueFlags::empty()
    }
}

bitflags::bitflags! {
    /// Why an instruction is pinned. An instruction is pinned while any
    /// reason is present.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PinReason: u8 {
        const UNKNOWN = 1 << 0;
        /// The instruction can fault.
        const TRAP = 1 << 1;
        /// The instruction has an observable side effect.
        const SIDE_EFFECT = 1 << 2;
        /// An explicit null check guards later accesses.
        const EXPLICIT_NULL_CHECK = 1 << 3;
        /// The instruction captures a state for deoptimization.
        const STATE_SPLIT = 1 << 4;
        /// Set by value numbering when a node must stay put.
        const GLOBAL_VALUE_NUMBERING = 1 << 5;
    }
}

impl Default for PinReason {
    fn default() -> Self {
        PinReason::empty()
    }
}

bitflags::bitflags! {
    /// Block header flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BlockFlags: u16 {
        const STANDARD_ENTRY = 1 << 0;
        const OSR_ENTRY = 1 << 1;
        const EXCEPTION_ENTRY = 1 << 2;
        const SUBROUTINE_ENTRY = 1 << 3;
        const BACKWARD_BRANCH_TARGET = 1 << 4;
        const IS_ON_WORK_LIST = 1 << 5;
        const WAS_VISITED = 1 << 6;
        const DEFAULT_EXCEPTION_HANDLER = 1 << 7;
        /// Loop header as discovered by the bytecode parser.
        const PARSER_LOOP_HEADER = 1 << 8;
        /// Empty block inserted to split a critical edge.
        const CRITICAL_EDGE_SPLIT = 1 << 9;
        /// Target of a backward branch, set by the ordering pass.
        const LINEAR_SCAN_LOOP_HEADER = 1 << 10;
        /// Source of a backward branch, set by the ordering pass.
        const LINEAR_SCAN_LOOP_END = 1 << 11;

        const ENTRY_MASK = Self::STANDARD_ENTRY.bits()
            | Self::OSR_ENTRY.bits()
            | Self::EXCEPTION_ENTRY.bits();

        /// Flags owned by the ordering pass.
        const LINEAR_SCAN_MASK = Self::LINEAR_SCAN_LOOP_HEADER.bits()
            | Self::LINEAR_SCAN_LOOP_END.bits()
            | Self::BACKWARD_BRANCH_TARGET.bits();
    }
}

impl Default for BlockFlags {
    fn default() -> Self {
        BlockFlags::empty()
    }
}

impl BlockFlags {
    /// Parse the lower-case name used in graph descriptions.
    pub fn from_label(name: &str) -> Option<BlockFlags> {
        let flag = match name {
            "std" | "standard_entry" => BlockFlags::STANDARD_ENTRY,
            "osr" | "osr_entry" => BlockFlags::OSR_ENTRY,
            "ex" | "exception_entry" => BlockFlags::EXCEPTION_ENTRY,
            "sr" | "subroutine_entry" => BlockFlags::SUBROUTINE_ENTRY,
            "default_handler" => BlockFlags::DEFAULT_EXCEPTION_HANDLER,
            "plh" | "parser_loop_header" => BlockFlags::PARSER_LOOP_HEADER,
            "ce" | "critical_edge_split" => BlockFlags::CRITICAL_EDGE_SPLIT,
            _ => return None,
        };
        Some(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_masks() {
        assert!(ValueFlags::LIVE_MASK.contains(ValueFlags::LIVE_DEOPT));
        assert!(!ValueFlags::LIVE_MASK.contains(ValueFlags::NON_NULL));
        assert!(BlockFlags::ENTRY_MASK.contains(BlockFlags::OSR_ENTRY));
        assert_eq!(BlockFlags::from_label("ex"), Some(BlockFlags::EXCEPTION_ENTRY));
        assert_eq!(BlockFlags::from_label("lh"), None);
    }
}
