//! Value nodes
//!
//! Every node in the graph is a [`Value`]: identity, kind, flags, an
//! optional substitution link and the instruction-level fields (bci, the
//! intrusive `next` link, covering handlers, pin state).

use super::{BlockId, FrameState, Instruction, Operand, PinReason, ValueFlags, ValueId, ValueKind};

/// Bci of an instruction that has not been appended to a block yet.
pub const BCI_NOT_APPENDED: i32 = -99;

#[derive(Debug, Clone)]
pub struct Value {
    id: ValueId,
    kind: ValueKind,
    flags: ValueFlags,
    pub(crate) subst: Option<ValueId>,
    operand: Option<Operand>,
    bci: i32,
    pub(crate) next: Option<ValueId>,
    exception_handlers: Vec<BlockId>,
    pin_state: PinReason,
    pub state_before: Option<FrameState>,
    pub op: Instruction,
}

impl Value {
    pub(crate) fn new(id: ValueId, kind: ValueKind, op: Instruction) -> Self {
        Self {
            id,
            kind,
            flags: ValueFlags::empty(),
            subst: None,
            operand: None,
            bci: BCI_NOT_APPENDED,
            next: None,
            exception_handlers: Vec::new(),
            pin_state: PinReason::empty(),
            state_before: None,
            op,
        }
    }

    #[inline]
    pub fn id(&self) -> ValueId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Narrow or widen the kind, e.g. when a phi is retyped.
    pub fn set_kind(&mut self, kind: ValueKind) {
        self.kind = kind;
    }

    // flags

    #[inline]
    pub fn flags(&self) -> ValueFlags {
        self.flags
    }

    #[inline]
    pub fn check_flag(&self, flag: ValueFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline]
    pub fn set_flag(&mut self, flag: ValueFlags) {
        self.flags.insert(flag);
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: ValueFlags) {
        self.flags.remove(flag);
    }

    /// Set `flag` only if `value` is true; never clears.
    #[inline]
    pub fn init_flag(&mut self, flag: ValueFlags, value: bool) {
        if value {
            self.flags.insert(flag);
        }
    }

    pub fn is_non_null(&self) -> bool {
        self.check_flag(ValueFlags::NON_NULL)
    }

    pub fn is_live(&self) -> bool {
        self.flags.intersects(ValueFlags::LIVE_MASK)
    }

    // substitution

    /// The raw substitution link. Use [`HirGraph::subst`](super::HirGraph::subst)
    /// for the resolved target.
    pub fn subst_link(&self) -> Option<ValueId> {
        self.subst
    }

    pub fn has_subst(&self) -> bool {
        self.subst.is_some()
    }

    // operand

    pub fn operand(&self) -> Option<Operand> {
        self.operand
    }

    pub fn set_operand(&mut self, operand: Operand) {
        self.operand = Some(operand);
    }

    pub fn clear_operand(&mut self) {
        self.operand = None;
    }

    // instruction fields

    #[inline]
    pub fn bci(&self) -> i32 {
        self.bci
    }

    pub fn set_bci(&mut self, bci: i32) {
        self.bci = bci;
    }

    /// Whether the instruction is linked into a block.
    pub fn is_appended(&self) -> bool {
        self.bci != BCI_NOT_APPENDED
    }

    #[inline]
    pub fn next(&self) -> Option<ValueId> {
        self.next
    }

    pub fn exception_handlers(&self) -> &[BlockId] {
        &self.exception_handlers
    }

    pub fn set_exception_handlers(&mut self, handlers: Vec<BlockId>) {
        self.exception_handlers = handlers;
    }

    pub fn has_exception_handlers(&self) -> bool {
        !self.exception_handlers.is_empty()
    }

    // pinning

    pub fn pin_state(&self) -> PinReason {
        self.pin_state
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        !self.pin_state.is_empty()
    }

    pub fn pin(&mut self, reason: PinReason) {
        self.pin_state.insert(reason);
    }

    /// Remove one reason. Nodes with side effects stay pinned regardless.
    pub fn unpin(&mut self, reason: PinReason) {
        self.pin_state.remove(reason);
        if self.op.has_side_effect() {
            self.pin_state.insert(PinReason::SIDE_EFFECT);
        }
    }

    pub fn can_trap(&self) -> bool {
        self.op.can_trap(self.kind, self.flags)
    }

    pub fn value_number(&self) -> u64 {
        self.op.value_number(self.kind, self.flags)
    }

    pub fn value_equal(&self, other: &Value) -> bool {
        self.kind == other.kind && self.op.value_equal(&other.op)
    }

    /// Apply `f` to values captured in this node's states: the state before
    /// it and, for terminators, the state after it.
    pub fn other_values_do(&self, mut f: impl FnMut(ValueId)) {
        if let Some(state) = &self.state_before {
            state.local_values_do(&mut f);
        }
        if let Some(end) = self.op.as_block_end() {
            if let Some(state) = &end.state_after {
                state.local_values_do(&mut f);
            }
        }
    }

    /// Mutable counterpart of [`Value::other_values_do`].
    pub fn other_values_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        if let Some(state) = self.state_before.as_mut() {
            state.values_mut(&mut f);
        }
        if let Some(end) = self.op.as_block_end_mut() {
            if let Some(state) = end.state_after.as_mut() {
                state.values_mut(&mut f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constant, ConstantValue, MonitorOp};

    fn constant() -> Value {
        Value::new(
            ValueId(0),
            ValueKind::Int,
            Instruction::Constant(Constant {
                value: ConstantValue::Int(1),
            }),
        )
    }

    #[test]
    fn test_flags() {
        let mut v = constant();
        assert!(!v.check_flag(ValueFlags::NON_NULL));
        v.init_flag(ValueFlags::NON_NULL, false);
        assert!(!v.check_flag(ValueFlags::NON_NULL));
        v.init_flag(ValueFlags::NON_NULL, true);
        assert!(v.is_non_null());
        v.clear_flag(ValueFlags::NON_NULL);
        assert!(!v.is_non_null());
    }

    #[test]
    fn test_pinning() {
        let mut v = constant();
        assert!(!v.is_pinned());
        v.pin(PinReason::EXPLICIT_NULL_CHECK);
        v.pin(PinReason::UNKNOWN);
        v.unpin(PinReason::UNKNOWN);
        assert!(v.is_pinned());
        v.unpin(PinReason::EXPLICIT_NULL_CHECK);
        assert!(!v.is_pinned());

        let mut monitor = Value::new(
            ValueId(1),
            ValueKind::Void,
            Instruction::MonitorEnter(MonitorOp {
                object: ValueId(0),
                lock_number: 0,
            }),
        );
        monitor.pin(PinReason::TRAP);
        monitor.unpin(PinReason::TRAP);
        assert!(monitor.is_pinned());
    }

    #[test]
    fn test_not_appended_by_default() {
        let mut v = constant();
        assert!(!v.is_appended());
        v.set_bci(4);
        assert!(v.is_appended());
    }
}
