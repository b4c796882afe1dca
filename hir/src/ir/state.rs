//! Abstract interpreter state
//!
//! A [`FrameState`] records which value occupies each local slot and stack
//! slot, plus the lock stack, at one program point in one inlining scope.
//! Double-word values occupy their slot and leave the following slot empty.

use super::{BlockId, IrScope, ScopeId, ValueArena, ValueId, ValueKind};
use crate::error::{HirError, HirResult, StructuralError};

/// The block and bci a merge happens at, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPoint {
    pub block: BlockId,
    pub bci: i32,
}

impl JoinPoint {
    pub fn new(block: BlockId, bci: i32) -> Self {
        Self { block, bci }
    }

    fn conflict(self, reason: impl Into<String>) -> HirError {
        HirError::merge_conflict(self.block, self.bci, reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameState {
    scope: ScopeId,
    locals: Vec<Option<ValueId>>,
    stack: Vec<Option<ValueId>>,
    max_stack: usize,
    locks: Vec<ValueId>,
    lock_stack: bool,
}

impl FrameState {
    pub fn new(scope: ScopeId, max_locals: usize, max_stack: usize) -> Self {
        Self {
            scope,
            locals: vec![None; max_locals],
            stack: Vec::with_capacity(max_stack),
            max_stack,
            locks: Vec::new(),
            lock_stack: false,
        }
    }

    #[inline]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    #[inline]
    pub fn locals_size(&self) -> usize {
        self.locals.len()
    }

    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    pub fn max_stack_size(&self) -> usize {
        self.max_stack
    }

    #[inline]
    pub fn locks_size(&self) -> usize {
        self.locks.len()
    }

    pub fn stack_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn no_active_locks(&self) -> bool {
        self.locks.is_empty()
    }

    /// Whether this is a trimmed state captured for an exception site.
    pub fn is_lock_stack(&self) -> bool {
        self.lock_stack
    }

    // locals

    #[inline]
    pub fn local_at(&self, i: usize) -> Option<ValueId> {
        self.locals.get(i).copied().flatten()
    }

    /// Like [`local_at`](Self::local_at), but an illegal value reads as empty.
    pub fn load_local(&self, values: &ValueArena, i: usize) -> Option<ValueId> {
        self.local_at(i)
            .filter(|&x| !values.get(x).kind().is_illegal())
    }

    /// Mark local `i` as holding no usable value.
    pub fn invalidate_local(&mut self, i: usize) {
        // the high slot of a double word is already empty
        if let Some(slot) = self.locals.get_mut(i) {
            *slot = None;
        }
    }

    /// Store `x` into local `i`, killing any double word it overlaps.
    pub fn store_local(&mut self, values: &ValueArena, i: usize, x: ValueId) {
        let is_double_word = |slot: Option<ValueId>| {
            slot.map_or(false, |v| values.get(v).kind().is_double_word())
        };

        self.locals[i] = Some(x);
        if is_double_word(Some(x)) {
            // the high half of x
            self.invalidate_local(i + 1);
        }
        if i > 0 && is_double_word(self.local_at(i - 1)) {
            self.invalidate_local(i - 1);
        }
    }

    pub fn clear_locals(&mut self) {
        for slot in &mut self.locals {
            *slot = None;
        }
    }

    // stack

    #[inline]
    pub fn stack_at(&self, i: usize) -> Option<ValueId> {
        self.stack.get(i).copied().flatten()
    }

    /// Push `x` with the slot footprint of `kind`.
    pub fn push(&mut self, kind: ValueKind, x: ValueId) {
        self.xpush(Some(x));
        if kind.is_double_word() {
            self.xpush(None);
        }
    }

    pub fn xpush(&mut self, x: Option<ValueId>) {
        self.stack.push(x);
    }

    /// Pop a value with the slot footprint of `kind`.
    pub fn pop(&mut self, kind: ValueKind) -> Option<ValueId> {
        if kind.is_double_word() {
            self.xpop();
        }
        self.xpop()
    }

    pub fn xpop(&mut self) -> Option<ValueId> {
        self.stack.pop().flatten()
    }

    pub fn truncate_stack(&mut self, size: usize) {
        self.stack.truncate(size);
    }

    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    // locks

    /// Push `object` on the lock stack and return its lock number.
    pub fn lock(&mut self, object: ValueId) -> usize {
        self.locks.push(object);
        self.locks.len() - 1
    }

    /// Pop the innermost lock and return the remaining count.
    pub fn unlock(&mut self) -> usize {
        self.locks.pop();
        self.locks.len()
    }

    pub fn lock_at(&self, i: usize) -> Option<ValueId> {
        self.locks.get(i).copied()
    }

    // copies

    /// Copy of this state for an exception site: locals and locks, with the
    /// stack trimmed to the part owned by callers.
    pub fn copy_locks(&self, scopes: &[IrScope]) -> FrameState {
        let size = if self.stack.is_empty() {
            0
        } else {
            scopes
                .get(self.scope.index())
                .map_or(0, |scope| scope.lock_stack_size(scopes))
        };
        let mut copy = self.clone();
        copy.lock_stack = true;
        copy.stack.truncate(size);
        copy
    }

    /// State for entering an inlined callee: empty locals, same stack and
    /// locks.
    pub fn push_scope(&self, callee: &IrScope) -> FrameState {
        let method = &callee.method;
        let mut state = FrameState::new(
            callee.id(),
            method.max_locals,
            self.max_stack + method.max_stack,
        );
        state.stack = self.stack.clone();
        state.locks = self.locks.clone();
        state
    }

    /// State for returning to the caller: its locals, this stack and locks.
    pub fn pop_scope(&self, scopes: &[IrScope]) -> Result<FrameState, StructuralError> {
        let scope = scopes.get(self.scope.index()).ok_or_else(|| {
            StructuralError::new("pop_scope", None, format!("unknown {}", self.scope))
        })?;
        let (caller, caller_state) = match (scope.caller(), scope.caller_state()) {
            (Some(caller), Some(state)) => (caller, state),
            _ => {
                return Err(StructuralError::new(
                    "pop_scope",
                    None,
                    format!("{} has no caller", self.scope),
                ))
            }
        };
        let mut state = FrameState::new(caller, caller_state.locals_size(), self.max_stack);
        state.stack = self.stack.clone();
        state.locks = self.locks.clone();
        state.locals = caller_state.locals.clone();
        Ok(state)
    }

    /// The state of the caller, if this state belongs to an inlined scope.
    pub fn caller_state<'a>(&self, scopes: &'a [IrScope]) -> Option<&'a FrameState> {
        scopes
            .get(self.scope.index())
            .and_then(|scope| scope.caller_state())
    }

    // comparisons

    /// Stack kinds and locks agree with `other`, which may belong to a
    /// different scope.
    pub fn is_same_across_scopes(&self, values: &ValueArena, other: &FrameState) -> bool {
        if self.stack_size() != other.stack_size() || self.locks_size() != other.locks_size() {
            return false;
        }
        for i in 0..self.stack_size() {
            if let Some(x) = self.stack_at(i) {
                let y = other.stack_at(i);
                if Some(x) != y && type_mismatch(values, x, y) {
                    return false;
                }
            }
        }
        self.locks == other.locks
    }

    pub(crate) fn check_size(&self, other: &FrameState, at: JoinPoint) -> HirResult<()> {
        if other.stack_size() != self.stack_size() {
            Err(at.conflict(format!(
                "stack sizes do not match ({} vs {})",
                self.stack_size(),
                other.stack_size()
            )))
        } else if other.locals_size() != self.locals_size() {
            Err(at.conflict(format!(
                "local sizes do not match ({} vs {})",
                self.locals_size(),
                other.locals_size()
            )))
        } else {
            Ok(())
        }
    }

    fn is_phi_of(values: &ValueArena, x: ValueId, block: BlockId) -> bool {
        values
            .get(x)
            .op
            .as_phi()
            .map_or(false, |phi| phi.block == block)
    }

    // phis

    /// Replace stack slot `i` with a new phi owned by `block`.
    pub fn setup_phi_for_stack(
        &mut self,
        values: &mut ValueArena,
        block: BlockId,
        i: usize,
    ) -> Result<ValueId, StructuralError> {
        let p = self.stack_at(i).ok_or_else(|| {
            StructuralError::at("setup_phi", block, format!("stack slot {} is empty", i))
        })?;
        if Self::is_phi_of(values, p, block) {
            return Err(StructuralError::at(
                "setup_phi",
                block,
                format!("phi already created for stack slot {}", i),
            ));
        }
        let kind = values.get(p).kind();
        let phi = values.new_phi(kind, block, -(i as i32) - 1);
        self.stack[i] = Some(phi);
        Ok(phi)
    }

    /// Replace local `i` with a new phi owned by `block`.
    pub fn setup_phi_for_local(
        &mut self,
        values: &mut ValueArena,
        block: BlockId,
        i: usize,
    ) -> Result<ValueId, StructuralError> {
        let p = self.local_at(i).ok_or_else(|| {
            StructuralError::at("setup_phi", block, format!("local {} is empty", i))
        })?;
        if Self::is_phi_of(values, p, block) {
            return Err(StructuralError::at(
                "setup_phi",
                block,
                format!("phi already created for local {}", i),
            ));
        }
        let kind = values.get(p).kind();
        let phi = values.new_phi(kind, block, i as i32);
        self.store_local(values, i, phi);
        Ok(phi)
    }

    /// Merge `other` into this state slot by slot. A slot that disagrees
    /// becomes a phi of `block`; a local whose kinds disagree becomes empty.
    pub fn merge(
        &mut self,
        values: &mut ValueArena,
        other: &FrameState,
        at: JoinPoint,
        merge_equivalent_constants: bool,
    ) -> HirResult<()> {
        self.check_size(other, at)?;
        let block = at.block;

        for i in 0..self.locals_size() + self.stack_size() {
            let (x, y) = if i < self.locals_size() {
                (self.local_at(i), other.local_at(i))
            } else {
                let s = i - self.locals_size();
                (self.stack_at(s), other.stack_at(s))
            };
            let x = match x {
                Some(x) if Some(x) != y => x,
                _ => continue,
            };
            if Self::is_phi_of(values, x, block) {
                continue;
            }
            if merge_equivalent_constants && equivalent_constants(values, x, y) {
                continue;
            }
            if i < self.locals_size() {
                if type_mismatch(values, x, y) {
                    self.invalidate_local(i);
                } else {
                    self.setup_phi_for_local(values, block, i)?;
                }
            } else {
                self.setup_phi_for_stack(values, block, i - self.locals_size())?;
            }
        }
        Ok(())
    }

    /// Drop this block's phis for locals whose kind disagrees with `other`.
    /// A disagreeing local that is not such a phi is a conflict.
    pub fn invalidate_mismatched_local_phis(
        &mut self,
        values: &ValueArena,
        other: &FrameState,
        at: JoinPoint,
    ) -> HirResult<()> {
        self.check_size(other, at)?;
        for i in 0..self.locals_size() {
            let x = match self.local_at(i) {
                Some(x) => x,
                None => continue,
            };
            let y = other.local_at(i);
            if Some(x) != y && type_mismatch(values, x, y) {
                if Self::is_phi_of(values, x, at.block) {
                    self.locals[i] = None;
                } else {
                    return Err(at.conflict(format!("type mismatch at local {}", i)));
                }
            }
        }
        Ok(())
    }

    /// Every slot that differs from `other` must be a phi of this block.
    pub fn check_phis(&self, values: &ValueArena, other: &FrameState, at: JoinPoint) -> HirResult<()> {
        self.check_size(other, at)?;
        let slots = self
            .locals
            .iter()
            .zip(other.locals.iter())
            .chain(self.stack.iter().zip(other.stack.iter()));
        for (i, (&x, &y)) in slots.enumerate() {
            if let Some(x) = x {
                if Some(x) != y && !Self::is_phi_of(values, x, at.block) {
                    return Err(at.conflict(format!("instruction is not a phi or null at {}", i)));
                }
            }
        }
        Ok(())
    }

    /// All phis in locals and stack slots.
    pub fn all_phis(&self, values: &ValueArena) -> Vec<ValueId> {
        self.slots()
            .filter(|&x| values.get(x).op.as_phi().is_some())
            .collect()
    }

    /// Non-empty local and stack slots, locals first.
    pub fn slots(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.locals.iter().chain(self.stack.iter()).filter_map(|&x| x)
    }

    // enumeration

    /// Apply `f` to every value in this state, its locks and the states of
    /// all callers.
    pub fn values_do(&self, scopes: &[IrScope], mut f: impl FnMut(ValueId)) {
        let mut current = Some(self);
        while let Some(state) = current {
            state.local_values_do(&mut f);
            current = state.caller_state(scopes);
        }
    }

    /// Like [`values_do`](Self::values_do) without following callers.
    pub fn local_values_do(&self, mut f: impl FnMut(ValueId)) {
        for x in self.slots() {
            f(x);
        }
        for &lock in &self.locks {
            f(lock);
        }
    }

    /// Rewrite every value in this state and its locks in place.
    pub fn values_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if let Some(x) = slot.as_mut() {
                f(x);
            }
        }
        for lock in self.locks.iter_mut() {
            f(lock);
        }
    }
}

fn type_mismatch(values: &ValueArena, x: ValueId, y: Option<ValueId>) -> bool {
    match y {
        None => true,
        Some(y) => values.get(x).kind() != values.get(y).kind(),
    }
}

fn equivalent_constants(values: &ValueArena, x: ValueId, y: Option<ValueId>) -> bool {
    let y = match y {
        Some(y) => y,
        None => return false,
    };
    match (values.get(x).op.as_constant(), values.get(y).op.as_constant()) {
        (Some(a), Some(b)) => a.equivalent(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstantValue, Instruction};

    const SCOPE: ScopeId = ScopeId(0);
    const BLOCK: BlockId = BlockId(7);

    fn at() -> JoinPoint {
        JoinPoint::new(BLOCK, 12)
    }

    #[test]
    fn test_store_local_double_word_overlap() {
        let mut values = ValueArena::new();
        let long = values.new_constant(ConstantValue::Long(1));
        let int = values.new_constant(ConstantValue::Int(2));
        let mut state = FrameState::new(SCOPE, 4, 2);

        state.store_local(&values, 1, long);
        assert_eq!(state.local_at(1), Some(long));
        assert_eq!(state.local_at(2), None);

        // writing the high half kills the long
        state.store_local(&values, 2, int);
        assert_eq!(state.local_at(1), None);
        assert_eq!(state.local_at(2), Some(int));

        // a long written just below another long kills the upper one
        state.store_local(&values, 2, long);
        state.store_local(&values, 1, long);
        assert_eq!(state.local_at(1), Some(long));
        assert_eq!(state.local_at(2), None);
    }

    #[test]
    fn test_push_pop_double_word() {
        let mut values = ValueArena::new();
        let d = values.new_constant(ConstantValue::double(1.5));
        let mut state = FrameState::new(SCOPE, 0, 4);
        state.push(ValueKind::Double, d);
        assert_eq!(state.stack_size(), 2);
        assert_eq!(state.stack_at(1), None);
        assert_eq!(state.pop(ValueKind::Double), Some(d));
        assert!(state.stack_empty());
    }

    #[test]
    fn test_merge_inserts_phi_only_where_values_differ() {
        let mut values = ValueArena::new();
        let a = values.new_constant(ConstantValue::Int(1));
        let b = values.new_constant(ConstantValue::Int(2));
        let shared = values.new_constant(ConstantValue::Int(3));

        let mut existing = FrameState::new(SCOPE, 2, 1);
        existing.store_local(&values, 0, a);
        existing.store_local(&values, 1, shared);
        existing.xpush(Some(a));
        let mut incoming = existing.clone();
        incoming.store_local(&values, 0, b);
        incoming.truncate_stack(0);
        incoming.xpush(Some(b));

        existing.merge(&mut values, &incoming, at(), false).unwrap();
        let phi = existing.local_at(0).unwrap();
        assert!(matches!(values.get(phi).op, Instruction::Phi(p) if p.block == BLOCK && p.index == 0));
        assert_eq!(existing.local_at(1), Some(shared));
        let stack_phi = existing.stack_at(0).unwrap();
        assert!(matches!(values.get(stack_phi).op, Instruction::Phi(p) if p.index == -1));

        // a second merge keeps the existing phis
        let count = values.len();
        existing.merge(&mut values, &incoming, at(), false).unwrap();
        assert_eq!(values.len(), count);
    }

    #[test]
    fn test_merge_kind_mismatch_invalidates_local() {
        let mut values = ValueArena::new();
        let i = values.new_constant(ConstantValue::Int(1));
        let o = values.new_constant(ConstantValue::Null);
        let mut existing = FrameState::new(SCOPE, 1, 0);
        existing.store_local(&values, 0, i);
        let mut incoming = existing.clone();
        incoming.store_local(&values, 0, o);

        existing.merge(&mut values, &incoming, at(), false).unwrap();
        assert_eq!(existing.local_at(0), None);
    }

    #[test]
    fn test_merge_equivalent_constants() {
        let mut values = ValueArena::new();
        let a = values.new_constant(ConstantValue::Int(5));
        let b = values.new_constant(ConstantValue::Int(5));
        let mut existing = FrameState::new(SCOPE, 1, 0);
        existing.store_local(&values, 0, a);
        let mut incoming = existing.clone();
        incoming.store_local(&values, 0, b);

        let mut merged = existing.clone();
        merged.merge(&mut values, &incoming, at(), true).unwrap();
        assert_eq!(merged.local_at(0), Some(a));

        existing.merge(&mut values, &incoming, at(), false).unwrap();
        assert_ne!(existing.local_at(0), Some(a));
    }

    #[test]
    fn test_size_mismatch_is_merge_conflict() {
        let mut values = ValueArena::new();
        let a = values.new_constant(ConstantValue::Int(1));
        let mut existing = FrameState::new(SCOPE, 1, 2);
        let mut incoming = existing.clone();
        incoming.xpush(Some(a));
        let err = existing.merge(&mut values, &incoming, at(), false).unwrap_err();
        assert!(err.is_bailout());
        assert!(matches!(err, HirError::MergeConflict { block: BLOCK, bci: 12, .. }));
    }

    #[test]
    fn test_check_phis_and_invalidate_mismatched() {
        let mut values = ValueArena::new();
        let a = values.new_constant(ConstantValue::Int(1));
        let b = values.new_constant(ConstantValue::Int(2));
        let o = values.new_constant(ConstantValue::Null);

        let mut header = FrameState::new(SCOPE, 2, 0);
        header.store_local(&values, 0, a);
        header.store_local(&values, 1, a);
        header.setup_phi_for_local(&mut values, BLOCK, 0).unwrap();

        // back edge brings a different int in local 0 and 1
        let mut back = header.clone();
        back.store_local(&values, 0, b);
        back.store_local(&values, 1, b);
        let err = header.check_phis(&values, &back, at()).unwrap_err();
        assert!(err.to_string().contains("not a phi"));

        // object in the phi slot drops the phi
        let mut back = header.clone();
        back.store_local(&values, 0, o);
        header.invalidate_mismatched_local_phis(&values, &back, at()).unwrap();
        assert_eq!(header.local_at(0), None);
        assert_eq!(header.local_at(1), Some(a));

        // object in a non-phi slot is a conflict
        let mut back = header.clone();
        back.store_local(&values, 1, o);
        assert!(header.invalidate_mismatched_local_phis(&values, &back, at()).is_err());
    }

    #[test]
    fn test_values_do_visits_locks() {
        let mut values = ValueArena::new();
        let a = values.new_constant(ConstantValue::Int(1));
        let obj = values.new_constant(ConstantValue::Null);
        let mut state = FrameState::new(SCOPE, 1, 1);
        state.store_local(&values, 0, a);
        assert_eq!(state.lock(obj), 0);

        let mut seen = Vec::new();
        state.values_do(&[], |v| seen.push(v));
        assert_eq!(seen, vec![a, obj]);
        assert_eq!(state.unlock(), 0);
    }
}
