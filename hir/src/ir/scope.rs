//! Inlining scopes and per-method analysis info

use super::{FrameState, ScopeId};
use crate::util::BitMap;
use fxhash::FxHashMap;

/// What the merge needs to know about a method.
#[derive(Debug, Clone, Default)]
pub struct MethodInfo {
    pub name: String,
    pub max_locals: usize,
    pub max_stack: usize,
    /// Live locals at block entry bcis
    liveness: FxHashMap<i32, BitMap>,
    /// Locals written somewhere inside a loop
    stores_in_loops: Option<BitMap>,
}

impl MethodInfo {
    pub fn new(name: impl Into<String>, max_locals: usize, max_stack: usize) -> Self {
        Self {
            name: name.into(),
            max_locals,
            max_stack,
            liveness: FxHashMap::default(),
            stores_in_loops: None,
        }
    }

    /// Record the live locals at `bci`.
    pub fn set_liveness(&mut self, bci: i32, live: BitMap) {
        self.liveness.insert(bci, live);
    }

    pub fn liveness(&self, bci: i32) -> Option<&BitMap> {
        self.liveness.get(&bci)
    }

    pub fn set_stores_in_loops(&mut self, stores: BitMap) {
        self.stores_in_loops = Some(stores);
    }

    pub fn stores_in_loops(&self) -> Option<&BitMap> {
        self.stores_in_loops.as_ref()
    }
}

/// One level of inlining. The root scope has no caller.
#[derive(Debug, Clone)]
pub struct IrScope {
    id: ScopeId,
    pub method: MethodInfo,
    caller: Option<ScopeId>,
    caller_bci: i32,
    caller_state: Option<FrameState>,
    level: usize,
    min_number_of_locks: usize,
}

impl IrScope {
    pub(crate) fn root(id: ScopeId, method: MethodInfo) -> Self {
        Self {
            id,
            method,
            caller: None,
            caller_bci: -1,
            caller_state: None,
            level: 0,
            min_number_of_locks: 0,
        }
    }

    pub(crate) fn inlined(
        id: ScopeId,
        method: MethodInfo,
        caller: &IrScope,
        caller_bci: i32,
        caller_state: FrameState,
    ) -> Self {
        Self {
            id,
            method,
            caller: Some(caller.id),
            caller_bci,
            caller_state: Some(caller_state),
            level: caller.level + 1,
            min_number_of_locks: 0,
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn caller(&self) -> Option<ScopeId> {
        self.caller
    }

    pub fn caller_bci(&self) -> i32 {
        self.caller_bci
    }

    /// State of the caller at the call site.
    pub fn caller_state(&self) -> Option<&FrameState> {
        self.caller_state.as_ref()
    }

    pub(crate) fn caller_state_mut(&mut self) -> Option<&mut FrameState> {
        self.caller_state.as_mut()
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_root(&self) -> bool {
        self.caller.is_none()
    }

    pub fn min_number_of_locks(&self) -> usize {
        self.min_number_of_locks
    }

    pub fn set_min_number_of_locks(&mut self, locks: usize) {
        if locks > self.min_number_of_locks {
            self.min_number_of_locks = locks;
        }
    }

    /// Stack slots held by all callers; exception states keep this much of
    /// the stack.
    pub fn lock_stack_size(&self, scopes: &[IrScope]) -> usize {
        let mut size = 0;
        let mut current = Some(self);
        while let Some(scope) = current {
            match scope.caller_state() {
                Some(state) => size += state.stack_size(),
                None => break,
            }
            current = scope.caller.and_then(|id| scopes.get(id.index()));
        }
        size
    }
}
