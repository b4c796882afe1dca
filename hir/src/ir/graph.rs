//! The value arena and the per-compilation graph
//!
//! A [`HirGraph`] owns every value, block and inlining scope of one method
//! compilation. Ids are handed out by the graph itself, so separate
//! compilations never share counters or nodes.

use super::{
    Block, BlockFlags, BlockId, Constant, ConstantValue, FrameState, Instruction, IrScope,
    MethodInfo, Phi, ScopeId, Value, ValueId, ValueKind,
};
use crate::error::StructuralError;
use crate::HirOptions;

/// Flat storage for value nodes.
#[derive(Debug, Clone, Default)]
pub struct ValueArena {
    nodes: Vec<Value>,
}

impl ValueArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Panics if `id` was not allocated by this arena.
    #[inline]
    pub fn get(&self, id: ValueId) -> &Value {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.nodes[id.index()]
    }

    pub fn try_get(&self, id: ValueId) -> Option<&Value> {
        self.nodes.get(id.index())
    }

    pub fn contains(&self, id: ValueId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.nodes.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.nodes.iter_mut()
    }

    /// Allocate a new node. Ids increase monotonically.
    pub fn alloc(&mut self, kind: ValueKind, op: Instruction) -> ValueId {
        let id = ValueId(self.nodes.len() as u32);
        self.nodes.push(Value::new(id, kind, op));
        id
    }

    pub fn new_constant(&mut self, value: ConstantValue) -> ValueId {
        self.alloc(value.kind(), Instruction::Constant(Constant { value }))
    }

    pub fn new_phi(&mut self, kind: ValueKind, block: BlockId, index: i32) -> ValueId {
        self.alloc(kind, Instruction::Phi(Phi { block, index }))
    }

    /// Follow substitution links to the value that stands for `id`.
    pub fn resolve(&self, id: ValueId) -> ValueId {
        let mut current = id;
        // links are acyclic, so the walk is bounded by the arena size
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(current.index()).and_then(|v| v.subst) {
                Some(next) => current = next,
                None => return current,
            }
        }
        current
    }

    /// Make `id` stand for `target`. Fails if that would close a cycle.
    pub fn set_subst(&mut self, id: ValueId, target: ValueId) -> Result<(), StructuralError> {
        if !self.contains(id) || !self.contains(target) {
            return Err(StructuralError::new(
                "set_subst",
                None,
                format!("unknown value {} or {}", id, target),
            ));
        }
        let mut current = Some(target);
        while let Some(link) = current {
            if link == id {
                return Err(StructuralError::new(
                    "set_subst",
                    None,
                    format!("substituting {} with {} creates a cycle", id, target),
                ));
            }
            current = self.nodes[link.index()].subst;
        }
        self.nodes[id.index()].subst = Some(target);
        Ok(())
    }

    pub fn clear_subst(&mut self, id: ValueId) {
        self.get_mut(id).subst = None;
    }

    /// Link `next` after `id` in its block and give it `bci`. Returns `next`.
    ///
    /// Terminators end the list, and phis and locals are never in one.
    pub fn set_next(
        &mut self,
        id: ValueId,
        next: ValueId,
        bci: i32,
    ) -> Result<ValueId, StructuralError> {
        let node = self.get(id);
        if node.op.is_block_end() || node.op.is_state_only() {
            return Err(StructuralError::new(
                "set_next",
                None,
                format!("{} ({}) cannot have a successor instruction", id, node.op.name()),
            ));
        }
        if self.get(next).op.is_state_only() {
            return Err(StructuralError::new(
                "set_next",
                None,
                format!("{} ({}) cannot be linked into a block", next, self.get(next).op.name()),
            ));
        }
        self.get_mut(id).next = Some(next);
        self.get_mut(next).set_bci(bci);
        Ok(next)
    }
}

/// Everything one method compilation builds.
#[derive(Debug, Clone)]
pub struct HirGraph {
    pub(crate) values: ValueArena,
    pub(crate) blocks: Vec<Block>,
    pub(crate) scopes: Vec<IrScope>,
    start: Option<BlockId>,
    options: HirOptions,
}

impl HirGraph {
    /// An empty graph with a root scope for `method`.
    pub fn new(method: MethodInfo, options: HirOptions) -> Self {
        Self {
            values: ValueArena::new(),
            blocks: Vec::new(),
            scopes: vec![IrScope::root(ScopeId(0), method)],
            start: None,
            options,
        }
    }

    pub fn options(&self) -> &HirOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut HirOptions {
        &mut self.options
    }

    // values

    pub fn values(&self) -> &ValueArena {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut ValueArena {
        &mut self.values
    }

    #[inline]
    pub fn value(&self, id: ValueId) -> &Value {
        self.values.get(id)
    }

    #[inline]
    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        self.values.get_mut(id)
    }

    /// Resolved substitution target of `id`, or `id` itself.
    pub fn subst(&self, id: ValueId) -> ValueId {
        self.values.resolve(id)
    }

    pub fn set_subst(&mut self, id: ValueId, target: ValueId) -> Result<(), StructuralError> {
        self.values.set_subst(id, target)
    }

    // blocks

    /// Create a block header at `bci`. Block ids are dense and start at 0.
    pub fn new_block(&mut self, bci: i32) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let begin = self.values.alloc(ValueKind::Illegal, Instruction::BlockBegin(id));
        self.values.get_mut(begin).set_bci(bci);
        self.blocks.push(Block::new(id, begin, bci));
        id
    }

    pub fn new_block_with_flags(&mut self, bci: i32, flags: BlockFlags) -> BlockId {
        let id = self.new_block(bci);
        self.blocks[id.index()].set_flag(flags);
        id
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn try_block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of block ids handed out; bit maps over blocks use this size.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn start(&self) -> Option<BlockId> {
        self.start
    }

    pub fn set_start(&mut self, start: BlockId) {
        self.start = Some(start);
    }

    // scopes

    pub fn scopes(&self) -> &[IrScope] {
        &self.scopes
    }

    pub fn scope(&self, id: ScopeId) -> &IrScope {
        &self.scopes[id.index()]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut IrScope {
        &mut self.scopes[id.index()]
    }

    pub fn root_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Open an inlining scope for `method` called from `caller` at `bci`.
    pub fn add_inlined_scope(
        &mut self,
        caller: ScopeId,
        method: MethodInfo,
        bci: i32,
        caller_state: FrameState,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        let scope = IrScope::inlined(id, method, &self.scopes[caller.index()], bci, caller_state);
        self.scopes.push(scope);
        id
    }

    /// A fresh state for the root method with every slot empty.
    pub fn new_state(&self) -> FrameState {
        let method = &self.scopes[0].method;
        FrameState::new(ScopeId(0), method.max_locals, method.max_stack)
    }
}
