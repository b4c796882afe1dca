//! HIR Builder
//!
//! A cursor over a [`HirGraph`] for constructing blocks in control-flow
//! order. The builder keeps track of the block being filled, the bci of the
//! next instruction and the handlers covering it, and applies the append
//! rules (trapping instructions are pinned and record their handlers).

use tracing::{debug, warn};

use super::{
    ArithmeticOp, ArithmeticOpcode, BlockEnd, BlockFlags, BlockId, Condition, ConstantValue,
    FrameState, HirGraph, Instruction, MethodInfo, PinReason, ValueId, ValueKind,
};
use crate::error::{HirError, HirResult, StructuralError};
use crate::logging::BUILDER_TARGET;
use crate::HirOptions;

/// HIR builder for constructing one method's graph
pub struct HirBuilder {
    graph: HirGraph,

    /// Block being filled
    current_block: Option<BlockId>,

    /// Last instruction of the current block
    last: Option<ValueId>,

    /// Bci given to the next appended instruction
    bci: i32,

    /// Handlers covering instructions appended from now on
    handlers: Vec<BlockId>,
}

impl HirBuilder {
    pub fn new(method: MethodInfo, options: HirOptions) -> Self {
        Self::from_graph(HirGraph::new(method, options))
    }

    /// Continue building into an existing graph.
    pub fn from_graph(graph: HirGraph) -> Self {
        Self {
            graph,
            current_block: None,
            last: None,
            bci: 0,
            handlers: Vec::new(),
        }
    }

    pub fn graph(&self) -> &HirGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut HirGraph {
        &mut self.graph
    }

    pub fn finish(self) -> HirGraph {
        self.graph
    }

    // === Block Building ===

    pub fn create_block(&mut self, bci: i32) -> BlockId {
        self.graph.new_block(bci)
    }

    pub fn create_block_with_flags(&mut self, bci: i32, flags: BlockFlags) -> BlockId {
        self.graph.new_block_with_flags(bci, flags)
    }

    /// Continue appending at the end of `block`'s instruction list.
    pub fn switch_to_block(&mut self, block: BlockId) -> Result<(), StructuralError> {
        let b = self.graph.try_block(block).ok_or_else(|| {
            StructuralError::new("switch_to_block", None, format!("unknown block {}", block))
        })?;
        if b.end().is_some() {
            return Err(StructuralError::at(
                "switch_to_block",
                block,
                "block is already terminated",
            ));
        }
        let last = self.graph.instructions(block).last().unwrap_or(b.begin());
        self.current_block = Some(block);
        self.last = Some(last);
        self.bci = b.bci();
        Ok(())
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    pub fn set_bci(&mut self, bci: i32) {
        self.bci = bci;
    }

    pub fn bci(&self) -> i32 {
        self.bci
    }

    /// Handlers that cover instructions appended from now on.
    pub fn set_covering_handlers(&mut self, handlers: Vec<BlockId>) {
        self.handlers = handlers;
    }

    fn cursor(&self, phase: &'static str) -> Result<(BlockId, ValueId), StructuralError> {
        match (self.current_block, self.last) {
            (Some(block), Some(last)) => Ok((block, last)),
            _ => Err(StructuralError::new(phase, None, "no current block")),
        }
    }

    // === Instruction Building ===

    /// Allocate `op` and link it after the last instruction of the current
    /// block.
    pub fn append(&mut self, kind: ValueKind, op: Instruction) -> Result<ValueId, StructuralError> {
        if op.is_block_end() {
            return Err(StructuralError::new(
                "append",
                self.current_block,
                "terminators are installed with terminate",
            ));
        }
        let id = self.graph.values_mut().alloc(kind, op);
        self.append_value(id)
    }

    /// Link an already allocated value into the current block.
    pub fn append_value(&mut self, id: ValueId) -> Result<ValueId, StructuralError> {
        let (_, last) = self.cursor("append")?;
        self.graph.values_mut().set_next(last, id, self.bci)?;
        let handlers = self.handlers.clone();
        let value = self.graph.value_mut(id);
        if value.can_trap() {
            value.pin(PinReason::TRAP);
            value.set_exception_handlers(handlers);
        }
        if value.op.has_side_effect() {
            value.pin(PinReason::SIDE_EFFECT);
        }
        self.last = Some(id);
        Ok(id)
    }

    pub fn constant(&mut self, value: ConstantValue) -> Result<ValueId, StructuralError> {
        self.append(value.kind(), Instruction::Constant(super::Constant { value }))
    }

    pub fn arithmetic(
        &mut self,
        op: ArithmeticOpcode,
        kind: ValueKind,
        x: ValueId,
        y: ValueId,
    ) -> Result<ValueId, StructuralError> {
        self.append(kind, Instruction::ArithmeticOp(ArithmeticOp { op, x, y }))
    }

    // === Terminators ===

    /// Install `end` as the current block's terminator and close the block.
    pub fn terminate(&mut self, end: BlockEnd) -> Result<ValueId, StructuralError> {
        let (block, last) = self.cursor("terminate")?;
        let end = self.graph.set_end_with(block, end)?;
        self.graph.values_mut().set_next(last, end, self.bci)?;
        debug!(target: BUILDER_TARGET, "{}: terminated with {}", block, self.graph.value(end).op.name());
        self.current_block = None;
        self.last = None;
        Ok(end)
    }

    pub fn goto(&mut self, target: BlockId, state: FrameState) -> Result<ValueId, StructuralError> {
        self.terminate(BlockEnd::goto(target).with_state_after(state))
    }

    pub fn if_(
        &mut self,
        x: ValueId,
        cond: Condition,
        y: ValueId,
        true_successor: BlockId,
        false_successor: BlockId,
        state: FrameState,
    ) -> Result<ValueId, StructuralError> {
        self.terminate(
            BlockEnd::if_(x, cond, y, true_successor, false_successor).with_state_after(state),
        )
    }

    pub fn return_(&mut self, result: Option<ValueId>) -> Result<ValueId, StructuralError> {
        self.terminate(BlockEnd::return_(result))
    }

    // === Joins and Handlers ===

    /// Merge `state` into `block`, logging bailouts before passing them on.
    pub fn merge_into(&mut self, block: BlockId, state: &FrameState) -> HirResult<()> {
        self.graph.try_merge(block, state).map_err(|err| {
            if err.is_bailout() {
                warn!(target: BUILDER_TARGET, "merge into {} abandoned: {}", block, err);
            }
            err
        })
    }

    /// Make `handler` cover `block`.
    ///
    /// A block that is its own handler cannot be ordered, so that shape is a
    /// bailout rather than a structural error.
    pub fn add_exception_handler(&mut self, block: BlockId, handler: BlockId) -> HirResult<()> {
        if block == handler {
            warn!(target: BUILDER_TARGET, "{} is covered by itself", block);
            return Err(HirError::unsupported(block, "exception handler covers itself"));
        }
        self.graph.add_exception_handler(block, handler)?;
        Ok(())
    }

    /// Create the start block ending in `Base` and make it the graph's start.
    ///
    /// A standard entry with predecessors (a loop at bci 0) gets a separate
    /// header block so the entry edge is distinct from the back edges.
    pub fn finish_start(
        &mut self,
        std_entry: BlockId,
        osr_entry: Option<BlockId>,
    ) -> Result<BlockId, StructuralError> {
        let entry_state = self
            .graph
            .block(std_entry)
            .state()
            .cloned()
            .unwrap_or_else(|| self.graph.new_state());

        let entry = if self.graph.block(std_entry).number_of_preds() > 0 {
            let header = self.graph.new_block_with_flags(
                self.graph.block(std_entry).bci(),
                BlockFlags::STANDARD_ENTRY,
            );
            self.switch_to_block(header)?;
            self.goto(std_entry, entry_state.clone())?;
            debug!(target: BUILDER_TARGET, "{} has predecessors, entering through {}", std_entry, header);
            header
        } else {
            self.graph.block_mut(std_entry).set_flag(BlockFlags::STANDARD_ENTRY);
            std_entry
        };
        if let Some(osr) = osr_entry {
            self.graph.block_mut(osr).set_flag(BlockFlags::OSR_ENTRY);
        }

        let start = self.graph.new_block(0);
        self.switch_to_block(start)?;
        self.terminate(BlockEnd::base(entry, osr_entry).with_state_after(entry_state))?;
        self.graph.set_start(start);
        Ok(start)
    }
}
