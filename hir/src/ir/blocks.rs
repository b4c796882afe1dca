//! Basic blocks and control flow edges
//!
//! A [`Block`] is the header of a basic block. Its terminator is a
//! [`BlockEnd`] value; edges exist only through terminators and exception
//! handler registration, and [`HirGraph::set_end`] is the single place that
//! edits both sides of a normal edge.

use super::{
    BlockEnd, BlockFlags, BlockId, FrameState, HirGraph, Instruction, Phi, ValueId,
    ValueKind,
};
use crate::error::StructuralError;
use crate::util::BitMap;
use smallvec::SmallVec;

#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    begin: ValueId,
    bci: i32,
    flags: BlockFlags,
    pub(crate) predecessors: SmallVec<[BlockId; 2]>,
    pub(crate) end: Option<ValueId>,
    pub(crate) dominator: Option<BlockId>,
    pub(crate) linear_scan_number: Option<usize>,
    pub(crate) loop_depth: u32,
    pub(crate) loop_index: Option<u32>,
    pub(crate) exception_handlers: Vec<BlockId>,
    pub(crate) exception_states: Vec<FrameState>,
    pub(crate) state: Option<FrameState>,
}

impl Block {
    pub(crate) fn new(id: BlockId, begin: ValueId, bci: i32) -> Self {
        Self {
            id,
            begin,
            bci,
            flags: BlockFlags::empty(),
            predecessors: SmallVec::new(),
            end: None,
            dominator: None,
            linear_scan_number: None,
            loop_depth: 0,
            loop_index: None,
            exception_handlers: Vec::new(),
            exception_states: Vec::new(),
            state: None,
        }
    }

    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// The `BlockBegin` value heading this block's instruction list.
    #[inline]
    pub fn begin(&self) -> ValueId {
        self.begin
    }

    #[inline]
    pub fn bci(&self) -> i32 {
        self.bci
    }

    #[inline]
    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    #[inline]
    pub fn check_flag(&self, flag: BlockFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: BlockFlags) {
        self.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: BlockFlags) {
        self.flags.remove(flag);
    }

    pub fn is_entry_block(&self) -> bool {
        self.flags.intersects(BlockFlags::ENTRY_MASK)
    }

    pub fn is_exception_entry(&self) -> bool {
        self.check_flag(BlockFlags::EXCEPTION_ENTRY)
    }

    pub fn is_parser_loop_header(&self) -> bool {
        self.check_flag(BlockFlags::PARSER_LOOP_HEADER)
    }

    pub fn was_visited(&self) -> bool {
        self.check_flag(BlockFlags::WAS_VISITED)
    }

    pub fn set_was_visited(&mut self, visited: bool) {
        if visited {
            self.set_flag(BlockFlags::WAS_VISITED);
        } else {
            self.clear_flag(BlockFlags::WAS_VISITED);
        }
    }

    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    pub fn number_of_preds(&self) -> usize {
        self.predecessors.len()
    }

    pub fn pred_at(&self, i: usize) -> Option<BlockId> {
        self.predecessors.get(i).copied()
    }

    /// The terminator value, once installed.
    pub fn end(&self) -> Option<ValueId> {
        self.end
    }

    pub fn dominator(&self) -> Option<BlockId> {
        self.dominator
    }

    /// Position in the linear-scan order, once computed.
    pub fn linear_scan_number(&self) -> Option<usize> {
        self.linear_scan_number
    }

    pub fn loop_depth(&self) -> u32 {
        self.loop_depth
    }

    pub fn loop_index(&self) -> Option<u32> {
        self.loop_index
    }

    pub fn exception_handlers(&self) -> &[BlockId] {
        &self.exception_handlers
    }

    pub fn number_of_exception_handlers(&self) -> usize {
        self.exception_handlers.len()
    }

    /// States captured at each site that can throw into this handler.
    pub fn exception_states(&self) -> &[FrameState] {
        &self.exception_states
    }

    pub fn state(&self) -> Option<&FrameState> {
        self.state.as_ref()
    }

    pub fn set_state(&mut self, state: FrameState) {
        self.state = Some(state);
    }
}

impl HirGraph {
    fn check_block(&self, phase: &'static str, id: BlockId) -> Result<(), StructuralError> {
        if id.index() < self.blocks.len() {
            Ok(())
        } else {
            Err(StructuralError::new(phase, None, format!("unknown block {}", id)))
        }
    }

    /// The terminator of `block`, if installed.
    pub fn end_of(&self, block: BlockId) -> Option<&BlockEnd> {
        self.block(block)
            .end
            .and_then(|end| self.value(end).op.as_block_end())
    }

    /// Successors of `block`; empty until a terminator is installed.
    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.end_of(block).map_or(&[], |end| end.successors())
    }

    pub fn number_of_sux(&self, block: BlockId) -> usize {
        self.successors(block).len()
    }

    pub fn sux_at(&self, block: BlockId, i: usize) -> Option<BlockId> {
        self.successors(block).get(i).copied()
    }

    /// Allocate a terminator value and install it as `block`'s end.
    pub fn set_end_with(&mut self, block: BlockId, end: BlockEnd) -> Result<ValueId, StructuralError> {
        let value = self.values.alloc(ValueKind::Illegal, Instruction::BlockEnd(end));
        self.set_end(block, value)?;
        Ok(value)
    }

    /// Replace the terminator of `block` with `end`.
    ///
    /// The old terminator's successors each lose one predecessor entry for
    /// `block`; the new successors each gain one.
    pub fn set_end(&mut self, block: BlockId, end: ValueId) -> Result<(), StructuralError> {
        self.check_block("set_end", block)?;
        let new_successors: SmallVec<[BlockId; 2]> = match self.values.try_get(end).map(|v| &v.op) {
            Some(Instruction::BlockEnd(e)) => {
                if let Some(owner) = e.begin() {
                    if owner != block {
                        return Err(StructuralError::at(
                            "set_end",
                            block,
                            format!("{} already ends {}", end, owner),
                        ));
                    }
                }
                e.successors().iter().copied().collect()
            }
            _ => {
                return Err(StructuralError::at(
                    "set_end",
                    block,
                    format!("{} is not a block end", end),
                ))
            }
        };
        for &sux in &new_successors {
            self.check_block("set_end", sux)?;
        }

        let old = self.blocks[block.index()].end;
        if old == Some(end) {
            return Ok(());
        }
        if let Some(old) = old {
            let old_successors: SmallVec<[BlockId; 2]> = match self.values.get_mut(old).op.as_block_end_mut() {
                Some(old_end) => {
                    old_end.set_begin(None);
                    old_end.successors().iter().copied().collect()
                }
                None => SmallVec::new(),
            };
            for sux in old_successors {
                let preds = &mut self.blocks[sux.index()].predecessors;
                if let Some(pos) = preds.iter().position(|&p| p == block) {
                    preds.remove(pos);
                }
            }
        }

        self.blocks[block.index()].end = Some(end);
        if let Some(e) = self.values.get_mut(end).op.as_block_end_mut() {
            e.set_begin(Some(block));
        }
        for sux in new_successors {
            self.blocks[sux.index()].predecessors.push(block);
        }
        Ok(())
    }

    /// Register `handler` as covering `block`. Each handler is listed once,
    /// and `block` appears once among the handler's predecessors.
    pub fn add_exception_handler(
        &mut self,
        block: BlockId,
        handler: BlockId,
    ) -> Result<(), StructuralError> {
        self.check_block("add_exception_handler", block)?;
        self.check_block("add_exception_handler", handler)?;
        if !self.block(handler).is_exception_entry() {
            return Err(StructuralError::at(
                "add_exception_handler",
                handler,
                "handler is not an exception entry",
            ));
        }
        let covering = &mut self.blocks[block.index()];
        if !covering.exception_handlers.contains(&handler) {
            covering.exception_handlers.push(handler);
        }
        let entry = &mut self.blocks[handler.index()];
        if !entry.predecessors.contains(&block) {
            entry.predecessors.push(block);
        }
        Ok(())
    }

    /// Record a state that throws into `handler` and return its index, which
    /// is the operand index for the handler's phis.
    pub fn add_exception_state(
        &mut self,
        handler: BlockId,
        state: FrameState,
    ) -> Result<usize, StructuralError> {
        self.check_block("add_exception_state", handler)?;
        let entry = &mut self.blocks[handler.index()];
        if !entry.is_exception_entry() {
            return Err(StructuralError::at(
                "add_exception_state",
                handler,
                "block is not an exception entry",
            ));
        }
        entry.exception_states.push(state);
        Ok(entry.exception_states.len() - 1)
    }

    /// Redirect every edge from `block` to `old` so it targets `new`.
    pub fn substitute_successor(
        &mut self,
        block: BlockId,
        old: BlockId,
        new: BlockId,
    ) -> Result<(), StructuralError> {
        let end = self.block(block).end.ok_or_else(|| {
            StructuralError::at("substitute_successor", block, "block has no end")
        })?;
        let mut current = match self.value(end).op.as_block_end() {
            Some(e) => e.clone(),
            None => {
                return Err(StructuralError::at(
                    "substitute_successor",
                    block,
                    "end is not a block end",
                ))
            }
        };
        for sux in current.successors_mut().iter_mut() {
            if *sux == old {
                *sux = new;
            }
        }
        current.set_begin(None);
        let replacement = self.values.alloc(ValueKind::Illegal, Instruction::BlockEnd(current));
        let bci = self.value(end).bci();
        self.value_mut(replacement).set_bci(bci);
        self.relink_end(block, end, replacement);
        self.set_end(block, replacement)
    }

    /// Point whatever instruction preceded `old` at `new`.
    fn relink_end(&mut self, block: BlockId, old: ValueId, new: ValueId) {
        let mut current = Some(self.block(block).begin);
        while let Some(id) = current {
            let next = self.value(id).next;
            if next == Some(old) {
                self.value_mut(id).next = Some(new);
                return;
            }
            current = next;
        }
    }

    /// Instructions of `block` in list order, starting with its header.
    pub fn instructions(&self, block: BlockId) -> InstructionIter<'_> {
        InstructionIter {
            graph: self,
            current: Some(self.block(block).begin),
            remaining: self.values.len() + 1,
        }
    }

    // phis

    /// Number of operands of a phi owned by `block`.
    pub fn phi_operand_count(&self, phi: &Phi) -> usize {
        let block = self.block(phi.block);
        if block.is_exception_entry() {
            block.exception_states.len()
        } else {
            block.predecessors.len()
        }
    }

    /// Operand `i` of `phi`: the slot's value in the end state of the
    /// `i`-th predecessor, or in the `i`-th handler state at exception entries.
    pub fn phi_operand_at(&self, phi: &Phi, i: usize) -> Result<Option<ValueId>, StructuralError> {
        let block = self.block(phi.block);
        let state = if block.is_exception_entry() {
            block.exception_states.get(i).ok_or_else(|| {
                StructuralError::at(
                    "phi_operand",
                    phi.block,
                    format!("no exception state {} (have {})", i, block.exception_states.len()),
                )
            })?
        } else {
            let pred = block.pred_at(i).ok_or_else(|| {
                StructuralError::at(
                    "phi_operand",
                    phi.block,
                    format!("no predecessor {} (have {})", i, block.predecessors.len()),
                )
            })?;
            self.end_of(pred)
                .and_then(|end| end.state_after.as_ref())
                .ok_or_else(|| {
                    StructuralError::at(
                        "phi_operand",
                        pred,
                        "predecessor end has no state after",
                    )
                })?
        };
        Ok(phi.input_in(state))
    }

    // traversal

    /// Visit every block reachable from `from` once, parents first.
    pub fn iterate_pre_order(&self, from: BlockId, mut f: impl FnMut(BlockId)) {
        self.iterate(from, true, &mut f);
    }

    /// Visit every block reachable from `from` once, children first.
    pub fn iterate_post_order(&self, from: BlockId, mut f: impl FnMut(BlockId)) {
        self.iterate(from, false, &mut f);
    }

    /// Explicit-stack walk. Handlers are entered before successors, each list
    /// in reverse order.
    fn iterate(&self, from: BlockId, pre: bool, f: &mut dyn FnMut(BlockId)) {
        enum Step {
            Enter(BlockId),
            Leave(BlockId),
        }

        let mut marked = BitMap::new(self.blocks.len());
        let mut stack = vec![Step::Enter(from)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(block) => {
                    if marked.get(block.index()) {
                        continue;
                    }
                    marked.set(block.index());
                    if pre {
                        f(block);
                    } else {
                        stack.push(Step::Leave(block));
                    }
                    // pushed in list order so the last entry pops first
                    for &sux in self.successors(block) {
                        stack.push(Step::Enter(sux));
                    }
                    for &handler in &self.block(block).exception_handlers {
                        stack.push(Step::Enter(handler));
                    }
                }
                Step::Leave(block) => f(block),
            }
        }
    }

    /// Blocks reachable from the start block, in pre-order.
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        let mut blocks = Vec::new();
        if let Some(start) = self.start() {
            self.iterate_pre_order(start, |b| blocks.push(b));
        }
        blocks
    }

    /// Insert an empty `Goto` block on every edge from a block with several
    /// successors to a block with several predecessors.
    ///
    /// The new block takes the source's place in the target's predecessor
    /// list, so phi operand positions are unchanged. Returns the new blocks.
    pub fn split_critical_edges(&mut self) -> Result<Vec<BlockId>, StructuralError> {
        let mut created = Vec::new();
        for from in self.reachable_blocks() {
            let sux_count = self.number_of_sux(from);
            if sux_count < 2 {
                continue;
            }
            for i in 0..sux_count {
                let to = match self.sux_at(from, i) {
                    Some(to) => to,
                    None => continue,
                };
                if self.block(to).number_of_preds() < 2 {
                    continue;
                }
                let split = self.split_edge(from, i, to)?;
                created.push(split);
            }
        }
        Ok(created)
    }

    fn split_edge(&mut self, from: BlockId, index: usize, to: BlockId) -> Result<BlockId, StructuralError> {
        let bci = self.block(to).bci;
        let split = self.new_block_with_flags(bci, BlockFlags::CRITICAL_EDGE_SPLIT);

        // carry the source's end state so phis of `to` read the same values
        let state = self.end_of(from).and_then(|e| e.state_after.clone());
        if let Some(state) = &state {
            self.block_mut(split).set_state(state.clone());
        }
        let mut goto = BlockEnd::goto(to);
        goto.state_after = state;
        let begin = self.block(split).begin;
        let goto_value = self.values.alloc(ValueKind::Illegal, Instruction::BlockEnd(goto));
        self.values.set_next(begin, goto_value, bci)?;

        // retarget successor `index` of `from` without touching its other edges
        let end = self.block(from).end.ok_or_else(|| {
            StructuralError::at("split_critical_edges", from, "block has no end")
        })?;
        if let Some(e) = self.values.get_mut(end).op.as_block_end_mut() {
            e.successors_mut()[index] = split;
        }
        self.blocks[split.index()].predecessors.push(from);

        // the goto's edge replaces `from` in place in `to`'s predecessors
        self.blocks[split.index()].end = Some(goto_value);
        if let Some(e) = self.values.get_mut(goto_value).op.as_block_end_mut() {
            e.set_begin(Some(split));
        }
        let preds = &mut self.blocks[to.index()].predecessors;
        match preds.iter().position(|&p| p == from) {
            Some(pos) => preds[pos] = split,
            None => {
                return Err(StructuralError::at(
                    "split_critical_edges",
                    to,
                    format!("{} missing from predecessors", from),
                ))
            }
        }
        Ok(split)
    }

    /// Clear everything the ordering pass computed so it can run again.
    pub fn reset_linear_scan_info(&mut self) {
        for block in &mut self.blocks {
            block.dominator = None;
            block.linear_scan_number = None;
            block.loop_depth = 0;
            block.loop_index = None;
            block.flags.remove(BlockFlags::LINEAR_SCAN_MASK);
        }
    }
}

/// Iterator over a block's instruction list.
pub struct InstructionIter<'a> {
    graph: &'a HirGraph,
    current: Option<ValueId>,
    remaining: usize,
}

impl<'a> Iterator for InstructionIter<'a> {
    type Item = ValueId;

    fn next(&mut self) -> Option<ValueId> {
        let id = self.current?;
        if self.remaining == 0 {
            // a cyclic next chain; the validator reports it
            return None;
        }
        self.remaining -= 1;
        self.current = self.graph.value(id).next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Condition, ConstantValue, MethodInfo};
    use crate::HirOptions;

    fn graph() -> HirGraph {
        HirGraph::new(MethodInfo::new("test", 2, 2), HirOptions::default())
    }

    fn cond(graph: &mut HirGraph) -> ValueId {
        graph.values_mut().new_constant(ConstantValue::Int(0))
    }

    #[test]
    fn test_set_end_keeps_edges_mirrored() {
        let mut g = graph();
        let a = g.new_block(0);
        let b = g.new_block(1);
        let c = g.new_block(2);
        let x = cond(&mut g);

        g.set_end_with(a, BlockEnd::if_(x, Condition::Eq, x, b, c)).unwrap();
        assert_eq!(g.successors(a), &[b, c]);
        assert_eq!(g.block(b).predecessors(), &[a]);
        assert_eq!(g.block(c).predecessors(), &[a]);

        // replacing the end moves the edges
        g.set_end_with(a, BlockEnd::goto(c)).unwrap();
        assert!(g.block(b).predecessors().is_empty());
        assert_eq!(g.block(c).predecessors(), &[a]);
    }

    #[test]
    fn test_set_end_counts_duplicate_edges() {
        let mut g = graph();
        let a = g.new_block(0);
        let b = g.new_block(1);
        let x = cond(&mut g);

        g.set_end_with(a, BlockEnd::if_(x, Condition::Eq, x, b, b)).unwrap();
        assert_eq!(g.block(b).predecessors(), &[a, a]);
        g.set_end_with(a, BlockEnd::goto(b)).unwrap();
        assert_eq!(g.block(b).predecessors(), &[a]);
    }

    #[test]
    fn test_set_end_rejects_foreign_end() {
        let mut g = graph();
        let a = g.new_block(0);
        let b = g.new_block(1);
        let end = g.set_end_with(a, BlockEnd::return_(None)).unwrap();
        assert!(g.set_end(b, end).is_err());
        let not_an_end = cond(&mut g);
        assert!(g.set_end(b, not_an_end).is_err());
    }

    #[test]
    fn test_exception_handler_registered_once() {
        let mut g = graph();
        let a = g.new_block(0);
        let h = g.new_block_with_flags(5, BlockFlags::EXCEPTION_ENTRY);
        let plain = g.new_block(6);

        g.add_exception_handler(a, h).unwrap();
        g.add_exception_handler(a, h).unwrap();
        assert_eq!(g.block(a).exception_handlers(), &[h]);
        assert_eq!(g.block(h).predecessors(), &[a]);
        assert!(g.add_exception_handler(a, plain).is_err());

        let state = g.new_state();
        assert_eq!(g.add_exception_state(h, state.clone()).unwrap(), 0);
        assert_eq!(g.add_exception_state(h, state.clone()).unwrap(), 1);
        assert!(g.add_exception_state(plain, state).is_err());
    }

    #[test]
    fn test_traversal_visits_each_block_once() {
        // a -> b, a -> c, b -> d, c -> d, d -> a
        let mut g = graph();
        let a = g.new_block(0);
        let b = g.new_block(1);
        let c = g.new_block(2);
        let d = g.new_block(3);
        let x = cond(&mut g);
        g.set_end_with(a, BlockEnd::if_(x, Condition::Eq, x, b, c)).unwrap();
        g.set_end_with(b, BlockEnd::goto(d)).unwrap();
        g.set_end_with(c, BlockEnd::goto(d)).unwrap();
        g.set_end_with(d, BlockEnd::goto(a)).unwrap();

        let mut pre = Vec::new();
        g.iterate_pre_order(a, |blk| pre.push(blk));
        assert_eq!(pre, vec![a, c, d, b]);

        let mut post = Vec::new();
        g.iterate_post_order(a, |blk| post.push(blk));
        assert_eq!(post, vec![d, c, b, a]);
    }

    #[test]
    fn test_phi_operands_follow_predecessor_order() {
        let mut g = graph();
        let p0 = g.new_block(0);
        let p1 = g.new_block(1);
        let join = g.new_block(2);
        let v0 = g.values_mut().new_constant(ConstantValue::Int(10));
        let v1 = g.values_mut().new_constant(ConstantValue::Int(11));

        for (pred, v) in [(p0, v0), (p1, v1)] {
            let mut state = g.new_state();
            state.store_local(g.values(), 0, v);
            g.set_end_with(pred, BlockEnd::goto(join).with_state_after(state))
                .unwrap();
        }
        let phi = Phi::for_local(join, 0);
        assert_eq!(g.phi_operand_count(&phi), 2);
        assert_eq!(g.phi_operand_at(&phi, 0).unwrap(), Some(v0));
        assert_eq!(g.phi_operand_at(&phi, 1).unwrap(), Some(v1));
        assert!(g.phi_operand_at(&phi, 2).is_err());
    }

    #[test]
    fn test_split_critical_edges_preserves_pred_positions() {
        //   a: if -> (m, b)
        //   b: goto m
        //   m: return
        let mut g = graph();
        let a = g.new_block(0);
        let b = g.new_block(1);
        let m = g.new_block(2);
        let x = cond(&mut g);
        let state = g.new_state();
        g.set_end_with(
            a,
            BlockEnd::if_(x, Condition::Eq, x, m, b).with_state_after(state.clone()),
        )
        .unwrap();
        g.set_end_with(b, BlockEnd::goto(m).with_state_after(state)).unwrap();
        g.set_end_with(m, BlockEnd::return_(None)).unwrap();
        g.set_start(a);
        assert_eq!(g.block(m).predecessors(), &[a, b]);

        let created = g.split_critical_edges().unwrap();
        assert_eq!(created.len(), 1);
        let split = created[0];
        assert!(g.block(split).check_flag(BlockFlags::CRITICAL_EDGE_SPLIT));
        assert_eq!(g.successors(a), &[split, b]);
        assert_eq!(g.block(m).predecessors(), &[split, b]);
        assert_eq!(g.block(split).predecessors(), &[a]);
        assert_eq!(g.successors(split), &[m]);
        assert!(g.end_of(split).unwrap().state_after.is_some());
    }

    #[test]
    fn test_substitute_successor() {
        let mut g = graph();
        let a = g.new_block(0);
        let b = g.new_block(1);
        let c = g.new_block(2);
        g.set_end_with(a, BlockEnd::goto(b)).unwrap();
        g.substitute_successor(a, b, c).unwrap();
        assert_eq!(g.successors(a), &[c]);
        assert!(g.block(b).predecessors().is_empty());
        assert_eq!(g.block(c).predecessors(), &[a]);
    }
}
