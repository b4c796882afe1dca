//! Linear-scan block ordering
//!
//! Computes the block order handed to the register allocator, together with
//! loop membership, loop depth and the dominator of every block:
//!
//! 1. Count forward edges, find back edges and number loop headers (innermost
//!    loops get the lowest indices)
//! 2. Flood each loop from its loop end back to the header
//! 3. Drop loops that contain the start block (several entries)
//! 4. Assign loop depth and loop index
//! 5. Schedule blocks greedily by [`BlockWeight`] once all their forward
//!    edges are processed, computing dominators on the way
//! 6. Iterate dominators to a fixpoint when OSR or irregular loops are present
//!
//! All traversals run on explicit stacks, so deep graphs cannot overflow the
//! native stack. The pass expects a fresh graph; run
//! [`HirGraph::reset_linear_scan_info`] before ordering a graph again.

use super::{dump, BlockFlags, BlockId, HirGraph};
use crate::error::StructuralError;
use crate::logging::{linear_scan_level, LINEAR_SCAN_TARGET};
use crate::util::{BitMap, BitMap2D};
use smallvec::SmallVec;
use std::fmt;

/// Emit a trace event if the graph's trace level is at least `$level`.
macro_rules! trace_ls {
    ($this:expr, $level:expr, $($arg:tt)+) => {
        if $this.trace_level >= $level {
            if let Some(lvl) = linear_scan_level($level) {
                log::log!(target: LINEAR_SCAN_TARGET, lvl, $($arg)+);
            }
        }
    };
}

/// Scheduling priority of a ready block. Fields compare in declaration
/// order, so loop depth dominates and each flag breaks the remaining ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct BlockWeight {
    pub loop_depth: u32,
    pub not_loop_header: bool,
    /// Loop ends go after the rest of their loop
    pub not_loop_end: bool,
    /// Split blocks are usually empty
    pub critical_edge_split: bool,
    /// Neither this block nor its single successor ends in a throw
    pub no_throw: bool,
    /// Neither this block nor its single successor ends in a return
    pub no_return: bool,
    pub not_exception_entry: bool,
}

impl BlockWeight {
    pub fn of(graph: &HirGraph, block: BlockId) -> Self {
        let b = graph.block(block);
        let single_sux = match graph.successors(block) {
            [sux] => Some(*sux),
            _ => None,
        };
        let ends_with = |pred: fn(&super::BlockEnd) -> bool| {
            let own = graph.end_of(block).map_or(false, pred);
            let next = single_sux
                .and_then(|s| graph.end_of(s))
                .map_or(false, pred);
            own || next
        };
        Self {
            loop_depth: b.loop_depth(),
            not_loop_header: !b.check_flag(BlockFlags::LINEAR_SCAN_LOOP_HEADER),
            not_loop_end: !b.check_flag(BlockFlags::LINEAR_SCAN_LOOP_END),
            critical_edge_split: b.check_flag(BlockFlags::CRITICAL_EDGE_SPLIT),
            no_throw: !ends_with(|end| end.is_throw()),
            no_return: !ends_with(|end| end.is_return()),
            not_exception_entry: !b.is_exception_entry(),
        }
    }

    /// The weight as one integer, loop depth in the high half.
    pub fn packed(&self) -> u32 {
        let flags = [
            self.not_loop_header,
            self.not_loop_end,
            self.critical_edge_split,
            self.no_throw,
            self.no_return,
            self.not_exception_entry,
        ];
        let mut weight = (self.loop_depth & 0x7FFF) << 16;
        for (i, &set) in flags.iter().enumerate() {
            if set {
                weight |= 1 << (15 - i);
            }
        }
        weight | 1
    }
}

impl fmt::Display for BlockWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#08x}", self.packed())
    }
}

/// Result of the ordering pass.
///
/// Per-block results (order number, loop index and depth, dominator) are
/// stored on the graph's blocks; this keeps the order and the loop matrix.
#[derive(Debug, Clone)]
pub struct LinearScanOrder {
    blocks: Vec<BlockId>,
    num_blocks: usize,
    num_loops: usize,
    loop_map: BitMap2D,
    iterative_dominators: bool,
    dominator_iterations: usize,
    stress: bool,
}

impl LinearScanOrder {
    /// Blocks in linear-scan order; the first is the start block.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn position(&self, block: BlockId) -> Option<usize> {
        self.blocks.iter().position(|&b| b == block)
    }

    /// Loops found, including discarded ones.
    pub fn num_loops(&self) -> usize {
        self.num_loops
    }

    pub fn is_block_in_loop(&self, loop_index: usize, block: BlockId) -> bool {
        self.loop_map.at(loop_index, block.index())
    }

    /// Members of loop `loop_index` in order.
    pub fn loop_blocks(&self, loop_index: usize) -> Vec<BlockId> {
        self.blocks
            .iter()
            .copied()
            .filter(|&b| self.is_block_in_loop(loop_index, b))
            .collect()
    }

    /// Whether the dominator fixpoint had to run.
    pub fn iterative_dominators(&self) -> bool {
        self.iterative_dominators
    }

    /// Fixpoint rounds executed, including the final unchanged one.
    pub fn dominator_iterations(&self) -> usize {
        self.dominator_iterations
    }

    /// Rerun the dominator fixpoint over this order. Returns the number of
    /// rounds that changed a dominator, so zero on a stable graph.
    pub fn recompute_dominators(&self, graph: &mut HirGraph) -> Result<usize, StructuralError> {
        let mut scratch = BitMap::new(graph.num_blocks());
        let mut changed = 0;
        while dominators_round(graph, &self.blocks, &mut scratch, 0)? {
            changed += 1;
            if changed > self.blocks.len() + 1 {
                return Err(StructuralError::new(
                    "compute_dominators",
                    None,
                    "fix point not reached",
                ));
            }
        }
        Ok(changed)
    }

    /// Check the order against the graph: numbering, edge direction, loop
    /// index consistency, loop contiguity and dominators.
    pub fn verify(&self, graph: &HirGraph) -> Result<(), StructuralError> {
        let fail = |block: BlockId, message: &str| {
            Err(StructuralError::at("verify", block, message.to_string()))
        };
        if self.blocks.len() != self.num_blocks {
            return Err(StructuralError::new(
                "verify",
                None,
                format!(
                    "wrong number of blocks in order ({} vs {})",
                    self.blocks.len(),
                    self.num_blocks
                ),
            ));
        }
        // stress mode scrambles the order on purpose
        if self.stress {
            return Ok(());
        }

        let number = |block: BlockId| -> Result<usize, StructuralError> {
            match graph.block(block).linear_scan_number() {
                Some(n) if self.blocks.get(n) == Some(&block) => Ok(n),
                _ => Err(StructuralError::at(
                    "verify",
                    block,
                    "incorrect linear scan number",
                )),
            }
        };

        for (i, &cur) in self.blocks.iter().enumerate() {
            let b = graph.block(cur);
            if number(cur)? != i {
                return fail(cur, "incorrect linear scan number");
            }

            for &sux in graph.successors(cur) {
                let s = graph.block(sux);
                let sux_number = number(sux)?;
                if !b.check_flag(BlockFlags::LINEAR_SCAN_LOOP_END) && i >= sux_number {
                    return fail(cur, "invalid order");
                }
                if b.loop_depth() == s.loop_depth()
                    && b.loop_index() != s.loop_index()
                    && !s.check_flag(BlockFlags::LINEAR_SCAN_LOOP_HEADER)
                {
                    return fail(cur, "successive blocks with same loop depth must have same loop index");
                }
            }

            for &pred in b.predecessors() {
                let p = graph.block(pred);
                let pred_number = number(pred)?;
                if !b.check_flag(BlockFlags::LINEAR_SCAN_LOOP_HEADER) && i <= pred_number {
                    return fail(cur, "invalid order");
                }
                if b.loop_depth() == p.loop_depth()
                    && b.loop_index() != p.loop_index()
                    && !b.check_flag(BlockFlags::LINEAR_SCAN_LOOP_HEADER)
                {
                    return fail(cur, "successive blocks with same loop depth must have same loop index");
                }
                let dom = match b.dominator() {
                    Some(dom) => dom,
                    None => return fail(cur, "all but first block must have dominator"),
                };
                if number(dom)? > pred_number {
                    return fail(cur, "dominator must be before predecessors");
                }
            }

            if i == 0 && b.dominator().is_some() {
                return fail(cur, "first block has no dominator");
            }
            if i > 0 && b.dominator().is_none() {
                return fail(cur, "all but first block must have dominator");
            }
            if b.number_of_preds() == 1 && b.dominator() != b.pred_at(0) {
                return fail(cur, "single predecessor must also be dominator");
            }
        }

        for loop_index in 0..self.num_loops {
            if let Some(&first) = self.blocks.first() {
                if self.is_block_in_loop(loop_index, first) {
                    return fail(first, "the first block must not be present in any loop");
                }
            }
            let mut members = self
                .blocks
                .iter()
                .skip_while(|&&b| !self.is_block_in_loop(loop_index, b))
                .skip_while(|&&b| self.is_block_in_loop(loop_index, b));
            if let Some(&stray) = members.find(|&&b| self.is_block_in_loop(loop_index, b)) {
                let message = format!("loop {} not continuous in linear-scan order", loop_index);
                return fail(stray, message.as_str());
            }
        }

        let mut scratch = BitMap::new(graph.num_blocks());
        if !dominators_stable(graph, &self.blocks, &mut scratch)? {
            return Err(StructuralError::new(
                "verify",
                None,
                "fix point not reached",
            ));
        }
        Ok(())
    }
}

/// Transient state of one ordering run.
pub struct ComputeLinearScanOrder {
    num_blocks: usize,
    num_loops: usize,
    iterative_dominators: bool,
    dominator_iterations: usize,
    linear_scan_order: Vec<BlockId>,

    visited: BitMap,
    active: BitMap,
    dominator_blocks: BitMap,
    forward_branches: Vec<i32>,
    loop_end_blocks: Vec<BlockId>,
    loop_map: BitMap2D,
    work_list: Vec<BlockId>,
    weights: Vec<BlockWeight>,

    trace_level: u8,
    stress: bool,
    verify: bool,
}

/// One frame of the explicit edge-counting stack.
enum Visit {
    Enter { block: BlockId, parent: Option<BlockId> },
    Exit(BlockId),
}

impl ComputeLinearScanOrder {
    fn new(graph: &HirGraph) -> Self {
        let max_block_id = graph.num_blocks();
        let options = graph.options();
        Self {
            num_blocks: 0,
            num_loops: 0,
            iterative_dominators: false,
            dominator_iterations: 0,
            linear_scan_order: Vec::new(),
            visited: BitMap::new(max_block_id),
            active: BitMap::new(max_block_id),
            dominator_blocks: BitMap::new(max_block_id),
            forward_branches: vec![0; max_block_id],
            loop_end_blocks: Vec::with_capacity(8),
            loop_map: BitMap2D::new(0, max_block_id),
            work_list: Vec::with_capacity(8),
            weights: vec![BlockWeight::default(); max_block_id],
            trace_level: options.trace_linear_scan_level,
            stress: options.stress_linear_scan,
            verify: options.verify_linear_scan_order,
        }
    }

    /// Order the blocks reachable from the graph's start block.
    pub fn compute(graph: &mut HirGraph) -> Result<LinearScanOrder, StructuralError> {
        let start = graph
            .start()
            .ok_or_else(|| StructuralError::new("linear_scan_order", None, "graph has no start block"))?;
        let mut pass = Self::new(graph);
        trace_ls!(pass, 2, " computing linear-scan block order");

        pass.count_edges(graph, start)?;
        if pass.num_loops > 0 {
            pass.mark_loops(graph)?;
            pass.clear_non_natural_loops(start);
            pass.assign_loop_depth(graph, start);
        }
        pass.compute_order(graph, start)?;
        pass.compute_dominators(graph)?;

        let order = LinearScanOrder {
            blocks: pass.linear_scan_order,
            num_blocks: pass.num_blocks,
            num_loops: pass.num_loops,
            loop_map: pass.loop_map,
            iterative_dominators: pass.iterative_dominators,
            dominator_iterations: pass.dominator_iterations,
            stress: pass.stress,
        };
        if pass.trace_level >= 2 {
            log_lines(2, &dump::loop_table(graph, &order));
        }
        if pass.trace_level >= 1 {
            log_lines(1, &dump::linear_scan_table(graph, &order));
        }
        if pass.verify {
            order.verify(graph)?;
        }
        Ok(order)
    }

    fn is_block_in_loop(&self, loop_index: usize, block: BlockId) -> bool {
        self.loop_map.at(loop_index, block.index())
    }

    // phase 1

    /// Depth-first walk counting incoming forward edges, marking back edges
    /// and numbering loop headers in post order.
    fn count_edges(&mut self, graph: &mut HirGraph, start: BlockId) -> Result<(), StructuralError> {
        let mut stack = vec![Visit::Enter {
            block: start,
            parent: None,
        }];

        while let Some(visit) = stack.pop() {
            let (cur, parent) = match visit {
                Visit::Enter { block, parent } => (block, parent),
                Visit::Exit(cur) => {
                    self.active.clear(cur.index());
                    if graph.block(cur).check_flag(BlockFlags::LINEAR_SCAN_LOOP_HEADER) {
                        if graph.block(cur).loop_index().is_some() {
                            return Err(StructuralError::at(
                                "count_edges",
                                cur,
                                "cannot set loop index twice",
                            ));
                        }
                        trace_ls!(self, 3, "Block {} is loop header of loop {}", cur, self.num_loops);
                        graph.block_mut(cur).loop_index = Some(self.num_loops as u32);
                        self.num_loops += 1;
                    }
                    trace_ls!(self, 3, "Finished count_edges for block {}", cur);
                    continue;
                }
            };

            trace_ls!(
                self,
                3,
                "Enter count_edges for block {} coming from {}",
                cur,
                parent.map_or_else(|| "-".to_string(), |p| p.to_string())
            );
            if graph.block(cur).dominator().is_some() {
                return Err(StructuralError::at(
                    "count_edges",
                    cur,
                    "dominator already initialized",
                ));
            }

            if self.active.get(cur.index()) {
                trace_ls!(self, 3, "backward branch");
                let parent = parent.ok_or_else(|| {
                    StructuralError::at("count_edges", cur, "back edge without a parent")
                })?;
                graph.block_mut(cur).set_flag(
                    BlockFlags::LINEAR_SCAN_LOOP_HEADER | BlockFlags::BACKWARD_BRANCH_TARGET,
                );
                graph.block_mut(parent).set_flag(BlockFlags::LINEAR_SCAN_LOOP_END);

                // The back edge is an exception edge, which cannot be split.
                // The loop is left out and dominators are iterated instead.
                if graph.block(cur).is_exception_entry() {
                    self.iterative_dominators = true;
                    continue;
                }
                if graph.successors(parent) != [cur] {
                    return Err(StructuralError::at(
                        "count_edges",
                        parent,
                        "loop end blocks must have one successor (critical edges are split)",
                    ));
                }
                self.loop_end_blocks.push(parent);
                continue;
            }

            self.forward_branches[cur.index()] += 1;

            if self.visited.get(cur.index()) {
                trace_ls!(self, 3, "block already visited");
                continue;
            }

            self.num_blocks += 1;
            self.visited.set(cur.index());
            self.active.set(cur.index());

            // Children are pushed so they pop last successor first, then last
            // handler first, matching a recursive walk.
            stack.push(Visit::Exit(cur));
            for &handler in graph.block(cur).exception_handlers() {
                stack.push(Visit::Enter {
                    block: handler,
                    parent: Some(cur),
                });
            }
            for &sux in graph.successors(cur) {
                stack.push(Visit::Enter {
                    block: sux,
                    parent: Some(cur),
                });
            }
        }
        Ok(())
    }

    // phase 2

    fn mark_loops(&mut self, graph: &HirGraph) -> Result<(), StructuralError> {
        trace_ls!(self, 3, "----- marking loops");
        self.loop_map = BitMap2D::new(self.num_loops, graph.num_blocks());

        for &loop_end in self.loop_end_blocks.iter().rev() {
            let loop_start = match graph.successors(loop_end) {
                [start] => *start,
                _ => {
                    return Err(StructuralError::at(
                        "mark_loops",
                        loop_end,
                        "incorrect number of successors",
                    ))
                }
            };
            let loop_index = match graph.block(loop_start).loop_index() {
                Some(i) if (i as usize) < self.num_loops => i as usize,
                _ => {
                    return Err(StructuralError::at("mark_loops", loop_start, "loop index not set"))
                }
            };
            trace_ls!(
                self,
                3,
                "Processing loop from {} to {} (loop {}):",
                loop_start,
                loop_end,
                loop_index
            );

            self.work_list.push(loop_end);
            self.loop_map.set_bit(loop_index, loop_end.index());
            while let Some(cur) = self.work_list.pop() {
                trace_ls!(self, 3, "    processing {}", cur);
                // the flood stops at the header and at an osr entry
                if cur == loop_start || graph.block(cur).check_flag(BlockFlags::OSR_ENTRY) {
                    continue;
                }
                for &pred in graph.block(cur).predecessors().iter().rev() {
                    if !self.loop_map.at(loop_index, pred.index()) {
                        trace_ls!(self, 3, "    pushing {}", pred);
                        self.work_list.push(pred);
                        self.loop_map.set_bit(loop_index, pred.index());
                    }
                }
            }
        }
        Ok(())
    }

    // phase 3

    /// A loop containing the start block has more than one entry.
    fn clear_non_natural_loops(&mut self, start: BlockId) {
        for i in (0..self.num_loops).rev() {
            if self.is_block_in_loop(i, start) {
                trace_ls!(self, 2, "Loop {} is non-natural, so it is ignored", i);
                self.loop_map.clear_row(i);
                self.iterative_dominators = true;
            }
        }
    }

    // phase 4

    fn assign_loop_depth(&mut self, graph: &mut HirGraph, start: BlockId) {
        trace_ls!(self, 3, "----- computing loop-depth and weight");
        self.visited.clear_all();
        self.active.clear_all();

        self.work_list.push(start);
        while let Some(cur) = self.work_list.pop() {
            if self.visited.get(cur.index()) {
                continue;
            }
            self.visited.set(cur.index());
            trace_ls!(self, 4, "Computing loop depth for block {}", cur);

            let mut loop_depth = 0;
            let mut min_loop_index = None;
            for i in (0..self.num_loops).rev() {
                if self.is_block_in_loop(i, cur) {
                    loop_depth += 1;
                    min_loop_index = Some(i as u32);
                }
            }
            let block = graph.block_mut(cur);
            block.loop_depth = loop_depth;
            block.loop_index = min_loop_index;

            self.work_list.extend(graph.successors(cur).iter().rev().copied());
            self.work_list
                .extend(graph.block(cur).exception_handlers().iter().rev().copied());
        }
    }

    // phase 5

    fn common_dominator(&mut self, graph: &HirGraph, a: BlockId, b: BlockId) -> Result<BlockId, StructuralError> {
        common_dominator(graph, a, b, &mut self.dominator_blocks)
    }

    fn compute_dominator(&mut self, graph: &mut HirGraph, cur: BlockId, parent: BlockId) -> Result<(), StructuralError> {
        match graph.block(cur).dominator() {
            None => {
                trace_ls!(self, 4, "DOM: initializing dominator of {} to {}", cur, parent);
                graph.block_mut(cur).dominator = Some(parent);
            }
            Some(current) => {
                let back_edge = graph.block(cur).check_flag(BlockFlags::LINEAR_SCAN_LOOP_HEADER)
                    && graph.block(parent).check_flag(BlockFlags::LINEAR_SCAN_LOOP_END);
                if back_edge {
                    return Ok(());
                }
                if graph.block(cur).number_of_preds() <= 1 {
                    return Err(StructuralError::at(
                        "compute_order",
                        cur,
                        "second dominator update for a block with one predecessor",
                    ));
                }
                let dominator = self.common_dominator(graph, current, parent)?;
                trace_ls!(
                    self,
                    4,
                    "DOM: computing dominator of {}: common dominator of {} and {} is {}",
                    cur,
                    parent,
                    current,
                    dominator
                );
                graph.block_mut(cur).dominator = Some(dominator);
            }
        }
        Ok(())
    }

    /// Discount the edge just traveled. A block is ready once every forward
    /// edge into it has been processed.
    fn ready_for_processing(&mut self, graph: &HirGraph, cur: BlockId) -> Result<bool, StructuralError> {
        let count = &mut self.forward_branches[cur.index()];
        *count -= 1;
        if *count != 0 {
            return Ok(false);
        }
        if graph.block(cur).linear_scan_number().is_some() || self.work_list.contains(&cur) {
            return Err(StructuralError::at(
                "compute_order",
                cur,
                "block can be ready only once",
            ));
        }
        Ok(true)
    }

    fn sort_into_work_list(&mut self, graph: &HirGraph, cur: BlockId) {
        let weight = BlockWeight::of(graph, cur);
        self.weights[cur.index()] = weight;

        if self.stress {
            self.work_list.insert(0, cur);
            return;
        }

        // ascending by weight; equal weights keep insertion order
        let mut index = self.work_list.len();
        while index > 0 && self.weights[self.work_list[index - 1].index()] > weight {
            index -= 1;
        }
        self.work_list.insert(index, cur);

        trace_ls!(self, 3, "Sorted {} into worklist. new worklist:", cur);
        if self.trace_level >= 3 {
            for (i, b) in self.work_list.iter().enumerate() {
                trace_ls!(self, 3, "{:8} {:>4}  weight: {}", i, b, self.weights[b.index()]);
            }
        }
    }

    fn append_block(&mut self, graph: &mut HirGraph, cur: BlockId) {
        trace_ls!(
            self,
            3,
            "appending block {} (weight {}) to linear-scan order",
            cur,
            self.weights[cur.index()]
        );
        graph.block_mut(cur).linear_scan_number = Some(self.linear_scan_order.len());
        self.linear_scan_order.push(cur);
    }

    fn compute_order(&mut self, graph: &mut HirGraph, start: BlockId) -> Result<(), StructuralError> {
        trace_ls!(self, 3, "----- computing final block order");
        self.linear_scan_order = Vec::with_capacity(self.num_blocks);
        self.append_block(graph, start);

        let (std_entry, osr_entry) = match graph.end_of(start) {
            Some(end) if end.is_base() => (end.standard_entry(), end.osr_entry()),
            _ => {
                return Err(StructuralError::at(
                    "compute_order",
                    start,
                    "start block must end with Base",
                ))
            }
        };
        let std_entry = std_entry.ok_or_else(|| {
            StructuralError::at("compute_order", start, "Base has no standard entry")
        })?;

        // The edge from the osr entry to its successor is left out of the
        // readiness count; the osr entry is placed right before that successor.
        let mut sux_of_osr_entry = None;
        if let Some(osr) = osr_entry {
            let sux = match graph.successors(osr) {
                [sux] => *sux,
                _ => {
                    return Err(StructuralError::at(
                        "compute_order",
                        osr,
                        "osr entry must have exactly one successor",
                    ))
                }
            };
            if graph.block(sux).number_of_preds() < 2 {
                return Err(StructuralError::at(
                    "compute_order",
                    sux,
                    "successor of osr entry must have two predecessors",
                ));
            }
            self.forward_branches[sux.index()] -= 1;
            sux_of_osr_entry = Some(sux);
            self.compute_dominator(graph, osr, start)?;
            self.iterative_dominators = true;
        }
        self.compute_dominator(graph, std_entry, start)?;

        if !self.ready_for_processing(graph, std_entry)? {
            return Err(StructuralError::at(
                "compute_order",
                std_entry,
                "the standard entry must be ready for processing",
            ));
        }
        self.sort_into_work_list(graph, std_entry);

        while let Some(cur) = self.work_list.pop() {
            if Some(cur) == sux_of_osr_entry {
                if let Some(osr) = osr_entry {
                    self.append_block(graph, osr);
                    self.compute_dominator(graph, cur, osr)?;
                }
            }
            self.append_block(graph, cur);

            let successors: SmallVec<[BlockId; 4]> = graph.successors(cur).iter().copied().collect();
            for sux in successors {
                self.compute_dominator(graph, sux, cur)?;
                if self.ready_for_processing(graph, sux)? {
                    self.sort_into_work_list(graph, sux);
                }
            }
            let handlers: SmallVec<[BlockId; 4]> =
                graph.block(cur).exception_handlers().iter().copied().collect();
            for handler in handlers {
                self.compute_dominator(graph, handler, cur)?;
                if self.ready_for_processing(graph, handler)? {
                    self.sort_into_work_list(graph, handler);
                }
            }
        }
        Ok(())
    }

    // phase 6

    fn compute_dominators(&mut self, graph: &mut HirGraph) -> Result<(), StructuralError> {
        trace_ls!(
            self,
            3,
            "----- computing dominators (iterative computation required: {})",
            self.iterative_dominators
        );
        // the dominators from compute_order are exact unless OSR or a
        // discarded loop is involved
        if self.iterative_dominators {
            loop {
                trace_ls!(self, 1, "DOM: next iteration of fix-point calculation");
                self.dominator_iterations += 1;
                let changed = dominators_round(
                    graph,
                    &self.linear_scan_order,
                    &mut self.dominator_blocks,
                    self.trace_level,
                )?;
                if !changed {
                    break;
                }
                if self.dominator_iterations > self.linear_scan_order.len() + 1 {
                    return Err(StructuralError::new(
                        "compute_dominators",
                        None,
                        "fix point not reached",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn log_lines(level: u8, text: &str) {
    if let Some(lvl) = linear_scan_level(level) {
        for line in text.lines() {
            log::log!(target: LINEAR_SCAN_TARGET, lvl, "{}", line);
        }
    }
}

/// First block on `b`'s dominator chain that is also on `a`'s.
fn common_dominator(
    graph: &HirGraph,
    a: BlockId,
    b: BlockId,
    scratch: &mut BitMap,
) -> Result<BlockId, StructuralError> {
    let limit = graph.num_blocks() + 1;
    scratch.clear_all();

    let mut current = Some(a);
    let mut steps = 0;
    while let Some(block) = current {
        scratch.set(block.index());
        current = graph.block(block).dominator();
        steps += 1;
        if steps > limit {
            return Err(StructuralError::at("common_dominator", a, "dominator chain is cyclic"));
        }
    }

    let mut current = Some(b);
    steps = 0;
    while let Some(block) = current {
        if scratch.get(block.index()) {
            return Ok(block);
        }
        current = graph.block(block).dominator();
        steps += 1;
        if steps > limit {
            break;
        }
    }
    Err(StructuralError::new(
        "common_dominator",
        None,
        format!("could not find dominator of {} and {}", a, b),
    ))
}

/// Dominator of `block` as the common dominator of all its predecessors.
fn dominator_from_preds(
    graph: &HirGraph,
    block: BlockId,
    scratch: &mut BitMap,
) -> Result<BlockId, StructuralError> {
    let preds = graph.block(block).predecessors();
    let mut dominator = *preds.first().ok_or_else(|| {
        StructuralError::at("compute_dominators", block, "block has no predecessors")
    })?;
    for &pred in &preds[1..] {
        dominator = common_dominator(graph, dominator, pred, scratch)?;
    }
    Ok(dominator)
}

fn check_start(graph: &HirGraph, order: &[BlockId]) -> Result<(), StructuralError> {
    if let Some(&start) = order.first() {
        let b = graph.block(start);
        if b.dominator().is_some() {
            return Err(StructuralError::at("compute_dominators", start, "start block must not have a dominator"));
        }
        if b.number_of_preds() != 0 {
            return Err(StructuralError::at("compute_dominators", start, "start block must not have predecessors"));
        }
    }
    Ok(())
}

/// One round of the fixpoint. Returns whether any dominator changed.
fn dominators_round(
    graph: &mut HirGraph,
    order: &[BlockId],
    scratch: &mut BitMap,
    trace_level: u8,
) -> Result<bool, StructuralError> {
    check_start(graph, order)?;
    let mut changed = false;
    for &block in order.iter().skip(1) {
        let dominator = dominator_from_preds(graph, block, scratch)?;
        if Some(dominator) != graph.block(block).dominator() {
            if trace_level >= 4 {
                log_lines(
                    4,
                    &format!(
                        "DOM: updating dominator of {} from {:?} to {}",
                        block,
                        graph.block(block).dominator(),
                        dominator
                    ),
                );
            }
            graph.block_mut(block).dominator = Some(dominator);
            changed = true;
        }
    }
    Ok(changed)
}

/// Read-only check that one more round would change nothing.
fn dominators_stable(graph: &HirGraph, order: &[BlockId], scratch: &mut BitMap) -> Result<bool, StructuralError> {
    check_start(graph, order)?;
    for &block in order.iter().skip(1) {
        if Some(dominator_from_preds(graph, block, scratch)?) != graph.block(block).dominator() {
            return Ok(false);
        }
    }
    Ok(true)
}

impl HirGraph {
    /// Run the ordering pass over this graph.
    pub fn compute_linear_scan_order(&mut self) -> Result<LinearScanOrder, StructuralError> {
        ComputeLinearScanOrder::compute(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockEnd, Condition, ConstantValue, MethodInfo};
    use crate::HirOptions;

    struct Cfg {
        graph: HirGraph,
        cond: super::super::ValueId,
    }

    impl Cfg {
        fn new() -> Self {
            let mut graph = HirGraph::new(MethodInfo::new("t", 0, 0), HirOptions::development());
            let cond = graph.values_mut().new_constant(ConstantValue::Int(0));
            Self { graph, cond }
        }

        fn block(&mut self) -> BlockId {
            let bci = self.graph.num_blocks() as i32;
            self.graph.new_block(bci)
        }

        fn goto(&mut self, from: BlockId, to: BlockId) {
            self.graph.set_end_with(from, BlockEnd::goto(to)).unwrap();
        }

        fn branch(&mut self, from: BlockId, t: BlockId, f: BlockId) {
            let c = self.cond;
            self.graph
                .set_end_with(from, BlockEnd::if_(c, Condition::Eq, c, t, f))
                .unwrap();
        }

        fn ret(&mut self, from: BlockId) {
            self.graph.set_end_with(from, BlockEnd::return_(None)).unwrap();
        }

        fn start(&mut self, std: BlockId, osr: Option<BlockId>) -> BlockId {
            let start = self.block();
            self.graph
                .set_end_with(start, BlockEnd::base(std, osr))
                .unwrap();
            self.graph.set_start(start);
            start
        }
    }

    #[test]
    fn test_block_weight_precedence() {
        let deeper = BlockWeight {
            loop_depth: 2,
            ..BlockWeight::default()
        };
        let flags = BlockWeight {
            loop_depth: 1,
            not_loop_header: true,
            not_loop_end: true,
            critical_edge_split: true,
            no_throw: true,
            no_return: true,
            not_exception_entry: true,
        };
        assert!(deeper > flags);
        assert!(deeper.packed() > flags.packed());

        let header = BlockWeight {
            not_loop_header: false,
            ..flags
        };
        let throwing = BlockWeight { no_throw: false, ..flags };
        assert!(throwing > header);
        assert!(throwing.packed() > header.packed());
        assert_eq!(BlockWeight::default().packed(), 1);
    }

    #[test]
    fn test_straight_line() {
        let mut cfg = Cfg::new();
        let a = cfg.block();
        let b = cfg.block();
        cfg.goto(a, b);
        cfg.ret(b);
        let start = cfg.start(a, None);

        let order = cfg.graph.compute_linear_scan_order().unwrap();
        assert_eq!(order.blocks(), &[start, a, b]);
        assert_eq!(order.num_loops(), 0);
        assert!(!order.iterative_dominators());
        assert_eq!(cfg.graph.block(b).dominator(), Some(a));
        assert_eq!(cfg.graph.block(a).dominator(), Some(start));
        assert_eq!(cfg.graph.block(start).dominator(), None);
    }

    #[test]
    fn test_natural_loop() {
        // B0 -> H; H -> (A, X); A -> B; B -> H
        let mut cfg = Cfg::new();
        let b0 = cfg.block();
        let h = cfg.block();
        let a = cfg.block();
        let b = cfg.block();
        let x = cfg.block();
        cfg.goto(b0, h);
        cfg.branch(h, a, x);
        cfg.goto(a, b);
        cfg.goto(b, h);
        cfg.ret(x);
        let start = cfg.start(b0, None);

        let order = cfg.graph.compute_linear_scan_order().unwrap();
        assert_eq!(order.blocks(), &[start, b0, h, a, b, x]);
        assert_eq!(order.num_loops(), 1);
        for blk in [h, a, b] {
            assert_eq!(cfg.graph.block(blk).loop_index(), Some(0));
            assert_eq!(cfg.graph.block(blk).loop_depth(), 1);
        }
        assert_eq!(cfg.graph.block(x).loop_depth(), 0);
        assert_eq!(cfg.graph.block(x).loop_index(), None);
        assert!(cfg.graph.block(h).check_flag(BlockFlags::LINEAR_SCAN_LOOP_HEADER));
        assert!(cfg.graph.block(h).check_flag(BlockFlags::BACKWARD_BRANCH_TARGET));
        assert!(cfg.graph.block(b).check_flag(BlockFlags::LINEAR_SCAN_LOOP_END));
        assert_eq!(cfg.graph.block(h).dominator(), Some(b0));
        assert_eq!(cfg.graph.block(x).dominator(), Some(h));
        assert_eq!(order.loop_blocks(0), vec![h, a, b]);
    }

    #[test]
    fn test_nested_loops_number_inner_first() {
        // B0 -> O; O -> (I, X); I -> (IB, OE); IB -> I; OE -> O
        let mut cfg = Cfg::new();
        let b0 = cfg.block();
        let outer = cfg.block();
        let inner = cfg.block();
        let inner_body = cfg.block();
        let outer_end = cfg.block();
        let exit = cfg.block();
        cfg.goto(b0, outer);
        cfg.branch(outer, inner, exit);
        cfg.branch(inner, inner_body, outer_end);
        cfg.goto(inner_body, inner);
        cfg.goto(outer_end, outer);
        cfg.ret(exit);
        cfg.start(b0, None);

        let order = cfg.graph.compute_linear_scan_order().unwrap();
        assert_eq!(order.num_loops(), 2);
        assert_eq!(cfg.graph.block(inner).loop_index(), Some(0));
        assert_eq!(cfg.graph.block(inner).loop_depth(), 2);
        assert_eq!(cfg.graph.block(inner_body).loop_depth(), 2);
        assert_eq!(cfg.graph.block(outer).loop_index(), Some(1));
        assert_eq!(cfg.graph.block(outer).loop_depth(), 1);
        assert_eq!(cfg.graph.block(outer_end).loop_index(), Some(1));

        let pos = |b| order.position(b).unwrap();
        assert!(pos(inner) < pos(inner_body));
        assert!(pos(inner_body) < pos(outer_end));
        assert!(pos(outer_end) < pos(exit));
    }

    #[test]
    fn test_rejects_unsplit_loop_end() {
        // loop end with two successors
        let mut cfg = Cfg::new();
        let b0 = cfg.block();
        let h = cfg.block();
        let x = cfg.block();
        cfg.goto(b0, h);
        cfg.branch(h, h, x);
        cfg.ret(x);
        cfg.start(b0, None);

        let err = cfg.graph.compute_linear_scan_order().unwrap_err();
        assert_eq!(err.phase, "count_edges");
        assert_eq!(err.block, Some(h));
    }

    #[test]
    fn test_requires_base_terminator() {
        let mut cfg = Cfg::new();
        let a = cfg.block();
        cfg.ret(a);
        cfg.graph.set_start(a);
        let err = cfg.graph.compute_linear_scan_order().unwrap_err();
        assert_eq!(err.phase, "compute_order");
    }

    #[test]
    fn test_stable_dominators_and_rerun() {
        let mut cfg = Cfg::new();
        let b0 = cfg.block();
        let l = cfg.block();
        let r = cfg.block();
        let m = cfg.block();
        cfg.branch(b0, l, r);
        cfg.goto(l, m);
        cfg.goto(r, m);
        cfg.ret(m);
        cfg.start(b0, None);

        let first = cfg.graph.compute_linear_scan_order().unwrap();
        assert_eq!(first.recompute_dominators(&mut cfg.graph).unwrap(), 0);
        assert_eq!(cfg.graph.block(m).dominator(), Some(b0));

        assert!(cfg.graph.compute_linear_scan_order().is_err());
        cfg.graph.reset_linear_scan_info();
        let second = cfg.graph.compute_linear_scan_order().unwrap();
        assert_eq!(first.blocks(), second.blocks());
    }

    #[test]
    fn test_stress_mode_still_places_every_block() {
        let mut cfg = Cfg::new();
        cfg.graph.options_mut().stress_linear_scan = true;
        let b0 = cfg.block();
        let l = cfg.block();
        let r = cfg.block();
        cfg.branch(b0, l, r);
        cfg.ret(l);
        cfg.ret(r);
        cfg.start(b0, None);

        let order = cfg.graph.compute_linear_scan_order().unwrap();
        assert_eq!(order.len(), 4);
        order.verify(&cfg.graph).unwrap();
    }
}
