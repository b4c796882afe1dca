//! HIR Validation
//!
//! Checks a built graph before it is handed to later phases: block lists are
//! well formed, edges are mirrored, terminators have the right arity, inputs
//! are legal and typed as their opcode expects. All problems are collected
//! instead of stopping at the first one.

use super::{
    accept, ArithmeticOp, ArrayLength, BlockEnd, BlockFlags, BlockId, CompareOp, Constant,
    Convert, EndKind, HirGraph, IfOp, Invoke, LoadField, LoadIndexed, Local, LogicOp, MonitorOp,
    NegateOp, NewInstance, NewObjectArray, NewTypeArray, NullCheck, Phi, ShiftOp, StoreField,
    StoreIndexed, TypeCheck, Value, ValueId, ValueKind, ValueVisitor,
};
use std::fmt;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub block: Option<BlockId>,
    pub value: Option<ValueId>,
}

/// Types of validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Block has no terminator installed
    MissingEnd,

    /// Instruction list does not stop at the block's terminator
    UnterminatedList,

    /// Terminator does not point back at the block that owns it
    EndBeginMismatch { found: Option<BlockId> },

    /// Successor count does not fit the terminator kind
    SuccessorCount {
        terminator: &'static str,
        expected: String,
        found: usize,
    },

    /// Edge recorded on one side only
    UnmirroredEdge { from: BlockId, to: BlockId },

    /// Handler edge to a block without the exception-entry flag
    HandlerNotExceptionEntry { handler: BlockId },

    /// Value in a block list still has a substitution link
    UnresolvedSubstitution { target: ValueId },

    /// Input outside the arena, a block marker, or of illegal kind
    IllegalInput { input: ValueId, reason: String },

    /// Kind of a value does not match what its opcode expects
    TypeMismatch {
        value: ValueId,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Phi or parameter slot outside the state it indexes
    SlotOutOfRange { slot: String, size: usize },

    /// Phi of this block whose operand cannot be read from the edge's state
    MissingPhiOperand { phi: ValueId, index: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(block) = self.block {
            write!(f, "{}: ", block)?;
        }
        if let Some(value) = self.value {
            write!(f, "{}: ", value)?;
        }
        match &self.kind {
            ValidationErrorKind::MissingEnd => write!(f, "block has no end"),
            ValidationErrorKind::UnterminatedList => {
                write!(f, "instruction list does not end with the block end")
            }
            ValidationErrorKind::EndBeginMismatch { found } => match found {
                Some(other) => write!(f, "block end belongs to {}", other),
                None => write!(f, "block end has no begin"),
            },
            ValidationErrorKind::SuccessorCount {
                terminator,
                expected,
                found,
            } => write!(f, "{} expects {} successors, has {}", terminator, expected, found),
            ValidationErrorKind::UnmirroredEdge { from, to } => {
                write!(f, "edge {} -> {} is not mirrored", from, to)
            }
            ValidationErrorKind::HandlerNotExceptionEntry { handler } => {
                write!(f, "handler {} is not an exception entry", handler)
            }
            ValidationErrorKind::UnresolvedSubstitution { target } => {
                write!(f, "instruction has unresolved substitution to {}", target)
            }
            ValidationErrorKind::IllegalInput { input, reason } => {
                write!(f, "illegal input {}: {}", input, reason)
            }
            ValidationErrorKind::TypeMismatch {
                value,
                expected,
                found,
            } => write!(f, "{} should be {}, is {}", value, expected, found),
            ValidationErrorKind::SlotOutOfRange { slot, size } => {
                write!(f, "{} outside a state of size {}", slot, size)
            }
            ValidationErrorKind::MissingPhiOperand { phi, index } => {
                write!(f, "operand {} of {} has no state to come from", index, phi)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// HIR validation context
struct ValidationContext<'a> {
    graph: &'a HirGraph,
    current_block: Option<BlockId>,
    current_value: Option<ValueId>,
    errors: Vec<ValidationError>,
}

impl<'a> ValidationContext<'a> {
    fn new(graph: &'a HirGraph) -> Self {
        Self {
            graph,
            current_block: None,
            current_value: None,
            errors: Vec::new(),
        }
    }

    fn add_error(&mut self, kind: ValidationErrorKind) {
        self.errors.push(ValidationError {
            kind,
            block: self.current_block,
            value: self.current_value,
        });
    }

    fn kind_of(&self, id: ValueId) -> Option<ValueKind> {
        self.graph.values().try_get(id).map(|v| v.kind())
    }

    fn expect_kind(&mut self, id: ValueId, expected: ValueKind) {
        if let Some(found) = self.kind_of(id) {
            if found != expected {
                self.add_error(ValidationErrorKind::TypeMismatch {
                    value: id,
                    expected,
                    found,
                });
            }
        }
    }

    fn expect_same_kind(&mut self, id: ValueId, other: ValueId) {
        if let Some(expected) = self.kind_of(other) {
            self.expect_kind(id, expected);
        }
    }

    fn expect_one_of(&mut self, id: ValueId, allowed: &[ValueKind]) {
        if let Some(found) = self.kind_of(id) {
            if !allowed.contains(&found) {
                self.add_error(ValidationErrorKind::TypeMismatch {
                    value: id,
                    expected: allowed[0],
                    found,
                });
            }
        }
    }

    /// Checks shared by every instruction.
    fn check_instruction(&mut self, value: &Value) {
        if let Some(target) = value.subst_link() {
            self.add_error(ValidationErrorKind::UnresolvedSubstitution { target });
        }
        let legal = !value.kind().is_illegal() || value.op.is_block_end();
        let mut bad = Vec::new();
        value.op.input_values_do(|input| {
            match self.graph.values().try_get(input) {
                None => bad.push((input, "not in the graph".to_string())),
                Some(v) if v.op.is_block_begin() || v.op.is_block_end() => {
                    bad.push((input, format!("{} is not a data value", v.op.name())))
                }
                Some(v) if legal && v.kind().is_illegal() => {
                    bad.push((input, "input has illegal kind".to_string()))
                }
                Some(_) => {}
            }
        });
        for (input, reason) in bad {
            self.add_error(ValidationErrorKind::IllegalInput { input, reason });
        }
    }

    fn check_block(&mut self, block: BlockId) {
        let graph = self.graph;
        self.current_block = Some(block);
        self.current_value = None;
        let b = graph.block(block);

        // instruction list
        let end = b.end();
        let mut last = b.begin();
        let mut steps = 0;
        for id in graph.instructions(block) {
            self.current_value = Some(id);
            accept(graph.value(id), self);
            last = id;
            steps += 1;
        }
        self.current_value = None;
        let terminated = graph.value(last).next().is_none() && steps <= graph.values().len();
        match end {
            None => self.add_error(ValidationErrorKind::MissingEnd),
            Some(end) if !terminated || last != end => {
                self.add_error(ValidationErrorKind::UnterminatedList)
            }
            Some(_) => {}
        }

        if let Some(end) = graph.end_of(block) {
            if end.begin() != Some(block) {
                self.add_error(ValidationErrorKind::EndBeginMismatch { found: end.begin() });
            }
            self.check_arity(end);
        }
        self.check_edges(block);
        self.check_phi_operands(block);
    }

    /// Every phi this block owns must find a value or an empty slot in the
    /// state of each incoming edge.
    fn check_phi_operands(&mut self, block: BlockId) {
        let graph = self.graph;
        let Some(state) = graph.block(block).state() else {
            return;
        };
        for id in state.all_phis(graph.values()) {
            let Some(phi) = graph.value(id).op.as_phi() else {
                continue;
            };
            if phi.block != block {
                continue;
            }
            self.current_value = Some(id);
            for index in 0..graph.phi_operand_count(phi) {
                if graph.phi_operand_at(phi, index).is_err() {
                    self.add_error(ValidationErrorKind::MissingPhiOperand { phi: id, index });
                }
            }
        }
        self.current_value = None;
    }

    fn check_arity(&mut self, end: &BlockEnd) {
        let found = end.successor_count();
        let ok = match (&end.kind, end.expected_successor_count()) {
            (_, Some(expected)) => found == expected,
            (EndKind::Base, None) => found == 1 || found == 2,
            (_, None) => found >= 1,
        };
        if !ok {
            let expected = match (&end.kind, end.expected_successor_count()) {
                (_, Some(expected)) => expected.to_string(),
                (EndKind::Base, None) => "1 or 2".to_string(),
                (_, None) => "at least 1".to_string(),
            };
            self.add_error(ValidationErrorKind::SuccessorCount {
                terminator: end.name(),
                expected,
                found,
            });
        }
    }

    fn check_edges(&mut self, block: BlockId) {
        let graph = self.graph;
        let b = graph.block(block);
        let successors = graph.successors(block);
        for &sux in successors {
            let Some(target) = graph.try_block(sux) else {
                self.add_error(ValidationErrorKind::UnmirroredEdge { from: block, to: sux });
                continue;
            };
            let out = successors.iter().filter(|&&s| s == sux).count();
            let back = target.predecessors().iter().filter(|&&p| p == block).count();
            let via_handler = usize::from(b.exception_handlers().contains(&sux));
            if out + via_handler != back {
                self.add_error(ValidationErrorKind::UnmirroredEdge { from: block, to: sux });
            }
        }
        for &handler in b.exception_handlers() {
            let Some(target) = graph.try_block(handler) else {
                self.add_error(ValidationErrorKind::UnmirroredEdge {
                    from: block,
                    to: handler,
                });
                continue;
            };
            if !target.check_flag(BlockFlags::EXCEPTION_ENTRY) {
                self.add_error(ValidationErrorKind::HandlerNotExceptionEntry { handler });
            }
            if !target.predecessors().contains(&block) {
                self.add_error(ValidationErrorKind::UnmirroredEdge {
                    from: block,
                    to: handler,
                });
            }
        }
        for &pred in b.predecessors() {
            let linked = graph.try_block(pred).map_or(false, |p| {
                graph.successors(pred).contains(&block) || p.exception_handlers().contains(&block)
            });
            if !linked {
                self.add_error(ValidationErrorKind::UnmirroredEdge { from: pred, to: block });
            }
        }
    }

    fn check_binary_arithmetic(&mut self, value: &Value, x: ValueId, y: ValueId, allowed: &[ValueKind]) {
        self.expect_one_of(value.id(), allowed);
        self.expect_kind(x, value.kind());
        self.expect_kind(y, value.kind());
    }
}

const NUMERIC: [ValueKind; 4] = [ValueKind::Int, ValueKind::Long, ValueKind::Float, ValueKind::Double];
const INTEGRAL: [ValueKind; 2] = [ValueKind::Int, ValueKind::Long];

impl ValueVisitor for ValidationContext<'_> {
    fn visit_constant(&mut self, value: &Value, op: &Constant) {
        self.check_instruction(value);
        self.expect_kind(value.id(), op.value.kind());
    }

    fn visit_local(&mut self, value: &Value, op: &Local) {
        self.check_instruction(value);
        let max = self.graph.scope(self.graph.root_scope()).method.max_locals;
        if op.index as usize >= max {
            self.add_error(ValidationErrorKind::SlotOutOfRange {
                slot: format!("local {}", op.index),
                size: max,
            });
        }
    }

    fn visit_phi(&mut self, value: &Value, op: &Phi) {
        self.check_instruction(value);
        let Some(block) = self.graph.try_block(op.block) else {
            self.add_error(ValidationErrorKind::SlotOutOfRange {
                slot: format!("unknown block {}", op.block),
                size: 0,
            });
            return;
        };
        let Some(state) = block.state() else {
            return;
        };
        let (slot, index, size) = match (op.local_index(), op.stack_index()) {
            (Some(i), _) => ("local", i, state.locals_size()),
            (None, Some(i)) => ("stack", i, state.stack_size()),
            (None, None) => return,
        };
        if index >= size {
            self.add_error(ValidationErrorKind::SlotOutOfRange {
                slot: format!("{} {}", slot, index),
                size,
            });
        }
    }

    fn visit_arithmetic_op(&mut self, value: &Value, op: &ArithmeticOp) {
        self.check_instruction(value);
        self.check_binary_arithmetic(value, op.x, op.y, &NUMERIC);
    }

    fn visit_logic_op(&mut self, value: &Value, op: &LogicOp) {
        self.check_instruction(value);
        self.check_binary_arithmetic(value, op.x, op.y, &INTEGRAL);
    }

    fn visit_shift_op(&mut self, value: &Value, op: &ShiftOp) {
        self.check_instruction(value);
        self.expect_one_of(value.id(), &INTEGRAL);
        self.expect_kind(op.x, value.kind());
        self.expect_kind(op.y, ValueKind::Int);
    }

    fn visit_negate_op(&mut self, value: &Value, op: &NegateOp) {
        self.check_instruction(value);
        self.expect_same_kind(value.id(), op.x);
    }

    fn visit_compare_op(&mut self, value: &Value, op: &CompareOp) {
        self.check_instruction(value);
        self.expect_kind(value.id(), ValueKind::Int);
        self.expect_kind(op.x, op.op.operand_kind());
        self.expect_kind(op.y, op.op.operand_kind());
    }

    fn visit_convert(&mut self, value: &Value, op: &Convert) {
        self.check_instruction(value);
        self.expect_kind(op.value, op.from);
        self.expect_kind(value.id(), op.to);
    }

    fn visit_if_op(&mut self, value: &Value, op: &IfOp) {
        self.check_instruction(value);
        self.expect_same_kind(op.y, op.x);
        self.expect_kind(op.true_value, value.kind());
        self.expect_kind(op.false_value, value.kind());
    }

    fn visit_null_check(&mut self, value: &Value, op: &NullCheck) {
        self.check_instruction(value);
        self.expect_kind(op.object, ValueKind::Object);
    }

    fn visit_load_field(&mut self, value: &Value, op: &LoadField) {
        self.check_instruction(value);
        if let Some(object) = op.object {
            self.expect_kind(object, ValueKind::Object);
        }
        self.expect_kind(value.id(), op.field.kind);
    }

    fn visit_store_field(&mut self, value: &Value, op: &StoreField) {
        self.check_instruction(value);
        if let Some(object) = op.object {
            self.expect_kind(object, ValueKind::Object);
        }
        self.expect_kind(op.value, op.field.kind);
    }

    fn visit_load_indexed(&mut self, value: &Value, op: &LoadIndexed) {
        self.check_instruction(value);
        self.expect_kind(op.array, ValueKind::Object);
        self.expect_kind(op.index, ValueKind::Int);
        if let Some(length) = op.length {
            self.expect_kind(length, ValueKind::Int);
        }
        self.expect_kind(value.id(), op.element_kind);
    }

    fn visit_store_indexed(&mut self, value: &Value, op: &StoreIndexed) {
        self.check_instruction(value);
        self.expect_kind(op.array, ValueKind::Object);
        self.expect_kind(op.index, ValueKind::Int);
        if let Some(length) = op.length {
            self.expect_kind(length, ValueKind::Int);
        }
        self.expect_kind(op.value, op.element_kind);
    }

    fn visit_array_length(&mut self, value: &Value, op: &ArrayLength) {
        self.check_instruction(value);
        self.expect_kind(op.array, ValueKind::Object);
        self.expect_kind(value.id(), ValueKind::Int);
    }

    fn visit_exception_object(&mut self, value: &Value) {
        self.check_instruction(value);
        self.expect_kind(value.id(), ValueKind::Object);
    }

    fn visit_osr_entry(&mut self, value: &Value) {
        self.check_instruction(value);
        self.expect_kind(value.id(), ValueKind::Word);
    }

    fn visit_new_instance(&mut self, value: &Value, _op: &NewInstance) {
        self.check_instruction(value);
        self.expect_kind(value.id(), ValueKind::Object);
    }

    fn visit_new_type_array(&mut self, value: &Value, op: &NewTypeArray) {
        self.check_instruction(value);
        self.expect_kind(op.length, ValueKind::Int);
        self.expect_kind(value.id(), ValueKind::Object);
    }

    fn visit_new_object_array(&mut self, value: &Value, op: &NewObjectArray) {
        self.check_instruction(value);
        self.expect_kind(op.length, ValueKind::Int);
        self.expect_kind(value.id(), ValueKind::Object);
    }

    fn visit_check_cast(&mut self, value: &Value, op: &TypeCheck) {
        self.check_instruction(value);
        self.expect_kind(op.object, ValueKind::Object);
        self.expect_kind(value.id(), ValueKind::Object);
    }

    fn visit_instance_of(&mut self, value: &Value, op: &TypeCheck) {
        self.check_instruction(value);
        self.expect_kind(op.object, ValueKind::Object);
        self.expect_kind(value.id(), ValueKind::Int);
    }

    fn visit_invoke(&mut self, value: &Value, op: &Invoke) {
        self.check_instruction(value);
        if let Some(receiver) = op.receiver {
            self.expect_kind(receiver, ValueKind::Object);
        }
        self.expect_kind(value.id(), op.target.return_kind);
    }

    fn visit_monitor_enter(&mut self, value: &Value, op: &MonitorOp) {
        self.check_instruction(value);
        self.expect_kind(op.object, ValueKind::Object);
    }

    fn visit_monitor_exit(&mut self, value: &Value, op: &MonitorOp) {
        self.check_instruction(value);
        self.expect_kind(op.object, ValueKind::Object);
    }

    fn visit_block_begin(&mut self, value: &Value, block: BlockId) {
        self.check_instruction(value);
        if Some(block) != self.current_block {
            self.add_error(ValidationErrorKind::IllegalInput {
                input: value.id(),
                reason: format!("header of {} inside another block", block),
            });
        }
    }

    fn visit_goto(&mut self, value: &Value, _end: &BlockEnd) {
        self.check_instruction(value);
    }

    fn visit_if(&mut self, value: &Value, end: &BlockEnd) {
        self.check_instruction(value);
        if let EndKind::If { x, y, .. } = &end.kind {
            self.expect_same_kind(*y, *x);
        }
    }

    fn visit_if_instance_of(&mut self, value: &Value, end: &BlockEnd) {
        self.check_instruction(value);
        if let EndKind::IfInstanceOf { object, .. } = &end.kind {
            self.expect_kind(*object, ValueKind::Object);
        }
    }

    fn visit_table_switch(&mut self, value: &Value, end: &BlockEnd) {
        self.check_instruction(value);
        if let EndKind::TableSwitch { value: key, .. } = &end.kind {
            self.expect_kind(*key, ValueKind::Int);
        }
    }

    fn visit_lookup_switch(&mut self, value: &Value, end: &BlockEnd) {
        self.check_instruction(value);
        if let EndKind::LookupSwitch { value: key, .. } = &end.kind {
            self.expect_kind(*key, ValueKind::Int);
        }
    }

    fn visit_return(&mut self, value: &Value, _end: &BlockEnd) {
        self.check_instruction(value);
    }

    fn visit_throw(&mut self, value: &Value, end: &BlockEnd) {
        self.check_instruction(value);
        if let EndKind::Throw { exception } = &end.kind {
            self.expect_kind(*exception, ValueKind::Object);
        }
    }

    fn visit_base(&mut self, value: &Value, _end: &BlockEnd) {
        self.check_instruction(value);
    }
}

/// Validate every block reachable from the start block, or every block when
/// no start is set.
pub fn validate_graph(graph: &HirGraph) -> Result<(), Vec<ValidationError>> {
    let mut ctx = ValidationContext::new(graph);
    let blocks: Vec<BlockId> = match graph.start() {
        Some(_) => graph.reachable_blocks(),
        None => graph.blocks().iter().map(|b| b.id()).collect(),
    };
    for block in blocks {
        ctx.check_block(block);
    }

    if ctx.errors.is_empty() {
        Ok(())
    } else {
        Err(ctx.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticOpcode, Condition, ConstantValue, Instruction, MethodInfo};
    use crate::HirOptions;

    fn graph() -> HirGraph {
        HirGraph::new(MethodInfo::new("m", 2, 2), HirOptions::default())
    }

    fn kinds(errors: &[ValidationError]) -> Vec<&ValidationErrorKind> {
        errors.iter().map(|e| &e.kind).collect()
    }

    #[test]
    fn test_valid_diamond() {
        let mut g = graph();
        let a = g.new_block(0);
        let b = g.new_block(1);
        let c = g.new_block(2);
        let d = g.new_block(3);
        g.set_start(a);
        let x = g.values_mut().new_constant(ConstantValue::Int(0));
        let begin = g.block(a).begin();
        g.values_mut().set_next(begin, x, 0).unwrap();
        let end = g.set_end_with(a, BlockEnd::if_(x, Condition::Eq, x, b, c)).unwrap();
        g.values_mut().set_next(x, end, 0).unwrap();
        for block in [b, c] {
            let end = g.set_end_with(block, BlockEnd::goto(d)).unwrap();
            let begin = g.block(block).begin();
            g.values_mut().set_next(begin, end, 1).unwrap();
        }
        let end = g.set_end_with(d, BlockEnd::return_(None)).unwrap();
        let begin = g.block(d).begin();
        g.values_mut().set_next(begin, end, 3).unwrap();

        assert_eq!(validate_graph(&g), Ok(()));
    }

    #[test]
    fn test_reports_missing_end_and_type_errors() {
        let mut g = graph();
        let a = g.new_block(0);
        let x = g.values_mut().new_constant(ConstantValue::Int(1));
        let y = g.values_mut().new_constant(ConstantValue::Long(1));
        let sum = g.values_mut().alloc(
            ValueKind::Int,
            Instruction::ArithmeticOp(ArithmeticOp {
                op: ArithmeticOpcode::Add,
                x,
                y,
            }),
        );
        let begin = g.block(a).begin();
        g.values_mut().set_next(begin, sum, 0).unwrap();

        let errors = validate_graph(&g).unwrap_err();
        let kinds = kinds(&errors);
        assert!(kinds.contains(&&ValidationErrorKind::MissingEnd));
        assert!(kinds.contains(&&ValidationErrorKind::TypeMismatch {
            value: y,
            expected: ValueKind::Int,
            found: ValueKind::Long,
        }));
        let mismatch = errors
            .iter()
            .find(|e| matches!(e.kind, ValidationErrorKind::TypeMismatch { .. }))
            .unwrap();
        assert_eq!(mismatch.block, Some(a));
        assert_eq!(mismatch.value, Some(sum));
    }

    #[test]
    fn test_reports_unresolved_substitution_and_block_inputs() {
        let mut g = graph();
        let a = g.new_block(0);
        let x = g.values_mut().new_constant(ConstantValue::Null);
        let y = g.values_mut().new_constant(ConstantValue::Null);
        let begin = g.block(a).begin();
        g.values_mut().set_next(begin, x, 0).unwrap();
        let end = g.set_end_with(a, BlockEnd::throw(begin)).unwrap();
        g.values_mut().set_next(x, end, 1).unwrap();
        g.set_subst(x, y).unwrap();

        let errors = validate_graph(&g).unwrap_err();
        let kinds = kinds(&errors);
        assert!(kinds.contains(&&ValidationErrorKind::UnresolvedSubstitution { target: y }));
        assert!(errors
            .iter()
            .any(|e| matches!(e.kind, ValidationErrorKind::IllegalInput { input, .. } if input == begin)));
    }

    #[test]
    fn test_reports_unmirrored_edges_and_arity() {
        let mut g = graph();
        let a = g.new_block(0);
        let b = g.new_block(1);
        let end = g.set_end_with(a, BlockEnd::goto(b)).unwrap();
        let begin = g.block(a).begin();
        g.values_mut().set_next(begin, end, 0).unwrap();
        let end = g.set_end_with(b, BlockEnd::return_(None)).unwrap();
        let begin = g.block(b).begin();
        g.values_mut().set_next(begin, end, 1).unwrap();

        // break the mirror behind set_end's back
        g.block_mut(b).predecessors.clear();
        // and give the return a successor
        let end = g.block(b).end().unwrap();
        if let Some(e) = g.value_mut(end).op.as_block_end_mut() {
            e.successors_mut().push(a);
        }

        let errors = validate_graph(&g).unwrap_err();
        let kinds = kinds(&errors);
        assert!(kinds.contains(&&ValidationErrorKind::UnmirroredEdge { from: a, to: b }));
        assert!(kinds.contains(&&ValidationErrorKind::SuccessorCount {
            terminator: "Return",
            expected: "0".to_string(),
            found: 1,
        }));
        assert!(errors.iter().all(|e| !e.to_string().is_empty()));
    }

    #[test]
    fn test_reports_phi_slot_out_of_range() {
        let mut g = graph();
        let a = g.new_block(0);
        let end = g.set_end_with(a, BlockEnd::return_(None)).unwrap();
        let begin = g.block(a).begin();
        g.values_mut().set_next(begin, end, 0).unwrap();
        let state = g.new_state();
        g.block_mut(a).set_state(state);
        let phi = g.values_mut().new_phi(ValueKind::Int, a, 5);

        // phis live in states, so check one directly
        let mut ctx = ValidationContext::new(&g);
        ctx.current_block = Some(a);
        accept(g.value(phi), &mut ctx);
        assert_eq!(
            kinds(&ctx.errors),
            vec![&ValidationErrorKind::SlotOutOfRange {
                slot: "local 5".to_string(),
                size: 2,
            }]
        );
    }

    #[test]
    fn test_reports_phi_without_incoming_state() {
        let mut g = graph();
        let a = g.new_block(0);
        let b = g.new_block(1);
        let c = g.new_block(2);
        g.set_start(a);
        let x = g.values_mut().new_constant(ConstantValue::Int(0));
        let begin = g.block(a).begin();
        g.values_mut().set_next(begin, x, 0).unwrap();

        let mut state = g.new_state();
        state.store_local(g.values(), 0, x);
        let end = g
            .set_end_with(a, BlockEnd::if_(x, Condition::Eq, x, b, c).with_state_after(state.clone()))
            .unwrap();
        g.values_mut().set_next(x, end, 0).unwrap();
        // b jumps to c without recording its state
        let end = g.set_end_with(b, BlockEnd::goto(c)).unwrap();
        let begin = g.block(b).begin();
        g.values_mut().set_next(begin, end, 1).unwrap();
        let end = g.set_end_with(c, BlockEnd::return_(None)).unwrap();
        let begin = g.block(c).begin();
        g.values_mut().set_next(begin, end, 2).unwrap();

        let phi = state.setup_phi_for_local(g.values_mut(), c, 0).unwrap();
        g.block_mut(c).set_state(state);

        let errors = validate_graph(&g).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].block, Some(c));
        assert_eq!(
            errors[0].kind,
            ValidationErrorKind::MissingPhiOperand { phi, index: 1 }
        );
    }
}
