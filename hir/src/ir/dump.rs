//! HIR Dump Utility
//!
//! Pretty-prints instructions, block headers and the linear-scan order table
//! in a compact textual form. Used by the ordering pass trace, by `hirscan`
//! and when debugging merge problems.

use super::{
    accept, ArithmeticOp, ArrayLength, BlockEnd, BlockFlags, BlockId, CompareOp, Constant,
    Convert, EndKind, HirGraph, IfOp, Invoke, LinearScanOrder, LoadField, LoadIndexed, Local,
    LogicOp, MonitorOp, NegateOp, NewInstance, NewObjectArray, NewTypeArray, NullCheck, Phi,
    ShiftOp, StoreField, StoreIndexed, TypeCheck, Value, ValueId, ValueVisitor,
};
use std::fmt::Write;

/// Writes one instruction's operation text.
struct InstructionPrinter {
    out: String,
}

impl InstructionPrinter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn text(mut self, value: &Value) -> String {
        accept(value, &mut self);
        self.out
    }

    fn successors(&mut self, end: &BlockEnd) {
        let list: Vec<String> = end.successors().iter().map(|b| b.to_string()).collect();
        let _ = write!(self.out, " -> {}", list.join(", "));
    }
}

fn opt(value: Option<ValueId>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl ValueVisitor for InstructionPrinter {
    fn visit_constant(&mut self, _value: &Value, op: &Constant) {
        let _ = write!(self.out, "const {}", op.value);
    }

    fn visit_local(&mut self, _value: &Value, op: &Local) {
        let _ = write!(self.out, "local[{}]", op.index);
    }

    fn visit_phi(&mut self, _value: &Value, op: &Phi) {
        match op.local_index() {
            Some(i) => {
                let _ = write!(self.out, "phi {} local[{}]", op.block, i);
            }
            None => {
                let _ = write!(self.out, "phi {} stack[{}]", op.block, op.stack_index().unwrap_or(0));
            }
        }
    }

    fn visit_arithmetic_op(&mut self, _value: &Value, op: &ArithmeticOp) {
        let _ = write!(self.out, "{} {} {}", op.x, op.op.symbol(), op.y);
    }

    fn visit_logic_op(&mut self, _value: &Value, op: &LogicOp) {
        let _ = write!(self.out, "{} {} {}", op.x, op.op.symbol(), op.y);
    }

    fn visit_shift_op(&mut self, _value: &Value, op: &ShiftOp) {
        let _ = write!(self.out, "{} {} {}", op.x, op.op.symbol(), op.y);
    }

    fn visit_negate_op(&mut self, _value: &Value, op: &NegateOp) {
        let _ = write!(self.out, "-{}", op.x);
    }

    fn visit_compare_op(&mut self, _value: &Value, op: &CompareOp) {
        let _ = write!(self.out, "{}({}, {})", op.op.name(), op.x, op.y);
    }

    fn visit_convert(&mut self, _value: &Value, op: &Convert) {
        let _ = write!(self.out, "{}2{}({})", op.from.type_char(), op.to.type_char(), op.value);
    }

    fn visit_if_op(&mut self, _value: &Value, op: &IfOp) {
        let _ = write!(
            self.out,
            "{} {} {} ? {} : {}",
            op.x,
            op.cond.operator(),
            op.y,
            op.true_value,
            op.false_value
        );
    }

    fn visit_null_check(&mut self, _value: &Value, op: &NullCheck) {
        let _ = write!(self.out, "null_check({})", op.object);
    }

    fn visit_load_field(&mut self, _value: &Value, op: &LoadField) {
        match op.object {
            Some(object) => {
                let _ = write!(self.out, "{}.{}", object, op.field.name);
            }
            None => {
                let _ = write!(self.out, "{}.{}", op.field.holder, op.field.name);
            }
        }
    }

    fn visit_store_field(&mut self, _value: &Value, op: &StoreField) {
        let target = op.object.map_or_else(|| op.field.holder.clone(), |o| o.to_string());
        let _ = write!(self.out, "{}.{} := {}", target, op.field.name, op.value);
    }

    fn visit_load_indexed(&mut self, _value: &Value, op: &LoadIndexed) {
        let _ = write!(self.out, "{}[{}] ({})", op.array, op.index, op.element_kind.type_char());
    }

    fn visit_store_indexed(&mut self, _value: &Value, op: &StoreIndexed) {
        let _ = write!(
            self.out,
            "{}[{}] := {} ({})",
            op.array,
            op.index,
            op.value,
            op.element_kind.type_char()
        );
    }

    fn visit_array_length(&mut self, _value: &Value, op: &ArrayLength) {
        let _ = write!(self.out, "{}.length", op.array);
    }

    fn visit_exception_object(&mut self, _value: &Value) {
        self.out.push_str("incoming exception");
    }

    fn visit_osr_entry(&mut self, _value: &Value) {
        self.out.push_str("osr entry");
    }

    fn visit_new_instance(&mut self, _value: &Value, op: &NewInstance) {
        let _ = write!(self.out, "new {}", op.class.name);
    }

    fn visit_new_type_array(&mut self, _value: &Value, op: &NewTypeArray) {
        let _ = write!(self.out, "new {}[{}]", op.element_kind, op.length);
    }

    fn visit_new_object_array(&mut self, _value: &Value, op: &NewObjectArray) {
        let _ = write!(self.out, "new {}[{}]", op.element_class.name, op.length);
    }

    fn visit_check_cast(&mut self, _value: &Value, op: &TypeCheck) {
        let _ = write!(self.out, "checkcast({}) {}", op.object, op.target.name);
    }

    fn visit_instance_of(&mut self, _value: &Value, op: &TypeCheck) {
        let _ = write!(self.out, "instanceof({}) {}", op.object, op.target.name);
    }

    fn visit_invoke(&mut self, _value: &Value, op: &Invoke) {
        let mut args: Vec<String> = Vec::new();
        if let Some(receiver) = op.receiver {
            args.push(receiver.to_string());
        }
        args.extend(op.arguments.iter().map(|a| a.to_string()));
        let _ = write!(
            self.out,
            "invoke {}.{}({})",
            op.target.holder,
            op.target.name,
            args.join(", ")
        );
    }

    fn visit_monitor_enter(&mut self, _value: &Value, op: &MonitorOp) {
        let _ = write!(self.out, "enter monitor[{}]({})", op.lock_number, op.object);
    }

    fn visit_monitor_exit(&mut self, _value: &Value, op: &MonitorOp) {
        let _ = write!(self.out, "exit monitor[{}]({})", op.lock_number, op.object);
    }

    fn visit_block_begin(&mut self, _value: &Value, block: BlockId) {
        let _ = write!(self.out, "{}:", block);
    }

    fn visit_goto(&mut self, value: &Value, end: &BlockEnd) {
        self.out.push_str("goto");
        if value.check_flag(super::ValueFlags::IS_SAFEPOINT) {
            self.out.push_str(" (safepoint)");
        }
        self.successors(end);
    }

    fn visit_if(&mut self, _value: &Value, end: &BlockEnd) {
        if let EndKind::If { x, cond, y, .. } = &end.kind {
            let _ = write!(self.out, "if {} {} {}", x, cond.operator(), y);
        }
        self.successors(end);
    }

    fn visit_if_instance_of(&mut self, _value: &Value, end: &BlockEnd) {
        if let EndKind::IfInstanceOf {
            object,
            target,
            test_is_instance,
        } = &end.kind
        {
            let op = if *test_is_instance { "instanceof" } else { "!instanceof" };
            let _ = write!(self.out, "if {} {} {}", object, op, target.name);
        }
        self.successors(end);
    }

    fn visit_table_switch(&mut self, _value: &Value, end: &BlockEnd) {
        if let EndKind::TableSwitch { value, low_key } = &end.kind {
            let _ = write!(self.out, "tableswitch {} from {}", value, low_key);
        }
        self.successors(end);
    }

    fn visit_lookup_switch(&mut self, _value: &Value, end: &BlockEnd) {
        if let EndKind::LookupSwitch { value, keys } = &end.kind {
            let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
            let _ = write!(self.out, "lookupswitch {} [{}]", value, keys.join(", "));
        }
        self.successors(end);
    }

    fn visit_return(&mut self, _value: &Value, end: &BlockEnd) {
        if let EndKind::Return { result } = &end.kind {
            match result {
                Some(result) => {
                    let _ = write!(self.out, "return {}", result);
                }
                None => self.out.push_str("return"),
            }
        }
    }

    fn visit_throw(&mut self, _value: &Value, end: &BlockEnd) {
        if let EndKind::Throw { exception } = &end.kind {
            let _ = write!(self.out, "throw {}", exception);
        }
    }

    fn visit_base(&mut self, _value: &Value, end: &BlockEnd) {
        let _ = write!(
            self.out,
            "std entry {} osr entry {}",
            end.standard_entry().map_or_else(|| "-".to_string(), |b| b.to_string()),
            end.osr_entry().map_or_else(|| "-".to_string(), |b| b.to_string())
        );
    }
}

/// Dump one instruction: bci, id with kind, operation and pin marker.
pub fn dump_instruction(graph: &HirGraph, id: ValueId) -> String {
    let value = graph.value(id);
    let text = InstructionPrinter::new().text(value);
    let subst = match value.subst_link() {
        Some(_) => format!("  => {}", graph.subst(id)),
        None => String::new(),
    };
    format!(
        "{:>5}  {}:{}{} {}{}",
        value.bci(),
        id,
        value.kind().type_char(),
        if value.is_pinned() { "." } else { " " },
        text,
        subst
    )
}

fn block_flags(graph: &HirGraph, block: BlockId) -> String {
    const NAMES: [(BlockFlags, &str); 8] = [
        (BlockFlags::STANDARD_ENTRY, "std"),
        (BlockFlags::OSR_ENTRY, "osr"),
        (BlockFlags::EXCEPTION_ENTRY, "ex"),
        (BlockFlags::SUBROUTINE_ENTRY, "sr"),
        (BlockFlags::BACKWARD_BRANCH_TARGET, "bb"),
        (BlockFlags::PARSER_LOOP_HEADER, "plh"),
        (BlockFlags::CRITICAL_EDGE_SPLIT, "ce"),
        (BlockFlags::LINEAR_SCAN_LOOP_HEADER, "lh"),
    ];
    let b = graph.block(block);
    let mut names: Vec<&str> = NAMES
        .iter()
        .filter(|(flag, _)| b.check_flag(*flag))
        .map(|(_, name)| *name)
        .collect();
    if b.check_flag(BlockFlags::LINEAR_SCAN_LOOP_END) {
        names.push("le");
    }
    names.join(" ")
}

fn block_list(blocks: &[BlockId]) -> String {
    let names: Vec<String> = blocks.iter().map(|b| b.to_string()).collect();
    names.join(" ")
}

/// Dump a block header: id, bci, flags, dominator and edges.
pub fn dump_block_header(graph: &HirGraph, block: BlockId) -> String {
    let b = graph.block(block);
    let mut out = format!("{} [{}]", block, b.bci());
    let flags = block_flags(graph, block);
    if !flags.is_empty() {
        let _ = write!(out, " {}", flags);
    }
    if let Some(dom) = b.dominator() {
        let _ = write!(out, " dom {}", dom);
    }
    if b.number_of_preds() > 0 {
        let _ = write!(out, " preds: {}", block_list(b.predecessors()));
    }
    if graph.number_of_sux(block) > 0 {
        let _ = write!(out, " sux: {}", block_list(graph.successors(block)));
    }
    if b.number_of_exception_handlers() > 0 {
        let _ = write!(out, " ex: {}", block_list(b.exception_handlers()));
    }
    out
}

/// Dump a block header followed by its instruction list.
pub fn dump_block(graph: &HirGraph, block: BlockId) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", dump_block_header(graph, block));
    for id in graph.instructions(block).skip(1) {
        let _ = writeln!(out, "  {}", dump_instruction(graph, id));
    }
    out
}

/// Dump every block reachable from the start block, in pre-order.
pub fn dump_graph(graph: &HirGraph) -> String {
    let mut out = String::new();
    for block in graph.reachable_blocks() {
        out.push_str(&dump_block(graph, block));
        out.push('\n');
    }
    out
}

fn loop_index_text(index: Option<u32>) -> String {
    index.map_or_else(|| "-1".to_string(), |i| i.to_string())
}

/// Loop membership matrix: one row per block, one column per loop.
pub fn loop_table(graph: &HirGraph, order: &LinearScanOrder) -> String {
    let mut out = String::from("----- loop information:\n");
    for &block in order.blocks() {
        let b = graph.block(block);
        let _ = write!(
            out,
            "{:4}: {:>4}: ",
            b.linear_scan_number().unwrap_or(0),
            block.to_string()
        );
        for loop_index in 0..order.num_loops() {
            out.push(if order.is_block_in_loop(loop_index, block) { '1' } else { '0' });
            out.push(' ');
        }
        let _ = writeln!(
            out,
            " -> loop_index: {:>2}, loop_depth: {:>2}",
            loop_index_text(b.loop_index()),
            b.loop_depth()
        );
    }
    out
}

/// The final order with loop info, flags, dominator and edges per block.
pub fn linear_scan_table(graph: &HirGraph, order: &LinearScanOrder) -> String {
    let mut out = String::from("----- linear-scan block order:\n");
    for &block in order.blocks() {
        let b = graph.block(block);
        let _ = write!(
            out,
            "{:4}: {:>4}    loop: {:>2}  depth: {:>2}",
            b.linear_scan_number().unwrap_or(0),
            block.to_string(),
            loop_index_text(b.loop_index()),
            b.loop_depth()
        );
        for (flag, name) in [
            (BlockFlags::EXCEPTION_ENTRY, " ex"),
            (BlockFlags::CRITICAL_EDGE_SPLIT, " ce"),
            (BlockFlags::LINEAR_SCAN_LOOP_HEADER, " lh"),
            (BlockFlags::LINEAR_SCAN_LOOP_END, " le"),
        ] {
            out.push_str(if b.check_flag(flag) { name } else { "   " });
        }
        match b.dominator() {
            Some(dom) => {
                let _ = write!(out, "    dom: {} ", dom);
            }
            None => out.push_str("    dom: null "),
        }
        if b.number_of_preds() > 0 {
            let _ = write!(out, "    preds: {} ", block_list(b.predecessors()));
        }
        if graph.number_of_sux(block) > 0 {
            let _ = write!(out, "    sux: {} ", block_list(graph.successors(block)));
        }
        if b.number_of_exception_handlers() > 0 {
            let _ = write!(out, "    ex: {} ", block_list(b.exception_handlers()));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticOpcode, Condition, ConstantValue, Instruction, MethodInfo, ValueKind};
    use crate::HirOptions;

    #[test]
    fn test_dump_instruction_and_block() {
        let mut graph = HirGraph::new(MethodInfo::new("m", 0, 0), HirOptions::default());
        let b = graph.new_block(0);
        let x = graph.values_mut().new_constant(ConstantValue::Int(3));
        let y = graph.values_mut().new_constant(ConstantValue::Int(4));
        let sum = graph.values_mut().alloc(
            ValueKind::Int,
            Instruction::ArithmeticOp(ArithmeticOp {
                op: ArithmeticOpcode::Add,
                x,
                y,
            }),
        );
        let begin = graph.block(b).begin();
        graph.values_mut().set_next(begin, x, 0).unwrap();
        graph.values_mut().set_next(x, y, 1).unwrap();
        graph.values_mut().set_next(y, sum, 2).unwrap();
        let end = graph
            .set_end_with(b, BlockEnd::if_(sum, Condition::Lt, x, b, b))
            .unwrap();
        graph.values_mut().set_next(sum, end, 3).unwrap();

        let line = dump_instruction(&graph, sum);
        assert!(line.contains(&format!("{} + {}", x, y)), "{}", line);
        assert!(line.starts_with("    2"));

        let text = dump_block(&graph, b);
        assert!(text.starts_with("B0 [0]"));
        assert!(text.contains("preds: B0 B0"));
        assert!(text.contains("const 3"));
        assert!(text.contains("-> B0, B0"));
    }
}
