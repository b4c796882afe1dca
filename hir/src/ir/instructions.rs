//! HIR instruction set
//!
//! A closed set of instruction kinds, each with its own payload struct.
//! Passes case on [`Instruction`] with an exhaustive `match`, or implement
//! [`ValueVisitor`] when they want one method per kind.

use super::{
    ArithmeticOpcode, BlockId, CompareOpcode, Condition, ConstantValue, FrameState, LogicOpcode,
    ShiftOpcode, Value, ValueFlags, ValueId, ValueKind,
};
use crate::error::StructuralError;
use fxhash::FxHasher;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};

/// A symbolic reference to a field, resolved outside the HIR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub holder: String,
    pub name: String,
    pub kind: ValueKind,
}

/// A symbolic reference to a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub name: String,
}

impl TypeRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A symbolic reference to a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub holder: String,
    pub name: String,
    pub return_kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constant {
    pub value: ConstantValue,
}

/// An incoming method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Local {
    pub index: u32,
}

/// Join of a local or stack slot at a block.
///
/// `index >= 0` names a local slot; a stack slot `s` is encoded as
/// `-(s + 1)`. Operands are not stored: operand `i` is read from the state of
/// the block's `i`-th predecessor (or `i`-th handler state) on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Phi {
    pub block: BlockId,
    pub index: i32,
}

impl Phi {
    pub fn for_local(block: BlockId, local: usize) -> Self {
        Self {
            block,
            index: local as i32,
        }
    }

    pub fn for_stack(block: BlockId, slot: usize) -> Self {
        Self {
            block,
            index: -(slot as i32) - 1,
        }
    }

    pub fn is_local(&self) -> bool {
        self.index >= 0
    }

    pub fn is_on_stack(&self) -> bool {
        self.index < 0
    }

    pub fn local_index(&self) -> Option<usize> {
        if self.is_local() {
            Some(self.index as usize)
        } else {
            None
        }
    }

    pub fn stack_index(&self) -> Option<usize> {
        if self.is_on_stack() {
            Some((-(self.index + 1)) as usize)
        } else {
            None
        }
    }

    /// The slot this phi stands for in `state`.
    pub fn input_in(&self, state: &FrameState) -> Option<ValueId> {
        match self.local_index() {
            Some(local) => state.local_at(local),
            None => self.stack_index().and_then(|slot| state.stack_at(slot)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArithmeticOp {
    pub op: ArithmeticOpcode,
    pub x: ValueId,
    pub y: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicOp {
    pub op: LogicOpcode,
    pub x: ValueId,
    pub y: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShiftOp {
    pub op: ShiftOpcode,
    pub x: ValueId,
    pub y: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NegateOp {
    pub x: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompareOp {
    pub op: CompareOpcode,
    pub x: ValueId,
    pub y: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Convert {
    pub from: ValueKind,
    pub to: ValueKind,
    pub value: ValueId,
}

/// `x cond y ? true_value : false_value`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IfOp {
    pub x: ValueId,
    pub cond: Condition,
    pub y: ValueId,
    pub true_value: ValueId,
    pub false_value: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NullCheck {
    pub object: ValueId,
}

/// Field load. `object` is `None` for static fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadField {
    pub object: Option<ValueId>,
    pub field: FieldRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreField {
    pub object: Option<ValueId>,
    pub field: FieldRef,
    pub value: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadIndexed {
    pub array: ValueId,
    pub index: ValueId,
    /// Explicit length for range check elimination, if already loaded
    pub length: Option<ValueId>,
    pub element_kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreIndexed {
    pub array: ValueId,
    pub index: ValueId,
    pub length: Option<ValueId>,
    pub element_kind: ValueKind,
    pub value: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayLength {
    pub array: ValueId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewInstance {
    pub class: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewTypeArray {
    pub length: ValueId,
    pub element_kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewObjectArray {
    pub length: ValueId,
    pub element_class: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeCheck {
    pub object: ValueId,
    pub target: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invoke {
    pub target: MethodRef,
    /// Receiver for virtual and special calls
    pub receiver: Option<ValueId>,
    pub arguments: SmallVec<[ValueId; 4]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitorOp {
    pub object: ValueId,
    pub lock_number: u32,
}

/// Terminator variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndKind {
    Goto,
    If {
        x: ValueId,
        cond: Condition,
        y: ValueId,
        unordered_is_true: bool,
    },
    IfInstanceOf {
        object: ValueId,
        target: TypeRef,
        test_is_instance: bool,
    },
    /// Dense switch over `low_key..low_key + cases`
    TableSwitch {
        value: ValueId,
        low_key: i32,
    },
    /// Sparse switch over sorted `keys`
    LookupSwitch {
        value: ValueId,
        keys: Vec<i32>,
    },
    Return {
        result: Option<ValueId>,
    },
    Throw {
        exception: ValueId,
    },
    /// Terminator of the start block: successors are the optional OSR entry
    /// followed by the standard entry.
    Base,
}

/// A block terminator.
///
/// The successor list is only reachable mutably from inside the crate so
/// that every edge change goes through `HirGraph::set_end`. The last
/// successor is the default (fall-through) successor.
#[derive(Debug, Clone)]
pub struct BlockEnd {
    pub kind: EndKind,
    successors: SmallVec<[BlockId; 2]>,
    begin: Option<BlockId>,
    pub state_after: Option<FrameState>,
}

impl BlockEnd {
    fn with(kind: EndKind, successors: SmallVec<[BlockId; 2]>) -> Self {
        Self {
            kind,
            successors,
            begin: None,
            state_after: None,
        }
    }

    pub fn goto(target: BlockId) -> Self {
        Self::with(EndKind::Goto, smallvec::smallvec![target])
    }

    pub fn if_(
        x: ValueId,
        cond: Condition,
        y: ValueId,
        true_successor: BlockId,
        false_successor: BlockId,
    ) -> Self {
        Self::with(
            EndKind::If {
                x,
                cond,
                y,
                unordered_is_true: false,
            },
            smallvec::smallvec![true_successor, false_successor],
        )
    }

    pub fn if_instance_of(
        object: ValueId,
        target: TypeRef,
        true_successor: BlockId,
        false_successor: BlockId,
    ) -> Self {
        Self::with(
            EndKind::IfInstanceOf {
                object,
                target,
                test_is_instance: true,
            },
            smallvec::smallvec![true_successor, false_successor],
        )
    }

    pub fn table_switch(
        value: ValueId,
        low_key: i32,
        cases: &[BlockId],
        default: BlockId,
    ) -> Self {
        let mut successors: SmallVec<[BlockId; 2]> = cases.iter().copied().collect();
        successors.push(default);
        Self::with(EndKind::TableSwitch { value, low_key }, successors)
    }

    /// Keys must be strictly ascending and match `cases` one to one.
    pub fn lookup_switch(
        value: ValueId,
        keys: Vec<i32>,
        cases: &[BlockId],
        default: BlockId,
    ) -> Result<Self, StructuralError> {
        if keys.len() != cases.len() {
            return Err(StructuralError::new(
                "lookup_switch",
                None,
                format!("{} keys for {} cases", keys.len(), cases.len()),
            ));
        }
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(StructuralError::new(
                "lookup_switch",
                None,
                "keys are not sorted",
            ));
        }
        let mut successors: SmallVec<[BlockId; 2]> = cases.iter().copied().collect();
        successors.push(default);
        Ok(Self::with(EndKind::LookupSwitch { value, keys }, successors))
    }

    pub fn return_(result: Option<ValueId>) -> Self {
        Self::with(EndKind::Return { result }, SmallVec::new())
    }

    pub fn throw(exception: ValueId) -> Self {
        Self::with(EndKind::Throw { exception }, SmallVec::new())
    }

    pub fn base(standard_entry: BlockId, osr_entry: Option<BlockId>) -> Self {
        let mut successors = SmallVec::new();
        if let Some(osr) = osr_entry {
            successors.push(osr);
        }
        successors.push(standard_entry);
        Self::with(EndKind::Base, successors)
    }

    pub fn with_state_after(mut self, state: FrameState) -> Self {
        self.state_after = Some(state);
        self
    }

    #[inline]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    #[inline]
    pub fn successor_count(&self) -> usize {
        self.successors.len()
    }

    #[inline]
    pub fn successor_at(&self, i: usize) -> Option<BlockId> {
        self.successors.get(i).copied()
    }

    pub fn default_successor(&self) -> Option<BlockId> {
        self.successors.last().copied()
    }

    /// The block this terminator ends, once installed.
    pub fn begin(&self) -> Option<BlockId> {
        self.begin
    }

    pub(crate) fn set_begin(&mut self, begin: Option<BlockId>) {
        self.begin = begin;
    }

    pub(crate) fn successors_mut(&mut self) -> &mut SmallVec<[BlockId; 2]> {
        &mut self.successors
    }

    pub fn standard_entry(&self) -> Option<BlockId> {
        match self.kind {
            EndKind::Base => self.default_successor(),
            _ => None,
        }
    }

    pub fn osr_entry(&self) -> Option<BlockId> {
        match self.kind {
            EndKind::Base if self.successors.len() == 2 => Some(self.successors[0]),
            _ => None,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind, EndKind::Return { .. })
    }

    pub fn is_throw(&self) -> bool {
        matches!(self.kind, EndKind::Throw { .. })
    }

    pub fn is_base(&self) -> bool {
        matches!(self.kind, EndKind::Base)
    }

    /// Number of successors this terminator kind requires, or `None` for
    /// switches, which take any count of at least one.
    pub fn expected_successor_count(&self) -> Option<usize> {
        match &self.kind {
            EndKind::Goto => Some(1),
            EndKind::If { .. } | EndKind::IfInstanceOf { .. } => Some(2),
            EndKind::LookupSwitch { keys, .. } => Some(keys.len() + 1),
            EndKind::TableSwitch { .. } => None,
            EndKind::Return { .. } | EndKind::Throw { .. } => Some(0),
            EndKind::Base => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            EndKind::Goto => "Goto",
            EndKind::If { .. } => "If",
            EndKind::IfInstanceOf { .. } => "IfInstanceOf",
            EndKind::TableSwitch { .. } => "TableSwitch",
            EndKind::LookupSwitch { .. } => "LookupSwitch",
            EndKind::Return { .. } => "Return",
            EndKind::Throw { .. } => "Throw",
            EndKind::Base => "Base",
        }
    }
}

/// The closed set of HIR instructions.
#[derive(Debug, Clone)]
pub enum Instruction {
    Constant(Constant),
    Local(Local),
    Phi(Phi),
    ArithmeticOp(ArithmeticOp),
    LogicOp(LogicOp),
    ShiftOp(ShiftOp),
    NegateOp(NegateOp),
    CompareOp(CompareOp),
    Convert(Convert),
    IfOp(IfOp),
    NullCheck(NullCheck),
    LoadField(LoadField),
    StoreField(StoreField),
    LoadIndexed(LoadIndexed),
    StoreIndexed(StoreIndexed),
    ArrayLength(ArrayLength),
    ExceptionObject,
    OsrEntry,
    NewInstance(NewInstance),
    NewTypeArray(NewTypeArray),
    NewObjectArray(NewObjectArray),
    CheckCast(TypeCheck),
    InstanceOf(TypeCheck),
    Invoke(Invoke),
    MonitorEnter(MonitorOp),
    MonitorExit(MonitorOp),
    BlockBegin(BlockId),
    BlockEnd(BlockEnd),
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Constant(_) => "Constant",
            Instruction::Local(_) => "Local",
            Instruction::Phi(_) => "Phi",
            Instruction::ArithmeticOp(_) => "ArithmeticOp",
            Instruction::LogicOp(_) => "LogicOp",
            Instruction::ShiftOp(_) => "ShiftOp",
            Instruction::NegateOp(_) => "NegateOp",
            Instruction::CompareOp(_) => "CompareOp",
            Instruction::Convert(_) => "Convert",
            Instruction::IfOp(_) => "IfOp",
            Instruction::NullCheck(_) => "NullCheck",
            Instruction::LoadField(_) => "LoadField",
            Instruction::StoreField(_) => "StoreField",
            Instruction::LoadIndexed(_) => "LoadIndexed",
            Instruction::StoreIndexed(_) => "StoreIndexed",
            Instruction::ArrayLength(_) => "ArrayLength",
            Instruction::ExceptionObject => "ExceptionObject",
            Instruction::OsrEntry => "OsrEntry",
            Instruction::NewInstance(_) => "NewInstance",
            Instruction::NewTypeArray(_) => "NewTypeArray",
            Instruction::NewObjectArray(_) => "NewObjectArray",
            Instruction::CheckCast(_) => "CheckCast",
            Instruction::InstanceOf(_) => "InstanceOf",
            Instruction::Invoke(_) => "Invoke",
            Instruction::MonitorEnter(_) => "MonitorEnter",
            Instruction::MonitorExit(_) => "MonitorExit",
            Instruction::BlockBegin(_) => "BlockBegin",
            Instruction::BlockEnd(end) => end.name(),
        }
    }

    pub fn as_phi(&self) -> Option<&Phi> {
        match self {
            Instruction::Phi(phi) => Some(phi),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&ConstantValue> {
        match self {
            Instruction::Constant(c) => Some(&c.value),
            _ => None,
        }
    }

    pub fn as_block_end(&self) -> Option<&BlockEnd> {
        match self {
            Instruction::BlockEnd(end) => Some(end),
            _ => None,
        }
    }

    pub fn as_block_end_mut(&mut self) -> Option<&mut BlockEnd> {
        match self {
            Instruction::BlockEnd(end) => Some(end),
            _ => None,
        }
    }

    pub fn is_block_end(&self) -> bool {
        matches!(self, Instruction::BlockEnd(_))
    }

    pub fn is_block_begin(&self) -> bool {
        matches!(self, Instruction::BlockBegin(_))
    }

    /// Phis and locals live in states, never in a block's instruction list.
    pub fn is_state_only(&self) -> bool {
        matches!(self, Instruction::Phi(_) | Instruction::Local(_))
    }

    /// Whether the instruction can fault at run time, given the kind and
    /// flags of the value it produces.
    pub fn can_trap(&self, kind: ValueKind, flags: ValueFlags) -> bool {
        let needs_null_check = !flags.contains(ValueFlags::NO_NULL_CHECK);
        match self {
            Instruction::ArithmeticOp(op) => {
                op.op.can_trap(kind) && !flags.contains(ValueFlags::NO_ZERO_CHECK)
            }
            Instruction::NullCheck(_) => needs_null_check,
            Instruction::LoadField(f) => {
                (f.object.is_some() && needs_null_check)
                    || flags.contains(ValueFlags::NEEDS_PATCHING)
            }
            Instruction::StoreField(f) => {
                (f.object.is_some() && needs_null_check)
                    || flags.contains(ValueFlags::NEEDS_PATCHING)
            }
            Instruction::LoadIndexed(_) => {
                needs_null_check || !flags.contains(ValueFlags::NO_RANGE_CHECK)
            }
            Instruction::StoreIndexed(s) => {
                needs_null_check
                    || !flags.contains(ValueFlags::NO_RANGE_CHECK)
                    || (s.element_kind == ValueKind::Object
                        && !flags.contains(ValueFlags::NO_STORE_CHECK))
            }
            Instruction::ArrayLength(_) => needs_null_check,
            Instruction::NewInstance(_)
            | Instruction::NewTypeArray(_)
            | Instruction::NewObjectArray(_)
            | Instruction::CheckCast(_)
            | Instruction::Invoke(_)
            | Instruction::MonitorEnter(_)
            | Instruction::MonitorExit(_) => true,
            Instruction::InstanceOf(_) => flags.contains(ValueFlags::NEEDS_PATCHING),
            Instruction::BlockEnd(end) => end.is_throw(),
            _ => false,
        }
    }

    /// Whether the instruction writes memory or otherwise changes state that
    /// other code can observe.
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            Instruction::StoreField(_)
                | Instruction::StoreIndexed(_)
                | Instruction::Invoke(_)
                | Instruction::MonitorEnter(_)
                | Instruction::MonitorExit(_)
        )
    }

    /// Apply `f` to every direct data input.
    pub fn input_values_do(&self, mut f: impl FnMut(ValueId)) {
        match self {
            Instruction::Constant(_)
            | Instruction::Local(_)
            | Instruction::Phi(_)
            | Instruction::ExceptionObject
            | Instruction::OsrEntry
            | Instruction::NewInstance(_)
            | Instruction::BlockBegin(_) => {}
            Instruction::ArithmeticOp(op) => {
                f(op.x);
                f(op.y);
            }
            Instruction::LogicOp(op) => {
                f(op.x);
                f(op.y);
            }
            Instruction::ShiftOp(op) => {
                f(op.x);
                f(op.y);
            }
            Instruction::NegateOp(op) => f(op.x),
            Instruction::CompareOp(op) => {
                f(op.x);
                f(op.y);
            }
            Instruction::Convert(op) => f(op.value),
            Instruction::IfOp(op) => {
                f(op.x);
                f(op.y);
                f(op.true_value);
                f(op.false_value);
            }
            Instruction::NullCheck(op) => f(op.object),
            Instruction::LoadField(op) => {
                if let Some(object) = op.object {
                    f(object);
                }
            }
            Instruction::StoreField(op) => {
                if let Some(object) = op.object {
                    f(object);
                }
                f(op.value);
            }
            Instruction::LoadIndexed(op) => {
                f(op.array);
                f(op.index);
                if let Some(length) = op.length {
                    f(length);
                }
            }
            Instruction::StoreIndexed(op) => {
                f(op.array);
                f(op.index);
                if let Some(length) = op.length {
                    f(length);
                }
                f(op.value);
            }
            Instruction::ArrayLength(op) => f(op.array),
            Instruction::NewTypeArray(op) => f(op.length),
            Instruction::NewObjectArray(op) => f(op.length),
            Instruction::CheckCast(op) | Instruction::InstanceOf(op) => f(op.object),
            Instruction::Invoke(op) => {
                if let Some(receiver) = op.receiver {
                    f(receiver);
                }
                for &arg in &op.arguments {
                    f(arg);
                }
            }
            Instruction::MonitorEnter(op) | Instruction::MonitorExit(op) => f(op.object),
            Instruction::BlockEnd(end) => match &end.kind {
                EndKind::Goto | EndKind::Base => {}
                EndKind::If { x, y, .. } => {
                    f(*x);
                    f(*y);
                }
                EndKind::IfInstanceOf { object, .. } => f(*object),
                EndKind::TableSwitch { value, .. } | EndKind::LookupSwitch { value, .. } => {
                    f(*value)
                }
                EndKind::Return { result } => {
                    if let Some(result) = result {
                        f(*result);
                    }
                }
                EndKind::Throw { exception } => f(*exception),
            },
        }
    }

    /// Apply `f` to every direct data input slot, allowing it to be rewritten.
    pub fn input_values_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            Instruction::Constant(_)
            | Instruction::Local(_)
            | Instruction::Phi(_)
            | Instruction::ExceptionObject
            | Instruction::OsrEntry
            | Instruction::NewInstance(_)
            | Instruction::BlockBegin(_) => {}
            Instruction::ArithmeticOp(op) => {
                f(&mut op.x);
                f(&mut op.y);
            }
            Instruction::LogicOp(op) => {
                f(&mut op.x);
                f(&mut op.y);
            }
            Instruction::ShiftOp(op) => {
                f(&mut op.x);
                f(&mut op.y);
            }
            Instruction::NegateOp(op) => f(&mut op.x),
            Instruction::CompareOp(op) => {
                f(&mut op.x);
                f(&mut op.y);
            }
            Instruction::Convert(op) => f(&mut op.value),
            Instruction::IfOp(op) => {
                f(&mut op.x);
                f(&mut op.y);
                f(&mut op.true_value);
                f(&mut op.false_value);
            }
            Instruction::NullCheck(op) => f(&mut op.object),
            Instruction::LoadField(op) => {
                if let Some(object) = op.object.as_mut() {
                    f(object);
                }
            }
            Instruction::StoreField(op) => {
                if let Some(object) = op.object.as_mut() {
                    f(object);
                }
                f(&mut op.value);
            }
            Instruction::LoadIndexed(op) => {
                f(&mut op.array);
                f(&mut op.index);
                if let Some(length) = op.length.as_mut() {
                    f(length);
                }
            }
            Instruction::StoreIndexed(op) => {
                f(&mut op.array);
                f(&mut op.index);
                if let Some(length) = op.length.as_mut() {
                    f(length);
                }
                f(&mut op.value);
            }
            Instruction::ArrayLength(op) => f(&mut op.array),
            Instruction::NewTypeArray(op) => f(&mut op.length),
            Instruction::NewObjectArray(op) => f(&mut op.length),
            Instruction::CheckCast(op) | Instruction::InstanceOf(op) => f(&mut op.object),
            Instruction::Invoke(op) => {
                if let Some(receiver) = op.receiver.as_mut() {
                    f(receiver);
                }
                for arg in op.arguments.iter_mut() {
                    f(arg);
                }
            }
            Instruction::MonitorEnter(op) | Instruction::MonitorExit(op) => f(&mut op.object),
            Instruction::BlockEnd(end) => match &mut end.kind {
                EndKind::Goto | EndKind::Base => {}
                EndKind::If { x, y, .. } => {
                    f(x);
                    f(y);
                }
                EndKind::IfInstanceOf { object, .. } => f(object),
                EndKind::TableSwitch { value, .. } | EndKind::LookupSwitch { value, .. } => {
                    f(value)
                }
                EndKind::Return { result } => {
                    if let Some(result) = result.as_mut() {
                        f(result);
                    }
                }
                EndKind::Throw { exception } => f(exception),
            },
        }
    }

    /// Direct inputs collected into a small vector.
    pub fn inputs(&self) -> SmallVec<[ValueId; 4]> {
        let mut inputs = SmallVec::new();
        self.input_values_do(|v| inputs.push(v));
        inputs
    }

    /// Hash for value numbering, or 0 if the instruction is not eligible.
    ///
    /// Only pure instructions participate. Two instructions with equal
    /// non-zero numbers still need [`Instruction::value_equal`] to match.
    pub fn value_number(&self, kind: ValueKind, flags: ValueFlags) -> u64 {
        fn number(tag: u8, payload: &impl Hash) -> u64 {
            let mut hasher = FxHasher::default();
            tag.hash(&mut hasher);
            payload.hash(&mut hasher);
            // zero is reserved for "not numberable"
            hasher.finish().max(1)
        }

        match self {
            Instruction::Constant(c) => number(1, c),
            Instruction::ArithmeticOp(op) if !self.can_trap(kind, flags) => number(2, op),
            Instruction::LogicOp(op) => number(3, op),
            Instruction::ShiftOp(op) => number(4, op),
            Instruction::NegateOp(op) => number(5, op),
            Instruction::CompareOp(op) => number(6, op),
            Instruction::Convert(op) => number(7, op),
            Instruction::IfOp(op) => number(8, op),
            Instruction::ArrayLength(op) => number(9, op),
            _ => 0,
        }
    }

    /// Structural equality for value numbering.
    pub fn value_equal(&self, other: &Instruction) -> bool {
        match (self, other) {
            (Instruction::Constant(a), Instruction::Constant(b)) => a == b,
            (Instruction::ArithmeticOp(a), Instruction::ArithmeticOp(b)) => a == b,
            (Instruction::LogicOp(a), Instruction::LogicOp(b)) => a == b,
            (Instruction::ShiftOp(a), Instruction::ShiftOp(b)) => a == b,
            (Instruction::NegateOp(a), Instruction::NegateOp(b)) => a == b,
            (Instruction::CompareOp(a), Instruction::CompareOp(b)) => a == b,
            (Instruction::Convert(a), Instruction::Convert(b)) => a == b,
            (Instruction::IfOp(a), Instruction::IfOp(b)) => a == b,
            (Instruction::ArrayLength(a), Instruction::ArrayLength(b)) => a == b,
            _ => false,
        }
    }
}

/// One method per instruction kind. [`accept`] dispatches to exactly one.
pub trait ValueVisitor {
    fn visit_constant(&mut self, value: &Value, op: &Constant);
    fn visit_local(&mut self, value: &Value, op: &Local);
    fn visit_phi(&mut self, value: &Value, op: &Phi);
    fn visit_arithmetic_op(&mut self, value: &Value, op: &ArithmeticOp);
    fn visit_logic_op(&mut self, value: &Value, op: &LogicOp);
    fn visit_shift_op(&mut self, value: &Value, op: &ShiftOp);
    fn visit_negate_op(&mut self, value: &Value, op: &NegateOp);
    fn visit_compare_op(&mut self, value: &Value, op: &CompareOp);
    fn visit_convert(&mut self, value: &Value, op: &Convert);
    fn visit_if_op(&mut self, value: &Value, op: &IfOp);
    fn visit_null_check(&mut self, value: &Value, op: &NullCheck);
    fn visit_load_field(&mut self, value: &Value, op: &LoadField);
    fn visit_store_field(&mut self, value: &Value, op: &StoreField);
    fn visit_load_indexed(&mut self, value: &Value, op: &LoadIndexed);
    fn visit_store_indexed(&mut self, value: &Value, op: &StoreIndexed);
    fn visit_array_length(&mut self, value: &Value, op: &ArrayLength);
    fn visit_exception_object(&mut self, value: &Value);
    fn visit_osr_entry(&mut self, value: &Value);
    fn visit_new_instance(&mut self, value: &Value, op: &NewInstance);
    fn visit_new_type_array(&mut self, value: &Value, op: &NewTypeArray);
    fn visit_new_object_array(&mut self, value: &Value, op: &NewObjectArray);
    fn visit_check_cast(&mut self, value: &Value, op: &TypeCheck);
    fn visit_instance_of(&mut self, value: &Value, op: &TypeCheck);
    fn visit_invoke(&mut self, value: &Value, op: &Invoke);
    fn visit_monitor_enter(&mut self, value: &Value, op: &MonitorOp);
    fn visit_monitor_exit(&mut self, value: &Value, op: &MonitorOp);
    fn visit_block_begin(&mut self, value: &Value, block: BlockId);
    fn visit_goto(&mut self, value: &Value, end: &BlockEnd);
    fn visit_if(&mut self, value: &Value, end: &BlockEnd);
    fn visit_if_instance_of(&mut self, value: &Value, end: &BlockEnd);
    fn visit_table_switch(&mut self, value: &Value, end: &BlockEnd);
    fn visit_lookup_switch(&mut self, value: &Value, end: &BlockEnd);
    fn visit_return(&mut self, value: &Value, end: &BlockEnd);
    fn visit_throw(&mut self, value: &Value, end: &BlockEnd);
    fn visit_base(&mut self, value: &Value, end: &BlockEnd);
}

/// Dispatch `value` to the visitor method for its kind.
pub fn accept<V: ValueVisitor + ?Sized>(value: &Value, visitor: &mut V) {
    match &value.op {
        Instruction::Constant(op) => visitor.visit_constant(value, op),
        Instruction::Local(op) => visitor.visit_local(value, op),
        Instruction::Phi(op) => visitor.visit_phi(value, op),
        Instruction::ArithmeticOp(op) => visitor.visit_arithmetic_op(value, op),
        Instruction::LogicOp(op) => visitor.visit_logic_op(value, op),
        Instruction::ShiftOp(op) => visitor.visit_shift_op(value, op),
        Instruction::NegateOp(op) => visitor.visit_negate_op(value, op),
        Instruction::CompareOp(op) => visitor.visit_compare_op(value, op),
        Instruction::Convert(op) => visitor.visit_convert(value, op),
        Instruction::IfOp(op) => visitor.visit_if_op(value, op),
        Instruction::NullCheck(op) => visitor.visit_null_check(value, op),
        Instruction::LoadField(op) => visitor.visit_load_field(value, op),
        Instruction::StoreField(op) => visitor.visit_store_field(value, op),
        Instruction::LoadIndexed(op) => visitor.visit_load_indexed(value, op),
        Instruction::StoreIndexed(op) => visitor.visit_store_indexed(value, op),
        Instruction::ArrayLength(op) => visitor.visit_array_length(value, op),
        Instruction::ExceptionObject => visitor.visit_exception_object(value),
        Instruction::OsrEntry => visitor.visit_osr_entry(value),
        Instruction::NewInstance(op) => visitor.visit_new_instance(value, op),
        Instruction::NewTypeArray(op) => visitor.visit_new_type_array(value, op),
        Instruction::NewObjectArray(op) => visitor.visit_new_object_array(value, op),
        Instruction::CheckCast(op) => visitor.visit_check_cast(value, op),
        Instruction::InstanceOf(op) => visitor.visit_instance_of(value, op),
        Instruction::Invoke(op) => visitor.visit_invoke(value, op),
        Instruction::MonitorEnter(op) => visitor.visit_monitor_enter(value, op),
        Instruction::MonitorExit(op) => visitor.visit_monitor_exit(value, op),
        Instruction::BlockBegin(block) => visitor.visit_block_begin(value, *block),
        Instruction::BlockEnd(end) => match end.kind {
            EndKind::Goto => visitor.visit_goto(value, end),
            EndKind::If { .. } => visitor.visit_if(value, end),
            EndKind::IfInstanceOf { .. } => visitor.visit_if_instance_of(value, end),
            EndKind::TableSwitch { .. } => visitor.visit_table_switch(value, end),
            EndKind::LookupSwitch { .. } => visitor.visit_lookup_switch(value, end),
            EndKind::Return { .. } => visitor.visit_return(value, end),
            EndKind::Throw { .. } => visitor.visit_throw(value, end),
            EndKind::Base => visitor.visit_base(value, end),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(x: u32, y: u32) -> Instruction {
        Instruction::ArithmeticOp(ArithmeticOp {
            op: ArithmeticOpcode::Add,
            x: ValueId(x),
            y: ValueId(y),
        })
    }

    #[test]
    fn test_phi_slot_encoding() {
        let local = Phi::for_local(BlockId(2), 3);
        assert_eq!(local.local_index(), Some(3));
        assert_eq!(local.stack_index(), None);

        let stack = Phi::for_stack(BlockId(2), 0);
        assert_eq!(stack.index, -1);
        assert_eq!(stack.stack_index(), Some(0));
        assert_eq!(Phi::for_stack(BlockId(2), 4).index, -5);
    }

    #[test]
    fn test_value_numbering_pure_only() {
        let flags = ValueFlags::empty();
        let int = ValueKind::Int;
        let a = add(1, 2);
        let b = add(1, 2);
        assert_ne!(a.value_number(int, flags), 0);
        assert_eq!(a.value_number(int, flags), b.value_number(int, flags));
        assert!(a.value_equal(&b));
        assert!(!a.value_equal(&add(2, 1)));

        let div = Instruction::ArithmeticOp(ArithmeticOp {
            op: ArithmeticOpcode::Div,
            x: ValueId(1),
            y: ValueId(2),
        });
        assert_eq!(div.value_number(int, flags), 0);
        assert_ne!(div.value_number(int, ValueFlags::NO_ZERO_CHECK), 0);
        // floating point division never traps
        assert_ne!(div.value_number(ValueKind::Double, flags), 0);

        let store = Instruction::MonitorEnter(MonitorOp {
            object: ValueId(0),
            lock_number: 0,
        });
        assert_eq!(store.value_number(ValueKind::Void, flags), 0);
        assert!(!store.value_equal(&store.clone()));
    }

    #[test]
    fn test_input_rewrite() {
        let mut op = Instruction::IfOp(IfOp {
            x: ValueId(1),
            cond: Condition::Lt,
            y: ValueId(2),
            true_value: ValueId(1),
            false_value: ValueId(3),
        });
        op.input_values_mut(|v| {
            if *v == ValueId(1) {
                *v = ValueId(9);
            }
        });
        assert_eq!(
            op.inputs().as_slice(),
            &[ValueId(9), ValueId(2), ValueId(9), ValueId(3)]
        );
    }

    #[test]
    fn test_block_end_successor_layout() {
        let base = BlockEnd::base(BlockId(1), Some(BlockId(2)));
        assert_eq!(base.successors(), &[BlockId(2), BlockId(1)]);
        assert_eq!(base.standard_entry(), Some(BlockId(1)));
        assert_eq!(base.osr_entry(), Some(BlockId(2)));

        let switch = BlockEnd::table_switch(ValueId(0), 10, &[BlockId(4), BlockId(5)], BlockId(6));
        assert_eq!(switch.default_successor(), Some(BlockId(6)));
        assert_eq!(switch.successor_count(), 3);

        assert!(BlockEnd::lookup_switch(ValueId(0), vec![3, 1], &[BlockId(1), BlockId(2)], BlockId(3)).is_err());
        assert!(BlockEnd::lookup_switch(ValueId(0), vec![1], &[BlockId(1), BlockId(2)], BlockId(3)).is_err());
    }

    #[test]
    fn test_trapping_instructions() {
        let load = Instruction::ArrayLength(ArrayLength { array: ValueId(0) });
        assert!(load.can_trap(ValueKind::Int, ValueFlags::empty()));
        assert!(!load.can_trap(ValueKind::Int, ValueFlags::NO_NULL_CHECK));
        assert!(!add(0, 1).can_trap(ValueKind::Int, ValueFlags::empty()));
    }
}
