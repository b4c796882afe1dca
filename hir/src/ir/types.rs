//! Value kinds, constants and opcodes

use serde::{Deserialize, Serialize};
use std::fmt;

/// The basic type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Object,
    /// Machine word or raw pointer
    Word,
    Void,
    Illegal,
}

impl ValueKind {
    /// Long and double occupy two local or stack slots.
    pub fn is_double_word(self) -> bool {
        matches!(self, ValueKind::Long | ValueKind::Double)
    }

    pub fn is_single_word(self) -> bool {
        !self.is_double_word() && !matches!(self, ValueKind::Void | ValueKind::Illegal)
    }

    /// Number of state slots a value of this kind occupies.
    pub fn size_in_slots(self) -> usize {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            ValueKind::Void | ValueKind::Illegal => 0,
            _ => 1,
        }
    }

    pub fn is_illegal(self) -> bool {
        self == ValueKind::Illegal
    }

    pub fn is_void(self) -> bool {
        self == ValueKind::Void
    }

    pub fn is_float_kind(self) -> bool {
        matches!(self, ValueKind::Float | ValueKind::Double)
    }

    pub fn type_char(self) -> char {
        match self {
            ValueKind::Int => 'i',
            ValueKind::Long => 'l',
            ValueKind::Float => 'f',
            ValueKind::Double => 'd',
            ValueKind::Object => 'a',
            ValueKind::Word => 'w',
            ValueKind::Void => 'v',
            ValueKind::Illegal => '-',
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Object => "object",
            ValueKind::Word => "word",
            ValueKind::Void => "void",
            ValueKind::Illegal => "illegal",
        };
        write!(f, "{}", name)
    }
}

/// A constant payload. Floating point values are held as raw bits so that
/// equality is bitwise, which is what value numbering and constant merging
/// need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    Word(u64),
    Null,
}

impl ConstantValue {
    pub fn float(value: f32) -> Self {
        ConstantValue::Float(value.to_bits())
    }

    pub fn double(value: f64) -> Self {
        ConstantValue::Double(value.to_bits())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ConstantValue::Int(_) => ValueKind::Int,
            ConstantValue::Long(_) => ValueKind::Long,
            ConstantValue::Float(_) => ValueKind::Float,
            ConstantValue::Double(_) => ValueKind::Double,
            ConstantValue::Word(_) => ValueKind::Word,
            ConstantValue::Null => ValueKind::Object,
        }
    }

    /// Whether two constants denote the same value.
    pub fn equivalent(&self, other: &ConstantValue) -> bool {
        self == other
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConstantValue::Null)
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Int(v) => write!(f, "{}", v),
            ConstantValue::Long(v) => write!(f, "{}L", v),
            ConstantValue::Float(bits) => write!(f, "{}f", f32::from_bits(*bits)),
            ConstantValue::Double(bits) => write!(f, "{}d", f64::from_bits(*bits)),
            ConstantValue::Word(v) => write!(f, "0x{:x}w", v),
            ConstantValue::Null => write!(f, "null"),
        }
    }
}

/// Arithmetic opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOpcode {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithmeticOpcode {
    /// Integer division and remainder fault on a zero divisor.
    pub fn can_trap(self, kind: ValueKind) -> bool {
        matches!(self, ArithmeticOpcode::Div | ArithmeticOpcode::Rem)
            && matches!(kind, ValueKind::Int | ValueKind::Long)
    }

    pub fn is_commutative(self) -> bool {
        matches!(self, ArithmeticOpcode::Add | ArithmeticOpcode::Mul)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOpcode::Add => "+",
            ArithmeticOpcode::Sub => "-",
            ArithmeticOpcode::Mul => "*",
            ArithmeticOpcode::Div => "/",
            ArithmeticOpcode::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicOpcode {
    And,
    Or,
    Xor,
}

impl LogicOpcode {
    pub fn symbol(self) -> &'static str {
        match self {
            LogicOpcode::And => "&",
            LogicOpcode::Or => "|",
            LogicOpcode::Xor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftOpcode {
    Shl,
    Shr,
    Ushr,
}

impl ShiftOpcode {
    pub fn symbol(self) -> &'static str {
        match self {
            ShiftOpcode::Shl => "<<",
            ShiftOpcode::Shr => ">>",
            ShiftOpcode::Ushr => ">>>",
        }
    }
}

/// Three-way comparisons producing -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOpcode {
    Lcmp,
    Fcmpl,
    Fcmpg,
    Dcmpl,
    Dcmpg,
}

impl CompareOpcode {
    pub fn operand_kind(self) -> ValueKind {
        match self {
            CompareOpcode::Lcmp => ValueKind::Long,
            CompareOpcode::Fcmpl | CompareOpcode::Fcmpg => ValueKind::Float,
            CompareOpcode::Dcmpl | CompareOpcode::Dcmpg => ValueKind::Double,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompareOpcode::Lcmp => "lcmp",
            CompareOpcode::Fcmpl => "fcmpl",
            CompareOpcode::Fcmpg => "fcmpg",
            CompareOpcode::Dcmpl => "dcmpl",
            CompareOpcode::Dcmpg => "dcmpg",
        }
    }
}

/// Branch conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Condition {
    pub fn negate(self) -> Condition {
        match self {
            Condition::Eq => Condition::Ne,
            Condition::Ne => Condition::Eq,
            Condition::Lt => Condition::Ge,
            Condition::Le => Condition::Gt,
            Condition::Gt => Condition::Le,
            Condition::Ge => Condition::Lt,
        }
    }

    /// The condition with operands swapped.
    pub fn mirror(self) -> Condition {
        match self {
            Condition::Eq => Condition::Eq,
            Condition::Ne => Condition::Ne,
            Condition::Lt => Condition::Gt,
            Condition::Le => Condition::Ge,
            Condition::Gt => Condition::Lt,
            Condition::Ge => Condition::Le,
        }
    }

    pub fn operator(self) -> &'static str {
        match self {
            Condition::Eq => "==",
            Condition::Ne => "!=",
            Condition::Lt => "<",
            Condition::Le => "<=",
            Condition::Gt => ">",
            Condition::Ge => ">=",
        }
    }
}

/// Backend operand attached to a value by the register allocator.
///
/// The HIR never looks inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operand(pub u32);
