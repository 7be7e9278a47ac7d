//! Operator-overload catalogue.
//!
//! [`Metamethod`] lists the reserved descriptor slots a bound type may fill.
//! The binding generator classifies a method as a metamethod when its name
//! matches [`Metamethod::name`], and the VM facade looks the same names up
//! when it dispatches an operation on a table or userdata.

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Reserved descriptor slots for operator overloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Metamethod {
    /// `t[k]` read.
    Index = 0,
    /// `t[k] = v` write.
    NewIndex,
    /// `#t`.
    Len,
    /// String conversion.
    ToString,
    /// `a + b`.
    Add,
    /// `a - b`.
    Sub,
    /// `a * b`.
    Mul,
    /// `a / b`.
    Div,
    /// `a // b`.
    IDiv,
    /// `a % b`.
    Mod,
    /// `a ^ b`.
    Pow,
    /// `-a`.
    Unm,
    /// `a == b`.
    Eq,
    /// `a < b`.
    Lt,
    /// `a <= b`.
    Le,
    /// `a .. b`.
    Concat,
}

/// Signature category of a metamethod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetamethodCategory {
    /// One operand, any return.
    Unary,
    /// Two operands, any return.
    Binary,
    /// One operand, numeric return.
    Length,
    /// One operand, string return.
    ToString,
    /// Object and key, any return.
    Index,
    /// Object, key and value, no return.
    NewIndex,
}

impl MetamethodCategory {
    /// Number of parameters, including the receiver.
    pub const fn arity(self) -> usize {
        match self {
            MetamethodCategory::Unary
            | MetamethodCategory::Length
            | MetamethodCategory::ToString => 1,
            MetamethodCategory::Binary | MetamethodCategory::Index => 2,
            MetamethodCategory::NewIndex => 3,
        }
    }

    /// Whether the metamethod must produce a value.
    pub const fn returns_value(self) -> bool {
        !matches!(self, MetamethodCategory::NewIndex)
    }
}

impl Metamethod {
    /// Every metamethod, in slot order.
    pub const ALL: [Metamethod; 16] = [
        Metamethod::Index,
        Metamethod::NewIndex,
        Metamethod::Len,
        Metamethod::ToString,
        Metamethod::Add,
        Metamethod::Sub,
        Metamethod::Mul,
        Metamethod::Div,
        Metamethod::IDiv,
        Metamethod::Mod,
        Metamethod::Pow,
        Metamethod::Unm,
        Metamethod::Eq,
        Metamethod::Lt,
        Metamethod::Le,
        Metamethod::Concat,
    ];

    /// The descriptor field name of this metamethod.
    pub const fn name(self) -> &'static str {
        match self {
            Metamethod::Index => "__index",
            Metamethod::NewIndex => "__newindex",
            Metamethod::Len => "__len",
            Metamethod::ToString => "__tostring",
            Metamethod::Add => "__add",
            Metamethod::Sub => "__sub",
            Metamethod::Mul => "__mul",
            Metamethod::Div => "__div",
            Metamethod::IDiv => "__idiv",
            Metamethod::Mod => "__mod",
            Metamethod::Pow => "__pow",
            Metamethod::Unm => "__unm",
            Metamethod::Eq => "__eq",
            Metamethod::Lt => "__lt",
            Metamethod::Le => "__le",
            Metamethod::Concat => "__concat",
        }
    }

    /// Look a metamethod up by descriptor field name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// The signature category used by the validator.
    pub const fn category(self) -> MetamethodCategory {
        match self {
            Metamethod::Index => MetamethodCategory::Index,
            Metamethod::NewIndex => MetamethodCategory::NewIndex,
            Metamethod::Len => MetamethodCategory::Length,
            Metamethod::ToString => MetamethodCategory::ToString,
            Metamethod::Unm => MetamethodCategory::Unary,
            _ => MetamethodCategory::Binary,
        }
    }

    /// The set containing only this metamethod.
    pub fn flag(self) -> MetamethodSet {
        MetamethodSet::from_bits_truncate(1 << u8::from(self))
    }
}

bitflags! {
    /// Occupancy of a descriptor's reserved metamethod slots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MetamethodSet: u16 {
        const INDEX = 1 << 0;
        const NEW_INDEX = 1 << 1;
        const LEN = 1 << 2;
        const TO_STRING = 1 << 3;
        const ADD = 1 << 4;
        const SUB = 1 << 5;
        const MUL = 1 << 6;
        const DIV = 1 << 7;
        const IDIV = 1 << 8;
        const MOD = 1 << 9;
        const POW = 1 << 10;
        const UNM = 1 << 11;
        const EQ = 1 << 12;
        const LT = 1 << 13;
        const LE = 1 << 14;
        const CONCAT = 1 << 15;
    }
}

/// Arithmetic operations dispatched by [`State::arith`](crate::State::arith).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Unm,
}

impl ArithOp {
    /// The metamethod consulted when an operand is not a number.
    pub const fn metamethod(self) -> Metamethod {
        match self {
            ArithOp::Add => Metamethod::Add,
            ArithOp::Sub => Metamethod::Sub,
            ArithOp::Mul => Metamethod::Mul,
            ArithOp::Div => Metamethod::Div,
            ArithOp::IDiv => Metamethod::IDiv,
            ArithOp::Mod => Metamethod::Mod,
            ArithOp::Pow => Metamethod::Pow,
            ArithOp::Unm => Metamethod::Unm,
        }
    }

    /// Number of operands popped from the stack.
    pub const fn operands(self) -> usize {
        match self {
            ArithOp::Unm => 1,
            _ => 2,
        }
    }
}

/// Comparisons dispatched by [`State::compare`](crate::State::compare).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
}

impl CompareOp {
    /// The metamethod consulted for non-primitive operands.
    pub const fn metamethod(self) -> Metamethod {
        match self {
            CompareOp::Eq => Metamethod::Eq,
            CompareOp::Lt => Metamethod::Lt,
            CompareOp::Le => Metamethod::Le,
        }
    }
}
