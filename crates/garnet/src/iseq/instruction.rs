use std::rc::Rc;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use super::{CallData, Iseq};
use crate::intern::{StaticSymbols, Symbol};

/// An immutable value embedded in an instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Nil,
    True,
    False,
    Integer(i64),
    BigInt(BigInt),
    Float(f64),
    Symbol(Symbol),
}

/// Operand of `putspecialobject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialObject {
    /// The module methods are defined into (`def` target).
    CBase,
    /// The module constants are defined into.
    ConstBase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefineClassKind {
    Class { has_superclass: bool },
    Module,
    /// `class << obj`; the cbase operand is the object.
    SingletonClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ThrowKind {
    Break,
    Return,
}

/// Operators with a specialized instruction.
///
/// Each one falls back to an ordinary `send` of [`FastOp::method`] when its guard fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr)]
pub enum FastOp {
    #[strum(serialize = "opt_plus")]
    Plus,
    #[strum(serialize = "opt_minus")]
    Minus,
    #[strum(serialize = "opt_mult")]
    Mult,
    #[strum(serialize = "opt_div")]
    Div,
    #[strum(serialize = "opt_mod")]
    Mod,
    #[strum(serialize = "opt_lt")]
    Lt,
    #[strum(serialize = "opt_le")]
    Le,
    #[strum(serialize = "opt_gt")]
    Gt,
    #[strum(serialize = "opt_ge")]
    Ge,
    #[strum(serialize = "opt_eq")]
    Eq,
    #[strum(serialize = "opt_neq")]
    Neq,
    #[strum(serialize = "opt_aref")]
    Aref,
    #[strum(serialize = "opt_aset")]
    Aset,
    #[strum(serialize = "opt_ltlt")]
    Ltlt,
    #[strum(serialize = "opt_length")]
    Length,
}

impl FastOp {
    /// The method this operator dispatches to on the slow path.
    #[must_use]
    pub fn method(self) -> StaticSymbols {
        match self {
            Self::Plus => StaticSymbols::Plus,
            Self::Minus => StaticSymbols::Minus,
            Self::Mult => StaticSymbols::Mult,
            Self::Div => StaticSymbols::Div,
            Self::Mod => StaticSymbols::Mod,
            Self::Lt => StaticSymbols::Lt,
            Self::Le => StaticSymbols::Le,
            Self::Gt => StaticSymbols::Gt,
            Self::Ge => StaticSymbols::Ge,
            Self::Eq => StaticSymbols::Eq,
            Self::Neq => StaticSymbols::Neq,
            Self::Aref => StaticSymbols::Aref,
            Self::Aset => StaticSymbols::Aset,
            Self::Ltlt => StaticSymbols::Ltlt,
            Self::Length => StaticSymbols::Length,
        }
    }

    /// Number of arguments besides the receiver.
    #[must_use]
    pub fn argc(self) -> u32 {
        match self {
            Self::Length => 0,
            Self::Aset => 2,
            _ => 1,
        }
    }
}

/// One VM instruction.
///
/// Every instruction has a fixed stack effect given by [`Instruction::pops`] and
/// [`Instruction::pushes`]. Jump targets are instruction indexes within the same sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Instruction {
    Nop,
    PutNil,
    PutSelf,
    PutObject(Literal),
    /// Pushes a new, unfrozen String each time it runs.
    PutString(String),
    PutSpecialObject(SpecialObject),
    Pop,
    Dup,
    DupN(u32),
    Swap,
    /// Copies the value `n` slots below the top onto the top.
    TopN(u32),
    /// Overwrites the value `n` slots below the top with the top.
    SetN(u32),
    AdjustStack(u32),
    GetLocal {
        index: u32,
        level: u32,
    },
    SetLocal {
        index: u32,
        level: u32,
    },
    #[strum(serialize = "getinstancevariable")]
    GetInstanceVariable(Symbol),
    #[strum(serialize = "setinstancevariable")]
    SetInstanceVariable(Symbol),
    GetGlobal(Symbol),
    SetGlobal(Symbol),
    /// Pops the scope (nil for lexical lookup) and pushes the constant.
    GetConstant {
        name: Symbol,
        allow_nil: bool,
    },
    /// Pops `[value, cbase]`.
    SetConstant(Symbol),
    NewArray(u32),
    /// Pops `n` alternating keys and values.
    NewHash(u32),
    SplatArray,
    ConcatArray,
    /// Pops an array and pushes `count` elements (plus the rest array when `splat`), first
    /// element on top.
    ExpandArray {
        count: u32,
        splat: bool,
    },
    /// Pops `[object, string]`; pushes `string` if it is a String, else a default rendering of
    /// `object`.
    AnyToString,
    ObjToString(CallData),
    ConcatStrings(u32),
    ToRegexp {
        options: u32,
        count: u32,
    },
    Intern,
    Send {
        call_data: CallData,
        block: Option<Rc<Iseq>>,
    },
    InvokeSuper {
        call_data: CallData,
        block: Option<Rc<Iseq>>,
        /// `super` without parentheses: arguments are re-read from the method's parameters.
        zsuper: bool,
    },
    InvokeBlock(CallData),
    Opt {
        op: FastOp,
        call_data: CallData,
    },
    DefineMethod {
        name: Symbol,
        body: Rc<Iseq>,
    },
    /// Pops the object receiving the singleton method.
    #[strum(serialize = "definesmethod")]
    DefineSMethod {
        name: Symbol,
        body: Rc<Iseq>,
    },
    /// Pops `[cbase, superclass]` and pushes the value of the body.
    DefineClass {
        name: Symbol,
        body: Rc<Iseq>,
        kind: DefineClassKind,
    },
    /// Runs `body` the first time only; always pushes the first result.
    Once(Rc<Iseq>),
    Jump(usize),
    BranchIf(usize),
    BranchUnless(usize),
    BranchNil(usize),
    Leave,
    Throw(ThrowKind),
    /// Re-raises the error parked by an ensure handler, if any.
    EndEnsure,
}

impl Instruction {
    /// Instruction name as shown in traces, e.g. `"opt_lt"` or `"send"`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opt { op, .. } => op.into(),
            other => other.into(),
        }
    }

    /// Number of values consumed from the operand stack.
    #[must_use]
    pub fn pops(&self) -> usize {
        match self {
            Self::Nop
            | Self::PutNil
            | Self::PutSelf
            | Self::PutObject(_)
            | Self::PutString(_)
            | Self::PutSpecialObject(_)
            | Self::GetLocal { .. }
            | Self::GetInstanceVariable(_)
            | Self::GetGlobal(_)
            | Self::DefineMethod { .. }
            | Self::Once(_)
            | Self::Jump(_)
            | Self::EndEnsure => 0,
            Self::Pop
            | Self::Dup
            | Self::SetLocal { .. }
            | Self::SetInstanceVariable(_)
            | Self::SetGlobal(_)
            | Self::GetConstant { .. }
            | Self::SplatArray
            | Self::ExpandArray { .. }
            | Self::ObjToString(_)
            | Self::Intern
            | Self::DefineSMethod { .. }
            | Self::BranchIf(_)
            | Self::BranchUnless(_)
            | Self::BranchNil(_)
            | Self::Leave
            | Self::Throw(_) => 1,
            Self::Swap | Self::SetConstant(_) | Self::ConcatArray | Self::AnyToString | Self::DefineClass { .. } => 2,
            Self::DupN(n) | Self::AdjustStack(n) | Self::NewArray(n) | Self::NewHash(n) | Self::ConcatStrings(n) => {
                *n as usize
            }
            Self::TopN(n) | Self::SetN(n) => *n as usize + 1,
            Self::ToRegexp { count, .. } => *count as usize,
            Self::Send { call_data, .. } | Self::InvokeSuper { call_data, .. } | Self::Opt { call_data, .. } => {
                call_data.stack_operands()
            }
            Self::InvokeBlock(call_data) => call_data.stack_operands() - 1,
        }
    }

    /// Number of values produced onto the operand stack.
    #[must_use]
    pub fn pushes(&self) -> usize {
        match self {
            Self::Nop
            | Self::Pop
            | Self::SetLocal { .. }
            | Self::SetInstanceVariable(_)
            | Self::SetGlobal(_)
            | Self::SetConstant(_)
            | Self::AdjustStack(_)
            | Self::DefineMethod { .. }
            | Self::DefineSMethod { .. }
            | Self::Jump(_)
            | Self::BranchIf(_)
            | Self::BranchUnless(_)
            | Self::BranchNil(_)
            | Self::Leave
            | Self::Throw(_)
            | Self::EndEnsure => 0,
            Self::Dup | Self::Swap => 2,
            Self::DupN(n) => *n as usize * 2,
            Self::TopN(n) => *n as usize + 2,
            Self::SetN(n) => *n as usize + 1,
            Self::ExpandArray { count, splat } => *count as usize + usize::from(*splat),
            _ => 1,
        }
    }

    /// Whether control never falls through to the next instruction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Jump(_) | Self::Leave | Self::Throw(_))
    }

    /// Jump target, for branches and jumps.
    #[must_use]
    pub fn target(&self) -> Option<usize> {
        match self {
            Self::Jump(t) | Self::BranchIf(t) | Self::BranchUnless(t) | Self::BranchNil(t) => Some(*t),
            _ => None,
        }
    }

    pub(crate) fn target_mut(&mut self) -> Option<&mut usize> {
        match self {
            Self::Jump(t) | Self::BranchIf(t) | Self::BranchUnless(t) | Self::BranchNil(t) => Some(t),
            _ => None,
        }
    }

    /// Rewrites every symbol and child sequence, used when linking an artifact into a VM.
    pub(crate) fn relink(&self, sym: &dyn Fn(Symbol) -> Symbol, child: &mut dyn FnMut(&Iseq) -> Rc<Iseq>) -> Self {
        let cd = |call_data: &CallData| CallData {
            mid: sym(call_data.mid),
            argc: call_data.argc,
            flags: call_data.flags,
            kw_arg: call_data.kw_arg.iter().map(|&s| sym(s)).collect(),
        };
        match self {
            Self::PutObject(Literal::Symbol(s)) => Self::PutObject(Literal::Symbol(sym(*s))),
            Self::GetInstanceVariable(s) => Self::GetInstanceVariable(sym(*s)),
            Self::SetInstanceVariable(s) => Self::SetInstanceVariable(sym(*s)),
            Self::GetGlobal(s) => Self::GetGlobal(sym(*s)),
            Self::SetGlobal(s) => Self::SetGlobal(sym(*s)),
            Self::GetConstant { name, allow_nil } => Self::GetConstant {
                name: sym(*name),
                allow_nil: *allow_nil,
            },
            Self::SetConstant(s) => Self::SetConstant(sym(*s)),
            Self::ObjToString(call_data) => Self::ObjToString(cd(call_data)),
            Self::Send { call_data, block } => Self::Send {
                call_data: cd(call_data),
                block: block.as_deref().map(&mut *child),
            },
            Self::InvokeSuper {
                call_data,
                block,
                zsuper,
            } => Self::InvokeSuper {
                call_data: cd(call_data),
                block: block.as_deref().map(&mut *child),
                zsuper: *zsuper,
            },
            Self::InvokeBlock(call_data) => Self::InvokeBlock(cd(call_data)),
            Self::Opt { op, call_data } => Self::Opt {
                op: *op,
                call_data: cd(call_data),
            },
            Self::DefineMethod { name, body } => Self::DefineMethod {
                name: sym(*name),
                body: child(body),
            },
            Self::DefineSMethod { name, body } => Self::DefineSMethod {
                name: sym(*name),
                body: child(body),
            },
            Self::DefineClass { name, body, kind } => Self::DefineClass {
                name: sym(*name),
                body: child(body),
                kind: *kind,
            },
            Self::Once(body) => Self::Once(child(body)),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_yarv() {
        assert_eq!(Instruction::PutNil.name(), "putnil");
        assert_eq!(Instruction::GetInstanceVariable(Symbol::from_index(0)).name(), "getinstancevariable");
        let cd = CallData::new(StaticSymbols::Lt.into(), 1);
        assert_eq!(Instruction::Opt { op: FastOp::Lt, call_data: cd }.name(), "opt_lt");
    }

    #[test]
    fn send_stack_effect_counts_receiver_and_block_arg() {
        let cd = CallData::new(Symbol::from_index(0), 2).with_flags(super::super::CallFlags::BLOCKARG);
        let send = Instruction::Send {
            call_data: cd,
            block: None,
        };
        assert_eq!(send.pops(), 4);
        assert_eq!(send.pushes(), 1);
    }
}
