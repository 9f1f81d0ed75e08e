//! Compiled instruction sequences.
//!
//! An [`InstructionSequence`] is the artifact the (external) compiler produces: a symbol pool
//! plus a tree of [`Iseq`] bodies. Within an artifact every [`Symbol`] indexes the pool; the VM
//! links an artifact by remapping those indexes onto its own interner, after which the
//! `Iseq` tree is executed directly.
//!
//! Artifacts serialize with postcard, so a host can cache compiled files as `.iseq` blobs.

mod builder;
mod call_data;
mod instruction;

use std::{cell::Cell, fmt, rc::Rc};

use serde::{Deserialize, Serialize};

pub use self::{
    builder::{IseqBuilder, Label},
    call_data::{CallData, CallFlags},
    instruction::{DefineClassKind, FastOp, Instruction, Literal, SpecialObject, ThrowKind},
};
use crate::intern::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IseqKind {
    Top,
    Method,
    Block,
    Class,
}

/// A keyword parameter; `default` of `None` makes it required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordParam {
    pub name: Symbol,
    pub default: Option<Literal>,
}

/// Declared parameters.
///
/// Parameters occupy the first local slots in the order lead, optional, rest, post,
/// keywords, block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamShape {
    pub lead: u32,
    pub opt: u32,
    /// Entry points: `opt_table[k]` is where execution starts when `k` optional arguments
    /// were supplied. Empty when `opt == 0`, otherwise `opt + 1` entries.
    pub opt_table: Vec<usize>,
    pub rest: bool,
    pub post: u32,
    pub keywords: Vec<KeywordParam>,
    pub block: bool,
}

impl ParamShape {
    /// Minimum number of positional arguments.
    #[must_use]
    pub fn required(&self) -> usize {
        (self.lead + self.post) as usize
    }

    /// Maximum number of positional arguments; `None` with a rest parameter.
    #[must_use]
    pub fn max(&self) -> Option<usize> {
        if self.rest {
            None
        } else {
            Some((self.lead + self.opt + self.post) as usize)
        }
    }

    #[must_use]
    pub fn rest_index(&self) -> usize {
        (self.lead + self.opt) as usize
    }

    #[must_use]
    pub fn post_start(&self) -> usize {
        self.rest_index() + usize::from(self.rest)
    }

    #[must_use]
    pub fn keyword_start(&self) -> usize {
        self.post_start() + self.post as usize
    }

    #[must_use]
    pub fn block_index(&self) -> usize {
        self.keyword_start() + self.keywords.len()
    }

    /// Number of local slots taken by parameters.
    #[must_use]
    pub fn size(&self) -> usize {
        self.block_index() + usize::from(self.block)
    }

    /// Whether a single Array argument is spread over the parameters of a proc.
    #[must_use]
    pub fn auto_splats(&self) -> bool {
        self.lead + self.opt + self.post > 1 || (self.rest && self.lead + self.post > 0)
    }

    /// `Proc#arity`-style arity.
    #[must_use]
    pub fn arity(&self) -> i64 {
        let required = self.required() as i64;
        let has_required_kw = self.keywords.iter().any(|kw| kw.default.is_none());
        let required = required + i64::from(has_required_kw);
        if self.rest || self.opt > 0 { -required - 1 } else { required }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatchKind {
    /// Catches exceptions; the handler starts with the exception on the stack.
    Rescue,
    /// Catches any unwinding error; the handler ends with `EndEnsure`.
    Ensure,
}

/// A protected instruction range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchEntry {
    pub kind: CatchKind,
    pub start: usize,
    pub end: usize,
    pub handler: usize,
    /// Stack depth (relative to the frame base) restored before entering the handler.
    pub sp: u32,
}

/// One compiled body: a method, block, class body or top-level script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iseq {
    pub name: String,
    pub path: String,
    pub kind: IseqKind,
    pub local_table: Vec<Symbol>,
    pub params: ParamShape,
    pub instructions: Vec<Instruction>,
    pub catch_table: Vec<CatchEntry>,
    pub stack_max: usize,
    /// Unique per linked sequence; zero in unlinked artifacts.
    #[serde(skip)]
    pub id: u32,
}

impl Iseq {
    /// Checks the stack discipline of this body (not its children) and returns the maximum
    /// depth reached.
    ///
    /// Every reachable instruction must see the same depth on every path, no instruction may
    /// pop below the frame base and `leave` must find exactly one value.
    pub fn verify_stack(&self) -> Result<usize, VerifyError> {
        self.verify_params()?;
        let len = self.instructions.len();
        let mut depths: Vec<Option<usize>> = vec![None; len + 1];
        let mut work: Vec<(usize, usize)> = vec![(0, 0)];
        work.extend(self.params.opt_table.iter().map(|&ip| (ip, 0)));
        for entry in &self.catch_table {
            let depth = entry.sp as usize + usize::from(entry.kind == CatchKind::Rescue);
            work.push((entry.handler, depth));
            if entry.start > entry.end || entry.end > len {
                return Err(self.verify_error(entry.start, "catch range out of bounds"));
            }
        }
        let mut max = 0;
        while let Some((ip, depth)) = work.pop() {
            if ip > len {
                return Err(self.verify_error(ip, "jump target out of bounds"));
            }
            match depths[ip] {
                Some(seen) if seen == depth => continue,
                Some(seen) => {
                    return Err(self.verify_error(ip, format!("stack depth {depth} conflicts with {seen}")));
                }
                None => depths[ip] = Some(depth),
            }
            let Some(insn) = self.instructions.get(ip) else {
                continue;
            };
            let pops = insn.pops();
            if depth < pops {
                return Err(self.verify_error(ip, format!("{} pops {pops} with depth {depth}", insn.name())));
            }
            if matches!(insn, Instruction::Leave) && depth != 1 {
                return Err(self.verify_error(ip, format!("leave with depth {depth}")));
            }
            let after = depth - pops + insn.pushes();
            max = max.max(after).max(depth);
            if let Some(target) = insn.target() {
                work.push((target, after));
            }
            if !insn.is_terminal() {
                work.push((ip + 1, after));
            }
        }
        Ok(max)
    }

    /// Parameters must fit the local table, and optional parameters need one entry point per
    /// supplied count.
    fn verify_params(&self) -> Result<(), VerifyError> {
        let params = &self.params;
        let entries = if params.opt == 0 { 0 } else { params.opt as usize + 1 };
        if params.opt_table.len() != entries {
            return Err(self.verify_error(
                0,
                format!("{} optional parameters with {} entry points", params.opt, params.opt_table.len()),
            ));
        }
        if params.size() > self.local_table.len() {
            return Err(self.verify_error(
                0,
                format!("{} parameters but {} locals", params.size(), self.local_table.len()),
            ));
        }
        Ok(())
    }

    /// Verifies this body and every nested body.
    pub fn verify(&self) -> Result<(), VerifyError> {
        self.verify_stack()?;
        for child in self.children() {
            child.verify()?;
        }
        Ok(())
    }

    /// Directly nested bodies (blocks, methods, class bodies, once blocks).
    pub fn children(&self) -> impl Iterator<Item = &Rc<Self>> {
        self.instructions.iter().filter_map(|insn| match insn {
            Instruction::Send { block, .. } | Instruction::InvokeSuper { block, .. } => block.as_ref(),
            Instruction::DefineMethod { body, .. }
            | Instruction::DefineSMethod { body, .. }
            | Instruction::DefineClass { body, .. }
            | Instruction::Once(body) => Some(body),
            _ => None,
        })
    }

    /// Copies this tree with every symbol remapped and fresh ids assigned.
    pub(crate) fn relink(&self, sym: &dyn Fn(Symbol) -> Symbol, next_id: &mut u32) -> Self {
        *next_id += 1;
        let id = *next_id;
        let mut child = |body: &Self| Rc::new(body.relink(sym, next_id));
        let instructions = self.instructions.iter().map(|insn| insn.relink(sym, &mut child)).collect();
        Self {
            name: self.name.clone(),
            path: self.path.clone(),
            kind: self.kind,
            local_table: self.local_table.iter().map(|&s| sym(s)).collect(),
            params: ParamShape {
                keywords: self
                    .params
                    .keywords
                    .iter()
                    .map(|kw| KeywordParam {
                        name: sym(kw.name),
                        default: match &kw.default {
                            Some(Literal::Symbol(s)) => Some(Literal::Symbol(sym(*s))),
                            other => other.clone(),
                        },
                    })
                    .collect(),
                ..self.params.clone()
            },
            instructions,
            catch_table: self.catch_table.clone(),
            stack_max: self.stack_max,
            id,
        }
    }

    fn verify_error(&self, ip: usize, message: impl Into<String>) -> VerifyError {
        VerifyError {
            iseq: self.name.clone(),
            ip,
            message: message.into(),
        }
    }
}

/// A compiled unit: symbol pool plus root body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionSequence {
    pub symbols: Vec<String>,
    pub root: Iseq,
}

impl InstructionSequence {
    /// Source path the unit was compiled from.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.root.path
    }

    /// Serializes the artifact with postcard.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserializes an artifact written by [`InstructionSequence::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    /// Verifies the stack discipline of every body and that every symbol is in the pool.
    pub fn verify(&self) -> Result<(), VerifyError> {
        self.root.verify()?;
        let pool = self.symbols.len();
        let bad = Cell::new(None);
        self.root.relink(
            &|sym| {
                if sym.index() >= pool && bad.get().is_none() {
                    bad.set(Some(sym));
                }
                sym
            },
            &mut 0,
        );
        match bad.get() {
            Some(sym) => Err(VerifyError {
                iseq: self.root.name.clone(),
                ip: 0,
                message: format!("symbol {} outside the pool of {pool}", sym.index()),
            }),
            None => Ok(()),
        }
    }
}

/// A malformed instruction sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub iseq: String,
    pub ip: usize,
    pub message: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid instruction sequence {} at {}: {}", self.iseq, self.ip, self.message)
    }
}

impl std::error::Error for VerifyError {}
