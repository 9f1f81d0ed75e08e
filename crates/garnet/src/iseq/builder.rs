//! Assembler for instruction sequences.
//!
//! Compilers (and tests) build bodies with [`IseqBuilder`]: instructions are appended in
//! order, jumps refer to [`Label`]s that are patched to instruction indexes when the body is
//! built, and the maximum stack depth is computed by verification rather than tracked by
//! hand. All builders of one artifact share a symbol pool.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use super::{
    CallData, CallFlags, CatchEntry, CatchKind, DefineClassKind, FastOp, Instruction, InstructionSequence, Iseq,
    IseqKind, KeywordParam, Literal, ParamShape, SpecialObject, ThrowKind, VerifyError,
};
use crate::intern::Symbol;

/// A jump target placed with [`IseqBuilder::place`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Default)]
struct SymbolPool {
    names: Vec<String>,
    lookup: AHashMap<String, Symbol>,
}

impl SymbolPool {
    fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.lookup.get(name) {
            return sym;
        }
        let sym = Symbol::from_index(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.lookup.insert(name.to_owned(), sym);
        sym
    }
}

#[derive(Debug)]
struct PendingCatch {
    kind: CatchKind,
    start: Label,
    end: Label,
    handler: Label,
    sp: u32,
}

/// Builds one [`Iseq`] body.
#[derive(Debug)]
pub struct IseqBuilder {
    pool: Rc<RefCell<SymbolPool>>,
    name: String,
    path: String,
    kind: IseqKind,
    locals: Vec<Symbol>,
    params: ParamShape,
    opt_labels: Vec<Label>,
    code: Vec<Instruction>,
    labels: Vec<Option<usize>>,
    jumps: Vec<usize>,
    catch: Vec<PendingCatch>,
}

impl IseqBuilder {
    /// Starts the top-level body of a new artifact.
    #[must_use]
    pub fn top(path: &str) -> Self {
        Self {
            pool: Rc::default(),
            name: "<main>".to_owned(),
            path: path.to_owned(),
            kind: IseqKind::Top,
            locals: Vec::new(),
            params: ParamShape::default(),
            opt_labels: Vec::new(),
            code: Vec::new(),
            labels: Vec::new(),
            jumps: Vec::new(),
            catch: Vec::new(),
        }
    }

    /// Starts a nested body sharing this builder's symbol pool.
    #[must_use]
    pub fn child(&self, kind: IseqKind, name: &str) -> Self {
        Self {
            pool: Rc::clone(&self.pool),
            name: name.to_owned(),
            path: self.path.clone(),
            kind,
            locals: Vec::new(),
            params: ParamShape::default(),
            opt_labels: Vec::new(),
            code: Vec::new(),
            labels: Vec::new(),
            jumps: Vec::new(),
            catch: Vec::new(),
        }
    }

    #[must_use]
    pub fn method(&self, name: &str) -> Self {
        self.child(IseqKind::Method, name)
    }

    #[must_use]
    pub fn block(&self) -> Self {
        let name = format!("block in {}", self.name);
        self.child(IseqKind::Block, &name)
    }

    #[must_use]
    pub fn class_body(&self, name: &str) -> Self {
        self.child(IseqKind::Class, &format!("<class:{name}>"))
    }

    pub fn intern(&self, name: &str) -> Symbol {
        self.pool.borrow_mut().intern(name)
    }

    /// Index of local `name`, declaring it if needed.
    pub fn local(&mut self, name: &str) -> u32 {
        let sym = self.intern(name);
        if let Some(index) = self.locals.iter().position(|&l| l == sym) {
            return index as u32;
        }
        self.locals.push(sym);
        (self.locals.len() - 1) as u32
    }

    /// Declares required leading parameters. Parameters must be declared before other locals,
    /// in the order lead, optional, rest, post, keyword, block.
    pub fn lead_params(&mut self, names: &[&str]) -> &mut Self {
        for name in names {
            self.local(name);
        }
        self.params.lead += names.len() as u32;
        self
    }

    /// Declares an optional parameter. Its default-value code goes between two
    /// [`IseqBuilder::opt_entry`] calls.
    pub fn opt_param(&mut self, name: &str) -> u32 {
        self.params.opt += 1;
        self.local(name)
    }

    /// Records the entry point used when the optional parameters declared so far were all
    /// supplied. Call once before the first default and once after each default.
    pub fn opt_entry(&mut self) -> &mut Self {
        let label = self.new_label();
        self.place(label);
        self.opt_labels.push(label);
        self
    }

    pub fn rest_param(&mut self, name: &str) -> u32 {
        self.params.rest = true;
        self.local(name)
    }

    pub fn post_params(&mut self, names: &[&str]) -> &mut Self {
        for name in names {
            self.local(name);
        }
        self.params.post += names.len() as u32;
        self
    }

    pub fn keyword_param(&mut self, name: &str, default: Option<Literal>) -> u32 {
        let sym = self.intern(name);
        self.params.keywords.push(KeywordParam { name: sym, default });
        self.local(name)
    }

    pub fn block_param(&mut self, name: &str) -> u32 {
        self.params.block = true;
        self.local(name)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next instruction.
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    pub fn emit(&mut self, insn: Instruction) -> &mut Self {
        if insn.target().is_some() {
            self.jumps.push(self.code.len());
        }
        self.code.push(insn);
        self
    }

    #[must_use]
    pub fn call_data(&self, name: &str, argc: u32) -> CallData {
        CallData::new(self.intern(name), argc)
    }

    pub fn put_nil(&mut self) -> &mut Self {
        self.emit(Instruction::PutNil)
    }

    pub fn put_self(&mut self) -> &mut Self {
        self.emit(Instruction::PutSelf)
    }

    pub fn put_object(&mut self, literal: Literal) -> &mut Self {
        self.emit(Instruction::PutObject(literal))
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.put_object(if value { Literal::True } else { Literal::False })
    }

    pub fn put_int(&mut self, value: i64) -> &mut Self {
        self.put_object(Literal::Integer(value))
    }

    pub fn put_float(&mut self, value: f64) -> &mut Self {
        self.put_object(Literal::Float(value))
    }

    pub fn put_symbol(&mut self, name: &str) -> &mut Self {
        let sym = self.intern(name);
        self.put_object(Literal::Symbol(sym))
    }

    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.emit(Instruction::PutString(value.to_owned()))
    }

    pub fn pop(&mut self) -> &mut Self {
        self.emit(Instruction::Pop)
    }

    pub fn dup(&mut self) -> &mut Self {
        self.emit(Instruction::Dup)
    }

    pub fn swap(&mut self) -> &mut Self {
        self.emit(Instruction::Swap)
    }

    pub fn topn(&mut self, n: u32) -> &mut Self {
        self.emit(Instruction::TopN(n))
    }

    pub fn get_local(&mut self, name: &str) -> &mut Self {
        let index = self.local(name);
        self.emit(Instruction::GetLocal { index, level: 0 })
    }

    pub fn set_local(&mut self, name: &str) -> &mut Self {
        let index = self.local(name);
        self.emit(Instruction::SetLocal { index, level: 0 })
    }

    /// Reads a local of an enclosing scope; `level` 1 is the immediately enclosing body.
    pub fn get_local_at(&mut self, index: u32, level: u32) -> &mut Self {
        self.emit(Instruction::GetLocal { index, level })
    }

    pub fn set_local_at(&mut self, index: u32, level: u32) -> &mut Self {
        self.emit(Instruction::SetLocal { index, level })
    }

    pub fn get_ivar(&mut self, name: &str) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::GetInstanceVariable(sym))
    }

    pub fn set_ivar(&mut self, name: &str) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::SetInstanceVariable(sym))
    }

    pub fn get_global(&mut self, name: &str) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::GetGlobal(sym))
    }

    pub fn set_global(&mut self, name: &str) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::SetGlobal(sym))
    }

    /// Lexical constant lookup (`Foo`).
    pub fn get_constant(&mut self, name: &str) -> &mut Self {
        let sym = self.intern(name);
        self.put_nil();
        self.emit(Instruction::GetConstant {
            name: sym,
            allow_nil: true,
        })
    }

    /// Scoped constant lookup (`scope::Foo`), with the scope on the stack.
    pub fn get_scoped_constant(&mut self, name: &str) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::GetConstant {
            name: sym,
            allow_nil: false,
        })
    }

    /// Assigns the value on the stack to a constant of the current lexical scope.
    pub fn set_constant(&mut self, name: &str) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::PutSpecialObject(SpecialObject::ConstBase));
        self.emit(Instruction::SetConstant(sym))
    }

    pub fn new_array(&mut self, count: u32) -> &mut Self {
        self.emit(Instruction::NewArray(count))
    }

    pub fn new_hash(&mut self, count: u32) -> &mut Self {
        self.emit(Instruction::NewHash(count))
    }

    /// Sends `name` to the receiver below `argc` arguments.
    pub fn send(&mut self, name: &str, argc: u32) -> &mut Self {
        let call_data = self.call_data(name, argc);
        self.send_with(call_data, None)
    }

    pub fn send_with(&mut self, call_data: CallData, block: Option<Iseq>) -> &mut Self {
        self.emit(Instruction::Send {
            call_data,
            block: block.map(Rc::new),
        })
    }

    pub fn send_block(&mut self, name: &str, argc: u32, block: Iseq) -> &mut Self {
        let call_data = self.call_data(name, argc);
        self.send_with(call_data, Some(block))
    }

    /// Receiverless call; the caller pushes `self` before the arguments.
    pub fn fcall(&mut self, name: &str, argc: u32) -> &mut Self {
        let call_data = self.call_data(name, argc).with_flags(CallFlags::FCALL);
        self.send_with(call_data, None)
    }

    pub fn fcall_block(&mut self, name: &str, argc: u32, block: Iseq) -> &mut Self {
        let call_data = self.call_data(name, argc).with_flags(CallFlags::FCALL);
        self.send_with(call_data, Some(block))
    }

    /// A bare identifier call such as `foo`.
    pub fn vcall(&mut self, name: &str) -> &mut Self {
        let call_data = self
            .call_data(name, 0)
            .with_flags(CallFlags::FCALL | CallFlags::VCALL);
        self.put_self();
        self.send_with(call_data, None)
    }

    pub fn invoke_block(&mut self, argc: u32) -> &mut Self {
        let call_data = CallData::new(self.intern("yield"), argc);
        self.emit(Instruction::InvokeBlock(call_data))
    }

    /// `super(args)`, or `super` when `zsuper`. The caller pushes `self` first.
    pub fn invoke_super(&mut self, argc: u32, zsuper: bool, block: Option<Iseq>) -> &mut Self {
        let call_data = CallData::new(self.intern("super"), argc).with_flags(CallFlags::FCALL);
        self.emit(Instruction::InvokeSuper {
            call_data,
            block: block.map(Rc::new),
            zsuper,
        })
    }

    /// A specialized operator, e.g. `opt_lt`.
    pub fn opt(&mut self, op: FastOp) -> &mut Self {
        let name: &'static str = op.method().into();
        let call_data = self.call_data(name, op.argc());
        self.emit(Instruction::Opt { op, call_data })
    }

    pub fn define_method(&mut self, name: &str, body: Iseq) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::DefineMethod {
            name: sym,
            body: Rc::new(body),
        })
    }

    /// Defines a singleton method on the object on the stack.
    pub fn define_smethod(&mut self, name: &str, body: Iseq) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::DefineSMethod {
            name: sym,
            body: Rc::new(body),
        })
    }

    /// `class Name < Superclass; body; end` in the current lexical scope.
    pub fn define_class(&mut self, name: &str, superclass: Option<&str>, body: Iseq) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::PutSpecialObject(SpecialObject::ConstBase));
        match superclass {
            Some(superclass) => self.get_constant(superclass),
            None => self.put_nil(),
        };
        self.emit(Instruction::DefineClass {
            name: sym,
            body: Rc::new(body),
            kind: DefineClassKind::Class {
                has_superclass: superclass.is_some(),
            },
        })
    }

    pub fn define_module(&mut self, name: &str, body: Iseq) -> &mut Self {
        let sym = self.intern(name);
        self.emit(Instruction::PutSpecialObject(SpecialObject::ConstBase));
        self.put_nil();
        self.emit(Instruction::DefineClass {
            name: sym,
            body: Rc::new(body),
            kind: DefineClassKind::Module,
        })
    }

    /// `class << obj; body; end` with the object on the stack.
    pub fn singleton_class_body(&mut self, body: Iseq) -> &mut Self {
        let sym = self.intern("singleton class");
        self.put_nil();
        self.emit(Instruction::DefineClass {
            name: sym,
            body: Rc::new(body),
            kind: DefineClassKind::SingletonClass,
        })
    }

    pub fn once(&mut self, body: Iseq) -> &mut Self {
        self.emit(Instruction::Once(Rc::new(body)))
    }

    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.emit(Instruction::Jump(label.0))
    }

    pub fn branch_if(&mut self, label: Label) -> &mut Self {
        self.emit(Instruction::BranchIf(label.0))
    }

    pub fn branch_unless(&mut self, label: Label) -> &mut Self {
        self.emit(Instruction::BranchUnless(label.0))
    }

    pub fn branch_nil(&mut self, label: Label) -> &mut Self {
        self.emit(Instruction::BranchNil(label.0))
    }

    pub fn leave(&mut self) -> &mut Self {
        self.emit(Instruction::Leave)
    }

    pub fn throw(&mut self, kind: ThrowKind) -> &mut Self {
        self.emit(Instruction::Throw(kind))
    }

    pub fn end_ensure(&mut self) -> &mut Self {
        self.emit(Instruction::EndEnsure)
    }

    /// Protects `[start, end)` with a rescue handler entered at stack depth `sp` + 1.
    pub fn rescue(&mut self, start: Label, end: Label, handler: Label, sp: u32) -> &mut Self {
        self.catch.push(PendingCatch {
            kind: CatchKind::Rescue,
            start,
            end,
            handler,
            sp,
        });
        self
    }

    /// Protects `[start, end)` with an ensure handler entered at stack depth `sp`.
    pub fn ensure(&mut self, start: Label, end: Label, handler: Label, sp: u32) -> &mut Self {
        self.catch.push(PendingCatch {
            kind: CatchKind::Ensure,
            start,
            end,
            handler,
            sp,
        });
        self
    }

    /// Resolves labels and verifies the body.
    pub fn build(self) -> Result<Iseq, VerifyError> {
        let resolve = |label: Label| {
            self.labels[label.0].ok_or_else(|| VerifyError {
                iseq: self.name.clone(),
                ip: 0,
                message: format!("label {} never placed", label.0),
            })
        };
        let mut code = self.code.clone();
        for &ip in &self.jumps {
            if let Some(target) = code[ip].target_mut() {
                *target = resolve(Label(*target))?;
            }
        }
        let mut params = self.params.clone();
        params.opt_table = self.opt_labels.iter().map(|&l| resolve(l)).collect::<Result<_, _>>()?;
        let catch_table = self
            .catch
            .iter()
            .map(|c| {
                Ok(CatchEntry {
                    kind: c.kind,
                    start: resolve(c.start)?,
                    end: resolve(c.end)?,
                    handler: resolve(c.handler)?,
                    sp: c.sp,
                })
            })
            .collect::<Result<_, VerifyError>>()?;
        let mut iseq = Iseq {
            name: self.name.clone(),
            path: self.path.clone(),
            kind: self.kind,
            local_table: self.locals.clone(),
            params,
            instructions: code,
            catch_table,
            stack_max: 0,
            id: 0,
        };
        iseq.stack_max = iseq.verify_stack()?;
        Ok(iseq)
    }

    /// Builds the root body and packages it with the shared symbol pool.
    pub fn finish(self) -> Result<InstructionSequence, VerifyError> {
        let pool = Rc::clone(&self.pool);
        let root = self.build()?;
        let symbols = pool.borrow().names.clone();
        Ok(InstructionSequence { symbols, root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_resolve_to_instruction_indexes() {
        let mut b = IseqBuilder::top("t.rb");
        let done = b.new_label();
        b.put_bool(true).branch_unless(done).put_int(1).pop().place(done).put_nil().leave();
        let iseq = b.build().unwrap();
        assert_eq!(iseq.instructions[1], Instruction::BranchUnless(4));
        assert_eq!(iseq.stack_max, 1);
    }

    #[test]
    fn unbalanced_leave_is_rejected() {
        let mut b = IseqBuilder::top("t.rb");
        b.put_int(1).put_int(2).leave();
        let err = b.build().unwrap_err();
        assert!(err.message.contains("leave with depth 2"), "{err}");
    }

    #[test]
    fn optional_parameters_need_every_entry_point() {
        let top = IseqBuilder::top("t.rb");
        let mut m = top.method("f");
        m.opt_param("y");
        m.opt_entry().put_int(1).set_local("y").opt_entry();
        m.get_local("y").leave();
        let mut iseq = m.build().unwrap();
        assert_eq!(iseq.params.opt_table.len(), 2);
        iseq.params.opt_table.clear();
        let err = iseq.verify_stack().unwrap_err();
        assert!(err.message.contains("1 optional parameters with 0 entry points"), "{err}");
    }

    #[test]
    fn inconsistent_merge_is_rejected() {
        let mut b = IseqBuilder::top("t.rb");
        let join = b.new_label();
        b.put_bool(true).branch_if(join).put_int(1).place(join).put_nil().leave();
        assert!(b.build().is_err());
    }

    #[test]
    fn children_share_the_pool() {
        let mut top = IseqBuilder::top("t.rb");
        let mut m = top.method("bump");
        m.get_ivar("@n").leave();
        let body = m.build().unwrap();
        top.define_method("bump", body).put_symbol("bump").leave();
        let artifact = top.finish().unwrap();
        assert!(artifact.symbols.iter().any(|s| s == "@n"));
        assert!(artifact.verify().is_ok());
        let bytes = artifact.to_bytes().unwrap();
        assert_eq!(InstructionSequence::from_bytes(&bytes).unwrap(), artifact);
    }
}
