//! The instruction loop and frame lifecycle.

use std::rc::Rc;

use crate::{
    callable::{Callable, Visibility},
    exception::{ExcType, RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::{StaticSymbols, Symbol},
    iseq::{
        CallData, CallFlags, CatchKind, Instruction, InstructionSequence, Iseq, Literal,
        SpecialObject, ThrowKind,
    },
    types::{RHash, RRegexp},
    value::Value,
    vm::{Cref, Frame, FrameKind, MethodContext, Scope, Vm, args::ArgMode},
};

/// Operands of a call site after popping them off the stack.
struct CallOperands {
    receiver: Value,
    args: Vec<Value>,
    block_arg: Option<Value>,
}

impl Vm {
    /// Remaps an artifact's symbols onto this VM and assigns fresh iseq ids.
    pub(crate) fn link(&mut self, artifact: &InstructionSequence) -> RunResult<Rc<Iseq>> {
        artifact
            .verify()
            .map_err(|err| ExcType::ScriptError.error(err.to_string()))?;
        let symbols: Vec<Symbol> = artifact.symbols.iter().map(|name| self.interns.intern(name)).collect();
        let remap = |sym: Symbol| symbols.get(sym.index()).copied().unwrap_or(sym);
        Ok(Rc::new(artifact.root.relink(&remap, &mut self.next_iseq_id)))
    }

    /// Runs a linked top-level body with `self` = main and Object as the lexical scope.
    pub(crate) fn run_top(&mut self, iseq: &Rc<Iseq>) -> RunResult<Value> {
        let serial = self.next_frame_serial();
        let frame = Frame {
            iseq: Rc::clone(iseq),
            stack_base: self.stack.len(),
            self_value: self.main,
            scope: Scope::new(iseq.local_table.len(), None),
            cref: Cref::root(self.core.object),
            block: None,
            kind: FrameKind::Top,
            serial,
            home: serial,
            break_tag: None,
            method: None,
            visibility: Visibility::Private,
            module_function: false,
            pending: Vec::new(),
        };
        self.run_frame(frame, 0)
    }

    /// Binds arguments and runs an interpreted method.
    #[expect(clippy::too_many_arguments, reason = "mirrors the shape of a call site")]
    pub(crate) fn run_method(
        &mut self,
        receiver: Value,
        owner: HeapId,
        mid: Symbol,
        iseq: &Rc<Iseq>,
        args: &[Value],
        block: Option<Value>,
        keywords: bool,
    ) -> RunResult<Value> {
        let scope = Scope::new(iseq.local_table.len(), None);
        let start = self.bind_params(iseq, &scope, args, block, ArgMode::Strict, keywords)?;
        let method = Rc::new(MethodContext {
            owner,
            name: mid,
            iseq: Some(Rc::clone(iseq)),
            scope: Rc::clone(&scope),
        });
        let serial = self.next_frame_serial();
        let frame = Frame {
            iseq: Rc::clone(iseq),
            stack_base: self.stack.len(),
            self_value: receiver,
            scope,
            cref: self.method_cref(owner),
            block,
            kind: FrameKind::Method,
            serial,
            home: serial,
            break_tag: None,
            method: Some(method),
            visibility: Visibility::Public,
            module_function: false,
            pending: Vec::new(),
        };
        self.run_frame(frame, start)
    }

    /// Lexical scope of a method body, rebuilt from the nesting of its owner.
    ///
    /// Singleton classes of modules resolve constants through the module they belong to.
    fn method_cref(&self, owner: HeapId) -> Rc<Cref> {
        let mut start = owner;
        if let Some(class) = self.heap.as_class(owner)
            && class.is_singleton
        {
            start = match class.attached.and_then(|attached| self.module_of(attached)) {
                Some(module) => module,
                None => return Cref::root(self.core.object),
            };
        }
        let mut chain = Vec::new();
        let mut current = Some(start);
        while let Some(module) = current {
            if module == self.core.object || chain.len() > 64 {
                break;
            }
            chain.push(module);
            current = self.heap.module(module).nesting_parent;
        }
        let mut cref = Cref::root(self.core.object);
        for &module in chain.iter().rev() {
            cref = cref.nested(module);
        }
        cref
    }

    /// Pushes `frame`, runs it from `start` and pops it again, whatever the outcome.
    pub(crate) fn run_frame(&mut self, frame: Frame, start: usize) -> RunResult<Value> {
        let depth = self.frames.len() + self.native_depth + 1;
        self.heap.tracker().check_recursion_depth(depth)?;
        self.tracer.on_call(&frame.iseq.name, self.frames.len() + 1);
        let iseq = Rc::clone(&frame.iseq);
        let serial = frame.serial;
        let kind = frame.kind;
        self.frames.push(frame);
        let mut result = self.execute(&iseq, start);
        if let Err(err) = &mut result {
            self.note_raise(err);
        }
        if let Some(frame) = self.frames.pop() {
            self.stack.truncate(frame.stack_base);
        }
        self.tracer.on_return(self.frames.len());
        match result {
            Err(RunError::Return { target, value }) if target == serial && kind.catches_return() => Ok(value),
            other => other,
        }
    }

    fn execute(&mut self, iseq: &Rc<Iseq>, start: usize) -> RunResult<Value> {
        let mut ip = start;
        loop {
            match self.run_from(iseq, &mut ip) {
                Ok(value) => return Ok(value),
                Err(err) => ip = self.find_handler(iseq, ip, err)?,
            }
        }
    }

    /// Enters the innermost catch entry covering `ip` that accepts `err`.
    fn find_handler(&mut self, iseq: &Iseq, ip: usize, mut err: RunError) -> RunResult<usize> {
        for entry in &iseq.catch_table {
            if ip < entry.start || ip >= entry.end {
                continue;
            }
            match entry.kind {
                CatchKind::Rescue if err.is_exception() => {
                    self.note_raise(&mut err);
                    let exception = self.materialize(err)?;
                    self.global_set(StaticSymbols::ErrInfo.into(), Value::Ref(exception));
                    let base = self.frame().stack_base;
                    self.stack.truncate(base + entry.sp as usize);
                    self.stack.push(Value::Ref(exception));
                    return Ok(entry.handler);
                }
                CatchKind::Ensure if err.runs_ensure() => {
                    let base = self.frame().stack_base;
                    self.stack.truncate(base + entry.sp as usize);
                    self.frame_mut().pending.push(err);
                    return Ok(entry.handler);
                }
                _ => {}
            }
        }
        Err(err)
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("Vm::frame: instruction executed without a frame")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("Vm::frame_mut: instruction executed without a frame")
    }

    #[inline]
    fn pop(&mut self) -> Value {
        // Verified sequences never pop below the frame base.
        self.stack.pop().unwrap_or_default()
    }

    #[inline]
    fn top(&self) -> Value {
        self.stack.last().copied().unwrap_or_default()
    }

    /// The value of a literal operand.
    pub(crate) fn literal(&mut self, literal: &Literal) -> RunResult<Value> {
        Ok(match literal {
            Literal::Nil => Value::Nil,
            Literal::True => Value::True,
            Literal::False => Value::False,
            Literal::Integer(n) => Value::Integer(*n),
            Literal::BigInt(b) => self.new_integer(b.clone())?,
            Literal::Float(f) => Value::Float(*f),
            Literal::Symbol(sym) => Value::Symbol(*sym),
        })
    }

    /// Runs instructions from `*ip` until the frame leaves or an error escapes; on error
    /// `*ip` is the faulting instruction.
    fn run_from(&mut self, iseq: &Rc<Iseq>, ip: &mut usize) -> RunResult<Value> {
        let base = self.frame().stack_base;
        loop {
            let Some(insn) = iseq.instructions.get(*ip) else {
                return Ok(if self.stack.len() > base { self.pop() } else { Value::Nil });
            };
            self.heap.tracker_mut().on_instruction()?;
            self.tracer
                .on_instruction(*ip, insn.name(), self.stack.len() - base, self.frames.len());
            match insn {
                Instruction::Nop => {}
                Instruction::PutNil => self.stack.push(Value::Nil),
                Instruction::PutSelf => {
                    let self_value = self.frame().self_value;
                    self.stack.push(self_value);
                }
                Instruction::PutObject(literal) => {
                    let value = self.literal(literal)?;
                    self.stack.push(value);
                }
                Instruction::PutString(text) => {
                    let value = self.new_string(text)?;
                    self.stack.push(value);
                }
                Instruction::PutSpecialObject(SpecialObject::CBase | SpecialObject::ConstBase) => {
                    let module = self.frame().cref.module;
                    self.stack.push(Value::Ref(module));
                }
                Instruction::Pop => {
                    self.pop();
                }
                Instruction::Dup => {
                    let value = self.top();
                    self.stack.push(value);
                }
                Instruction::DupN(n) => {
                    let at = self.stack.len() - *n as usize;
                    self.stack.extend_from_within(at..);
                }
                Instruction::Swap => {
                    let len = self.stack.len();
                    self.stack.swap(len - 1, len - 2);
                }
                Instruction::TopN(n) => {
                    let value = self.stack[self.stack.len() - 1 - *n as usize];
                    self.stack.push(value);
                }
                Instruction::SetN(n) => {
                    let value = self.top();
                    let at = self.stack.len() - 1 - *n as usize;
                    self.stack[at] = value;
                }
                Instruction::AdjustStack(n) => {
                    let len = self.stack.len() - *n as usize;
                    self.stack.truncate(len);
                }
                Instruction::GetLocal { index, level } => {
                    let value = self.local_scope(*level)?.get(*index as usize);
                    self.stack.push(value);
                }
                Instruction::SetLocal { index, level } => {
                    let value = self.pop();
                    self.local_scope(*level)?.set(*index as usize, value);
                }
                Instruction::GetInstanceVariable(name) => {
                    let value = self.ivar_get(self.frame().self_value, *name);
                    self.stack.push(value);
                }
                Instruction::SetInstanceVariable(name) => {
                    let value = self.top();
                    let self_value = self.frame().self_value;
                    self.ivar_set(self_value, *name, value)?;
                    self.pop();
                }
                Instruction::GetGlobal(name) => {
                    let value = self.global_get(*name);
                    self.stack.push(value);
                }
                Instruction::SetGlobal(name) => {
                    let value = self.pop();
                    self.global_set(*name, value);
                }
                Instruction::GetConstant { name, allow_nil } => {
                    let scope = self.top();
                    let scope = if scope.is_nil() && *allow_nil { None } else { Some(scope) };
                    let cref = Rc::clone(&self.frame().cref);
                    let value = self.get_constant(&cref, scope, *name)?;
                    self.pop();
                    self.stack.push(value);
                }
                Instruction::SetConstant(name) => {
                    let len = self.stack.len();
                    let (value, cbase) = (self.stack[len - 2], self.stack[len - 1]);
                    let Some(module) = self.module_of(cbase) else {
                        let inspected = self.inspect_value(cbase)?;
                        return Err(RunError::type_error(format!("{inspected} is not a class/module")));
                    };
                    self.const_set(module, *name, value)?;
                    self.stack.truncate(len - 2);
                }
                Instruction::NewArray(n) => {
                    let items = self.stack[self.stack.len() - *n as usize..].to_vec();
                    let array = self.new_array(items)?;
                    self.stack.truncate(self.stack.len() - *n as usize);
                    self.stack.push(array);
                }
                Instruction::NewHash(n) => {
                    let items = self.stack[self.stack.len() - *n as usize..].to_vec();
                    let hash = self.new_hash(RHash::new())?;
                    for pair in items.chunks_exact(2) {
                        self.hash_store(hash, pair[0], pair[1])?;
                    }
                    self.stack.truncate(self.stack.len() - *n as usize);
                    self.stack.push(hash);
                }
                Instruction::SplatArray => {
                    let items = self.splat_items(self.top())?;
                    let array = self.new_array(items)?;
                    self.pop();
                    self.stack.push(array);
                }
                Instruction::ConcatArray => {
                    let len = self.stack.len();
                    let (head, tail) = (self.stack[len - 2], self.stack[len - 1]);
                    let mut items = self.splat_items(head)?;
                    items.extend(self.splat_items(tail)?);
                    let array = self.new_array(items)?;
                    self.stack.truncate(len - 2);
                    self.stack.push(array);
                }
                Instruction::ExpandArray { count, splat } => {
                    let value = self.top();
                    let items = self.try_array(value)?.unwrap_or_else(|| vec![value]);
                    let count = *count as usize;
                    let rest = if *splat {
                        Some(self.new_array(items.iter().skip(count).copied().collect())?)
                    } else {
                        None
                    };
                    self.pop();
                    if let Some(rest) = rest {
                        self.stack.push(rest);
                    }
                    for i in (0..count).rev() {
                        self.stack.push(items.get(i).copied().unwrap_or(Value::Nil));
                    }
                }
                Instruction::AnyToString => {
                    let string = self.pop();
                    let object = self.pop();
                    if self.is_string(string) {
                        self.stack.push(string);
                    } else {
                        let text = self.default_to_s(object);
                        let value = self.new_string_owned(text)?;
                        self.stack.push(value);
                    }
                }
                Instruction::ObjToString(call_data) => {
                    let value = self.top();
                    if !self.is_string(value) {
                        let converted = self.call_method(value, call_data.mid, &[], None, Some(call_data), true)?;
                        self.pop();
                        self.stack.push(converted);
                    }
                }
                Instruction::ConcatStrings(n) => {
                    let parts = self.stack[self.stack.len() - *n as usize..].to_vec();
                    let mut text = String::new();
                    for part in parts {
                        text.push_str(&self.to_s_value(part)?);
                    }
                    let value = self.new_string_owned(text)?;
                    self.stack.truncate(self.stack.len() - *n as usize);
                    self.stack.push(value);
                }
                Instruction::ToRegexp { options, count } => {
                    let parts = self.stack[self.stack.len() - *count as usize..].to_vec();
                    let mut source = String::new();
                    for part in parts {
                        source.push_str(&self.to_s_value(part)?);
                    }
                    let regexp = self.new_regexp(&source, *options)?;
                    self.stack.truncate(self.stack.len() - *count as usize);
                    self.stack.push(regexp);
                }
                Instruction::Intern => {
                    let value = self.top();
                    let text = self.expect_string(value)?;
                    let sym = self.interns.intern(&text);
                    self.pop();
                    self.stack.push(Value::Symbol(sym));
                }
                Instruction::Send { call_data, block } => {
                    let result = self.exec_send(call_data, block.as_ref())?;
                    self.stack.push(result);
                }
                Instruction::InvokeSuper {
                    call_data,
                    block,
                    zsuper,
                } => {
                    let result = self.exec_super(call_data, block.as_ref(), *zsuper)?;
                    self.stack.push(result);
                }
                Instruction::InvokeBlock(call_data) => {
                    let result = self.exec_yield(call_data)?;
                    self.stack.push(result);
                }
                Instruction::Opt { op, call_data } => self.exec_fast(*op, call_data)?,
                Instruction::DefineMethod { name, body } => self.exec_define_method(*name, body)?,
                Instruction::DefineSMethod { name, body } => {
                    let object = self.top();
                    let singleton = self.singleton_class_of(object)?;
                    self.add_method(singleton, *name, Callable::interpreted(Rc::clone(body), Visibility::Public))?;
                    self.pop();
                    self.call_hook(object, StaticSymbols::SingletonMethodAdded, &[Value::Symbol(*name)])?;
                }
                Instruction::DefineClass { name, body, kind } => {
                    let len = self.stack.len();
                    let (cbase, superclass) = (self.stack[len - 2], self.stack[len - 1]);
                    let module = self.open_class_body(cbase, superclass, *name, *kind)?;
                    let result = self.run_class_body(module, body)?;
                    self.stack.truncate(len - 2);
                    self.stack.push(result);
                }
                Instruction::Once(body) => {
                    let value = match self.once_cache.get(&body.id) {
                        Some(&value) => value,
                        None => {
                            let value = self.run_once_body(body)?;
                            self.once_cache.insert(body.id, value);
                            value
                        }
                    };
                    self.stack.push(value);
                }
                Instruction::Jump(target) => {
                    *ip = *target;
                    continue;
                }
                Instruction::BranchIf(target) => {
                    if self.pop().truthy() {
                        *ip = *target;
                        continue;
                    }
                }
                Instruction::BranchUnless(target) => {
                    if !self.pop().truthy() {
                        *ip = *target;
                        continue;
                    }
                }
                Instruction::BranchNil(target) => {
                    if self.pop().is_nil() {
                        *ip = *target;
                        continue;
                    }
                }
                Instruction::Leave => return Ok(self.pop()),
                Instruction::Throw(kind) => {
                    let value = self.top();
                    return self.exec_throw(*kind, value);
                }
                Instruction::EndEnsure => {
                    if let Some(err) = self.frame_mut().pending.pop() {
                        return Err(err);
                    }
                }
            }
            *ip += 1;
        }
    }

    fn local_scope(&self, level: u32) -> RunResult<Rc<Scope>> {
        self.frame()
            .scope
            .at_level(level)
            .ok_or_else(|| RunError::internal("local variable level outside the scope chain"))
    }

    /// Elements contributed by `*value`.
    fn splat_items(&mut self, value: Value) -> RunResult<Vec<Value>> {
        if value.is_nil() {
            return Ok(Vec::new());
        }
        if let Some(items) = self.try_array(value)? {
            return Ok(items);
        }
        let to_a: Symbol = StaticSymbols::ToA.into();
        if value.heap_id().is_some() && self.responds_to(value, to_a)? {
            let converted = self.funcall(value, to_a, &[])?;
            if let Some(items) = self.array_of(converted) {
                return Ok(items.clone());
            }
        }
        Ok(vec![value])
    }

    pub(crate) fn new_regexp(&mut self, source: &str, options: u32) -> RunResult<Value> {
        let regexp = RRegexp::new(source, options).map_err(|err| ExcType::RegexpError.error(err.to_string()))?;
        Ok(Value::Ref(self.heap.allocate(self.core.regexp, HeapData::Regexp(regexp))?))
    }

    /// Pops the operands of a call site, expanding a splat and packing keyword values into a
    /// trailing Hash. With `with_receiver` false there is no receiver slot (`yield`).
    fn pop_call_operands(&mut self, call_data: &CallData, with_receiver: bool) -> RunResult<CallOperands> {
        let block_arg = if call_data.has_block_arg() { Some(self.top()) } else { None };
        let skip = usize::from(block_arg.is_some());
        let argc = call_data.argc as usize;
        let len = self.stack.len();
        let args_start = len - skip - argc;
        let mut args = self.stack[args_start..len - skip].to_vec();
        let receiver = if with_receiver { self.stack[args_start - 1] } else { Value::Nil };

        let kw_count = call_data.kw_arg.len();
        let keywords = if call_data.flags.contains(CallFlags::KWARG) && kw_count <= args.len() {
            let values = args.split_off(args.len() - kw_count);
            let mut hash = RHash::new();
            for (&name, value) in call_data.kw_arg.iter().zip(values) {
                let key = Value::Symbol(name);
                let hash_key = self.hash_key(key, false);
                hash.insert(hash_key, key, value);
            }
            Some(self.new_hash(hash)?)
        } else {
            None
        };
        if call_data.flags.contains(CallFlags::SPLAT)
            && let Some(splatted) = args.pop()
        {
            args.extend(self.splat_items(splatted)?);
        }
        args.extend(keywords);

        let block_arg = match block_arg {
            Some(value) => self.to_block(value)?,
            None => None,
        };
        self.stack.truncate(args_start - usize::from(with_receiver));
        Ok(CallOperands {
            receiver,
            args,
            block_arg,
        })
    }

    /// Calls with a literal block under a fresh break tag; `break` from the block ends here.
    fn with_literal_block(
        &mut self,
        block: &Rc<Iseq>,
        call: impl FnOnce(&mut Self, Value) -> RunResult<Value>,
    ) -> RunResult<Value> {
        let tag = self.new_break_tag();
        let proc = self.make_block(block, tag)?;
        self.active_break_tags.push(tag);
        let result = call(self, proc);
        self.active_break_tags.pop();
        match result {
            Err(RunError::Break { tag: target, value }) if target == tag => Ok(value),
            other => other,
        }
    }

    fn exec_send(&mut self, call_data: &CallData, block: Option<&Rc<Iseq>>) -> RunResult<Value> {
        let CallOperands {
            receiver,
            args,
            block_arg,
        } = self.pop_call_operands(call_data, true)?;
        let fcall = call_data.is_fcall();
        match block {
            Some(block) => self.with_literal_block(block, |vm, proc| {
                vm.call_method(receiver, call_data.mid, &args, Some(proc), Some(call_data), fcall)
            }),
            None => self.call_method(receiver, call_data.mid, &args, block_arg, Some(call_data), fcall),
        }
    }

    fn exec_super(&mut self, call_data: &CallData, block: Option<&Rc<Iseq>>, zsuper: bool) -> RunResult<Value> {
        let Some(method) = self.frame().method.clone() else {
            return Err(ExcType::RuntimeError.error("super called outside of method"));
        };
        let CallOperands {
            receiver,
            mut args,
            block_arg,
        } = self.pop_call_operands(call_data, true)?;
        let mut forwarded = call_data.clone();
        if zsuper {
            let (zargs, keywords) = self.zsuper_args(&method)?;
            args = zargs;
            if keywords {
                forwarded.flags = forwarded.flags | CallFlags::KWARG;
            }
        }
        let inherited_block = block_arg.or(self.frame().block);
        match block {
            Some(block) => self.with_literal_block(block, |vm, proc| {
                vm.call_super(receiver, &method, &args, Some(proc), Some(&forwarded))
            }),
            None => self.call_super(receiver, &method, &args, inherited_block, Some(&forwarded)),
        }
    }

    fn exec_yield(&mut self, call_data: &CallData) -> RunResult<Value> {
        let CallOperands { args, block_arg, .. } = self.pop_call_operands(call_data, false)?;
        let Some(block) = self.frame().block else {
            return Err(RunError::local_jump("no block given (yield)"));
        };
        self.call_proc(block, &args, block_arg)
    }

    fn exec_define_method(&mut self, name: Symbol, body: &Rc<Iseq>) -> RunResult<()> {
        let (module, frame_visibility, module_function) = {
            let frame = self.frame();
            (frame.cref.module, frame.visibility, frame.module_function)
        };
        let always_private = matches!(
            self.interns.get(name),
            "initialize" | "initialize_copy" | "respond_to_missing?"
        );
        let visibility = if always_private || module_function {
            Visibility::Private
        } else {
            frame_visibility
        };
        self.add_method(module, name, Callable::interpreted(Rc::clone(body), visibility))?;
        if module_function {
            let singleton = self.singleton_class_of(Value::Ref(module))?;
            self.add_method(singleton, name, Callable::interpreted(Rc::clone(body), Visibility::Public))?;
        }
        self.call_hook(Value::Ref(module), StaticSymbols::MethodAdded, &[Value::Symbol(name)])
    }

    /// Runs a class, module or singleton class body with `self` = the module.
    fn run_class_body(&mut self, module: HeapId, body: &Rc<Iseq>) -> RunResult<Value> {
        let serial = self.next_frame_serial();
        let cref = self.frame().cref.nested(module);
        let frame = Frame {
            iseq: Rc::clone(body),
            stack_base: self.stack.len(),
            self_value: Value::Ref(module),
            scope: Scope::new(body.local_table.len(), None),
            cref,
            block: None,
            kind: FrameKind::Class,
            serial,
            home: serial,
            break_tag: None,
            method: None,
            visibility: Visibility::Public,
            module_function: false,
            pending: Vec::new(),
        };
        self.run_frame(frame, 0)
    }

    /// Runs a `once` body in the scope of the current frame.
    fn run_once_body(&mut self, body: &Rc<Iseq>) -> RunResult<Value> {
        let serial = self.next_frame_serial();
        let (self_value, parent, cref, block, home, method) = {
            let frame = self.frame();
            (
                frame.self_value,
                Rc::clone(&frame.scope),
                Rc::clone(&frame.cref),
                frame.block,
                frame.home,
                frame.method.clone(),
            )
        };
        let frame = Frame {
            iseq: Rc::clone(body),
            stack_base: self.stack.len(),
            self_value,
            scope: Scope::new(body.local_table.len(), Some(parent)),
            cref,
            block,
            kind: FrameKind::Block,
            serial,
            home,
            break_tag: None,
            method,
            visibility: Visibility::Public,
            module_function: false,
            pending: Vec::new(),
        };
        self.run_frame(frame, 0)
    }

    /// `break` and `return` out of the current frame.
    fn exec_throw(&mut self, kind: ThrowKind, value: Value) -> RunResult<Value> {
        let frame = self.frame();
        match (kind, frame.kind) {
            (ThrowKind::Break, FrameKind::Lambda) => Ok(value),
            (ThrowKind::Break, FrameKind::Block) => match frame.break_tag {
                Some(tag) if self.active_break_tags.contains(&tag) => Err(RunError::Break { tag, value }),
                _ => Err(RunError::local_jump("break from proc-closure")),
            },
            (ThrowKind::Break, _) => Err(RunError::local_jump("break from proc-closure")),
            (ThrowKind::Return, FrameKind::Block) => {
                let home = frame.home;
                let live = self
                    .frames
                    .iter()
                    .any(|frame| frame.serial == home && frame.kind.catches_return());
                if live {
                    Err(RunError::Return { target: home, value })
                } else {
                    Err(RunError::local_jump("unexpected return"))
                }
            }
            (ThrowKind::Return, _) => Ok(value),
        }
    }

    /// Stores `key => value` in a Hash; unfrozen String keys are copied and frozen first.
    pub(crate) fn hash_store(&mut self, hash: Value, key: Value, value: Value) -> RunResult<()> {
        self.check_frozen(hash)?;
        let by_identity = self.hash_of(hash).is_some_and(|h| h.compare_by_identity);
        let key = match self.string_of(key) {
            Some(text) if !by_identity && !self.frozen(key) => {
                let copy = self.new_string_owned(text.to_owned())?;
                self.freeze_value(copy);
                copy
            }
            _ => key,
        };
        let hash_key = self.hash_key(key, by_identity);
        self.hash_mut(hash)?.insert(hash_key, key, value);
        Ok(())
    }

    /// `hash[key]`, consulting the default value or default proc when the key is absent.
    pub(crate) fn hash_fetch(&mut self, hash: Value, key: Value) -> RunResult<Value> {
        let Some(record) = self.hash_of(hash) else {
            return Err(RunError::internal("hash_fetch on a non-Hash"));
        };
        let hash_key = self.hash_key(key, record.compare_by_identity);
        if let Some(value) = record.get(&hash_key) {
            return Ok(value);
        }
        let (default, default_proc) = (record.default, record.default_proc);
        match default_proc {
            Some(default_proc) => self.call_proc(default_proc, &[hash, key], None),
            None => Ok(default),
        }
    }
}
