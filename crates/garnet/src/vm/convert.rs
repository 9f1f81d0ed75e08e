//! Inspection, equality and implicit conversions.

use std::{cmp::Ordering, fmt::Write as _};

use num_bigint::BigInt;

use crate::{
    builtins::float::format_float,
    exception::{RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::StaticSymbols,
    types::{HashKey, string},
    value::Value,
    vm::Vm,
};

/// Inspect nesting beyond which containers print as `[...]`.
const MAX_INSPECT_DEPTH: usize = 64;

impl Vm {
    /// `value.inspect` through dispatch.
    pub(crate) fn inspect_value(&mut self, value: Value) -> RunResult<String> {
        // Immediates cannot have singleton methods, so only a redefinition in their class
        // could change the result; dispatch covers that too.
        let result = self.funcall(value, StaticSymbols::Inspect.into(), &[])?;
        Ok(self.text_or_default(result))
    }

    /// `value.to_s` through dispatch.
    pub(crate) fn to_s_value(&mut self, value: Value) -> RunResult<String> {
        if let Some(s) = self.string_of(value) {
            return Ok(s.to_owned());
        }
        let result = self.funcall(value, StaticSymbols::ToS.into(), &[])?;
        Ok(self.text_or_default(result))
    }

    fn text_or_default(&self, value: Value) -> String {
        match self.string_of(value) {
            Some(s) => s.to_owned(),
            None => self.default_to_s(value),
        }
    }

    /// `#<Foo>`-style rendering used when `to_s` does not return a String.
    #[must_use]
    pub(crate) fn default_to_s(&self, value: Value) -> String {
        let class = self.real_class_of(value);
        let name = self.module_display_name(class);
        match value {
            Value::Ref(id) => format!("#<{name}:{:#018x}>", self.heap.get(id).object_id),
            _ => format!("#<{name}>"),
        }
    }

    /// The builtin `inspect` of a value, without dispatching on the value itself.
    ///
    /// Container elements are still inspected through dispatch.
    pub(crate) fn builtin_inspect(&mut self, value: Value) -> RunResult<String> {
        match value {
            Value::Nil => Ok("nil".to_owned()),
            Value::True => Ok("true".to_owned()),
            Value::False => Ok("false".to_owned()),
            Value::Integer(n) => Ok(n.to_string()),
            Value::Float(f) => Ok(format_float(f)),
            Value::Symbol(sym) => Ok(string::inspect_symbol(self.interns.get(sym))),
            Value::Ref(id) => self.inspect_heap(id),
        }
    }

    fn inspect_heap(&mut self, id: HeapId) -> RunResult<String> {
        match self.heap.data(id) {
            HeapData::String(s) => Ok(string::inspect(s)),
            HeapData::BigInt(b) => Ok(b.to_string()),
            HeapData::Array(_) => self.inspect_array(id),
            HeapData::Hash(_) => self.inspect_hash(id),
            HeapData::Module(_) | HeapData::Class(_) => Ok(self.module_display_name(id)),
            HeapData::Regexp(regexp) => Ok(regexp.inspect()),
            HeapData::Proc(proc) => {
                let lambda = if proc.is_lambda { " (lambda)" } else { "" };
                Ok(format!("#<Proc:{:#018x}{lambda}>", self.heap.get(id).object_id))
            }
            HeapData::Io(stream) => Ok(format!("#<IO:<{}>>", if stream.fileno() == 1 { "STDOUT" } else { "STDERR" })),
            HeapData::Exception(_) => self.inspect_exception(id),
            HeapData::Object => self.inspect_object(id),
        }
    }

    /// Runs `body` with `id` on the inspect guard; returns `recursive` if it already is.
    fn guarded(
        &mut self,
        id: HeapId,
        recursive: &str,
        body: impl FnOnce(&mut Self) -> RunResult<String>,
    ) -> RunResult<String> {
        if self.inspect_guard.contains(&id) || self.inspect_guard.len() >= MAX_INSPECT_DEPTH {
            return Ok(recursive.to_owned());
        }
        self.inspect_guard.push(id);
        let result = body(self);
        self.inspect_guard.pop();
        result
    }

    fn inspect_array(&mut self, id: HeapId) -> RunResult<String> {
        self.guarded(id, "[...]", |vm| {
            let items = vm.array_of(Value::Ref(id)).cloned().unwrap_or_default();
            let mut out = String::from("[");
            for (i, item) in items.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&vm.inspect_value(item)?);
            }
            out.push(']');
            Ok(out)
        })
    }

    fn inspect_hash(&mut self, id: HeapId) -> RunResult<String> {
        self.guarded(id, "{...}", |vm| {
            let pairs = vm.hash_of(Value::Ref(id)).map(|h| h.pair_vec()).unwrap_or_default();
            if pairs.is_empty() {
                return Ok("{}".to_owned());
            }
            let mut out = String::from("{");
            for (i, (key, value)) in pairs.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&vm.inspect_value(key)?);
                out.push_str("=>");
                out.push_str(&vm.inspect_value(value)?);
            }
            out.push('}');
            Ok(out)
        })
    }

    fn inspect_object(&mut self, id: HeapId) -> RunResult<String> {
        let base = self.default_to_s(Value::Ref(id));
        let ivars: Vec<_> = self
            .heap
            .get(id)
            .ivars
            .as_ref()
            .map(|ivars| ivars.iter().map(|(&k, &v)| (k, v)).collect())
            .unwrap_or_default();
        if ivars.is_empty() {
            return Ok(base);
        }
        self.guarded(id, &format!("{}...>", &base[..base.len() - 1]), |vm| {
            let mut out = base[..base.len() - 1].to_owned();
            for (i, (name, value)) in ivars.into_iter().enumerate() {
                out.push_str(if i == 0 { " " } else { ", " });
                let rendered = vm.inspect_value(value)?;
                let _ = write!(out, "{}={rendered}", vm.interns.get(name));
            }
            out.push('>');
            Ok(out)
        })
    }

    fn inspect_exception(&mut self, id: HeapId) -> RunResult<String> {
        let class = self.heap.class_of(id);
        let class_name = self.module_display_name(class);
        let message = self.exception_message(Value::Ref(id))?;
        if message.is_empty() || message == class_name {
            Ok(class_name)
        } else {
            Ok(format!("#<{class_name}: {message}>"))
        }
    }

    /// `a == b` with builtin shortcuts; other receivers dispatch `==`.
    pub(crate) fn values_eq(&mut self, a: Value, b: Value) -> RunResult<bool> {
        if a.identical(b) {
            return Ok(!matches!(a, Value::Float(f) if f.is_nan()));
        }
        match (a, b) {
            (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => {
                return Ok(x as f64 == y);
            }
            (Value::Float(x), Value::Float(y)) => return Ok(x == y),
            (Value::Ref(_), _) => {}
            _ => return Ok(false),
        }
        let result = self.funcall(a, StaticSymbols::Eq.into(), &[b])?;
        Ok(result.truthy())
    }

    /// Structural equality of builtin values, used by `Array#==`/`Hash#==`.
    pub(crate) fn builtin_eq(&mut self, a: Value, b: Value) -> RunResult<Option<bool>> {
        let (Some(x), Some(y)) = (a.heap_id(), b.heap_id()) else {
            return Ok(None);
        };
        match (self.heap.data(x), self.heap.data(y)) {
            (HeapData::String(s), HeapData::String(t)) => Ok(Some(s == t)),
            (HeapData::BigInt(s), HeapData::BigInt(t)) => Ok(Some(s == t)),
            (HeapData::Array(s), HeapData::Array(t)) => {
                if s.len() != t.len() {
                    return Ok(Some(false));
                }
                let pairs: Vec<_> = s.iter().copied().zip(t.iter().copied()).collect();
                if self.inspect_guard.contains(&x) {
                    return Ok(Some(x == y));
                }
                self.inspect_guard.push(x);
                let mut equal = true;
                for (p, q) in pairs {
                    match self.values_eq(p, q) {
                        Ok(true) => {}
                        Ok(false) => {
                            equal = false;
                            break;
                        }
                        Err(err) => {
                            self.inspect_guard.pop();
                            return Err(err);
                        }
                    }
                }
                self.inspect_guard.pop();
                Ok(Some(equal))
            }
            (HeapData::Hash(s), HeapData::Hash(t)) => {
                if s.len() != t.len() {
                    return Ok(Some(false));
                }
                let entries: Vec<_> = s.raw_entries().map(|(k, &(_, v))| (k.clone(), v)).collect();
                let other: Vec<_> = entries.iter().map(|(k, _)| t.get(k)).collect();
                for ((_, v), w) in entries.into_iter().zip(other) {
                    match w {
                        Some(w) if self.values_eq(v, w)? => {}
                        _ => return Ok(Some(false)),
                    }
                }
                Ok(Some(true))
            }
            _ => Ok(None),
        }
    }

    /// Hash-table key of `value`.
    #[must_use]
    pub(crate) fn hash_key(&self, value: Value, by_identity: bool) -> HashKey {
        HashKey::of(&self.heap, value, by_identity)
    }

    /// `a <=> b` as an ordering; `None` when incomparable.
    pub(crate) fn compare_values(&mut self, a: Value, b: Value) -> RunResult<Option<Ordering>> {
        match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => return Ok(Some(x.cmp(&y))),
            (Value::Float(x), Value::Float(y)) => return Ok(x.partial_cmp(&y)),
            (Value::Integer(x), Value::Float(y)) => return Ok((x as f64).partial_cmp(&y)),
            (Value::Float(x), Value::Integer(y)) => return Ok(x.partial_cmp(&(y as f64))),
            _ => {}
        }
        if let (Some(x), Some(y)) = (self.string_of(a), self.string_of(b)) {
            return Ok(Some(x.cmp(y)));
        }
        let result = self.funcall(a, StaticSymbols::Cmp.into(), &[b])?;
        Ok(self.ordering_of(result))
    }

    /// Interprets the result of `<=>`.
    #[must_use]
    pub(crate) fn ordering_of(&self, value: Value) -> Option<Ordering> {
        match value {
            Value::Integer(n) => Some(n.cmp(&0)),
            Value::Float(f) => f.partial_cmp(&0.0),
            other => self.bigint_of(other).map(|b| b.sign().cmp(&num_bigint::Sign::NoSign)),
        }
    }

    /// `a <=> b`, raising ArgumentError when the values are incomparable.
    pub(crate) fn compare_or_fail(&mut self, a: Value, b: Value) -> RunResult<Ordering> {
        match self.compare_values(a, b)? {
            Some(ordering) => Ok(ordering),
            None => Err(self.comparison_failed(a, b)),
        }
    }

    pub(crate) fn comparison_failed(&mut self, a: Value, b: Value) -> RunError {
        let left = self.module_display_name(self.real_class_of(a));
        let right = match b {
            Value::Nil | Value::True | Value::False | Value::Integer(_) | Value::Float(_) => {
                self.inspect_value(b).unwrap_or_default()
            }
            _ => self.module_display_name(self.real_class_of(b)),
        };
        RunError::argument(format!("comparison of {left} with {right} failed"))
    }

    /// Class name used in conversion errors: `nil`, `true`, `false` or the class.
    #[must_use]
    pub(crate) fn conversion_name(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_owned(),
            Value::True => "true".to_owned(),
            Value::False => "false".to_owned(),
            other => self.module_display_name(self.real_class_of(other)),
        }
    }

    /// Implicit Integer conversion (`Integer` or `to_int`).
    pub(crate) fn expect_int(&mut self, value: Value) -> RunResult<i64> {
        match value {
            Value::Integer(n) => Ok(n),
            Value::Ref(_) if self.bigint_of(value).is_some() => Err(crate::exception::ExcType::RangeError.error(
                "bignum too big to convert into `long'",
            )),
            Value::Float(f) if f.is_finite() => Ok(f as i64),
            other => Err(RunError::no_implicit_conversion(&self.conversion_name(other), "Integer")),
        }
    }

    /// Implicit String conversion (`String` or `to_str`).
    pub(crate) fn expect_string(&mut self, value: Value) -> RunResult<String> {
        if let Some(s) = self.string_of(value) {
            return Ok(s.to_owned());
        }
        if value.heap_id().is_some() && self.responds_to(value, StaticSymbols::ToStr.into())? {
            let converted = self.funcall(value, StaticSymbols::ToStr.into(), &[])?;
            if let Some(s) = self.string_of(converted) {
                return Ok(s.to_owned());
            }
        }
        Err(RunError::no_implicit_conversion(&self.conversion_name(value), "String"))
    }

    /// Implicit Array conversion (`Array` or `to_ary`); `None` for other values.
    pub(crate) fn try_array(&mut self, value: Value) -> RunResult<Option<Vec<Value>>> {
        if let Some(items) = self.array_of(value) {
            return Ok(Some(items.clone()));
        }
        if value.heap_id().is_none() {
            return Ok(None);
        }
        let to_ary = self.interns.intern("to_ary");
        if self.responds_to(value, to_ary)? {
            let converted = self.funcall(value, to_ary, &[])?;
            return Ok(self.array_of(converted).cloned());
        }
        Ok(None)
    }

    /// Symbol or String name argument, e.g. for `send` or `const_get`.
    pub(crate) fn expect_name(&mut self, value: Value) -> RunResult<crate::intern::Symbol> {
        match value {
            Value::Symbol(sym) => Ok(sym),
            other => match self.string_of(other) {
                Some(s) => {
                    let s = s.to_owned();
                    Ok(self.interns.intern(&s))
                }
                None => {
                    let inspected = self.inspect_value(other)?;
                    Err(RunError::type_error(format!("{inspected} is not a symbol nor a string")))
                }
            },
        }
    }

    /// Numeric value as `f64` for Float arithmetic.
    pub(crate) fn to_f64(&self, value: Value) -> Option<f64> {
        match value {
            Value::Integer(n) => Some(n as f64),
            Value::Float(f) => Some(f),
            other => self
                .bigint_of(other)
                .map(|b| num_traits::ToPrimitive::to_f64(&b).unwrap_or(f64::INFINITY)),
        }
    }

    /// Value for `BigInt` results, demoted to `i64` when it fits.
    pub(crate) fn int_result(&mut self, value: BigInt) -> RunResult<Value> {
        self.new_integer(value)
    }

    /// How a receiver is named in NoMethodError/NameError messages.
    pub(crate) fn describe_receiver(&mut self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_owned(),
            Value::True => "true".to_owned(),
            Value::False => "false".to_owned(),
            v if v.identical(self.main) => "main:Object".to_owned(),
            Value::Ref(id) if self.heap.is_module(id) => {
                let kind = if self.heap.as_class(id).is_some() { "class" } else { "module" };
                format!("{kind} {}", self.module_display_name(id))
            }
            other => format!("an instance of {}", self.module_display_name(self.real_class_of(other))),
        }
    }
}
