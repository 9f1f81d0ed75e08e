//! The `opt_*` instructions.
//!
//! Each operator runs inline when the receiver and argument have builtin types and the method
//! it stands for is still the builtin one: not redefined in the class, not shadowed by an
//! included or prepended module and not overridden on the receiver's singleton class.
//! Anything else is an ordinary send of the operator's method.

use num_integer::Integer;
use smallvec::SmallVec;

use crate::{
    builtins::float::float_mod,
    exception::RunResult,
    heap::{HeapData, HeapId},
    intern::{StaticSymbols, Symbol},
    iseq::{CallData, FastOp},
    value::Value,
    vm::Vm,
};

impl Vm {
    /// Executes `op` with its receiver and arguments on the stack, replacing them with the
    /// result.
    pub(super) fn exec_fast(&mut self, op: FastOp, call_data: &CallData) -> RunResult<()> {
        let argc = op.argc() as usize;
        let len = self.stack.len();
        let receiver_at = len - argc - 1;
        let receiver = self.stack[receiver_at];
        let args: SmallVec<[Value; 2]> = self.stack[len - argc..].iter().copied().collect();

        let fast = if self.builtin_intact(receiver, op) {
            self.try_fast(op, receiver, &args)?
        } else {
            None
        };
        self.tracer.on_fast_path(op.into(), fast.is_some());
        let result = match fast {
            Some(value) => value,
            None => self.call_method(
                receiver,
                call_data.mid,
                &args,
                None,
                Some(call_data),
                call_data.is_fcall(),
            )?,
        };
        self.stack.truncate(receiver_at);
        self.stack.push(result);
        Ok(())
    }

    /// Whether `receiver` still resolves `op` (and `==` for `!=`) to the builtin method.
    fn builtin_intact(&mut self, receiver: Value, op: FastOp) -> bool {
        if let Value::Ref(id) = receiver
            && self.heap.get(id).singleton.is_some()
        {
            return false;
        }
        let class = self.real_class_of(receiver);
        let intact = self.resolves_to_builtin(class, op.method().into());
        if op == FastOp::Neq {
            intact && self.resolves_to_builtin(class, StaticSymbols::Eq.into())
        } else {
            intact
        }
    }

    /// Whether lookup of `mid` from `class` lands on the native installed at bootstrap,
    /// whichever ancestor owns it (`!=` lives on BasicObject).
    fn resolves_to_builtin(&mut self, class: HeapId, mid: Symbol) -> bool {
        let Some(entry) = self.find_method(class, mid) else {
            return false;
        };
        self.builtin_methods
            .get(&(entry.owner, mid))
            .is_some_and(|builtin| entry.callable.same_body(builtin))
    }

    /// The inline result, or `None` when the operand types (or values) need the full method.
    fn try_fast(&mut self, op: FastOp, receiver: Value, args: &[Value]) -> RunResult<Option<Value>> {
        let arg = args.first().copied().unwrap_or_default();
        Ok(match (receiver, arg) {
            (Value::Integer(a), Value::Integer(b)) if op != FastOp::Aref && op != FastOp::Aset => {
                integer_op(op, a, b)
            }
            (Value::Float(a), Value::Float(b)) => float_op(op, a, b),
            (Value::Symbol(a), Value::Symbol(b)) => match op {
                FastOp::Eq => Some(Value::from_bool(a == b)),
                FastOp::Neq => Some(Value::from_bool(a != b)),
                _ => None,
            },
            (Value::Ref(id), _) => match self.heap.data(id) {
                HeapData::String(_) => self.string_op(op, receiver, arg)?,
                HeapData::Array(_) => self.array_op(op, receiver, args),
                HeapData::Hash(_) => self.hash_op(op, receiver, args)?,
                _ => None,
            },
            _ => None,
        })
    }

    fn string_op(&mut self, op: FastOp, receiver: Value, arg: Value) -> RunResult<Option<Value>> {
        let Some(text) = self.string_of(receiver) else {
            return Ok(None);
        };
        if op == FastOp::Length {
            return Ok(Some(Value::Integer(text.chars().count() as i64)));
        }
        let Some(other) = self.string_of(arg) else {
            return Ok(None);
        };
        Ok(match op {
            FastOp::Eq => Some(Value::from_bool(text == other)),
            FastOp::Neq => Some(Value::from_bool(text != other)),
            FastOp::Plus => {
                let joined = format!("{text}{other}");
                Some(self.new_string_owned(joined)?)
            }
            FastOp::Ltlt if !self.frozen(receiver) => {
                let other = other.to_owned();
                self.string_mut(receiver)?.push_str(&other);
                Some(receiver)
            }
            _ => None,
        })
    }

    fn array_op(&mut self, op: FastOp, receiver: Value, args: &[Value]) -> Option<Value> {
        let len = self.array_of(receiver)?.len();
        match (op, args) {
            (FastOp::Length, _) => Some(Value::Integer(len as i64)),
            (FastOp::Aref, &[Value::Integer(index)]) => {
                let items = self.array_of(receiver)?;
                Some(resolve_index(index, len).and_then(|i| items.get(i).copied()).unwrap_or(Value::Nil))
            }
            (FastOp::Aset, &[Value::Integer(index), value]) if !self.frozen(receiver) => {
                let slot = if index < 0 {
                    resolve_index(index, len)?
                } else {
                    usize::try_from(index).ok()?
                };
                let items = self.array_mut(receiver).ok()?;
                if slot >= items.len() {
                    items.resize(slot + 1, Value::Nil);
                }
                items[slot] = value;
                Some(value)
            }
            (FastOp::Ltlt, &[value]) if !self.frozen(receiver) => {
                self.array_mut(receiver).ok()?.push(value);
                Some(receiver)
            }
            _ => None,
        }
    }

    fn hash_op(&mut self, op: FastOp, receiver: Value, args: &[Value]) -> RunResult<Option<Value>> {
        let Some(hash) = self.hash_of(receiver) else {
            return Ok(None);
        };
        Ok(match (op, args) {
            (FastOp::Length, _) => Some(Value::Integer(hash.len() as i64)),
            (FastOp::Aref, &[key]) if hash.default_proc.is_none() => Some(self.hash_fetch(receiver, key)?),
            (FastOp::Aset, &[key, value]) if !self.frozen(receiver) => {
                self.hash_store(receiver, key, value)?;
                Some(value)
            }
            _ => None,
        })
    }
}

/// Position of a possibly negative index in a sequence of `len` elements.
pub(crate) fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index < 0 {
        let from_end = usize::try_from(index.unsigned_abs()).ok()?;
        len.checked_sub(from_end)
    } else {
        usize::try_from(index).ok()
    }
}

fn integer_op(op: FastOp, a: i64, b: i64) -> Option<Value> {
    let int = |n: Option<i64>| n.map(Value::Integer);
    match op {
        FastOp::Plus => int(a.checked_add(b)),
        FastOp::Minus => int(a.checked_sub(b)),
        FastOp::Mult => int(a.checked_mul(b)),
        // Zero divisors and `MIN / -1` go to the method, which raises or promotes.
        FastOp::Div if b != 0 && !(a == i64::MIN && b == -1) => Some(Value::Integer(a.div_floor(&b))),
        FastOp::Mod if b != 0 && !(a == i64::MIN && b == -1) => Some(Value::Integer(a.mod_floor(&b))),
        FastOp::Lt => Some(Value::from_bool(a < b)),
        FastOp::Le => Some(Value::from_bool(a <= b)),
        FastOp::Gt => Some(Value::from_bool(a > b)),
        FastOp::Ge => Some(Value::from_bool(a >= b)),
        FastOp::Eq => Some(Value::from_bool(a == b)),
        FastOp::Neq => Some(Value::from_bool(a != b)),
        _ => None,
    }
}

fn float_op(op: FastOp, a: f64, b: f64) -> Option<Value> {
    Some(match op {
        FastOp::Plus => Value::Float(a + b),
        FastOp::Minus => Value::Float(a - b),
        FastOp::Mult => Value::Float(a * b),
        FastOp::Div => Value::Float(a / b),
        FastOp::Mod => Value::Float(float_mod(a, b)),
        FastOp::Lt => Value::from_bool(a < b),
        FastOp::Le => Value::from_bool(a <= b),
        FastOp::Gt => Value::from_bool(a > b),
        FastOp::Ge => Value::from_bool(a >= b),
        FastOp::Eq => Value::from_bool(a == b),
        FastOp::Neq => Value::from_bool(a != b),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indexes_count_from_the_end() {
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(-4, 3), None);
        assert_eq!(resolve_index(5, 3), Some(5));
    }

    #[test]
    fn integer_division_floors() {
        assert_eq!(integer_op(FastOp::Div, -7, 2), Some(Value::Integer(-4)));
        assert_eq!(integer_op(FastOp::Mod, -7, 2), Some(Value::Integer(1)));
        assert_eq!(integer_op(FastOp::Div, 1, 0), None);
        assert_eq!(integer_op(FastOp::Plus, i64::MAX, 1), None);
    }
}
