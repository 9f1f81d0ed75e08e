//! Enumerable: collection methods for any class with an `each`.
//!
//! Every method drives the receiver's own `each` through a native block, so a class only has
//! to yield its elements. Multiple yielded values arrive packed into one Array.

use std::{cell::RefCell, cmp::Ordering, rc::Rc};

use crate::{
    builtins::{block_ordering, count_arg, def, pack_yield, sort_values},
    callable::CallArgs,
    exception::{RunError, RunResult},
    intern::{StaticSymbols, Symbol},
    types::RHash,
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) {
    let enumerable = vm.core.enumerable;
    def(vm, enumerable, "to_a", -1, |vm, recv, _| {
        let items = collect(vm, recv)?;
        vm.new_array(items)
    });
    super::alias(vm, enumerable, "entries", "to_a");
    def(vm, enumerable, "map", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let items = fold_each(vm, recv, Vec::new(), move |vm, out, value| {
            out.push(vm.call_block(Some(block), &[value])?);
            Ok(true)
        })?;
        vm.new_array(items)
    });
    super::alias(vm, enumerable, "collect", "map");
    def(vm, enumerable, "flat_map", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let items = fold_each(vm, recv, Vec::new(), move |vm, out, value| {
            let mapped = vm.call_block(Some(block), &[value])?;
            match vm.array_of(mapped) {
                Some(inner) => out.extend_from_slice(inner),
                None => out.push(mapped),
            }
            Ok(true)
        })?;
        vm.new_array(items)
    });
    super::alias(vm, enumerable, "collect_concat", "flat_map");
    def(vm, enumerable, "select", 0, |vm, recv, args| filter(vm, recv, args, true));
    super::alias(vm, enumerable, "filter", "select");
    def(vm, enumerable, "reject", 0, |vm, recv, args| filter(vm, recv, args, false));
    def(vm, enumerable, "filter_map", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let items = fold_each(vm, recv, Vec::new(), move |vm, out, value| {
            let mapped = vm.call_block(Some(block), &[value])?;
            if mapped.truthy() {
                out.push(mapped);
            }
            Ok(true)
        })?;
        vm.new_array(items)
    });
    def(vm, enumerable, "find", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let found = fold_each(vm, recv, None, move |vm, found, value| {
            if vm.call_block(Some(block), &[value])?.truthy() {
                *found = Some(value);
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found.unwrap_or(Value::Nil))
    });
    super::alias(vm, enumerable, "detect", "find");
    def(vm, enumerable, "find_index", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let test = Test::from_args(args)?;
        let (_, found) = fold_each(vm, recv, (0_i64, None), move |vm, (index, found), value| {
            if test.matches(vm, value)? {
                *found = Some(*index);
                return Ok(false);
            }
            *index += 1;
            Ok(true)
        })?;
        Ok(found.map_or(Value::Nil, Value::Integer))
    });
    def(vm, enumerable, "any?", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let test = Test::from_args(args)?;
        let any = fold_each(vm, recv, false, move |vm, any, value| {
            *any = test.matches(vm, value)?;
            Ok(!*any)
        })?;
        Ok(Value::from_bool(any))
    });
    def(vm, enumerable, "all?", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let test = Test::from_args(args)?;
        let failed = fold_each(vm, recv, false, move |vm, failed, value| {
            *failed = !test.matches(vm, value)?;
            Ok(!*failed)
        })?;
        Ok(Value::from_bool(!failed))
    });
    def(vm, enumerable, "none?", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let test = Test::from_args(args)?;
        let any = fold_each(vm, recv, false, move |vm, any, value| {
            *any = test.matches(vm, value)?;
            Ok(!*any)
        })?;
        Ok(Value::from_bool(!any))
    });
    def(vm, enumerable, "count", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let test = match (args.opt(0), args.block) {
            (None, None) => None,
            _ => Some(Test::from_args(args)?),
        };
        let count = fold_each(vm, recv, 0_i64, move |vm, count, value| {
            if test.map_or(Ok(true), |test| test.matches(vm, value))? {
                *count += 1;
            }
            Ok(true)
        })?;
        Ok(Value::Integer(count))
    });
    def(vm, enumerable, "include?", 1, |vm, recv, args| {
        let target = args.get(0);
        let found = fold_each(vm, recv, false, move |vm, found, value| {
            *found = vm.values_eq(value, target)?;
            Ok(!*found)
        })?;
        Ok(Value::from_bool(found))
    });
    super::alias(vm, enumerable, "member?", "include?");
    def(vm, enumerable, "partition", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let (yes, no) = fold_each(vm, recv, (Vec::new(), Vec::new()), move |vm, (yes, no), value| {
            if vm.call_block(Some(block), &[value])?.truthy() {
                yes.push(value);
            } else {
                no.push(value);
            }
            Ok(true)
        })?;
        let yes = vm.new_array(yes)?;
        let no = vm.new_array(no)?;
        vm.new_array(vec![yes, no])
    });
    def(vm, enumerable, "inject", -1, inject);
    super::alias(vm, enumerable, "reduce", "inject");
    def(vm, enumerable, "sum", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let block = args.block;
        let init = args.opt(0).unwrap_or(Value::Integer(0));
        fold_each(vm, recv, init, move |vm, total, value| {
            let value = match block {
                Some(block) => vm.call_block(Some(block), &[value])?,
                None => value,
            };
            *total = vm.funcall(*total, StaticSymbols::Plus.into(), &[value])?;
            Ok(true)
        })
    });
    def(vm, enumerable, "min", -1, |vm, recv, args| extreme(vm, recv, args, Ordering::Less));
    def(vm, enumerable, "max", -1, |vm, recv, args| extreme(vm, recv, args, Ordering::Greater));
    def(vm, enumerable, "min_by", 0, |vm, recv, args| extreme_by(vm, recv, args, Ordering::Less));
    def(vm, enumerable, "max_by", 0, |vm, recv, args| extreme_by(vm, recv, args, Ordering::Greater));
    def(vm, enumerable, "sort", 0, |vm, recv, args| {
        let items = collect(vm, recv)?;
        let sorted = match args.block {
            Some(block) => sort_values(vm, items, &mut |vm, a, b| block_ordering(vm, block, a, b))?,
            None => sort_values(vm, items, &mut |vm, a, b| vm.compare_or_fail(a, b))?,
        };
        vm.new_array(sorted)
    });
    def(vm, enumerable, "sort_by", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let items = collect(vm, recv)?;
        let sorted = sort_by(vm, items, block)?;
        vm.new_array(sorted)
    });
    def(vm, enumerable, "each_with_index", 0, |vm, recv, args| {
        let block = args.require_block()?;
        fold_each(vm, recv, 0_i64, move |vm, index, value| {
            vm.call_block(Some(block), &[value, Value::Integer(*index)])?;
            *index += 1;
            Ok(true)
        })?;
        Ok(recv)
    });
    def(vm, enumerable, "each_with_object", 1, |vm, recv, args| {
        let block = args.require_block()?;
        let memo = args.get(0);
        fold_each(vm, recv, (), move |vm, (), value| {
            vm.call_block(Some(block), &[value, memo])?;
            Ok(true)
        })?;
        Ok(memo)
    });
    def(vm, enumerable, "each_slice", 1, |vm, recv, args| {
        let block = args.require_block()?;
        let size = count_arg(vm, args.get(0))?;
        if size == 0 {
            return Err(RunError::argument("invalid slice size"));
        }
        let rest = fold_each(vm, recv, Vec::new(), move |vm, slice, value| {
            slice.push(value);
            if slice.len() == size {
                let chunk = vm.new_array(std::mem::take(slice))?;
                vm.call_block(Some(block), &[chunk])?;
            }
            Ok(true)
        })?;
        if !rest.is_empty() {
            let chunk = vm.new_array(rest)?;
            vm.call_block(Some(block), &[chunk])?;
        }
        Ok(recv)
    });
    def(vm, enumerable, "group_by", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let groups = vm.new_hash(RHash::new())?;
        fold_each(vm, recv, (), move |vm, (), value| {
            let key = vm.call_block(Some(block), &[value])?;
            append_to_group(vm, groups, key, value)?;
            Ok(true)
        })?;
        Ok(groups)
    });
    def(vm, enumerable, "tally", 0, |vm, recv, _| {
        let counts = vm.new_hash(RHash::new())?;
        fold_each(vm, recv, (), move |vm, (), value| {
            let key = vm.hash_key(value, false);
            let current = vm.hash_of(counts).and_then(|hash| hash.get(&key));
            let next = match current {
                Some(Value::Integer(n)) => n + 1,
                _ => 1,
            };
            vm.hash_store(counts, value, Value::Integer(next))?;
            Ok(true)
        })?;
        Ok(counts)
    });
    def(vm, enumerable, "to_h", 0, |vm, recv, args| {
        let block = args.block;
        let hash = vm.new_hash(RHash::new())?;
        fold_each(vm, recv, (), move |vm, (), value| {
            let pair = match block {
                Some(block) => vm.call_block(Some(block), &[value])?,
                None => value,
            };
            let (key, val) = match vm.array_of(pair).map(Vec::as_slice) {
                Some(&[key, val]) => (key, val),
                _ => {
                    let name = vm.conversion_name(pair);
                    return Err(RunError::type_error(format!("wrong element type {name} (expected array)")));
                }
            };
            vm.hash_store(hash, key, val)?;
            Ok(true)
        })?;
        Ok(hash)
    });
    def(vm, enumerable, "uniq", 0, |vm, recv, args| {
        let block = args.block;
        let (items, _) = fold_each(vm, recv, (Vec::new(), RHash::new()), move |vm, (items, seen), value| {
            let keyed = match block {
                Some(block) => vm.call_block(Some(block), &[value])?,
                None => value,
            };
            let key = vm.hash_key(keyed, false);
            if !seen.contains(&key) {
                seen.insert(key, keyed, Value::True);
                items.push(value);
            }
            Ok(true)
        })?;
        vm.new_array(items)
    });
    def(vm, enumerable, "first", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        match args.opt(0) {
            None => {
                let first = fold_each(vm, recv, None, |_, first, value| {
                    *first = Some(value);
                    Ok(false)
                })?;
                Ok(first.unwrap_or(Value::Nil))
            }
            Some(n) => take(vm, recv, n),
        }
    });
    def(vm, enumerable, "take", 1, |vm, recv, args| take(vm, recv, args.get(0)));
}

/// Folds the values yielded by `recv.each` into `init`. `step` returns false to stop the
/// iteration early.
pub(super) fn fold_each<T: 'static>(
    vm: &mut Vm,
    recv: Value,
    init: T,
    step: impl Fn(&mut Vm, &mut T, Value) -> RunResult<bool> + 'static,
) -> RunResult<T> {
    let state = Rc::new(RefCell::new(Some(init)));
    let tag = vm.new_break_tag();
    let shared = Rc::clone(&state);
    let block = vm.native_proc_with_tag(tag, false, move |vm, args, _| {
        let value = pack_yield(vm, args)?;
        let mut guard = shared
            .try_borrow_mut()
            .map_err(|_| RunError::internal("iteration block re-entered"))?;
        let Some(acc) = guard.as_mut() else {
            return Err(RunError::internal("iteration block called after its iteration ended"));
        };
        if step(vm, acc, value)? {
            Ok(Value::Nil)
        } else {
            Err(RunError::Break { tag, value: Value::Nil })
        }
    })?;
    vm.active_break_tags.push(tag);
    let result = vm.funcall_with_block(recv, StaticSymbols::Each.into(), &[], block);
    vm.active_break_tags.pop();
    match result {
        Ok(_) => {}
        Err(RunError::Break { tag: target, .. }) if target == tag => {}
        Err(err) => return Err(err),
    }
    let finished = state.borrow_mut().take();
    finished.ok_or_else(|| RunError::internal("iteration state already taken"))
}

/// Every value yielded by `each`, in order.
pub(super) fn collect(vm: &mut Vm, recv: Value) -> RunResult<Vec<Value>> {
    fold_each(vm, recv, Vec::new(), |_, out, value| {
        out.push(value);
        Ok(true)
    })
}

/// A pattern argument (matched with `===`), a block, or plain truthiness.
#[derive(Clone, Copy)]
enum Test {
    Pattern(Value),
    Block(Value),
    Truthy,
}

impl Test {
    fn from_args(args: CallArgs<'_>) -> RunResult<Self> {
        Ok(match (args.opt(0), args.block) {
            (Some(pattern), _) => Self::Pattern(pattern),
            (None, Some(block)) => Self::Block(block),
            (None, None) => Self::Truthy,
        })
    }

    fn matches(self, vm: &mut Vm, value: Value) -> RunResult<bool> {
        Ok(match self {
            Self::Pattern(pattern) => vm.funcall(pattern, StaticSymbols::Eqq.into(), &[value])?.truthy(),
            Self::Block(block) => vm.call_block(Some(block), &[value])?.truthy(),
            Self::Truthy => value.truthy(),
        })
    }
}

fn filter(vm: &mut Vm, recv: Value, args: CallArgs<'_>, keep: bool) -> RunResult<Value> {
    let block = args.require_block()?;
    let items = fold_each(vm, recv, Vec::new(), move |vm, out, value| {
        if vm.call_block(Some(block), &[value])?.truthy() == keep {
            out.push(value);
        }
        Ok(true)
    })?;
    vm.new_array(items)
}

/// `inject(init = nil, sym = nil) { |memo, value| }`. A lone argument is the operator when no
/// block is given.
fn inject(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    args.check(0, Some(2))?;
    let (init, op) = match (args.args, args.block) {
        ([], Some(_)) => (None, None),
        ([init], Some(_)) => (Some(*init), None),
        ([op], None) => (None, Some(vm.expect_name(*op)?)),
        ([init, op], _) => (Some(*init), Some(vm.expect_name(*op)?)),
        _ => return Err(RunError::local_jump("no block given")),
    };
    let block = args.block;
    let memo = fold_each(vm, recv, init, move |vm, memo, value| {
        *memo = Some(match *memo {
            None => value,
            Some(acc) => combine(vm, acc, value, op, block)?,
        });
        Ok(true)
    })?;
    Ok(memo.unwrap_or(Value::Nil))
}

fn combine(vm: &mut Vm, acc: Value, value: Value, op: Option<Symbol>, block: Option<Value>) -> RunResult<Value> {
    match (op, block) {
        (Some(op), _) => vm.call_method(acc, op, &[value], None, None, false),
        (None, block) => vm.call_block(block, &[acc, value]),
    }
}

/// `min`/`max`, optionally with a comparison block or a count.
fn extreme(vm: &mut Vm, recv: Value, args: CallArgs<'_>, want: Ordering) -> RunResult<Value> {
    args.check(0, Some(1))?;
    let items = collect(vm, recv)?;
    let block = args.block;
    let mut compare = |vm: &mut Vm, a: Value, b: Value| match block {
        Some(block) => block_ordering(vm, block, a, b),
        None => vm.compare_or_fail(a, b),
    };
    if let Some(n) = args.opt(0) {
        let n = count_arg(vm, n)?;
        let mut sorted = sort_values(vm, items, &mut compare)?;
        if want == Ordering::Greater {
            sorted.reverse();
        }
        sorted.truncate(n);
        return vm.new_array(sorted);
    }
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            Some(current) if compare(vm, item, current)? != want => current,
            _ => item,
        });
    }
    Ok(best.unwrap_or(Value::Nil))
}

fn extreme_by(vm: &mut Vm, recv: Value, args: CallArgs<'_>, want: Ordering) -> RunResult<Value> {
    let block = args.require_block()?;
    let items = collect(vm, recv)?;
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let key = vm.call_block(Some(block), &[item])?;
        best = Some(match best {
            Some((current, current_key)) if vm.compare_or_fail(key, current_key)? != want => (current, current_key),
            _ => (item, key),
        });
    }
    Ok(best.map_or(Value::Nil, |(item, _)| item))
}

/// Sorts by the block's key for each element, computing every key once.
pub(super) fn sort_by(vm: &mut Vm, items: Vec<Value>, block: Value) -> RunResult<Vec<Value>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let key = vm.call_block(Some(block), &[item])?;
        keyed.push(vm.new_array(vec![key, item])?);
    }
    let sorted = sort_values(vm, keyed, &mut |vm, a, b| {
        let key_a = vm.array_of(a).map_or(Value::Nil, |pair| pair[0]);
        let key_b = vm.array_of(b).map_or(Value::Nil, |pair| pair[0]);
        vm.compare_or_fail(key_a, key_b)
    })?;
    Ok(sorted
        .into_iter()
        .map(|pair| vm.array_of(pair).map_or(Value::Nil, |pair| pair[1]))
        .collect())
}

fn take(vm: &mut Vm, recv: Value, n: Value) -> RunResult<Value> {
    let n = count_arg(vm, n)?;
    if n == 0 {
        return vm.new_array(Vec::new());
    }
    let items = fold_each(vm, recv, Vec::new(), move |_, out, value| {
        out.push(value);
        Ok(out.len() < n)
    })?;
    vm.new_array(items)
}

/// Appends `value` to the Array stored under `key`, creating it on first use.
pub(super) fn append_to_group(vm: &mut Vm, groups: Value, key: Value, value: Value) -> RunResult<()> {
    let hash_key = vm.hash_key(key, false);
    match vm.hash_of(groups).and_then(|hash| hash.get(&hash_key)) {
        Some(group) => vm.array_mut(group)?.push(value),
        None => {
            let group = vm.new_array(vec![value])?;
            vm.hash_store(groups, key, group)?;
        }
    }
    Ok(())
}
