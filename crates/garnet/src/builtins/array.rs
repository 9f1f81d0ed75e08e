//! Array.
//!
//! Iterating methods re-read the receiver after every block call, so a block that grows or
//! shrinks the array is seen by the loop (as Ruby programs expect from `each`).

use std::cmp::Ordering;

use crate::{
    builtins::{block_ordering, count_arg, def, def_private, enumerable, sort_values},
    callable::CallArgs,
    exception::{ExcType, RunError, RunResult},
    heap::HeapId,
    types::RHash,
    value::Value,
    vm::{Vm, resolve_index},
};

pub(super) fn register(vm: &mut Vm) {
    let array = vm.core.array;
    def_private(vm, array, "initialize", -1, initialize);

    register_access(vm, array);
    register_mutation(vm, array);
    register_iteration(vm, array);
    register_transforms(vm, array);
    register_operators(vm, array);
}

/// `Array.new(size = 0, default = nil)`, `Array.new(size) { |i| }` or `Array.new(array)`.
fn initialize(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    args.check(0, Some(2))?;
    let items = match (args.opt(0), args.opt(1)) {
        (None, _) => Vec::new(),
        (Some(first), None) if vm.array_of(first).is_some() => vm.array_of(first).cloned().unwrap_or_default(),
        (Some(size), default) => {
            let size = count_arg(vm, size)?;
            reserve(vm, size)?;
            match args.block {
                Some(block) => {
                    let mut items = Vec::with_capacity(size);
                    for i in 0..size {
                        items.push(vm.call_block(Some(block), &[Value::Integer(i as i64)])?);
                    }
                    items
                }
                None => vec![default.unwrap_or(Value::Nil); size],
            }
        }
    };
    *vm.array_mut(recv)? = items;
    Ok(Value::Nil)
}

fn register_access(vm: &mut Vm, array: HeapId) {
    def(vm, array, "[]", -2, aref);
    super::alias(vm, array, "slice", "[]");
    def(vm, array, "[]=", -3, aset);
    def(vm, array, "at", 1, |vm, recv, args| {
        let index = vm.expect_int(args.get(0))?;
        Ok(element(vm, recv, index))
    });
    def(vm, array, "dig", -2, |vm, recv, args| {
        let index = vm.expect_int(args.get(0))?;
        let found = element(vm, recv, index);
        match args.args.get(1..) {
            Some(rest) if !rest.is_empty() && !found.is_nil() => {
                let dig = vm.interns.intern("dig");
                vm.call_method(found, dig, rest, None, None, false)
            }
            _ => Ok(found),
        }
    });
    def(vm, array, "fetch", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let index = vm.expect_int(args.get(0))?;
        let len = items(vm, recv).len();
        if let Some(value) = resolve_index(index, len).and_then(|i| vm.array_of(recv)?.get(i).copied()) {
            return Ok(value);
        }
        if let Some(block) = args.block {
            return vm.call_block(Some(block), &[args.get(0)]);
        }
        if let Some(default) = args.opt(1) {
            return Ok(default);
        }
        let len = len as i64;
        Err(ExcType::IndexError.error(format!(
            "index {index} outside of array bounds: {}...{len}",
            -len
        )))
    });
    def(vm, array, "first", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        match args.opt(0) {
            None => Ok(element(vm, recv, 0)),
            Some(n) => {
                let n = count_arg(vm, n)?;
                let head = items(vm, recv).into_iter().take(n).collect();
                vm.new_array(head)
            }
        }
    });
    def(vm, array, "last", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        match args.opt(0) {
            None => Ok(element(vm, recv, -1)),
            Some(n) => {
                let n = count_arg(vm, n)?;
                let all = items(vm, recv);
                let tail = all[all.len().saturating_sub(n)..].to_vec();
                vm.new_array(tail)
            }
        }
    });
    def(vm, array, "values_at", -1, |vm, recv, args| {
        let mut picked = Vec::with_capacity(args.len());
        for &index in args.args {
            let index = vm.expect_int(index)?;
            picked.push(element(vm, recv, index));
        }
        vm.new_array(picked)
    });
    def(vm, array, "take", 1, |vm, recv, args| {
        let n = count_arg(vm, args.get(0))?;
        let head = items(vm, recv).into_iter().take(n).collect();
        vm.new_array(head)
    });
    def(vm, array, "drop", 1, |vm, recv, args| {
        let n = count_arg(vm, args.get(0))?;
        let rest = items(vm, recv).into_iter().skip(n).collect();
        vm.new_array(rest)
    });
    def(vm, array, "length", 0, |vm, recv, _| Ok(Value::Integer(items(vm, recv).len() as i64)));
    super::alias(vm, array, "size", "length");
    def(vm, array, "empty?", 0, |vm, recv, _| {
        Ok(Value::from_bool(vm.array_of(recv).is_none_or(Vec::is_empty)))
    });
    def(vm, array, "include?", 1, |vm, recv, args| {
        for item in items(vm, recv) {
            if vm.values_eq(item, args.get(0))? {
                return Ok(Value::True);
            }
        }
        Ok(Value::False)
    });
    def(vm, array, "index", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        for (i, item) in items(vm, recv).into_iter().enumerate() {
            let hit = match (args.opt(0), args.block) {
                (Some(target), _) => vm.values_eq(item, target)?,
                (None, Some(block)) => vm.call_block(Some(block), &[item])?.truthy(),
                (None, None) => return Err(RunError::local_jump("no block given (yield)")),
            };
            if hit {
                return Ok(Value::Integer(i as i64));
            }
        }
        Ok(Value::Nil)
    });
    super::alias(vm, array, "find_index", "index");
    def(vm, array, "to_a", 0, |_, recv, _| Ok(recv));
    super::alias(vm, array, "to_ary", "to_a");
    def(vm, array, "inspect", 0, |vm, recv, _| {
        let text = vm.builtin_inspect(recv)?;
        vm.new_string_owned(text)
    });
    super::alias(vm, array, "to_s", "inspect");
}

fn register_mutation(vm: &mut Vm, array: HeapId) {
    def(vm, array, "push", -1, |vm, recv, args| {
        vm.array_mut(recv)?.extend_from_slice(args.args);
        Ok(recv)
    });
    super::alias(vm, array, "append", "push");
    def(vm, array, "<<", 1, |vm, recv, args| {
        vm.array_mut(recv)?.push(args.get(0));
        Ok(recv)
    });
    def(vm, array, "pop", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        match args.opt(0) {
            None => Ok(vm.array_mut(recv)?.pop().unwrap_or(Value::Nil)),
            Some(n) => {
                let n = count_arg(vm, n)?;
                let items = vm.array_mut(recv)?;
                let at = items.len().saturating_sub(n);
                let popped = items.split_off(at);
                vm.new_array(popped)
            }
        }
    });
    def(vm, array, "shift", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        match args.opt(0) {
            None => {
                let items = vm.array_mut(recv)?;
                Ok(if items.is_empty() { Value::Nil } else { items.remove(0) })
            }
            Some(n) => {
                let n = count_arg(vm, n)?;
                let items = vm.array_mut(recv)?;
                let shifted = items.drain(..n.min(items.len())).collect();
                vm.new_array(shifted)
            }
        }
    });
    def(vm, array, "unshift", -1, |vm, recv, args| {
        vm.array_mut(recv)?.splice(0..0, args.args.iter().copied());
        Ok(recv)
    });
    super::alias(vm, array, "prepend", "unshift");
    def(vm, array, "insert", -2, |vm, recv, args| {
        let index = vm.expect_int(args.get(0))?;
        let values = &args.args[1..];
        let len = items(vm, recv).len();
        let at = if index < 0 {
            let from_end = usize::try_from(index.unsigned_abs()).unwrap_or(usize::MAX);
            (len + 1).checked_sub(from_end).ok_or_else(|| {
                ExcType::IndexError.error(format!("index {index} too small for array; minimum: -{}", len + 1))
            })?
        } else {
            usize::try_from(index).unwrap_or(usize::MAX)
        };
        let items = vm.array_mut(recv)?;
        if at > items.len() {
            items.resize(at, Value::Nil);
        }
        items.splice(at..at, values.iter().copied());
        Ok(recv)
    });
    def(vm, array, "concat", -1, |vm, recv, args| {
        let mut extra = Vec::new();
        for &other in args.args {
            extra.extend(expect_array(vm, other)?);
        }
        vm.array_mut(recv)?.extend(extra);
        Ok(recv)
    });
    def(vm, array, "delete", 1, |vm, recv, args| {
        let target = args.get(0);
        let mut kept = Vec::new();
        let mut found = None;
        for item in items(vm, recv) {
            if vm.values_eq(item, target)? {
                found = Some(item);
            } else {
                kept.push(item);
            }
        }
        match found {
            Some(found) => {
                *vm.array_mut(recv)? = kept;
                Ok(found)
            }
            None => args.block.map_or(Ok(Value::Nil), |block| vm.call_block(Some(block), &[target])),
        }
    });
    def(vm, array, "delete_at", 1, |vm, recv, args| {
        let index = vm.expect_int(args.get(0))?;
        let items = vm.array_mut(recv)?;
        Ok(match resolve_index(index, items.len()) {
            Some(i) if i < items.len() => items.remove(i),
            _ => Value::Nil,
        })
    });
    def(vm, array, "delete_if", 0, |vm, recv, args| {
        let block = args.require_block()?;
        vm.check_frozen(recv)?;
        let mut kept = Vec::new();
        for item in items(vm, recv) {
            if !vm.call_block(Some(block), &[item])?.truthy() {
                kept.push(item);
            }
        }
        *vm.array_mut(recv)? = kept;
        Ok(recv)
    });
    super::alias(vm, array, "reject!", "delete_if");
    def(vm, array, "keep_if", 0, |vm, recv, args| {
        let block = args.require_block()?;
        vm.check_frozen(recv)?;
        let mut kept = Vec::new();
        for item in items(vm, recv) {
            if vm.call_block(Some(block), &[item])?.truthy() {
                kept.push(item);
            }
        }
        *vm.array_mut(recv)? = kept;
        Ok(recv)
    });
    super::alias(vm, array, "select!", "keep_if");
    def(vm, array, "clear", 0, |vm, recv, _| {
        vm.array_mut(recv)?.clear();
        Ok(recv)
    });
    def(vm, array, "replace", 1, |vm, recv, args| {
        let replacement = expect_array(vm, args.get(0))?;
        *vm.array_mut(recv)? = replacement;
        Ok(recv)
    });
    def(vm, array, "map!", 0, |vm, recv, args| {
        let block = args.require_block()?;
        vm.check_frozen(recv)?;
        let mut i = 0;
        while let Some(item) = nth(vm, recv, i) {
            let mapped = vm.call_block(Some(block), &[item])?;
            if let Some(slot) = vm.array_mut(recv)?.get_mut(i) {
                *slot = mapped;
            }
            i += 1;
        }
        Ok(recv)
    });
    super::alias(vm, array, "collect!", "map!");
    def(vm, array, "reverse!", 0, |vm, recv, _| {
        vm.array_mut(recv)?.reverse();
        Ok(recv)
    });
    def(vm, array, "sort!", 0, |vm, recv, args| {
        vm.check_frozen(recv)?;
        let sorted = sorted(vm, recv, args.block)?;
        *vm.array_mut(recv)? = sorted;
        Ok(recv)
    });
    def(vm, array, "uniq!", 0, |vm, recv, args| {
        let before = items(vm, recv).len();
        let unique = unique(vm, recv, args.block)?;
        if unique.len() == before {
            return Ok(Value::Nil);
        }
        *vm.array_mut(recv)? = unique;
        Ok(recv)
    });
    def(vm, array, "compact!", 0, |vm, recv, _| {
        let items = vm.array_mut(recv)?;
        let before = items.len();
        items.retain(|item| !item.is_nil());
        Ok(if items.len() == before { Value::Nil } else { recv })
    });
    def(vm, array, "flatten!", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let depth = depth_arg(vm, args.opt(0))?;
        let flat = flatten(vm, recv, depth)?;
        *vm.array_mut(recv)? = flat;
        Ok(recv)
    });
}

fn register_iteration(vm: &mut Vm, array: HeapId) {
    def(vm, array, "each", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let mut i = 0;
        while let Some(item) = nth(vm, recv, i) {
            vm.call_block(Some(block), &[item])?;
            i += 1;
        }
        Ok(recv)
    });
    def(vm, array, "each_with_index", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let mut i = 0;
        while let Some(item) = nth(vm, recv, i) {
            vm.call_block(Some(block), &[item, Value::Integer(i as i64)])?;
            i += 1;
        }
        Ok(recv)
    });
    def(vm, array, "each_index", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let mut i = 0;
        while nth(vm, recv, i).is_some() {
            vm.call_block(Some(block), &[Value::Integer(i as i64)])?;
            i += 1;
        }
        Ok(recv)
    });
    def(vm, array, "reverse_each", 0, |vm, recv, args| {
        let block = args.require_block()?;
        for item in items(vm, recv).into_iter().rev() {
            vm.call_block(Some(block), &[item])?;
        }
        Ok(recv)
    });
    def(vm, array, "map", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let mut mapped = Vec::new();
        let mut i = 0;
        while let Some(item) = nth(vm, recv, i) {
            mapped.push(vm.call_block(Some(block), &[item])?);
            i += 1;
        }
        vm.new_array(mapped)
    });
    super::alias(vm, array, "collect", "map");
    def(vm, array, "select", 0, |vm, recv, args| filter(vm, recv, args, true));
    super::alias(vm, array, "filter", "select");
    def(vm, array, "reject", 0, |vm, recv, args| filter(vm, recv, args, false));
}

fn register_transforms(vm: &mut Vm, array: HeapId) {
    def(vm, array, "join", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let separator = match args.opt(0) {
            None | Some(Value::Nil) => String::new(),
            Some(sep) => vm.expect_string(sep)?,
        };
        let mut out = String::new();
        join_into(vm, recv, &separator, &mut out, &mut Vec::new())?;
        vm.new_string_owned(out)
    });
    def(vm, array, "reverse", 0, |vm, recv, _| {
        let mut reversed = items(vm, recv);
        reversed.reverse();
        vm.new_array(reversed)
    });
    def(vm, array, "rotate", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let count = args.opt(0).map_or(Ok(1), |n| vm.expect_int(n))?;
        let mut rotated = items(vm, recv);
        if !rotated.is_empty() {
            let len = rotated.len() as i64;
            rotated.rotate_left(count.rem_euclid(len) as usize);
        }
        vm.new_array(rotated)
    });
    def(vm, array, "sort", 0, |vm, recv, args| {
        let sorted = sorted(vm, recv, args.block)?;
        vm.new_array(sorted)
    });
    def(vm, array, "sort_by!", 0, |vm, recv, args| {
        let block = args.require_block()?;
        vm.check_frozen(recv)?;
        let all = items(vm, recv);
        let sorted = enumerable::sort_by(vm, all, block)?;
        *vm.array_mut(recv)? = sorted;
        Ok(recv)
    });
    def(vm, array, "uniq", 0, |vm, recv, args| {
        let unique = unique(vm, recv, args.block)?;
        vm.new_array(unique)
    });
    def(vm, array, "compact", 0, |vm, recv, _| {
        let kept = items(vm, recv).into_iter().filter(|item| !item.is_nil()).collect();
        vm.new_array(kept)
    });
    def(vm, array, "flatten", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let depth = depth_arg(vm, args.opt(0))?;
        let flat = flatten(vm, recv, depth)?;
        vm.new_array(flat)
    });
    def(vm, array, "zip", -1, |vm, recv, args| {
        let mut others = Vec::with_capacity(args.len());
        for &other in args.args {
            others.push(expect_array(vm, other)?);
        }
        let mut rows = Vec::new();
        for (i, item) in items(vm, recv).into_iter().enumerate() {
            let mut row = vec![item];
            row.extend(others.iter().map(|other| other.get(i).copied().unwrap_or(Value::Nil)));
            rows.push(vm.new_array(row)?);
        }
        vm.new_array(rows)
    });
}

fn register_operators(vm: &mut Vm, array: HeapId) {
    def(vm, array, "+", 1, |vm, recv, args| {
        let mut joined = items(vm, recv);
        joined.extend(expect_array(vm, args.get(0))?);
        vm.new_array(joined)
    });
    def(vm, array, "-", 1, |vm, recv, args| {
        let removed = expect_array(vm, args.get(0))?;
        let mut exclude = RHash::new();
        for item in removed {
            let key = vm.hash_key(item, false);
            exclude.insert(key, item, Value::True);
        }
        let kept = items(vm, recv)
            .into_iter()
            .filter(|&item| !exclude.contains(&vm.hash_key(item, false)))
            .collect();
        vm.new_array(kept)
    });
    def(vm, array, "*", 1, |vm, recv, args| {
        let arg = args.get(0);
        if let Some(separator) = vm.string_of(arg).map(str::to_owned) {
            let mut out = String::new();
            join_into(vm, recv, &separator, &mut out, &mut Vec::new())?;
            return vm.new_string_owned(out);
        }
        let times = vm.expect_int(arg)?;
        let times = usize::try_from(times).map_err(|_| RunError::argument("negative argument"))?;
        let source = items(vm, recv);
        reserve(vm, source.len().saturating_mul(times))?;
        vm.new_array(source.repeat(times))
    });
    def(vm, array, "&", 1, |vm, recv, args| {
        let other = expect_array(vm, args.get(0))?;
        let mut keep = RHash::new();
        for item in other {
            let key = vm.hash_key(item, false);
            keep.insert(key, item, Value::True);
        }
        let mut seen = RHash::new();
        let mut common = Vec::new();
        for item in items(vm, recv) {
            let key = vm.hash_key(item, false);
            if keep.contains(&key) && !seen.contains(&key) {
                seen.insert(key, item, Value::True);
                common.push(item);
            }
        }
        vm.new_array(common)
    });
    def(vm, array, "|", 1, |vm, recv, args| {
        let mut all = items(vm, recv);
        all.extend(expect_array(vm, args.get(0))?);
        let mut seen = RHash::new();
        let mut union = Vec::new();
        for item in all {
            let key = vm.hash_key(item, false);
            if !seen.contains(&key) {
                seen.insert(key, item, Value::True);
                union.push(item);
            }
        }
        vm.new_array(union)
    });
    def(vm, array, "==", 1, |vm, recv, args| {
        Ok(Value::from_bool(vm.builtin_eq(recv, args.get(0))?.unwrap_or(false)))
    });
    def(vm, array, "<=>", 1, |vm, recv, args| {
        let Some(other) = vm.array_of(args.get(0)).cloned() else {
            return Ok(Value::Nil);
        };
        let mine = items(vm, recv);
        for (a, b) in mine.iter().zip(&other) {
            match vm.compare_values(*a, *b)? {
                Some(Ordering::Equal) => {}
                Some(ordering) => return Ok(Value::Integer(ordering as i64)),
                None => return Ok(Value::Nil),
            }
        }
        Ok(Value::Integer(mine.len().cmp(&other.len()) as i64))
    });
}

/// Longest Array a single operation may build.
const MAX_LENGTH: usize = 1 << 28;

/// Charges the resource tracker for an Array of `len` elements before building it.
fn reserve(vm: &mut Vm, len: usize) -> RunResult<()> {
    if len > MAX_LENGTH {
        return Err(RunError::argument("array size too big"));
    }
    vm.heap.tracker_mut().on_allocate(len * std::mem::size_of::<Value>())?;
    Ok(())
}

fn items(vm: &Vm, recv: Value) -> Vec<Value> {
    vm.array_of(recv).cloned().unwrap_or_default()
}

fn nth(vm: &Vm, recv: Value, i: usize) -> Option<Value> {
    vm.array_of(recv).and_then(|items| items.get(i).copied())
}

fn element(vm: &Vm, recv: Value, index: i64) -> Value {
    let Some(items) = vm.array_of(recv) else {
        return Value::Nil;
    };
    resolve_index(index, items.len())
        .and_then(|i| items.get(i).copied())
        .unwrap_or(Value::Nil)
}

fn expect_array(vm: &mut Vm, value: Value) -> RunResult<Vec<Value>> {
    match vm.try_array(value)? {
        Some(items) => Ok(items),
        None => Err(RunError::no_implicit_conversion(&vm.conversion_name(value), "Array")),
    }
}

/// `ary[index]` or `ary[start, length]`.
fn aref(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    args.check(1, Some(2))?;
    let index = vm.expect_int(args.get(0))?;
    let Some(length) = args.opt(1) else {
        return Ok(element(vm, recv, index));
    };
    let length = vm.expect_int(length)?;
    let all = items(vm, recv);
    match span(index, length, all.len()) {
        Some((start, end)) => vm.new_array(all[start..end].to_vec()),
        None => Ok(Value::Nil),
    }
}

/// `ary[index] = value` or `ary[start, length] = value` (an Array value is spliced in).
fn aset(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    args.check(2, Some(3))?;
    let index = vm.expect_int(args.get(0))?;
    let len = items(vm, recv).len();
    if args.len() == 2 {
        let value = args.get(1);
        let slot = match resolve_index(index, len) {
            Some(slot) if index >= 0 || slot < len => slot,
            _ => {
                return Err(ExcType::IndexError.error(format!(
                    "index {index} too small for array; minimum: -{len}"
                )));
            }
        };
        reserve(vm, slot + 1)?;
        let items = vm.array_mut(recv)?;
        if slot >= items.len() {
            items.resize(slot + 1, Value::Nil);
        }
        items[slot] = value;
        return Ok(value);
    }
    let length = vm.expect_int(args.get(1))?;
    if length < 0 {
        return Err(ExcType::IndexError.error(format!("negative length ({length})")));
    }
    let value = args.get(2);
    let start = resolve_index(index, len).ok_or_else(|| {
        ExcType::IndexError.error(format!("index {index} too small for array; minimum: -{len}"))
    })?;
    let replacement = vm.array_of(value).cloned().unwrap_or_else(|| vec![value]);
    let items = vm.array_mut(recv)?;
    if start > items.len() {
        items.resize(start, Value::Nil);
    }
    let end = (start + length as usize).min(items.len());
    items.splice(start..end, replacement);
    Ok(value)
}

/// Bounds of `[start, length]` in a sequence of `len`; `None` when `start` is out of range.
pub(super) fn span(start: i64, length: i64, len: usize) -> Option<(usize, usize)> {
    if length < 0 {
        return None;
    }
    let start = resolve_index(start, len).filter(|&s| s <= len)?;
    let end = start.saturating_add(usize::try_from(length).ok()?).min(len);
    Some((start, end))
}

fn filter(vm: &mut Vm, recv: Value, args: CallArgs<'_>, keep: bool) -> RunResult<Value> {
    let block = args.require_block()?;
    let mut kept = Vec::new();
    let mut i = 0;
    while let Some(item) = nth(vm, recv, i) {
        if vm.call_block(Some(block), &[item])?.truthy() == keep {
            kept.push(item);
        }
        i += 1;
    }
    vm.new_array(kept)
}

fn sorted(vm: &mut Vm, recv: Value, block: Option<Value>) -> RunResult<Vec<Value>> {
    let all = items(vm, recv);
    match block {
        Some(block) => sort_values(vm, all, &mut |vm, a, b| block_ordering(vm, block, a, b)),
        None => sort_values(vm, all, &mut |vm, a, b| vm.compare_or_fail(a, b)),
    }
}

/// First occurrence of each element (or of each block result), by `eql?`.
fn unique(vm: &mut Vm, recv: Value, block: Option<Value>) -> RunResult<Vec<Value>> {
    let mut seen = RHash::new();
    let mut kept = Vec::new();
    for item in items(vm, recv) {
        let keyed = match block {
            Some(block) => vm.call_block(Some(block), &[item])?,
            None => item,
        };
        let key = vm.hash_key(keyed, false);
        if !seen.contains(&key) {
            seen.insert(key, keyed, Value::True);
            kept.push(item);
        }
    }
    Ok(kept)
}

fn depth_arg(vm: &mut Vm, value: Option<Value>) -> RunResult<Option<usize>> {
    match value {
        None | Some(Value::Nil) => Ok(None),
        Some(depth) => Ok(usize::try_from(vm.expect_int(depth)?).ok()),
    }
}

fn flatten(vm: &mut Vm, recv: Value, depth: Option<usize>) -> RunResult<Vec<Value>> {
    let mut out = Vec::new();
    let mut stack = Vec::new();
    flatten_into(vm, recv, depth, &mut out, &mut stack)?;
    Ok(out)
}

fn flatten_into(
    vm: &mut Vm,
    array: Value,
    depth: Option<usize>,
    out: &mut Vec<Value>,
    stack: &mut Vec<Value>,
) -> RunResult<()> {
    if stack.iter().any(|seen| seen.identical(array)) {
        return Err(RunError::argument("tried to flatten recursive array"));
    }
    stack.push(array);
    for item in items(vm, array) {
        match depth {
            Some(0) => out.push(item),
            _ if vm.array_of(item).is_some() => {
                flatten_into(vm, item, depth.map(|d| d - 1), out, stack)?;
            }
            _ => out.push(item),
        }
    }
    stack.pop();
    Ok(())
}

fn join_into(vm: &mut Vm, array: Value, separator: &str, out: &mut String, stack: &mut Vec<Value>) -> RunResult<()> {
    if stack.iter().any(|seen| seen.identical(array)) {
        return Err(RunError::argument("recursive array join"));
    }
    stack.push(array);
    for (i, item) in items(vm, array).into_iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        if vm.array_of(item).is_some() {
            join_into(vm, item, separator, out, stack)?;
        } else if let Some(text) = vm.string_of(item) {
            out.push_str(text);
        } else {
            out.push_str(&vm.to_s_value(item)?);
        }
    }
    stack.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::span;

    #[test]
    fn spans_clamp_to_the_end() {
        assert_eq!(span(1, 2, 5), Some((1, 3)));
        assert_eq!(span(3, 10, 5), Some((3, 5)));
        assert_eq!(span(5, 1, 5), Some((5, 5)));
        assert_eq!(span(6, 1, 5), None);
        assert_eq!(span(-2, 5, 5), Some((3, 5)));
        assert_eq!(span(0, -1, 5), None);
    }
}
