//! Hash.
//!
//! Blocks receive each entry as one `[key, value]` Array, which `|k, v|` parameters
//! destructure. Iteration walks a snapshot of the entries taken when it starts.

use crate::{
    builtins::{def, def_private},
    callable::CallArgs,
    exception::{ExcType, RunError, RunResult},
    heap::HeapId,
    types::RHash,
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) {
    let hash = vm.core.hash;
    def_private(vm, hash, "initialize", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        if args.block.is_some() && !args.is_empty() {
            return Err(RunError::arity(args.len(), 0, Some(0)));
        }
        let record = vm.hash_mut(recv)?;
        record.default = args.opt(0).unwrap_or(Value::Nil);
        record.default_proc = args.block;
        Ok(Value::Nil)
    });

    register_access(vm, hash);
    register_views(vm, hash);
    register_iteration(vm, hash);
    register_merging(vm, hash);
}

fn register_access(vm: &mut Vm, hash: HeapId) {
    def(vm, hash, "[]", 1, |vm, recv, args| vm.hash_fetch(recv, args.get(0)));
    def(vm, hash, "[]=", 2, |vm, recv, args| {
        vm.hash_store(recv, args.get(0), args.get(1))?;
        Ok(args.get(1))
    });
    super::alias(vm, hash, "store", "[]=");
    def(vm, hash, "fetch", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let key = args.get(0);
        if let Some(value) = lookup(vm, recv, key) {
            return Ok(value);
        }
        if let Some(block) = args.block {
            return vm.call_block(Some(block), &[key]);
        }
        if let Some(default) = args.opt(1) {
            return Ok(default);
        }
        let shown = vm.inspect_value(key)?;
        Err(ExcType::KeyError.error(format!("key not found: {shown}")))
    });
    def(vm, hash, "dig", -2, |vm, recv, args| {
        let found = vm.hash_fetch(recv, args.get(0))?;
        match args.args.get(1..) {
            Some(rest) if !rest.is_empty() && !found.is_nil() => {
                let dig = vm.interns.intern("dig");
                vm.call_method(found, dig, rest, None, None, false)
            }
            _ => Ok(found),
        }
    });
    def(vm, hash, "values_at", -1, |vm, recv, args| {
        let mut values = Vec::with_capacity(args.len());
        for &key in args.args {
            values.push(vm.hash_fetch(recv, key)?);
        }
        vm.new_array(values)
    });
    def(vm, hash, "key?", 1, |vm, recv, args| {
        Ok(Value::from_bool(lookup(vm, recv, args.get(0)).is_some()))
    });
    super::alias(vm, hash, "has_key?", "key?");
    super::alias(vm, hash, "include?", "key?");
    super::alias(vm, hash, "member?", "key?");
    def(vm, hash, "value?", 1, |vm, recv, args| {
        for (_, value) in pairs(vm, recv) {
            if vm.values_eq(value, args.get(0))? {
                return Ok(Value::True);
            }
        }
        Ok(Value::False)
    });
    super::alias(vm, hash, "has_value?", "value?");
    def(vm, hash, "key", 1, |vm, recv, args| {
        for (key, value) in pairs(vm, recv) {
            if vm.values_eq(value, args.get(0))? {
                return Ok(key);
            }
        }
        Ok(Value::Nil)
    });
    def(vm, hash, "delete", 1, |vm, recv, args| {
        let key = args.get(0);
        let by_identity = vm.hash_of(recv).is_some_and(|h| h.compare_by_identity);
        let hash_key = vm.hash_key(key, by_identity);
        let removed = vm.hash_mut(recv)?.remove(&hash_key);
        match removed {
            Some((_, value)) => Ok(value),
            None => args.block.map_or(Ok(Value::Nil), |block| vm.call_block(Some(block), &[key])),
        }
    });
    def(vm, hash, "clear", 0, |vm, recv, _| {
        vm.hash_mut(recv)?.clear();
        Ok(recv)
    });
    def(vm, hash, "default", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let Some(record) = vm.hash_of(recv) else {
            return Ok(Value::Nil);
        };
        let (default, default_proc) = (record.default, record.default_proc);
        match (args.opt(0), default_proc) {
            (Some(key), Some(default_proc)) => vm.call_proc(default_proc, &[recv, key], None),
            _ => Ok(default),
        }
    });
    def(vm, hash, "default=", 1, |vm, recv, args| {
        let record = vm.hash_mut(recv)?;
        record.default = args.get(0);
        record.default_proc = None;
        Ok(args.get(0))
    });
    def(vm, hash, "default_proc", 0, |vm, recv, _| {
        Ok(vm.hash_of(recv).and_then(|h| h.default_proc).unwrap_or(Value::Nil))
    });
    def(vm, hash, "compare_by_identity", 0, |vm, recv, _| {
        let entries = pairs(vm, recv);
        let mut rebuilt = RHash::new();
        for (key, value) in entries {
            let hash_key = vm.hash_key(key, true);
            rebuilt.insert(hash_key, key, value);
        }
        let record = vm.hash_mut(recv)?;
        rebuilt.default = record.default;
        rebuilt.default_proc = record.default_proc;
        rebuilt.compare_by_identity = true;
        *record = rebuilt;
        Ok(recv)
    });
    def(vm, hash, "compare_by_identity?", 0, |vm, recv, _| {
        Ok(Value::from_bool(vm.hash_of(recv).is_some_and(|h| h.compare_by_identity)))
    });
}

fn register_views(vm: &mut Vm, hash: HeapId) {
    def(vm, hash, "keys", 0, |vm, recv, _| {
        let keys = pairs(vm, recv).into_iter().map(|(key, _)| key).collect();
        vm.new_array(keys)
    });
    def(vm, hash, "values", 0, |vm, recv, _| {
        let values = pairs(vm, recv).into_iter().map(|(_, value)| value).collect();
        vm.new_array(values)
    });
    def(vm, hash, "length", 0, |vm, recv, _| {
        Ok(Value::Integer(vm.hash_of(recv).map_or(0, RHash::len) as i64))
    });
    super::alias(vm, hash, "size", "length");
    def(vm, hash, "empty?", 0, |vm, recv, _| {
        Ok(Value::from_bool(vm.hash_of(recv).is_none_or(RHash::is_empty)))
    });
    def(vm, hash, "to_a", 0, |vm, recv, _| {
        let mut rows = Vec::new();
        for (key, value) in pairs(vm, recv) {
            rows.push(vm.new_array(vec![key, value])?);
        }
        vm.new_array(rows)
    });
    def(vm, hash, "to_h", 0, |vm, recv, args| {
        let Some(block) = args.block else {
            return Ok(recv);
        };
        let out = vm.new_hash(RHash::new())?;
        for pair in pair_arrays(vm, recv)? {
            let mapped = vm.call_block(Some(block), &[pair])?;
            let Some(&[key, value]) = vm.array_of(mapped).map(Vec::as_slice) else {
                let name = vm.conversion_name(mapped);
                return Err(RunError::type_error(format!("wrong element type {name} (expected array)")));
            };
            vm.hash_store(out, key, value)?;
        }
        Ok(out)
    });
    def(vm, hash, "invert", 0, |vm, recv, _| {
        let out = vm.new_hash(RHash::new())?;
        for (key, value) in pairs(vm, recv) {
            vm.hash_store(out, value, key)?;
        }
        Ok(out)
    });
    def(vm, hash, "inspect", 0, |vm, recv, _| {
        let text = vm.builtin_inspect(recv)?;
        vm.new_string_owned(text)
    });
    super::alias(vm, hash, "to_s", "inspect");
    def(vm, hash, "==", 1, |vm, recv, args| {
        Ok(Value::from_bool(vm.builtin_eq(recv, args.get(0))?.unwrap_or(false)))
    });
}

fn register_iteration(vm: &mut Vm, hash: HeapId) {
    def(vm, hash, "each", 0, |vm, recv, args| {
        let block = args.require_block()?;
        for pair in pair_arrays(vm, recv)? {
            vm.call_block(Some(block), &[pair])?;
        }
        Ok(recv)
    });
    super::alias(vm, hash, "each_pair", "each");
    def(vm, hash, "each_key", 0, |vm, recv, args| {
        let block = args.require_block()?;
        for (key, _) in pairs(vm, recv) {
            vm.call_block(Some(block), &[key])?;
        }
        Ok(recv)
    });
    def(vm, hash, "each_value", 0, |vm, recv, args| {
        let block = args.require_block()?;
        for (_, value) in pairs(vm, recv) {
            vm.call_block(Some(block), &[value])?;
        }
        Ok(recv)
    });
    def(vm, hash, "select", 0, |vm, recv, args| filter(vm, recv, args, true));
    super::alias(vm, hash, "filter", "select");
    def(vm, hash, "reject", 0, |vm, recv, args| filter(vm, recv, args, false));
    def(vm, hash, "transform_values", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let out = vm.new_hash(RHash::new())?;
        for (key, value) in pairs(vm, recv) {
            let mapped = vm.call_block(Some(block), &[value])?;
            vm.hash_store(out, key, mapped)?;
        }
        Ok(out)
    });
    def(vm, hash, "transform_keys", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let out = vm.new_hash(RHash::new())?;
        for (key, value) in pairs(vm, recv) {
            let mapped = vm.call_block(Some(block), &[key])?;
            vm.hash_store(out, mapped, value)?;
        }
        Ok(out)
    });
}

fn register_merging(vm: &mut Vm, hash: HeapId) {
    def(vm, hash, "merge", -1, |vm, recv, args| {
        let copy = copy_hash(vm, recv)?;
        merge_into(vm, copy, args)?;
        Ok(copy)
    });
    def(vm, hash, "update", -1, |vm, recv, args| {
        vm.check_frozen(recv)?;
        merge_into(vm, recv, args)?;
        Ok(recv)
    });
    super::alias(vm, hash, "merge!", "update");
}

/// The stored value for `key`, ignoring defaults.
fn lookup(vm: &Vm, hash: Value, key: Value) -> Option<Value> {
    let record = vm.hash_of(hash)?;
    record.get(&vm.hash_key(key, record.compare_by_identity))
}

fn pairs(vm: &Vm, hash: Value) -> Vec<(Value, Value)> {
    vm.hash_of(hash).map(RHash::pair_vec).unwrap_or_default()
}

fn pair_arrays(vm: &mut Vm, hash: Value) -> RunResult<Vec<Value>> {
    let entries = pairs(vm, hash);
    let mut out = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        out.push(vm.new_array(vec![key, value])?);
    }
    Ok(out)
}

/// A new Hash with the same entries and identity mode; defaults are not copied.
fn copy_hash(vm: &mut Vm, hash: Value) -> RunResult<Value> {
    let mut copy = vm
        .hash_of(hash)
        .cloned()
        .ok_or_else(|| RunError::internal("copy_hash on a non-Hash"))?;
    copy.default = Value::Nil;
    copy.default_proc = None;
    vm.new_hash(copy)
}

/// Stores every entry of each argument into `target`; a block resolves duplicate keys as
/// `block(key, old, new)`.
fn merge_into(vm: &mut Vm, target: Value, args: CallArgs<'_>) -> RunResult<()> {
    for &other in args.args {
        if vm.hash_of(other).is_none() {
            return Err(RunError::no_implicit_conversion(&vm.conversion_name(other), "Hash"));
        }
        for (key, value) in pairs(vm, other) {
            let value = match (args.block, lookup(vm, target, key)) {
                (Some(block), Some(old)) => vm.call_block(Some(block), &[key, old, value])?,
                _ => value,
            };
            vm.hash_store(target, key, value)?;
        }
    }
    Ok(())
}

fn filter(vm: &mut Vm, recv: Value, args: CallArgs<'_>, keep: bool) -> RunResult<Value> {
    let block = args.require_block()?;
    let out = vm.new_hash(RHash::new())?;
    for (key, value) in pairs(vm, recv) {
        let pair = vm.new_array(vec![key, value])?;
        if vm.call_block(Some(block), &[pair])?.truthy() == keep {
            vm.hash_store(out, key, value)?;
        }
    }
    Ok(out)
}
