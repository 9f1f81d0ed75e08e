//! String.
//!
//! Strings are UTF-8 and indexed by character. Bang methods modify the receiver (raising
//! FrozenError when it is frozen) and answer nil when nothing changed.

use std::fmt::Write as _;

use regex::{Captures, Regex};

use crate::{
    builtins::{array::span, def, def_private, regexp},
    callable::CallArgs,
    exception::{ExcType, RunError, RunResult},
    heap::HeapId,
    types::string::{self, awk_split, byte_offset},
    value::Value,
    vm::{Vm, resolve_index},
};

/// Longest String a single operation may build, in bytes.
const MAX_LENGTH: usize = 1 << 28;

/// Defines a copying method and its in-place bang variant from one `&str -> String` function.
macro_rules! transforms {
    ($vm:expr, $class:expr, $($name:literal, $bang:literal => $func:expr;)*) => {$(
        def($vm, $class, $name, 0, |vm, recv, _| {
            let func: fn(&str) -> String = $func;
            let changed = func(&text_of(vm, recv));
            vm.new_string_owned(changed)
        });
        def($vm, $class, $bang, 0, |vm, recv, _| {
            let func: fn(&str) -> String = $func;
            let changed = func(&text_of(vm, recv));
            replace_if_changed(vm, recv, changed)
        });
    )*};
}

pub(super) fn register(vm: &mut Vm) {
    let class = vm.core.string;
    def_private(vm, class, "initialize", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        if let Some(source) = args.opt(0) {
            let text = vm.expect_string(source)?;
            *vm.string_mut(recv)? = text;
        }
        Ok(Value::Nil)
    });

    register_operators(vm, class);
    register_conversions(vm, class);
    register_queries(vm, class);
    register_slicing(vm, class);
    register_patterns(vm, class);
    register_mutation(vm, class);

    transforms!(vm, class,
        "upcase", "upcase!" => str::to_uppercase;
        "downcase", "downcase!" => str::to_lowercase;
        "capitalize", "capitalize!" => string::capitalize;
        "swapcase", "swapcase!" => string::swapcase;
        "reverse", "reverse!" => |s| s.chars().rev().collect();
        "strip", "strip!" => |s| s.trim_matches(is_strippable).to_owned();
        "lstrip", "lstrip!" => |s| s.trim_start_matches(is_strippable).to_owned();
        "rstrip", "rstrip!" => |s| s.trim_end_matches(is_strippable).to_owned();
        "chop", "chop!" => chop;
    );
}

fn register_operators(vm: &mut Vm, class: HeapId) {
    def(vm, class, "+", 1, |vm, recv, args| {
        let other = vm.expect_string(args.get(0))?;
        let mut joined = text_of(vm, recv);
        reserve(vm, joined.len() + other.len())?;
        joined.push_str(&other);
        vm.new_string_owned(joined)
    });
    def(vm, class, "*", 1, |vm, recv, args| {
        let times = vm.expect_int(args.get(0))?;
        let times = usize::try_from(times).map_err(|_| RunError::argument("negative argument"))?;
        let text = text_of(vm, recv);
        reserve(vm, text.len().saturating_mul(times))?;
        vm.new_string_owned(text.repeat(times))
    });
    def(vm, class, "==", 1, |vm, recv, args| {
        let equal = vm.string_of(args.get(0)).is_some_and(|other| vm.string_of(recv) == Some(other));
        Ok(Value::from_bool(equal))
    });
    super::alias(vm, class, "eql?", "==");
    super::alias(vm, class, "===", "==");
    def(vm, class, "<=>", 1, |vm, recv, args| {
        let (Some(a), Some(b)) = (vm.string_of(recv), vm.string_of(args.get(0))) else {
            return Ok(Value::Nil);
        };
        Ok(Value::Integer(a.cmp(b) as i64))
    });
    def(vm, class, "<<", 1, |vm, recv, args| {
        let piece = appended_text(vm, args.get(0))?;
        vm.string_mut(recv)?.push_str(&piece);
        Ok(recv)
    });
    def(vm, class, "concat", -1, |vm, recv, args| {
        let mut pieces = String::new();
        for &arg in args.args {
            pieces.push_str(&appended_text(vm, arg)?);
        }
        vm.string_mut(recv)?.push_str(&pieces);
        Ok(recv)
    });
    def(vm, class, "prepend", -1, |vm, recv, args| {
        let mut pieces = String::new();
        for &arg in args.args {
            pieces.push_str(&vm.expect_string(arg)?);
        }
        vm.string_mut(recv)?.insert_str(0, &pieces);
        Ok(recv)
    });
    def(vm, class, "-@", 0, |vm, recv, _| {
        if vm.frozen(recv) {
            return Ok(recv);
        }
        let copy = vm.new_string_owned(text_of(vm, recv))?;
        vm.freeze_value(copy);
        Ok(copy)
    });
    def(vm, class, "+@", 0, |vm, recv, _| {
        if vm.frozen(recv) {
            return vm.new_string_owned(text_of(vm, recv));
        }
        Ok(recv)
    });
}

fn register_conversions(vm: &mut Vm, class: HeapId) {
    def(vm, class, "to_s", 0, |_, recv, _| Ok(recv));
    super::alias(vm, class, "to_str", "to_s");
    def(vm, class, "to_sym", 0, |vm, recv, _| {
        let text = text_of(vm, recv);
        Ok(Value::Symbol(vm.interns.intern(&text)))
    });
    super::alias(vm, class, "intern", "to_sym");
    def(vm, class, "inspect", 0, |vm, recv, _| {
        let text = string::inspect(&text_of(vm, recv));
        vm.new_string_owned(text)
    });
    def(vm, class, "to_i", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let base = match args.opt(0) {
            None => 10,
            Some(base) => {
                let base = vm.expect_int(base)?;
                match u32::try_from(base) {
                    Ok(base @ 2..=36) => base,
                    _ => return Err(RunError::argument(format!("invalid radix {base}"))),
                }
            }
        };
        match string::leading_integer(&text_of(vm, recv), base) {
            Some(n) => vm.int_result(n),
            None => Ok(Value::Integer(0)),
        }
    });
    def(vm, class, "to_f", 0, |vm, recv, _| Ok(Value::Float(string::leading_float(&text_of(vm, recv)))));
    def(vm, class, "ord", 0, |vm, recv, _| match text_of(vm, recv).chars().next() {
        Some(c) => Ok(Value::Integer(i64::from(u32::from(c)))),
        None => Err(RunError::argument("empty string")),
    });
    def(vm, class, "chars", 0, |vm, recv, _| {
        let text = text_of(vm, recv);
        let mut chars = Vec::with_capacity(text.len());
        for c in text.chars() {
            chars.push(vm.new_string_owned(c.to_string())?);
        }
        vm.new_array(chars)
    });
    def(vm, class, "bytes", 0, |vm, recv, _| {
        let bytes = text_of(vm, recv).bytes().map(|b| Value::Integer(i64::from(b))).collect();
        vm.new_array(bytes)
    });
    def(vm, class, "lines", 0, |vm, recv, _| {
        let text = text_of(vm, recv);
        let mut lines = Vec::new();
        for line in text.split_inclusive('\n') {
            lines.push(vm.new_string(line)?);
        }
        vm.new_array(lines)
    });
    def(vm, class, "each_char", 0, |vm, recv, args| {
        let block = args.require_block()?;
        for c in text_of(vm, recv).chars() {
            let piece = vm.new_string_owned(c.to_string())?;
            vm.call_block(Some(block), &[piece])?;
        }
        Ok(recv)
    });
    def(vm, class, "each_line", 0, |vm, recv, args| {
        let block = args.require_block()?;
        for line in text_of(vm, recv).split_inclusive('\n') {
            let piece = vm.new_string(line)?;
            vm.call_block(Some(block), &[piece])?;
        }
        Ok(recv)
    });
}

fn register_queries(vm: &mut Vm, class: HeapId) {
    def(vm, class, "length", 0, |vm, recv, _| {
        Ok(Value::Integer(vm.string_of(recv).map_or(0, |s| s.chars().count()) as i64))
    });
    super::alias(vm, class, "size", "length");
    def(vm, class, "bytesize", 0, |vm, recv, _| Ok(Value::Integer(vm.string_of(recv).map_or(0, str::len) as i64)));
    def(vm, class, "empty?", 0, |vm, recv, _| {
        Ok(Value::from_bool(vm.string_of(recv).is_none_or(str::is_empty)))
    });
    def(vm, class, "include?", 1, |vm, recv, args| {
        let needle = vm.expect_string(args.get(0))?;
        Ok(Value::from_bool(text_of(vm, recv).contains(&needle)))
    });
    def(vm, class, "start_with?", -1, |vm, recv, args| {
        let text = text_of(vm, recv);
        for &prefix in args.args {
            let hit = match regexp::regex_if(vm, prefix) {
                Some(regex) => regex.find(&text).is_some_and(|found| found.start() == 0),
                None => text.starts_with(&vm.expect_string(prefix)?),
            };
            if hit {
                return Ok(Value::True);
            }
        }
        Ok(Value::False)
    });
    def(vm, class, "end_with?", -1, |vm, recv, args| {
        let text = text_of(vm, recv);
        for &suffix in args.args {
            if text.ends_with(&vm.expect_string(suffix)?) {
                return Ok(Value::True);
            }
        }
        Ok(Value::False)
    });
    def(vm, class, "index", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let text = text_of(vm, recv);
        let count = text.chars().count();
        let start = match args.opt(1) {
            None => 0,
            Some(start) => {
                let start = vm.expect_int(start)?;
                match resolve_index(start, count) {
                    Some(start) if start <= count => start,
                    _ => return Ok(Value::Nil),
                }
            }
        };
        let offset = byte_offset(&text, start);
        let regex = regexp::pattern_regex(vm, args.get(0))?;
        Ok(match regex.find_at(&text, offset) {
            Some(found) => Value::Integer(text[..found.start()].chars().count() as i64),
            None => Value::Nil,
        })
    });
    for (name, align) in [("ljust", Align::Left), ("rjust", Align::Right), ("center", Align::Center)] {
        let func: super::NativeMethod = match align {
            Align::Left => |vm, recv, args| justify(vm, recv, args, Align::Left),
            Align::Right => |vm, recv, args| justify(vm, recv, args, Align::Right),
            Align::Center => |vm, recv, args| justify(vm, recv, args, Align::Center),
        };
        def(vm, class, name, -2, func);
    }
}

fn register_slicing(vm: &mut Vm, class: HeapId) {
    def(vm, class, "[]", -2, aref);
    super::alias(vm, class, "slice", "[]");
    def(vm, class, "[]=", -3, aset);
    def(vm, class, "chomp", -1, |vm, recv, args| {
        let chomped = chomped(vm, recv, args)?;
        vm.new_string_owned(chomped)
    });
    def(vm, class, "chomp!", -1, |vm, recv, args| {
        let chomped = chomped(vm, recv, args)?;
        replace_if_changed(vm, recv, chomped)
    });
    def(vm, class, "split", -1, split);
}

fn register_patterns(vm: &mut Vm, class: HeapId) {
    def(vm, class, "=~", 1, |vm, recv, args| {
        let pattern = args.get(0);
        if vm.is_string(pattern) {
            return Err(RunError::type_error("wrong argument type String (expected Regexp)"));
        }
        let match_op = vm.interns.intern("=~");
        vm.call_method(pattern, match_op, &[recv], None, None, false)
    });
    def(vm, class, "match?", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let regex = regexp::pattern_regex(vm, args.get(0))?;
        Ok(Value::from_bool(regex.is_match(&text_of(vm, recv))))
    });
    def(vm, class, "sub", -2, |vm, recv, args| {
        let text = text_of(vm, recv);
        let replaced = substitute(vm, &text, args, false)?;
        vm.new_string_owned(replaced.unwrap_or(text))
    });
    def(vm, class, "sub!", -2, |vm, recv, args| {
        vm.check_frozen(recv)?;
        let text = text_of(vm, recv);
        match substitute(vm, &text, args, false)? {
            Some(replaced) => {
                *vm.string_mut(recv)? = replaced;
                Ok(recv)
            }
            None => Ok(Value::Nil),
        }
    });
    def(vm, class, "gsub", -2, |vm, recv, args| {
        let text = text_of(vm, recv);
        let replaced = substitute(vm, &text, args, true)?;
        vm.new_string_owned(replaced.unwrap_or(text))
    });
    def(vm, class, "gsub!", -2, |vm, recv, args| {
        vm.check_frozen(recv)?;
        let text = text_of(vm, recv);
        match substitute(vm, &text, args, true)? {
            Some(replaced) => {
                *vm.string_mut(recv)? = replaced;
                Ok(recv)
            }
            None => Ok(Value::Nil),
        }
    });
    def(vm, class, "scan", 1, |vm, recv, args| {
        let text = text_of(vm, recv);
        let regex = regexp::pattern_regex(vm, args.get(0))?;
        let mut found = Vec::new();
        for caps in regex.captures_iter(&text) {
            let item = if regex.captures_len() > 1 {
                let mut groups = Vec::with_capacity(caps.len() - 1);
                for group in caps.iter().skip(1) {
                    groups.push(match group {
                        Some(group) => vm.new_string(group.as_str())?,
                        None => Value::Nil,
                    });
                }
                vm.new_array(groups)?
            } else {
                vm.new_string(caps.get(0).map_or("", |whole| whole.as_str()))?
            };
            found.push(item);
        }
        match args.block {
            Some(block) => {
                for item in found {
                    vm.call_block(Some(block), &[item])?;
                }
                Ok(recv)
            }
            None => vm.new_array(found),
        }
    });
}

fn register_mutation(vm: &mut Vm, class: HeapId) {
    def(vm, class, "replace", 1, |vm, recv, args| {
        let text = vm.expect_string(args.get(0))?;
        *vm.string_mut(recv)? = text;
        Ok(recv)
    });
    def(vm, class, "clear", 0, |vm, recv, _| {
        vm.string_mut(recv)?.clear();
        Ok(recv)
    });
}

fn text_of(vm: &Vm, value: Value) -> String {
    vm.string_of(value).map(str::to_owned).unwrap_or_default()
}

fn reserve(vm: &mut Vm, len: usize) -> RunResult<()> {
    if len > MAX_LENGTH {
        return Err(RunError::argument("argument too big"));
    }
    vm.heap.tracker_mut().on_allocate(len)?;
    Ok(())
}

fn is_strippable(c: char) -> bool {
    c.is_whitespace() || c == '\0'
}

fn chop(s: &str) -> String {
    if let Some(stripped) = s.strip_suffix("\r\n") {
        return stripped.to_owned();
    }
    let mut chars = s.chars();
    chars.next_back();
    chars.as_str().to_owned()
}

/// Stores `changed` in `recv` and answers it, or nil when the text is unchanged.
fn replace_if_changed(vm: &mut Vm, recv: Value, changed: String) -> RunResult<Value> {
    let target = vm.string_mut(recv)?;
    if *target == changed {
        return Ok(Value::Nil);
    }
    *target = changed;
    Ok(recv)
}

/// Text appended by `<<`/`concat`: an Integer is a codepoint.
fn appended_text(vm: &mut Vm, value: Value) -> RunResult<String> {
    match value {
        Value::Integer(code) => u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .ok_or_else(|| ExcType::RangeError.error(format!("{code} out of char range"))),
        other => vm.expect_string(other),
    }
}

fn chomped(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<String> {
    args.check(0, Some(1))?;
    let text = text_of(vm, recv);
    let separator = match args.opt(0) {
        None => None,
        Some(Value::Nil) => return Ok(text),
        Some(sep) => Some(vm.expect_string(sep)?),
    };
    Ok(string::chomp(&text, separator.as_deref()).to_owned())
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
    Center,
}

fn justify(vm: &mut Vm, recv: Value, args: CallArgs<'_>, align: Align) -> RunResult<Value> {
    args.check(1, Some(2))?;
    let width = usize::try_from(vm.expect_int(args.get(0))?).unwrap_or(0);
    let pad = match args.opt(1) {
        None => " ".to_owned(),
        Some(pad) => vm.expect_string(pad)?,
    };
    if pad.is_empty() {
        return Err(RunError::argument("zero width padding"));
    }
    let text = text_of(vm, recv);
    let len = text.chars().count();
    if width <= len {
        return vm.new_string_owned(text);
    }
    reserve(vm, width.saturating_mul(4))?;
    let total = width - len;
    let (left, right) = match align {
        Align::Left => (0, total),
        Align::Right => (total, 0),
        Align::Center => (total / 2, total - total / 2),
    };
    let filler = |n: usize| pad.chars().cycle().take(n).collect::<String>();
    vm.new_string_owned(format!("{}{text}{}", filler(left), filler(right)))
}

/// `str[index]`, `str[start, length]`, `str[substring]` or `str[regexp, group = 0]`.
fn aref(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    args.check(1, Some(2))?;
    let text = text_of(vm, recv);
    let arg = args.get(0);
    if let Some(regex) = regexp::regex_if(vm, arg) {
        let group = match args.opt(1) {
            None => 0,
            Some(group) => usize::try_from(vm.expect_int(group)?).unwrap_or(usize::MAX),
        };
        return match regex.captures(&text).and_then(|caps| caps.get(group)) {
            Some(found) => vm.new_string(found.as_str()),
            None => Ok(Value::Nil),
        };
    }
    if let Some(needle) = vm.string_of(arg).map(str::to_owned) {
        return if text.contains(&needle) {
            vm.new_string_owned(needle)
        } else {
            Ok(Value::Nil)
        };
    }
    let index = vm.expect_int(arg)?;
    let count = text.chars().count();
    let range = match args.opt(1) {
        None => resolve_index(index, count).filter(|&i| i < count).map(|i| (i, i + 1)),
        Some(length) => {
            let length = vm.expect_int(length)?;
            span(index, length, count)
        }
    };
    match range {
        Some((start, end)) => {
            let slice = &text[byte_offset(&text, start)..byte_offset(&text, end)];
            vm.new_string(slice)
        }
        None => Ok(Value::Nil),
    }
}

/// `str[index] = s`, `str[start, length] = s`, `str[substring] = s` or `str[regexp] = s`.
fn aset(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    args.check(2, Some(3))?;
    vm.check_frozen(recv)?;
    let value = args.get(args.len() - 1);
    let replacement = vm.expect_string(value)?;
    let text = text_of(vm, recv);
    let arg = args.get(0);
    let bytes = if let Some(regex) = regexp::regex_if(vm, arg) {
        let found = regex
            .find(&text)
            .ok_or_else(|| ExcType::IndexError.error("regexp not matched"))?;
        found.start()..found.end()
    } else if let Some(needle) = vm.string_of(arg).map(str::to_owned) {
        let start = text
            .find(&needle)
            .ok_or_else(|| ExcType::IndexError.error("string not matched"))?;
        start..start + needle.len()
    } else {
        let index = vm.expect_int(arg)?;
        let count = text.chars().count();
        let length = match args.len() {
            3 => vm.expect_int(args.get(1))?,
            _ => 1,
        };
        let (start, end) = match resolve_index(index, count) {
            Some(start) if start < count || (args.len() == 3 && start == count) => {
                span(index, length, count)
                    .ok_or_else(|| ExcType::IndexError.error(format!("negative length {length}")))?
            }
            _ => return Err(ExcType::IndexError.error(format!("index {index} out of string"))),
        };
        byte_offset(&text, start)..byte_offset(&text, end)
    };
    vm.string_mut(recv)?.replace_range(bytes, &replacement);
    Ok(value)
}

/// `split(pattern = nil, limit = 0)`.
fn split(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    args.check(0, Some(2))?;
    let text = text_of(vm, recv);
    let limit = match args.opt(1) {
        None => 0,
        Some(limit) => vm.expect_int(limit)?,
    };
    let max_fields = usize::try_from(limit).unwrap_or(0);
    let whitespace = match args.opt(0) {
        None | Some(Value::Nil) => true,
        Some(pattern) => vm.string_of(pattern) == Some(" "),
    };
    let mut fields: Vec<String> = if whitespace {
        awk_split(&text, max_fields).into_iter().map(str::to_owned).collect()
    } else {
        let regex = regexp::pattern_regex(vm, args.get(0))?;
        if regex.as_str().is_empty() {
            split_chars(&text, max_fields)
        } else if max_fields > 0 {
            regex.splitn(&text, max_fields).map(str::to_owned).collect()
        } else {
            regex.split(&text).map(str::to_owned).collect()
        }
    };
    if limit == 0 {
        while fields.last().is_some_and(String::is_empty) {
            fields.pop();
        }
    }
    let mut values = Vec::with_capacity(fields.len());
    for field in fields {
        values.push(vm.new_string_owned(field)?);
    }
    vm.new_array(values)
}

fn split_chars(text: &str, max_fields: usize) -> Vec<String> {
    let mut fields = Vec::new();
    for (i, (offset, c)) in text.char_indices().enumerate() {
        if max_fields > 0 && i + 1 == max_fields {
            fields.push(text[offset..].to_owned());
            return fields;
        }
        fields.push(c.to_string());
    }
    fields
}

enum Replacement {
    Template(String),
    Hash(Value),
    Block(Value),
}

/// Runs `sub` (first match) or `gsub` (every match) over `text`; `None` when nothing matched.
fn substitute(vm: &mut Vm, text: &str, args: CallArgs<'_>, global: bool) -> RunResult<Option<String>> {
    args.check(1, Some(2))?;
    let regex = regexp::pattern_regex(vm, args.get(0))?;
    let replacement = match (args.opt(1), args.block) {
        (Some(hash), _) if vm.hash_of(hash).is_some() => Replacement::Hash(hash),
        (Some(template), _) => Replacement::Template(vm.expect_string(template)?),
        (None, Some(block)) => Replacement::Block(block),
        (None, None) => return Err(RunError::arity(1, 2, Some(2))),
    };
    let matches: Vec<Captures<'_>> = if global {
        regex.captures_iter(text).collect()
    } else {
        regex.captures(text).into_iter().collect()
    };
    if matches.is_empty() {
        return Ok(None);
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in &matches {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        match &replacement {
            Replacement::Template(template) => expand_template(template, caps, &regex, &mut out),
            Replacement::Hash(hash) => {
                let key = vm.new_string(whole.as_str())?;
                let value = vm.hash_fetch(*hash, key)?;
                out.push_str(&vm.to_s_value(value)?);
            }
            Replacement::Block(block) => {
                let matched = vm.new_string(whole.as_str())?;
                let value = vm.call_block(Some(*block), &[matched])?;
                out.push_str(&vm.to_s_value(value)?);
            }
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    reserve(vm, out.len())?;
    Ok(Some(out))
}

/// Appends a replacement template with `\0`-`\9`, `\&`, `\k<name>` and `\\` expanded.
fn expand_template(template: &str, caps: &Captures<'_>, regex: &Regex, out: &mut String) {
    let group = |index: usize| caps.get(index).map_or("", |m| m.as_str());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(digit @ '0'..='9') => {
                chars.next();
                out.push_str(group(digit as usize - '0' as usize));
            }
            Some('&') => {
                chars.next();
                out.push_str(group(0));
            }
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some('k') => {
                chars.next();
                let mut name = String::new();
                if chars.next_if_eq(&'<').is_some() {
                    for c in chars.by_ref() {
                        if c == '>' {
                            break;
                        }
                        name.push(c);
                    }
                }
                if regex.capture_names().flatten().any(|n| n == name) {
                    out.push_str(caps.name(&name).map_or("", |m| m.as_str()));
                } else {
                    let _ = write!(out, "\\k<{name}>");
                }
            }
            _ => out.push('\\'),
        }
    }
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::{chop, expand_template, split_chars};

    fn expand(pattern: &str, text: &str, template: &str) -> String {
        let regex = Regex::new(pattern).unwrap();
        let caps = regex.captures(text).unwrap();
        let mut out = String::new();
        expand_template(template, &caps, &regex, &mut out);
        out
    }

    #[test]
    fn templates_expand_groups() {
        assert_eq!(expand(r"(\w+)@(\w+)", "me@host", r"\2 at \1"), "host at me");
        assert_eq!(expand(r"o", "foo", r"[\&]"), "[o]");
        assert_eq!(expand(r"(?<n>\d+)", "a1", r"<\k<n>>"), "<1>");
        assert_eq!(expand(r"x", "x", r"a\\b"), r"a\b");
    }

    #[test]
    fn chop_removes_crlf_together() {
        assert_eq!(chop("ab\r\n"), "ab");
        assert_eq!(chop("ab"), "a");
        assert_eq!(chop(""), "");
    }

    #[test]
    fn empty_pattern_splits_characters() {
        assert_eq!(split_chars("abc", 0), vec!["a", "b", "c"]);
        assert_eq!(split_chars("abc", 2), vec!["a", "bc"]);
    }
}
