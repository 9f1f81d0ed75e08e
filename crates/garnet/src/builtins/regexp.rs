//! Regexp, backed by the `regex` crate.
//!
//! There is no MatchData: `=~` answers the character offset of the first match and the
//! String methods that need groups (`sub`, `gsub`, `scan`) read them directly.

use regex::Regex;

use crate::{
    builtins::{def, def_singleton},
    exception::{RunError, RunResult},
    heap::HeapData,
    types::regexp::{self, EXTENDED, IGNORECASE, MULTILINE},
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) -> RunResult<()> {
    let class = vm.core.regexp;
    for (name, bits) in [("IGNORECASE", IGNORECASE), ("EXTENDED", EXTENDED), ("MULTILINE", MULTILINE)] {
        let name = vm.interns.intern(name);
        vm.const_set(class, name, Value::Integer(i64::from(bits)))?;
    }

    def_singleton(vm, class, "new", -2, |vm, _, args| {
        args.check(1, Some(2))?;
        let source = args.get(0);
        if let Some((pattern, options)) = parts(vm, source) {
            return vm.new_regexp(&pattern, options);
        }
        let pattern = vm.expect_string(source)?;
        let options = match args.opt(1) {
            None | Some(Value::Nil | Value::False) => 0,
            Some(Value::Integer(bits)) => u32::try_from(bits).unwrap_or(0) & (IGNORECASE | EXTENDED | MULTILINE),
            Some(flags) => match vm.string_of(flags) {
                Some(letters) => regexp::parse_options(letters),
                None => IGNORECASE,
            },
        };
        vm.new_regexp(&pattern, options)
    })?;
    def_singleton(vm, class, "escape", 1, |vm, _, args| {
        let text = match args.get(0) {
            Value::Symbol(sym) => vm.interns.get(sym).to_owned(),
            other => vm.expect_string(other)?,
        };
        vm.new_string_owned(escape(&text))
    })?;
    let singleton = vm.singleton_class_of(Value::Ref(class))?;
    super::alias(vm, singleton, "compile", "new");
    super::alias(vm, singleton, "quote", "escape");

    def(vm, class, "source", 0, |vm, recv, _| {
        let (source, _) = parts(vm, recv).unwrap_or_default();
        vm.new_string_owned(source)
    });
    def(vm, class, "options", 0, |vm, recv, _| {
        let (_, options) = parts(vm, recv).unwrap_or_default();
        Ok(Value::Integer(i64::from(options)))
    });
    def(vm, class, "casefold?", 0, |vm, recv, _| {
        let (_, options) = parts(vm, recv).unwrap_or_default();
        Ok(Value::from_bool(options & IGNORECASE != 0))
    });
    def(vm, class, "to_s", 0, |vm, recv, _| {
        let text = rendered(vm, recv, regexp::RRegexp::to_s);
        vm.new_string_owned(text)
    });
    def(vm, class, "inspect", 0, |vm, recv, _| {
        let text = rendered(vm, recv, regexp::RRegexp::inspect);
        vm.new_string_owned(text)
    });
    def(vm, class, "==", 1, |vm, recv, args| {
        let equal = match (parts(vm, recv), parts(vm, args.get(0))) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        Ok(Value::from_bool(equal))
    });
    super::alias(vm, class, "eql?", "==");
    def(vm, class, "=~", 1, |vm, recv, args| {
        let subject = args.get(0);
        if subject.is_nil() {
            return Ok(Value::Nil);
        }
        let text = subject_text(vm, subject)?;
        let regex = regex_of(vm, recv)?;
        Ok(match regex.find(&text) {
            Some(found) => Value::Integer(text[..found.start()].chars().count() as i64),
            None => Value::Nil,
        })
    });
    def(vm, class, "match?", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let subject = args.get(0);
        if subject.is_nil() {
            return Ok(Value::False);
        }
        let text = subject_text(vm, subject)?;
        let regex = regex_of(vm, recv)?;
        Ok(Value::from_bool(regex.is_match(&text)))
    });
    def(vm, class, "===", 1, |vm, recv, args| {
        let text = match args.get(0) {
            Value::Symbol(sym) => vm.interns.get(sym).to_owned(),
            other => match vm.string_of(other) {
                Some(text) => text.to_owned(),
                None => return Ok(Value::False),
            },
        };
        let regex = regex_of(vm, recv)?;
        Ok(Value::from_bool(regex.is_match(&text)))
    });
    Ok(())
}

fn parts(vm: &Vm, value: Value) -> Option<(String, u32)> {
    match value {
        Value::Ref(id) => match vm.heap.data(id) {
            HeapData::Regexp(regexp) => Some((regexp.source.clone(), regexp.options)),
            _ => None,
        },
        _ => None,
    }
}

fn rendered(vm: &Vm, value: Value, render: fn(&regexp::RRegexp) -> String) -> String {
    match value {
        Value::Ref(id) => match vm.heap.data(id) {
            HeapData::Regexp(regexp) => render(regexp),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

/// Compiled form of a Regexp value.
fn regex_of(vm: &Vm, value: Value) -> RunResult<Regex> {
    regex_if(vm, value).ok_or_else(|| {
        RunError::type_error(format!(
            "wrong argument type {} (expected Regexp)",
            vm.conversion_name(value)
        ))
    })
}

/// Compiled form of `value` when it is a Regexp.
pub(super) fn regex_if(vm: &Vm, value: Value) -> Option<Regex> {
    match value {
        Value::Ref(id) => match vm.heap.data(id) {
            HeapData::Regexp(regexp) => Some(regexp.regex.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// A Regexp argument as is, or a String argument matched literally.
pub(super) fn pattern_regex(vm: &mut Vm, pattern: Value) -> RunResult<Regex> {
    if let Some(regex) = regex_if(vm, pattern) {
        return Ok(regex);
    }
    let literal = vm.expect_string(pattern)?;
    Regex::new(&regex::escape(&literal)).map_err(|err| RunError::internal(err.to_string()))
}

fn subject_text(vm: &mut Vm, subject: Value) -> RunResult<String> {
    match subject {
        Value::Symbol(sym) => Ok(vm.interns.get(sym).to_owned()),
        other => vm.expect_string(other),
    }
}

/// `Regexp.escape`: backslashes before metacharacters, escapes for whitespace.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '.' | '*' | '?' | '+' | '^' | '$' | '|' | '(' | ')' | '[' | ']' | '{' | '}' | '\\' | '-' | '#' => {
                out.push('\\');
                out.push(c);
            }
            ' ' => out.push_str("\\ "),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '\x0b' => out.push_str("\\v"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape;

    #[test]
    fn escapes_metacharacters_and_whitespace() {
        assert_eq!(escape("a.b*c"), "a\\.b\\*c");
        assert_eq!(escape("x y\n"), "x\\ y\\n");
        assert_eq!(escape("plain"), "plain");
    }
}
