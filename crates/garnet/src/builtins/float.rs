//! Float.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::FromPrimitive;

use crate::{
    builtins::def,
    callable::CallArgs,
    exception::{ExcType, RunError, RunResult},
    intern::StaticSymbols,
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) {
    let float = vm.core.float;
    def(vm, float, "+", 1, |vm, recv, args| arith(vm, recv, args.get(0), "+", |a, b| a + b));
    def(vm, float, "-", 1, |vm, recv, args| arith(vm, recv, args.get(0), "-", |a, b| a - b));
    def(vm, float, "*", 1, |vm, recv, args| arith(vm, recv, args.get(0), "*", |a, b| a * b));
    def(vm, float, "/", 1, |vm, recv, args| arith(vm, recv, args.get(0), "/", |a, b| a / b));
    def(vm, float, "%", 1, |vm, recv, args| arith(vm, recv, args.get(0), "%", float_mod));
    def(vm, float, "**", 1, |vm, recv, args| arith(vm, recv, args.get(0), "**", f64::powf));
    def(vm, float, "-@", 0, |_, recv, _| Ok(Value::Float(-self_f64(recv))));
    def(vm, float, "==", 1, |vm, recv, args| {
        Ok(Value::from_bool(vm.to_f64(args.get(0)) == Some(self_f64(recv))))
    });
    def(vm, float, "<=>", 1, |vm, recv, args| {
        Ok(match vm.to_f64(args.get(0)).and_then(|b| self_f64(recv).partial_cmp(&b)) {
            Some(ordering) => Value::Integer(ordering as i64),
            None => Value::Nil,
        })
    });
    def(vm, float, "<", 1, |vm, recv, args| compare(vm, recv, args, Ordering::is_lt));
    def(vm, float, "<=", 1, |vm, recv, args| compare(vm, recv, args, Ordering::is_le));
    def(vm, float, ">", 1, |vm, recv, args| compare(vm, recv, args, Ordering::is_gt));
    def(vm, float, ">=", 1, |vm, recv, args| compare(vm, recv, args, Ordering::is_ge));
    def(vm, float, "to_s", 0, |vm, recv, _| vm.new_string_owned(format_float(self_f64(recv))));
    def(vm, float, "inspect", 0, |vm, recv, _| vm.new_string_owned(format_float(self_f64(recv))));
    def(vm, float, "to_f", 0, |_, recv, _| Ok(recv));
    def(vm, float, "to_i", 0, |vm, recv, _| to_integer(vm, self_f64(recv).trunc()));
    def(vm, float, "floor", 0, |vm, recv, _| to_integer(vm, self_f64(recv).floor()));
    def(vm, float, "ceil", 0, |vm, recv, _| to_integer(vm, self_f64(recv).ceil()));
    def(vm, float, "round", -1, round);
    def(vm, float, "abs", 0, |_, recv, _| Ok(Value::Float(self_f64(recv).abs())));
    def(vm, float, "nan?", 0, |_, recv, _| Ok(Value::from_bool(self_f64(recv).is_nan())));
    def(vm, float, "zero?", 0, |_, recv, _| Ok(Value::from_bool(self_f64(recv) == 0.0)));
    def(vm, float, "infinite?", 0, |_, recv, _| {
        let f = self_f64(recv);
        Ok(if f.is_infinite() {
            Value::Integer(if f > 0.0 { 1 } else { -1 })
        } else {
            Value::Nil
        })
    });
    def(vm, float, "finite?", 0, |_, recv, _| Ok(Value::from_bool(self_f64(recv).is_finite())));
    def(vm, float, "coerce", 1, |vm, recv, args| {
        let Some(other) = vm.to_f64(args.get(0)) else {
            let name = vm.conversion_name(args.get(0));
            return Err(RunError::type_error(format!("can't convert {name} into Float")));
        };
        vm.new_array(vec![Value::Float(other), recv])
    });
}

fn self_f64(value: Value) -> f64 {
    match value {
        Value::Float(f) => f,
        _ => f64::NAN,
    }
}

fn arith(vm: &mut Vm, recv: Value, other: Value, op: &str, f: fn(f64, f64) -> f64) -> RunResult<Value> {
    match vm.to_f64(other) {
        Some(b) => Ok(Value::Float(f(self_f64(recv), b))),
        None => coerce_binop(vm, recv, other, op),
    }
}

fn compare(vm: &mut Vm, recv: Value, args: CallArgs<'_>, test: fn(Ordering) -> bool) -> RunResult<Value> {
    let other = args.get(0);
    match vm.to_f64(other) {
        Some(b) => Ok(Value::from_bool(self_f64(recv).partial_cmp(&b).is_some_and(test))),
        None => Err(vm.comparison_failed(recv, other)),
    }
}

/// `recv op other` through `other.coerce(recv)`, raising TypeError when `other` can't coerce.
pub(super) fn coerce_binop(vm: &mut Vm, recv: Value, other: Value, op: &str) -> RunResult<Value> {
    let coerce = StaticSymbols::Coerce.into();
    if other.heap_id().is_some() && vm.responds_to(other, coerce)? {
        let pair = vm.funcall(other, coerce, &[recv])?;
        if let Some(&[left, right]) = vm.array_of(pair).map(Vec::as_slice) {
            let mid = vm.interns.intern(op);
            return vm.funcall(left, mid, &[right]);
        }
        return Err(RunError::type_error("coerce must return [x, y]"));
    }
    let from = match other {
        Value::Nil => "nil".to_owned(),
        Value::True => "true".to_owned(),
        Value::False => "false".to_owned(),
        _ => vm.module_display_name(vm.real_class_of(other)),
    };
    let into = vm.module_display_name(vm.real_class_of(recv));
    Err(RunError::type_error(format!("{from} can't be coerced into {into}")))
}

/// Integer for a whole-valued float, raising FloatDomainError for NaN and infinities.
pub(super) fn to_integer(vm: &mut Vm, f: f64) -> RunResult<Value> {
    if !f.is_finite() {
        return Err(ExcType::FloatDomainError.error(format_float(f)));
    }
    if f.abs() < 9.0e18 {
        return Ok(Value::Integer(f as i64));
    }
    match BigInt::from_f64(f) {
        Some(big) => vm.int_result(big),
        None => Err(ExcType::FloatDomainError.error(format_float(f))),
    }
}

fn round(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    args.check(0, Some(1))?;
    let f = self_f64(recv);
    let digits = match args.opt(0) {
        Some(value) => vm.expect_int(value)?,
        None => 0,
    };
    if digits > 0 {
        if !f.is_finite() {
            return Ok(recv);
        }
        let scale = 10f64.powi(i32::try_from(digits.min(308)).unwrap_or(308));
        return Ok(Value::Float((f * scale).round() / scale));
    }
    if digits == 0 {
        return to_integer(vm, f.round());
    }
    let scale = 10f64.powi(i32::try_from(-digits.max(-308)).unwrap_or(308));
    to_integer(vm, (f / scale).round() * scale)
}

/// Float modulo with the sign of the divisor.
pub(crate) fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
}

/// `Float#to_s`: shortest round-trip digits, always with a fractional part, switching to
/// exponent form below `1e-4` and from `1e16` on.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_owned();
    }
    let mut buffer = ryu::Buffer::new();
    let shortest = buffer.format_finite(f.abs());
    let (digits, exponent) = decimal_digits(shortest);
    let sign = if f < 0.0 { "-" } else { "" };
    format!("{sign}{}", ruby_layout(&digits, exponent))
}

/// Splits ryu output (`"1.5e20"`, `"0.00012"`, `"123.0"`) into significant digits and the
/// exponent of the first one: `d.ddd * 10^exponent`.
fn decimal_digits(shortest: &str) -> (String, i32) {
    let (mantissa, mut exponent) = match shortest.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse::<i32>().unwrap_or(0)),
        None => (shortest, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let int_part = int_part.trim_start_matches('0');
    let digits = if int_part.is_empty() {
        let significant = frac_part.trim_start_matches('0');
        exponent -= (frac_part.len() - significant.len()) as i32 + 1;
        significant.to_owned()
    } else {
        exponent += int_part.len() as i32 - 1;
        format!("{int_part}{frac_part}")
    };
    let digits = digits.trim_end_matches('0');
    (if digits.is_empty() { "0" } else { digits }.to_owned(), exponent)
}

/// Ruby places the point inline for `1e-4 <= |f| < 1e16` and uses `d.de[+-]XX` otherwise.
fn ruby_layout(digits: &str, exponent: i32) -> String {
    if !(-4..16).contains(&exponent) {
        let (lead, rest) = digits.split_at(1);
        let rest = if rest.is_empty() { "0" } else { rest };
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{lead}.{rest}e{sign}{:02}", exponent.abs());
    }
    if exponent < 0 {
        let zeros = "0".repeat((-exponent - 1) as usize);
        return format!("0.{zeros}{digits}");
    }
    let point = exponent as usize + 1;
    if digits.len() <= point {
        format!("{digits:0<point$}.0")
    } else {
        let (int_part, frac_part) = digits.split_at(point);
        format!("{int_part}.{frac_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_ruby() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e16), "1.0e+16");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(0.00001), "1.0e-05");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(1.5e100), "1.5e+100");
        assert_eq!(format_float(f64::NAN), "NaN");
        assert_eq!(format_float(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_float(-0.0), "-0.0");
        assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float(123.456), "123.456");
        assert_eq!(format_float(-1.25e-7), "-1.25e-07");
        assert_eq!(format_float(100.0), "100.0");
    }

    #[test]
    fn ryu_output_splits_into_digits() {
        assert_eq!(decimal_digits("1e16"), ("1".to_owned(), 16));
        assert_eq!(decimal_digits("1.5e-7"), ("15".to_owned(), -7));
        assert_eq!(decimal_digits("0.00012"), ("12".to_owned(), -4));
        assert_eq!(decimal_digits("120.0"), ("12".to_owned(), 2));
    }

    #[test]
    fn modulo_takes_the_divisor_sign() {
        assert_eq!(float_mod(-7.0, 2.0), 1.0);
        assert_eq!(float_mod(7.0, -2.0), -1.0);
        assert_eq!(float_mod(6.0, 3.0), 0.0);
    }
}
