//! Integer, with transparent promotion to `BigInt` on overflow.
//!
//! Small values are `Value::Integer`; anything outside `i64` lives on the heap as a `BigInt`
//! of class Integer. Every method accepts either form and results are demoted back to
//! immediates whenever they fit. Division and modulo floor toward negative infinity.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_integer::Integer as _;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    builtins::{
        def,
        float::{coerce_binop, float_mod},
    },
    callable::CallArgs,
    exception::{ExcType, RunError, RunResult},
    value::Value,
    vm::Vm,
};

/// Largest exponent `**` computes exactly.
const MAX_EXPONENT: u32 = 1 << 20;

pub(super) fn register(vm: &mut Vm) {
    let integer = vm.core.integer;
    def(vm, integer, "+", 1, |vm, recv, args| {
        let other = args.get(0);
        if let (Value::Integer(a), Value::Integer(b)) = (recv, other)
            && let Some(sum) = a.checked_add(b)
        {
            return Ok(Value::Integer(sum));
        }
        arith(vm, recv, other, "+", |a, b| Ok(a + b), |a, b| a + b)
    });
    def(vm, integer, "-", 1, |vm, recv, args| {
        let other = args.get(0);
        if let (Value::Integer(a), Value::Integer(b)) = (recv, other)
            && let Some(difference) = a.checked_sub(b)
        {
            return Ok(Value::Integer(difference));
        }
        arith(vm, recv, other, "-", |a, b| Ok(a - b), |a, b| a - b)
    });
    def(vm, integer, "*", 1, |vm, recv, args| {
        let other = args.get(0);
        if let (Value::Integer(a), Value::Integer(b)) = (recv, other)
            && let Some(product) = a.checked_mul(b)
        {
            return Ok(Value::Integer(product));
        }
        arith(vm, recv, other, "*", |a, b| Ok(a * b), |a, b| a * b)
    });
    def(vm, integer, "/", 1, |vm, recv, args| {
        arith(vm, recv, args.get(0), "/", |a, b| nonzero(b).map(|b| a.div_floor(b)), |a, b| a / b)
    });
    def(vm, integer, "%", 1, |vm, recv, args| {
        arith(vm, recv, args.get(0), "%", |a, b| nonzero(b).map(|b| a.mod_floor(b)), float_mod)
    });
    def(vm, integer, "**", 1, pow);
    def(vm, integer, "-@", 0, |vm, recv, _| match recv {
        Value::Integer(n) if n != i64::MIN => Ok(Value::Integer(-n)),
        _ => {
            let n = big(vm, recv);
            vm.int_result(-n)
        }
    });
    def(vm, integer, "~", 0, |vm, recv, _| {
        let n = big(vm, recv);
        vm.int_result(!n)
    });
    def(vm, integer, "abs", 0, |vm, recv, _| match recv {
        Value::Integer(n) if n != i64::MIN => Ok(Value::Integer(n.abs())),
        _ => {
            let n = big(vm, recv);
            vm.int_result(n.abs())
        }
    });
    def(vm, integer, "divmod", 1, |vm, recv, args| {
        let other = args.get(0);
        if let Value::Float(b) = other {
            let a = vm.to_f64(recv).unwrap_or(f64::NAN);
            let quotient = super::float::to_integer(vm, (a / b).floor())?;
            return vm.new_array(vec![quotient, Value::Float(float_mod(a, b))]);
        }
        let Some(b) = int_arg(vm, other) else {
            return coerce_binop(vm, recv, other, "divmod");
        };
        let a = big(vm, recv);
        let (quotient, modulo) = a.div_mod_floor(nonzero(&b)?);
        let quotient = vm.int_result(quotient)?;
        let modulo = vm.int_result(modulo)?;
        vm.new_array(vec![quotient, modulo])
    });
    def(vm, integer, "fdiv", 1, |vm, recv, args| {
        let a = vm.to_f64(recv).unwrap_or(f64::NAN);
        match vm.to_f64(args.get(0)) {
            Some(b) => Ok(Value::Float(a / b)),
            None => coerce_binop(vm, recv, args.get(0), "fdiv"),
        }
    });
    def(vm, integer, "&", 1, |vm, recv, args| bitwise(vm, recv, args.get(0), |a, b| a & b));
    def(vm, integer, "|", 1, |vm, recv, args| bitwise(vm, recv, args.get(0), |a, b| a | b));
    def(vm, integer, "^", 1, |vm, recv, args| bitwise(vm, recv, args.get(0), |a, b| a ^ b));
    def(vm, integer, "<<", 1, |vm, recv, args| {
        let bits = vm.expect_int(args.get(0))?;
        shift(vm, recv, bits)
    });
    def(vm, integer, ">>", 1, |vm, recv, args| {
        let bits = vm.expect_int(args.get(0))?;
        shift(vm, recv, bits.checked_neg().unwrap_or(i64::MAX))
    });

    def(vm, integer, "==", 1, |vm, recv, args| {
        Ok(Value::from_bool(numeric_cmp(vm, recv, args.get(0)) == Some(Ordering::Equal)))
    });
    def(vm, integer, "<=>", 1, |vm, recv, args| {
        Ok(match numeric_cmp(vm, recv, args.get(0)) {
            Some(ordering) => Value::Integer(ordering as i64),
            None => Value::Nil,
        })
    });
    def(vm, integer, "<", 1, |vm, recv, args| compare(vm, recv, args, Ordering::is_lt));
    def(vm, integer, "<=", 1, |vm, recv, args| compare(vm, recv, args, Ordering::is_le));
    def(vm, integer, ">", 1, |vm, recv, args| compare(vm, recv, args, Ordering::is_gt));
    def(vm, integer, ">=", 1, |vm, recv, args| compare(vm, recv, args, Ordering::is_ge));

    def(vm, integer, "to_s", -1, to_s);
    def(vm, integer, "inspect", 0, |vm, recv, _| {
        let text = big(vm, recv).to_string();
        vm.new_string_owned(text)
    });
    def(vm, integer, "to_i", 0, |_, recv, _| Ok(recv));
    def(vm, integer, "to_int", 0, |_, recv, _| Ok(recv));
    def(vm, integer, "to_f", 0, |vm, recv, _| Ok(Value::Float(vm.to_f64(recv).unwrap_or(f64::NAN))));
    def(vm, integer, "floor", 0, |_, recv, _| Ok(recv));
    def(vm, integer, "ceil", 0, |_, recv, _| Ok(recv));
    def(vm, integer, "round", 0, |_, recv, _| Ok(recv));
    def(vm, integer, "integer?", 0, |_, _, _| Ok(Value::True));
    def(vm, integer, "chr", 0, |vm, recv, _| {
        let code = match recv {
            Value::Integer(n @ 0..=255) => n,
            _ => {
                let n = big(vm, recv);
                return Err(ExcType::RangeError.error(format!("{n} out of char range")));
            }
        };
        let c = u32::try_from(code).ok().and_then(char::from_u32).unwrap_or('\0');
        vm.new_string_owned(c.to_string())
    });

    def(vm, integer, "times", 0, |vm, recv, args| {
        let block = args.require_block()?;
        let count = vm.expect_int(recv)?;
        for i in 0..count {
            vm.call_block(Some(block), &[Value::Integer(i)])?;
        }
        Ok(recv)
    });
    def(vm, integer, "upto", 1, |vm, recv, args| {
        let block = args.require_block()?;
        let (from, to) = (vm.expect_int(recv)?, vm.expect_int(args.get(0))?);
        for i in from..=to {
            vm.call_block(Some(block), &[Value::Integer(i)])?;
        }
        Ok(recv)
    });
    def(vm, integer, "downto", 1, |vm, recv, args| {
        let block = args.require_block()?;
        let (from, to) = (vm.expect_int(recv)?, vm.expect_int(args.get(0))?);
        for i in (to..=from).rev() {
            vm.call_block(Some(block), &[Value::Integer(i)])?;
        }
        Ok(recv)
    });

    def(vm, integer, "succ", 0, |vm, recv, _| step(vm, recv, 1));
    def(vm, integer, "next", 0, |vm, recv, _| step(vm, recv, 1));
    def(vm, integer, "pred", 0, |vm, recv, _| step(vm, recv, -1));
    def(vm, integer, "zero?", 0, |vm, recv, _| Ok(Value::from_bool(big(vm, recv).is_zero())));
    def(vm, integer, "even?", 0, |vm, recv, _| Ok(Value::from_bool(big(vm, recv).is_even())));
    def(vm, integer, "odd?", 0, |vm, recv, _| Ok(Value::from_bool(big(vm, recv).is_odd())));
    def(vm, integer, "gcd", 1, |vm, recv, args| {
        let Some(other) = int_arg(vm, args.get(0)) else {
            return Err(RunError::type_error("not an integer"));
        };
        let gcd = big(vm, recv).gcd(&other);
        vm.int_result(gcd)
    });
    def(vm, integer, "lcm", 1, |vm, recv, args| {
        let Some(other) = int_arg(vm, args.get(0)) else {
            return Err(RunError::type_error("not an integer"));
        };
        let lcm = big(vm, recv).lcm(&other);
        vm.int_result(lcm)
    });
    def(vm, integer, "coerce", 1, |vm, recv, args| {
        let other = args.get(0);
        if int_arg(vm, other).is_some() {
            return vm.new_array(vec![other, recv]);
        }
        match (vm.to_f64(other), vm.to_f64(recv)) {
            (Some(a), Some(b)) => vm.new_array(vec![Value::Float(a), Value::Float(b)]),
            _ => {
                let name = vm.conversion_name(other);
                Err(RunError::type_error(format!("can't convert {name} into Float")))
            }
        }
    });
}

/// The receiver as a `BigInt`; receivers are always Integer values.
fn big(vm: &Vm, value: Value) -> BigInt {
    int_arg(vm, value).unwrap_or_default()
}

/// `value` as a `BigInt` when it is an Integer of either representation.
fn int_arg(vm: &Vm, value: Value) -> Option<BigInt> {
    match value {
        Value::Integer(n) => Some(BigInt::from(n)),
        other => vm.bigint_of(other),
    }
}

fn nonzero(divisor: &BigInt) -> RunResult<&BigInt> {
    if divisor.is_zero() {
        Err(RunError::zero_division())
    } else {
        Ok(divisor)
    }
}

/// Integer arithmetic with Float contagion and `coerce` for foreign operands.
fn arith(
    vm: &mut Vm,
    recv: Value,
    other: Value,
    op: &str,
    ints: fn(&BigInt, &BigInt) -> RunResult<BigInt>,
    floats: fn(f64, f64) -> f64,
) -> RunResult<Value> {
    if let Value::Float(b) = other {
        let a = vm.to_f64(recv).unwrap_or(f64::NAN);
        return Ok(Value::Float(floats(a, b)));
    }
    match int_arg(vm, other) {
        Some(b) => {
            let result = ints(&big(vm, recv), &b)?;
            vm.int_result(result)
        }
        None => coerce_binop(vm, recv, other, op),
    }
}

fn pow(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    let other = args.get(0);
    if let Value::Float(b) = other {
        return Ok(Value::Float(vm.to_f64(recv).unwrap_or(f64::NAN).powf(b)));
    }
    let Some(exponent) = int_arg(vm, other) else {
        return coerce_binop(vm, recv, other, "**");
    };
    let base = big(vm, recv);
    if exponent.is_negative() {
        let a = vm.to_f64(recv).unwrap_or(f64::NAN);
        let b = exponent.to_f64().unwrap_or(f64::NEG_INFINITY);
        return Ok(Value::Float(a.powf(b)));
    }
    let trivial = base.is_zero() || base.abs() == BigInt::from(1);
    let exponent = match exponent.to_u32() {
        Some(e) if e <= MAX_EXPONENT || trivial => e,
        _ if trivial => u32::from(exponent.is_odd()) + 2,
        _ => return Err(RunError::argument("exponent too large")),
    };
    vm.int_result(base.pow(exponent))
}

fn bitwise(vm: &mut Vm, recv: Value, other: Value, f: fn(BigInt, BigInt) -> BigInt) -> RunResult<Value> {
    match int_arg(vm, other) {
        Some(b) => {
            let result = f(big(vm, recv), b);
            vm.int_result(result)
        }
        None => Err(RunError::no_implicit_conversion(&vm.conversion_name(other), "Integer")),
    }
}

/// Left shift by `bits`; negative counts shift right, flooring.
fn shift(vm: &mut Vm, recv: Value, bits: i64) -> RunResult<Value> {
    let n = big(vm, recv);
    let result = if bits >= 0 {
        let bits = usize::try_from(bits).ok().filter(|&b| b <= MAX_EXPONENT as usize);
        match bits {
            Some(bits) => n << bits,
            None if n.is_zero() => n,
            None => return Err(RunError::argument("shift width too big")),
        }
    } else {
        let bits = usize::try_from(bits.unsigned_abs()).unwrap_or(usize::MAX);
        if u64::try_from(bits).unwrap_or(u64::MAX) >= n.bits() {
            BigInt::from(if n.is_negative() { -1 } else { 0 })
        } else {
            n >> bits
        }
    };
    vm.int_result(result)
}

fn step(vm: &mut Vm, recv: Value, delta: i64) -> RunResult<Value> {
    if let Value::Integer(n) = recv
        && let Some(next) = n.checked_add(delta)
    {
        return Ok(Value::Integer(next));
    }
    let next = big(vm, recv) + delta;
    vm.int_result(next)
}

/// Numeric ordering of an Integer against any number; `None` for non-numbers and NaN.
fn numeric_cmp(vm: &Vm, recv: Value, other: Value) -> Option<Ordering> {
    match (recv, other) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(&b)),
        (_, Value::Float(b)) => vm.to_f64(recv)?.partial_cmp(&b),
        _ => Some(big(vm, recv).cmp(&int_arg(vm, other)?)),
    }
}

fn compare(vm: &mut Vm, recv: Value, args: CallArgs<'_>, test: fn(Ordering) -> bool) -> RunResult<Value> {
    let other = args.get(0);
    match numeric_cmp(vm, recv, other) {
        Some(ordering) => Ok(Value::from_bool(test(ordering))),
        None if matches!(other, Value::Float(_)) => Ok(Value::False),
        None => Err(vm.comparison_failed(recv, other)),
    }
}

fn to_s(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    args.check(0, Some(1))?;
    let base = match args.opt(0) {
        Some(value) => vm.expect_int(value)?,
        None => 10,
    };
    let Some(radix) = u32::try_from(base).ok().filter(|b| (2..=36).contains(b)) else {
        return Err(RunError::argument(format!("invalid radix {base}")));
    };
    let text = big(vm, recv).to_str_radix(radix);
    vm.new_string_owned(text)
}
