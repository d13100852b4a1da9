//! Arithmetic and comparisons over the numeric primitives.
//!
//! Integer arithmetic wraps; integer division and remainder by zero raise
//! `DivisionByZero`.

use super::BuiltinProvider;
use super::common::{bool_arg, corrupt};
use crate::errors::{Exception, messages};
use crate::node::{EvalResult, Flow};
use crate::registration::FunctionDecl;
use crate::symbols::FunctionAttrs;
use crate::thread::Thread;
use mu_core::Value;

pub(super) trait Number: Copy + PartialOrd {
    const TYPE: &'static str;
    const INTEGER: bool;

    fn from_value(value: Value) -> Option<Self>;
    fn into_value(self) -> Value;
    fn to_i64(self) -> i64;
    fn from_i64(value: i64) -> Self;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;

    fn add(self, other: Self) -> Self;
    fn sub(self, other: Self) -> Self;
    fn mul(self, other: Self) -> Self;
    /// `None` for an integer division by zero.
    fn div(self, other: Self) -> Option<Self>;
    fn rem(self, other: Self) -> Option<Self>;
    fn neg(self) -> Self;
}

macro_rules! integer {
    ($t:ty, $variant:ident, $name:literal) => {
        impl Number for $t {
            const TYPE: &'static str = $name;
            const INTEGER: bool = true;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
            fn into_value(self) -> Value {
                Value::$variant(self)
            }
            fn to_i64(self) -> i64 {
                self as i64
            }
            fn from_i64(value: i64) -> Self {
                value as $t
            }
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(value: f64) -> Self {
                value as $t
            }
            fn add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }
            fn sub(self, other: Self) -> Self {
                self.wrapping_sub(other)
            }
            fn mul(self, other: Self) -> Self {
                self.wrapping_mul(other)
            }
            fn div(self, other: Self) -> Option<Self> {
                (other != 0).then(|| self.wrapping_div(other))
            }
            fn rem(self, other: Self) -> Option<Self> {
                (other != 0).then(|| self.wrapping_rem(other))
            }
            fn neg(self) -> Self {
                self.wrapping_neg()
            }
        }
    };
}

macro_rules! float {
    ($t:ty, $variant:ident, $name:literal) => {
        impl Number for $t {
            const TYPE: &'static str = $name;
            const INTEGER: bool = false;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
            fn into_value(self) -> Value {
                Value::$variant(self)
            }
            fn to_i64(self) -> i64 {
                self as i64
            }
            fn from_i64(value: i64) -> Self {
                value as $t
            }
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(value: f64) -> Self {
                value as $t
            }
            fn add(self, other: Self) -> Self {
                self + other
            }
            fn sub(self, other: Self) -> Self {
                self - other
            }
            fn mul(self, other: Self) -> Self {
                self * other
            }
            fn div(self, other: Self) -> Option<Self> {
                Some(self / other)
            }
            fn rem(self, other: Self) -> Option<Self> {
                Some(self % other)
            }
            fn neg(self) -> Self {
                -self
            }
        }
    };
}

integer!(u8, Byte, "byte");
integer!(i16, Short, "short");
integer!(i32, Int, "int");
integer!(i64, Int64, "int64");
float!(f32, Float, "float");
float!(f64, Double, "double");

pub(super) fn number<T: Number>(args: &[Value], index: usize) -> Result<T, Flow> {
    args.get(index)
        .copied()
        .and_then(T::from_value)
        .ok_or(corrupt(messages::NOT_A_NUMBER))
}

fn pair<T: Number>(args: &[Value]) -> Result<(T, T), Flow> {
    Ok((number(args, 0)?, number(args, 1)?))
}

fn add<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    Ok(a.add(b).into_value())
}

fn sub<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    Ok(a.sub(b).into_value())
}

fn mul<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    Ok(a.mul(b).into_value())
}

fn div<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    a.div(b)
        .map(Number::into_value)
        .ok_or(Exception::DivisionByZero.into())
}

fn rem<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    a.rem(b)
        .map(Number::into_value)
        .ok_or(Exception::DivisionByZero.into())
}

fn neg<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    Ok(number::<T>(args, 0)?.neg().into_value())
}

fn less<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    Ok(Value::Bool(a < b))
}

fn less_equal<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    Ok(Value::Bool(a <= b))
}

fn greater<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    Ok(Value::Bool(a > b))
}

fn greater_equal<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    Ok(Value::Bool(a >= b))
}

fn equal<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    Ok(Value::Bool(a == b))
}

fn not_equal<T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = pair::<T>(args)?;
    Ok(Value::Bool(a != b))
}

fn not(_: &mut Thread, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(!bool_arg(args, 0)?))
}

fn arithmetic<T: Number>(out: &mut Vec<FunctionDecl>) {
    let t = T::TYPE;
    let binary = [t, t];
    out.extend([
        FunctionDecl::native("+", add::<T>, t, &binary).with_attrs(FunctionAttrs::COMMUTATIVE),
        FunctionDecl::native("-", sub::<T>, t, &binary),
        FunctionDecl::native("*", mul::<T>, t, &binary).with_attrs(FunctionAttrs::COMMUTATIVE),
        FunctionDecl::native("/", div::<T>, t, &binary),
        FunctionDecl::native("%", rem::<T>, t, &binary),
        FunctionDecl::native("-", neg::<T>, t, &[t]),
        FunctionDecl::native("<", less::<T>, "bool", &binary),
        FunctionDecl::native("<=", less_equal::<T>, "bool", &binary),
        FunctionDecl::native(">", greater::<T>, "bool", &binary),
        FunctionDecl::native(">=", greater_equal::<T>, "bool", &binary),
        FunctionDecl::native("==", equal::<T>, "bool", &binary),
        FunctionDecl::native("!=", not_equal::<T>, "bool", &binary),
    ]);
}

pub(super) struct Numeric;

impl BuiltinProvider for Numeric {
    fn functions(&self) -> Vec<FunctionDecl> {
        let mut out = Vec::new();
        arithmetic::<i32>(&mut out);
        arithmetic::<i64>(&mut out);
        arithmetic::<f32>(&mut out);
        arithmetic::<f64>(&mut out);
        out.push(FunctionDecl::native("!", not, "bool", &["bool"]));
        out.push(FunctionDecl::inline(
            "&&",
            crate::eval::control::logical_and,
            "bool",
            &["bool", "bool"],
        ));
        out.push(FunctionDecl::inline(
            "||",
            crate::eval::control::logical_or,
            "bool",
            &["bool", "bool"],
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps() {
        assert_eq!(i32::MAX.add(1), i32::MIN);
        assert_eq!(i32::MIN.neg(), i32::MIN);
        assert_eq!(7i32.div(0), None);
        assert_eq!(i32::MIN.div(-1), Some(i32::MIN));
    }

    #[test]
    fn float_division_by_zero_is_infinite() {
        assert_eq!(1.0f32.div(0.0), Some(f32::INFINITY));
        assert!(0.0f64.rem(0.0).is_some_and(f64::is_nan));
    }
}
