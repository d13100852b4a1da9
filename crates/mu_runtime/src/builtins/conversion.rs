//! Conversions between primitives.
//!
//! Widening numeric conversions are implicit; narrowing ones, conversions
//! to `char` and conversions to `string` need an explicit cast.

use super::BuiltinProvider;
use super::common::{arg, corrupt, display, int_arg};
use super::numeric::{Number, number};
use crate::errors::{Exception, messages};
use crate::node::EvalResult;
use crate::registration::FunctionDecl;
use crate::symbols::{FunctionAttrs, NativeFunc};
use crate::thread::Thread;
use mu_core::Value;

fn convert<F: Number, T: Number>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let value = number::<F>(args, 0)?;
    let converted = if F::INTEGER && T::INTEGER {
        T::from_i64(value.to_i64())
    } else {
        T::from_f64(value.to_f64())
    };
    Ok(converted.into_value())
}

fn char_to_int(_: &mut Thread, args: &[Value]) -> EvalResult {
    match arg(args, 0)? {
        Value::Char(c) => Ok(Value::Int(c as i32)),
        _ => Err(corrupt(messages::NOT_A_NUMBER)),
    }
}

fn int_to_char(_: &mut Thread, args: &[Value]) -> EvalResult {
    let code = int_arg(args, 0)?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or(Exception::OutOfRange(code as i64).into())
}

fn to_string(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let text = display(thread, arg(args, 0)?)?;
    Ok(thread.alloc_string(&text))
}

const NUMBERS: [&str; 6] = ["byte", "short", "int", "int64", "float", "double"];

/// Source is implicitly convertible to target.
const WIDENING: [(&str, &str); 13] = [
    ("byte", "short"),
    ("byte", "int"),
    ("byte", "int64"),
    ("byte", "float"),
    ("byte", "double"),
    ("short", "int"),
    ("short", "int64"),
    ("short", "float"),
    ("short", "double"),
    ("int", "int64"),
    ("int", "float"),
    ("int", "double"),
    ("float", "double"),
];

fn converter(from: &str, to: &str) -> Option<NativeFunc> {
    macro_rules! to {
        ($f:ty) => {
            match to {
                "byte" => Some(convert::<$f, u8> as NativeFunc),
                "short" => Some(convert::<$f, i16> as NativeFunc),
                "int" => Some(convert::<$f, i32> as NativeFunc),
                "int64" => Some(convert::<$f, i64> as NativeFunc),
                "float" => Some(convert::<$f, f32> as NativeFunc),
                "double" => Some(convert::<$f, f64> as NativeFunc),
                _ => None,
            }
        };
    }
    match from {
        "byte" => to!(u8),
        "short" => to!(i16),
        "int" => to!(i32),
        "int64" => to!(i64),
        "float" => to!(f32),
        "double" => to!(f64),
        _ => None,
    }
}

fn cast(target: &'static str, func: NativeFunc, from: &'static str, attrs: FunctionAttrs) -> (&'static str, FunctionDecl) {
    (
        target,
        FunctionDecl::native("cast", func, target, &[from]).with_attrs(attrs),
    )
}

pub(super) struct Conversions;

impl BuiltinProvider for Conversions {
    fn functions(&self) -> Vec<FunctionDecl> {
        Vec::new()
    }

    fn casts(&self) -> Vec<(&'static str, FunctionDecl)> {
        let mut out = Vec::new();
        for from in NUMBERS {
            for to in NUMBERS {
                if from == to {
                    continue;
                }
                let Some(func) = converter(from, to) else {
                    continue;
                };
                let attrs = if WIDENING.contains(&(from, to)) {
                    FunctionAttrs::IMPLICIT_CAST
                } else {
                    FunctionAttrs::CAST
                };
                out.push(cast(to, func, from, attrs));
            }
            out.push(cast("string", to_string, from, FunctionAttrs::CAST));
        }
        out.push(cast("int", char_to_int, "char", FunctionAttrs::IMPLICIT_CAST));
        out.push(cast("char", int_to_char, "int", FunctionAttrs::CAST));
        out.push(cast("string", to_string, "char", FunctionAttrs::CAST));
        out.push(cast("string", to_string, "bool", FunctionAttrs::CAST));
        out
    }
}
