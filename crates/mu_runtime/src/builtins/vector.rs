//! `vector float[N]` constructors and arithmetic.

use super::BuiltinProvider;
use super::common::{arg, corrupt, int_arg};
use super::numeric::number;
use crate::errors::{Exception, messages};
use crate::node::{EvalResult, Flow};
use crate::registration::FunctionDecl;
use crate::symbols::FunctionAttrs;
use crate::thread::Thread;
use mu_core::Value;

trait Lanes: Copy {
    const TYPE: &'static str;
    const CONSTRUCTOR: &'static str;
    const PARAMS: &'static [&'static str];

    fn from_value(value: Value) -> Option<Self>;
    fn into_value(self) -> Value;
    fn lanes(&self) -> &[f32];
    fn lanes_mut(&mut self) -> &mut [f32];
    fn zero() -> Self;
}

macro_rules! lanes {
    ($n:literal, $variant:ident, $name:literal, $ctor:literal, $params:expr) => {
        impl Lanes for [f32; $n] {
            const TYPE: &'static str = $name;
            const CONSTRUCTOR: &'static str = $ctor;
            const PARAMS: &'static [&'static str] = $params;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
            fn into_value(self) -> Value {
                Value::$variant(self)
            }
            fn lanes(&self) -> &[f32] {
                self
            }
            fn lanes_mut(&mut self) -> &mut [f32] {
                self
            }
            fn zero() -> Self {
                [0.0; $n]
            }
        }
    };
}

lanes!(2, Vec2, "vector float[2]", "vec2", &["float"; 2]);
lanes!(3, Vec3, "vector float[3]", "vec3", &["float"; 3]);
lanes!(4, Vec4, "vector float[4]", "vec4", &["float"; 4]);

fn vector<V: Lanes>(args: &[Value], index: usize) -> Result<V, Flow> {
    arg(args, index)
        .ok()
        .and_then(V::from_value)
        .ok_or(corrupt(messages::NOT_A_NUMBER))
}

fn construct<V: Lanes>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let mut v = V::zero();
    for (i, lane) in v.lanes_mut().iter_mut().enumerate() {
        *lane = number::<f32>(args, i)?;
    }
    Ok(v.into_value())
}

fn zip<V: Lanes>(args: &[Value], f: impl Fn(f32, f32) -> f32) -> EvalResult {
    let (a, b) = (vector::<V>(args, 0)?, vector::<V>(args, 1)?);
    let mut out = V::zero();
    for ((o, x), y) in out.lanes_mut().iter_mut().zip(a.lanes()).zip(b.lanes()) {
        *o = f(*x, *y);
    }
    Ok(out.into_value())
}

fn add<V: Lanes>(_: &mut Thread, args: &[Value]) -> EvalResult {
    zip::<V>(args, |x, y| x + y)
}

fn sub<V: Lanes>(_: &mut Thread, args: &[Value]) -> EvalResult {
    zip::<V>(args, |x, y| x - y)
}

fn scale<V: Lanes>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let mut v = vector::<V>(args, 0)?;
    let k = number::<f32>(args, 1)?;
    for lane in v.lanes_mut() {
        *lane *= k;
    }
    Ok(v.into_value())
}

fn dot<V: Lanes>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = (vector::<V>(args, 0)?, vector::<V>(args, 1)?);
    Ok(Value::Float(
        a.lanes().iter().zip(b.lanes()).map(|(x, y)| x * y).sum(),
    ))
}

fn lane<V: Lanes>(_: &mut Thread, args: &[Value]) -> EvalResult {
    let v = vector::<V>(args, 0)?;
    let index = int_arg(args, 1)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| v.lanes().get(i).copied())
        .map(Value::Float)
        .ok_or(Exception::OutOfRange(index as i64).into())
}

fn declare<V: Lanes>(out: &mut Vec<FunctionDecl>) {
    let t = V::TYPE;
    out.extend([
        FunctionDecl::native(V::CONSTRUCTOR, construct::<V>, t, V::PARAMS),
        FunctionDecl::native("+", add::<V>, t, &[t, t]).with_attrs(FunctionAttrs::COMMUTATIVE),
        FunctionDecl::native("-", sub::<V>, t, &[t, t]),
        FunctionDecl::native("*", scale::<V>, t, &[t, "float"])
            .with_attrs(FunctionAttrs::COMMUTATIVE),
        FunctionDecl::native("dot", dot::<V>, "float", &[t, t]),
        FunctionDecl::native("[]", lane::<V>, "float", &[t, "int"]),
    ]);
}

pub(super) struct Vectors;

impl BuiltinProvider for Vectors {
    fn functions(&self) -> Vec<FunctionDecl> {
        let mut out = Vec::new();
        declare::<[f32; 2]>(&mut out);
        declare::<[f32; 3]>(&mut out);
        declare::<[f32; 4]>(&mut out);
        out
    }
}
