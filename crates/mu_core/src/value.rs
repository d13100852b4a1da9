//! Runtime value representation.
//!
//! A `Value` is the cell passed between evaluation functions, stored in
//! thread stacks, instance slots and globals. It is `Copy`; heap data is only
//! ever reached through an `ObjRef`.

use crate::handle::{Location, ObjRef, ObjectId, SymbolId};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Void,
    /// The empty list and the null object pointer.
    Nil,
    Bool(bool),
    Byte(u8),
    Char(char),
    Short(i16),
    Int(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Object(ObjRef),
    /// A function or type symbol used as a first-class value.
    Symbol(SymbolId),
    Ref(Location),
}

impl Value {
    pub fn object(id: ObjectId) -> Self {
        Value::Object(ObjRef::new(id))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_location(&self) -> Option<Location> {
        match self {
            Value::Ref(l) => Some(*l),
            _ => None,
        }
    }

    /// The heap object this value keeps alive, if any.
    #[inline]
    pub fn referent(&self) -> Option<ObjectId> {
        match self {
            Value::Object(r) => Some(r.id),
            Value::Ref(Location::Field { obj, .. }) => Some(*obj),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Char(_) => "char",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Int64(_) => "int64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Vec2(_) => "vector float[2]",
            Value::Vec3(_) => "vector float[3]",
            Value::Vec4(_) => "vector float[4]",
            Value::Object(_) => "object",
            Value::Symbol(_) => "symbol",
            Value::Ref(_) => "reference",
        }
    }
}

fn write_floats(f: &mut fmt::Formatter<'_>, v: &[f32]) -> fmt::Result {
    f.write_str("<")?;
    for (i, x) in v.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", x)?;
    }
    f.write_str(">")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Byte(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::Short(i) => write!(f, "{}", i),
            Value::Int(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Double(x) => write!(f, "{}", x),
            Value::Vec2(v) => write_floats(f, v),
            Value::Vec3(v) => write_floats(f, v),
            Value::Vec4(v) => write_floats(f, v),
            Value::Object(r) => write!(f, "<object {}+{}>", r.id.0, r.base),
            Value::Symbol(s) => write!(f, "<symbol {}>", s.0),
            Value::Ref(l) => write!(f, "<ref {:?}>", l),
        }
    }
}
