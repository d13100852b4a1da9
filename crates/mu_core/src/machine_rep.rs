//! Machine representations.
//!
//! Every type maps to exactly one representation, fixed when the type is
//! constructed. The set is open: consumers must handle representations they
//! do not recognize by reporting an error rather than assuming the match is
//! exhaustive.

use crate::value::Value;
use std::fmt;

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MachineRep {
    Void,
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Int64,
    Float,
    Double,
    /// Objects, lists, strings, function values and references.
    Pointer,
    Vec2f,
    Vec3f,
    Vec4f,
}

impl MachineRep {
    pub const ALL: [MachineRep; 13] = [
        MachineRep::Void,
        MachineRep::Bool,
        MachineRep::Byte,
        MachineRep::Char,
        MachineRep::Short,
        MachineRep::Int,
        MachineRep::Int64,
        MachineRep::Float,
        MachineRep::Double,
        MachineRep::Pointer,
        MachineRep::Vec2f,
        MachineRep::Vec3f,
        MachineRep::Vec4f,
    ];

    /// Size in bytes of one value in this representation.
    pub fn size(self) -> u32 {
        match self {
            MachineRep::Void => 0,
            MachineRep::Bool | MachineRep::Byte => 1,
            MachineRep::Short => 2,
            MachineRep::Char | MachineRep::Int | MachineRep::Float => 4,
            MachineRep::Int64 | MachineRep::Double | MachineRep::Pointer => 8,
            MachineRep::Vec2f => 8,
            MachineRep::Vec3f => 12,
            MachineRep::Vec4f => 16,
        }
    }

    /// Alignment used when laying out instance fields.
    pub fn alignment(self) -> u32 {
        match self {
            MachineRep::Void => 1,
            MachineRep::Vec2f => 8,
            MachineRep::Vec3f | MachineRep::Vec4f => 16,
            other => other.size(),
        }
    }

    /// Short register-class name.
    pub fn name(self) -> &'static str {
        match self {
            MachineRep::Void => "v",
            MachineRep::Bool => "b",
            MachineRep::Byte => "B",
            MachineRep::Char => "c",
            MachineRep::Short => "s",
            MachineRep::Int => "i",
            MachineRep::Int64 => "L",
            MachineRep::Float => "f",
            MachineRep::Double => "F",
            MachineRep::Pointer => "p",
            MachineRep::Vec2f => "2f",
            MachineRep::Vec3f => "3f",
            MachineRep::Vec4f => "4f",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        MachineRep::ALL.into_iter().find(|r| r.name() == name)
    }

    /// Scalar representation of one vector component.
    pub fn element(self) -> Option<MachineRep> {
        match self {
            MachineRep::Vec2f | MachineRep::Vec3f | MachineRep::Vec4f => Some(MachineRep::Float),
            _ => None,
        }
    }

    pub fn width(self) -> u32 {
        match self {
            MachineRep::Void => 0,
            MachineRep::Vec2f => 2,
            MachineRep::Vec3f => 3,
            MachineRep::Vec4f => 4,
            _ => 1,
        }
    }

    pub fn vector(width: u32) -> Option<MachineRep> {
        match width {
            2 => Some(MachineRep::Vec2f),
            3 => Some(MachineRep::Vec3f),
            4 => Some(MachineRep::Vec4f),
            _ => None,
        }
    }

    #[inline]
    pub fn is_pointer(self) -> bool {
        self == MachineRep::Pointer
    }

    /// The value a fresh slot of this representation holds.
    pub fn zero(self) -> Value {
        match self {
            MachineRep::Void => Value::Void,
            MachineRep::Bool => Value::Bool(false),
            MachineRep::Byte => Value::Byte(0),
            MachineRep::Char => Value::Char('\0'),
            MachineRep::Short => Value::Short(0),
            MachineRep::Int => Value::Int(0),
            MachineRep::Int64 => Value::Int64(0),
            MachineRep::Float => Value::Float(0.0),
            MachineRep::Double => Value::Double(0.0),
            MachineRep::Pointer => Value::Nil,
            MachineRep::Vec2f => Value::Vec2([0.0; 2]),
            MachineRep::Vec3f => Value::Vec3([0.0; 3]),
            MachineRep::Vec4f => Value::Vec4([0.0; 4]),
        }
    }

    /// Whether `value` is a legal cell for this representation.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (MachineRep::Void, Value::Void)
                | (MachineRep::Bool, Value::Bool(_))
                | (MachineRep::Byte, Value::Byte(_))
                | (MachineRep::Char, Value::Char(_))
                | (MachineRep::Short, Value::Short(_))
                | (MachineRep::Int, Value::Int(_))
                | (MachineRep::Int64, Value::Int64(_))
                | (MachineRep::Float, Value::Float(_))
                | (MachineRep::Double, Value::Double(_))
                | (MachineRep::Vec2f, Value::Vec2(_))
                | (MachineRep::Vec3f, Value::Vec3(_))
                | (MachineRep::Vec4f, Value::Vec4(_))
                | (
                    MachineRep::Pointer,
                    Value::Nil | Value::Object(_) | Value::Symbol(_) | Value::Ref(_)
                )
        )
    }
}

impl fmt::Display for MachineRep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for rep in MachineRep::ALL {
            assert_eq!(MachineRep::from_name(rep.name()), Some(rep));
        }
    }

    #[test]
    fn zero_is_accepted() {
        for rep in MachineRep::ALL {
            assert!(rep.accepts(&rep.zero()), "{rep}");
        }
        assert!(!MachineRep::Int.accepts(&Value::Float(1.0)));
    }
}
