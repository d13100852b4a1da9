//! Per-representation data access: constants, variable references and
//! dereferences, assignment and function return.
//!
//! Each representation gets its own table of evaluation functions. The
//! functions validate every value they move against the representation, so
//! a mistyped tree surfaces as an internal error at the first access.

use crate::errors::{InternalError, messages};
use crate::node::{EvalResult, Flow, Node, NodeFunc};
use crate::thread::Thread;
use mu_core::{Location, MachineRep, Value};

pub struct RepFuncs {
    pub rep: MachineRep,
    pub constant: NodeFunc,
    /// `T&` to a frame slot; the slot is the node operand.
    pub reference_stack: NodeFunc,
    pub reference_global: NodeFunc,
    /// `T&` to a field of the object in `args[0]`.
    pub reference_member: NodeFunc,
    /// Loads through the reference produced by `args[0]`.
    pub dereference: NodeFunc,
    pub dereference_stack: NodeFunc,
    pub dereference_global: NodeFunc,
    pub dereference_member: NodeFunc,
    /// Stores `args[1]` through the reference `args[0]`.
    pub assign: NodeFunc,
    pub function_return: NodeFunc,
}

#[inline]
fn checked(rep: MachineRep, value: Value) -> EvalResult {
    if rep.accepts(&value) {
        Ok(value)
    } else {
        log::error!("{} value in a {} cell", value.kind_name(), rep);
        Err(InternalError::CorruptValue(messages::REP_MISMATCH).into())
    }
}

fn member_location(node: &Node, thread: &mut Thread) -> Result<Location, Flow> {
    let object = node.eval_arg(0, thread)?;
    let r = thread.object_ref(object)?;
    Ok(Location::Field {
        obj: r.id,
        slot: r.base + node.operand()?,
    })
}

fn reference_stack(node: &Node, thread: &mut Thread) -> EvalResult {
    Ok(Value::Ref(thread.local_location(node.operand()?)))
}

fn reference_global(node: &Node, _thread: &mut Thread) -> EvalResult {
    Ok(Value::Ref(Location::Global(node.operand()?)))
}

fn reference_member(node: &Node, thread: &mut Thread) -> EvalResult {
    Ok(Value::Ref(member_location(node, thread)?))
}

fn constant(rep: MachineRep, node: &Node) -> EvalResult {
    let value = node
        .data
        .ok_or(Flow::Internal(InternalError::CorruptValue(messages::MISSING_CONSTANT)))?;
    checked(rep, value)
}

fn dereference(rep: MachineRep, node: &Node, thread: &mut Thread) -> EvalResult {
    match node.eval_arg(0, thread)? {
        Value::Ref(location) => checked(rep, thread.load(location)?),
        Value::Nil => Err(crate::errors::Exception::NilReference.into()),
        _ => Err(InternalError::CorruptValue(messages::NOT_A_REFERENCE).into()),
    }
}

fn dereference_stack(rep: MachineRep, node: &Node, thread: &mut Thread) -> EvalResult {
    checked(rep, thread.local(node.operand()?)?)
}

fn dereference_global(rep: MachineRep, node: &Node, thread: &mut Thread) -> EvalResult {
    checked(rep, thread.load(Location::Global(node.operand()?))?)
}

fn dereference_member(rep: MachineRep, node: &Node, thread: &mut Thread) -> EvalResult {
    let location = member_location(node, thread)?;
    checked(rep, thread.load(location)?)
}

fn assign(rep: MachineRep, node: &Node, thread: &mut Thread) -> EvalResult {
    let target = node.eval_arg(0, thread)?;
    let Value::Ref(location) = target else {
        return Err(InternalError::CorruptValue(messages::NOT_A_REFERENCE).into());
    };
    // The reference keeps a field's object alive while the value evaluates.
    thread.push(target);
    let value = checked(rep, node.eval_arg(1, thread)?)?;
    thread.pop()?;
    thread.store(location, value)?;
    Ok(value)
}

fn function_return(rep: MachineRep, node: &Node, thread: &mut Thread) -> EvalResult {
    let value = checked(rep, node.eval_arg(0, thread)?)?;
    Err(Flow::Return(value))
}

macro_rules! rep_table {
    ($module:ident, $rep:expr) => {
        mod $module {
            use super::*;

            const REP: MachineRep = $rep;

            fn constant(node: &Node, _thread: &mut Thread) -> EvalResult {
                super::constant(REP, node)
            }

            fn dereference(node: &Node, thread: &mut Thread) -> EvalResult {
                super::dereference(REP, node, thread)
            }

            fn dereference_stack(node: &Node, thread: &mut Thread) -> EvalResult {
                super::dereference_stack(REP, node, thread)
            }

            fn dereference_global(node: &Node, thread: &mut Thread) -> EvalResult {
                super::dereference_global(REP, node, thread)
            }

            fn dereference_member(node: &Node, thread: &mut Thread) -> EvalResult {
                super::dereference_member(REP, node, thread)
            }

            fn assign(node: &Node, thread: &mut Thread) -> EvalResult {
                super::assign(REP, node, thread)
            }

            fn function_return(node: &Node, thread: &mut Thread) -> EvalResult {
                super::function_return(REP, node, thread)
            }

            pub static FUNCS: RepFuncs = RepFuncs {
                rep: REP,
                constant,
                reference_stack,
                reference_global,
                reference_member,
                dereference,
                dereference_stack,
                dereference_global,
                dereference_member,
                assign,
                function_return,
            };
        }
    };
}

rep_table!(void, MachineRep::Void);
rep_table!(boolean, MachineRep::Bool);
rep_table!(byte, MachineRep::Byte);
rep_table!(character, MachineRep::Char);
rep_table!(short, MachineRep::Short);
rep_table!(int, MachineRep::Int);
rep_table!(int64, MachineRep::Int64);
rep_table!(float, MachineRep::Float);
rep_table!(double, MachineRep::Double);
rep_table!(pointer, MachineRep::Pointer);
rep_table!(vec2, MachineRep::Vec2f);
rep_table!(vec3, MachineRep::Vec3f);
rep_table!(vec4, MachineRep::Vec4f);

/// Evaluation functions for a representation, `None` when the runtime has
/// no table for it.
pub fn rep_funcs(rep: MachineRep) -> Option<&'static RepFuncs> {
    match rep {
        MachineRep::Void => Some(&void::FUNCS),
        MachineRep::Bool => Some(&boolean::FUNCS),
        MachineRep::Byte => Some(&byte::FUNCS),
        MachineRep::Char => Some(&character::FUNCS),
        MachineRep::Short => Some(&short::FUNCS),
        MachineRep::Int => Some(&int::FUNCS),
        MachineRep::Int64 => Some(&int64::FUNCS),
        MachineRep::Float => Some(&float::FUNCS),
        MachineRep::Double => Some(&double::FUNCS),
        MachineRep::Pointer => Some(&pointer::FUNCS),
        MachineRep::Vec2f => Some(&vec2::FUNCS),
        MachineRep::Vec3f => Some(&vec3::FUNCS),
        MachineRep::Vec4f => Some(&vec4::FUNCS),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_rep_has_a_table() {
        for rep in MachineRep::ALL {
            let funcs = rep_funcs(rep).expect("table");
            assert_eq!(funcs.rep, rep);
        }
    }

    #[test]
    fn checked_rejects_foreign_values() {
        assert!(checked(MachineRep::Int, Value::Int(3)).is_ok());
        assert_eq!(
            checked(MachineRep::Int, Value::Float(3.0)),
            Err(Flow::Internal(InternalError::CorruptValue(messages::REP_MISMATCH)))
        );
    }
}
