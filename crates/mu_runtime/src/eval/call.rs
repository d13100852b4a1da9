//! Call nodes.
//!
//! Arguments are evaluated left to right and pushed onto the value stack,
//! where the callee finds them. A call node whose data is `Bool(true)` was
//! resolved with its two arguments swapped; they are still evaluated in
//! source order and exchanged on the stack afterwards.

use crate::errors::{Exception, InternalError, messages};
use crate::heap::ManagedObject;
use crate::node::{EvalResult, Flow, Node};
use crate::thread::Thread;
use mu_core::{ObjRef, Value};
use smallvec::SmallVec;

/// Pushes every argument in order and returns the stack height before.
fn push_args(node: &Node, thread: &mut Thread) -> Result<usize, Flow> {
    let base = thread.stack_len();
    for arg in &node.args {
        let value = arg.eval(thread)?;
        thread.push(value);
    }
    if node.data == Some(Value::Bool(true)) {
        thread.swap_top();
    }
    Ok(base)
}

/// Calls the host function stored on the node.
pub fn call_native(node: &Node, thread: &mut Thread) -> EvalResult {
    let native = node
        .native
        .ok_or(Flow::Internal(InternalError::CorruptValue(messages::MISSING_FUNCTION)))?;
    let base = push_args(node, thread)?;
    let args: SmallVec<[Value; 8]> = SmallVec::from_slice(thread.stack_from(base));
    let result = native(thread, &args);
    thread.truncate(base);
    result
}

/// Calls the function symbol stored on the node.
pub fn call_function(node: &Node, thread: &mut Thread) -> EvalResult {
    let function = node.symbol_operand()?;
    let base = push_args(node, thread)?;
    let argc = thread.stack_len() - base;
    thread.invoke(function, argc, &[])
}

fn receiver(thread: &Thread, base: usize, name: impl FnOnce() -> String) -> Result<ObjRef, Flow> {
    match thread.stack_from(base).first() {
        Some(Value::Object(r)) => Ok(*r),
        Some(Value::Nil) => Err(Exception::NilMethodInvocation(name()).into()),
        _ => Err(InternalError::CorruptValue(messages::NOT_AN_OBJECT).into()),
    }
}

fn method_name(thread: &Thread, node: &Node) -> String {
    node.symbol
        .map(|s| thread.table().name(s).to_string())
        .unwrap_or_default()
}

/// Virtual call. `args[0]` is the receiver viewed as the class declaring the
/// method; the operand is the method's index in that class's table.
pub fn call_virtual(node: &Node, thread: &mut Thread) -> EvalResult {
    let index = match node.data {
        Some(Value::Int(i)) if i >= 0 => i as u32,
        _ => return Err(InternalError::CorruptValue(messages::MISSING_OPERAND).into()),
    };
    let base = thread.stack_len();
    for arg in &node.args {
        let value = arg.eval(thread)?;
        thread.push(value);
    }
    let argc = thread.stack_len() - base;
    let r = receiver(thread, base, || method_name(thread, node))?;
    let class = thread.runtime_class(r)?;
    let entry = {
        let table = thread.table();
        let info = table
            .class(class)
            .ok_or(Flow::Internal(InternalError::CorruptValue(messages::NOT_A_CLASS)))?;
        info.dispatch(r.base, index)
    };
    let entry = entry.ok_or(Flow::Internal(InternalError::CorruptValue(messages::BAD_DISPATCH)))?;
    log::trace!("virtual call #{} on {} -> {}", index, class, entry.function);
    thread.set_stack(base, Value::Object(r.with_base(entry.this_offset)))?;
    thread.invoke(entry.function, argc, &[])
}

/// Call through an interface. `args[0]` is the receiver; `symbol` is the
/// interface and the operand the member's position in it.
pub fn call_interface(node: &Node, thread: &mut Thread) -> EvalResult {
    let iface = node.symbol_operand()?;
    let position = node.operand()? as usize;
    let base = thread.stack_len();
    for arg in &node.args {
        let value = arg.eval(thread)?;
        thread.push(value);
    }
    let argc = thread.stack_len() - base;
    let r = receiver(thread, base, || {
        let table = thread.table();
        table
            .interface(iface)
            .and_then(|i| i.methods.get(position))
            .map(|&m| table.name(m).to_string())
            .unwrap_or_default()
    })?;
    let class = thread.runtime_class(r)?;
    let entry = {
        let table = thread.table();
        table
            .implementation(class, iface)
            .and_then(|entries| entries.get(position).copied())
    };
    let Some(entry) = entry else {
        let (name, class_name) = {
            let table = thread.table();
            let name = table
                .interface(iface)
                .and_then(|i| i.methods.get(position))
                .map(|&m| table.name(m).to_string())
                .unwrap_or_default();
            (name, table.qualified_name(class))
        };
        thread.truncate(base);
        return Err(Exception::NoSuchMethod {
            name,
            class: class_name,
        }
        .into());
    };
    thread.set_stack(base, Value::Object(r.with_base(entry.this_offset)))?;
    thread.invoke(entry.function, argc, &[])
}

/// Calls the function value in `args[0]` with the remaining arguments.
pub fn apply(node: &Node, thread: &mut Thread) -> EvalResult {
    let base = thread.stack_len();
    for arg in &node.args {
        let value = arg.eval(thread)?;
        thread.push(value);
    }
    let callee = thread.remove_at(base)?;
    let argc = thread.stack_len() - base;
    thread.invoke_value(callee, argc)
}

/// Fixes the arguments in `args[1..]` of the function value in `args[0]`.
/// The node's data holds the hole mask.
pub fn partial_apply(node: &Node, thread: &mut Thread) -> EvalResult {
    let holes = node.operand()?;
    let base = thread.stack_len();
    for arg in &node.args {
        let value = arg.eval(thread)?;
        thread.push(value);
    }
    let values = thread.stack_from(base);
    let callee = values.first().copied().unwrap_or(Value::Nil);
    let bound: Box<[Value]> = values.get(1..).unwrap_or_default().into();
    let id = thread.alloc(ManagedObject::Partial {
        callee,
        bound,
        holes,
    });
    thread.truncate(base);
    Ok(Value::object(id))
}

/// Creates a closure over the lambda in `symbol`. The arguments load the
/// captured variables from the enclosing frame, in capture order.
pub fn make_closure(node: &Node, thread: &mut Thread) -> EvalResult {
    let function = node.symbol_operand()?;
    if node.args.is_empty() {
        return Ok(Value::Symbol(function));
    }
    let base = thread.stack_len();
    for arg in &node.args {
        let value = arg.eval(thread)?;
        thread.push(value);
    }
    let captured: Box<[Value]> = thread.stack_from(base).into();
    let id = thread.alloc(ManagedObject::Closure { function, captured });
    thread.truncate(base);
    Ok(Value::object(id))
}
