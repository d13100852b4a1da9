//! Object construction and pointer conversions.

use crate::errors::{Exception, InternalError, messages};
use crate::heap::ManagedObject;
use crate::node::{EvalResult, Flow, Node};
use crate::thread::Thread;
use mu_core::{SymbolId, Value};

/// Allocates an instance of the class in `symbol`. When the node data holds
/// a constructor symbol, it is called with the new object and the
/// arguments; the node yields the object either way.
pub fn new_instance(node: &Node, thread: &mut Thread) -> EvalResult {
    let class = node.symbol_operand()?;
    let object = instantiate(thread, class)?;
    let Some(Value::Symbol(constructor)) = node.data else {
        return Ok(object);
    };
    let base = thread.stack_len();
    thread.push(object);
    for arg in &node.args {
        let value = arg.eval(thread)?;
        thread.push(value);
    }
    let argc = thread.stack_len() - base;
    thread.invoke(constructor, argc, &[])?;
    Ok(object)
}

/// A fresh instance with every slot at its template value.
pub fn instantiate(thread: &mut Thread, class: SymbolId) -> EvalResult {
    let (slots, pointers) = {
        let table = thread.table();
        let Some(info) = table.class(class) else {
            return Err(InternalError::CorruptValue(messages::NOT_A_CLASS).into());
        };
        let Some(layout) = info.layout() else {
            return Err(InternalError::ClassNotFrozen(table.qualified_name(class)).into());
        };
        (
            layout.template.clone().into_boxed_slice(),
            layout.pointer_slots.clone(),
        )
    };
    let id = thread.alloc(ManagedObject::Instance {
        class,
        slots,
        pointers,
    });
    Ok(Value::object(id))
}

/// Moves the view of `args[0]` to the ancestor sub-object at the operand's
/// slot offset. Nil passes through.
pub fn upcast(node: &Node, thread: &mut Thread) -> EvalResult {
    let offset = node.operand()?;
    match node.eval_arg(0, thread)? {
        Value::Object(r) => Ok(Value::Object(r.with_base(r.base + offset))),
        Value::Nil => Ok(Value::Nil),
        _ => Err(InternalError::CorruptValue(messages::NOT_AN_OBJECT).into()),
    }
}

/// Views `args[0]` as the class in `symbol`, checked against the runtime
/// class of the instance. Nil passes through.
pub fn dynamic_cast(node: &Node, thread: &mut Thread) -> EvalResult {
    let target = node.symbol_operand()?;
    let r = match node.eval_arg(0, thread)? {
        Value::Object(r) => r,
        Value::Nil => return Ok(Value::Nil),
        _ => return Err(InternalError::CorruptValue(messages::NOT_AN_OBJECT).into()),
    };
    let runtime = thread.runtime_class(r)?;
    let table = thread.table();
    match table.dynamic_cast(runtime, target) {
        Some(offset) => Ok(Value::Object(r.with_base(offset))),
        None => Err(Exception::BadDynamicCast {
            from: table.qualified_name(runtime),
            to: table.qualified_name(target),
        }
        .into()),
    }
}

/// A new string object holding the node's text.
pub fn string_literal(node: &Node, thread: &mut Thread) -> EvalResult {
    let text = node
        .text
        .clone()
        .ok_or(Flow::Internal(InternalError::CorruptValue(messages::MISSING_CONSTANT)))?;
    Ok(Value::object(thread.alloc(ManagedObject::Str(text))))
}

/// Builds a list from the arguments, first argument at the head.
pub fn list_constructor(node: &Node, thread: &mut Thread) -> EvalResult {
    let base = thread.stack_len();
    for arg in &node.args {
        let value = arg.eval(thread)?;
        thread.push(value);
    }
    let elements: Vec<Value> = thread.stack_from(base).to_vec();
    let mut list = Value::Nil;
    for value in elements.into_iter().rev() {
        list = Value::object(thread.alloc(ManagedObject::ListNode { value, next: list }));
    }
    thread.truncate(base);
    Ok(list)
}
