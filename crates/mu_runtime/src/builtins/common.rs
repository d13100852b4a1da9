use crate::errors::{InternalError, messages};
use crate::heap::ManagedObject;
use crate::node::Flow;
use crate::thread::Thread;
use mu_core::Value;

pub(super) fn corrupt(message: &'static str) -> Flow {
    Flow::Internal(InternalError::CorruptValue(message))
}

pub(super) fn arg(args: &[Value], index: usize) -> Result<Value, Flow> {
    args.get(index)
        .copied()
        .ok_or(corrupt(messages::MISSING_ARGUMENT))
}

pub(super) fn int_arg(args: &[Value], index: usize) -> Result<i32, Flow> {
    arg(args, index)?
        .as_int()
        .ok_or(corrupt(messages::NOT_AN_INT))
}

pub(super) fn bool_arg(args: &[Value], index: usize) -> Result<bool, Flow> {
    arg(args, index)?
        .as_bool()
        .ok_or(corrupt(messages::NOT_A_BOOL))
}

/// Identity for objects, bitwise equality otherwise.
pub(super) fn values_equal(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => x.id == y.id,
        _ => a == b,
    }
}

/// Text `print` writes for a value.
pub(super) fn display(thread: &Thread, value: Value) -> Result<String, Flow> {
    Ok(match value {
        Value::Void => String::new(),
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Byte(b) => b.to_string(),
        Value::Char(c) => c.to_string(),
        Value::Short(i) => i.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Vec2(v) => lanes(&v),
        Value::Vec3(v) => lanes(&v),
        Value::Vec4(v) => lanes(&v),
        Value::Symbol(s) => format!("<function {}>", thread.table().qualified_name(s)),
        Value::Ref(_) => "<reference>".to_string(),
        Value::Object(r) => {
            let object = thread.memory().heap.get(r.id).cloned();
            match object {
                Some(ManagedObject::Str(s)) => s.to_string(),
                Some(ManagedObject::ListNode { .. }) => {
                    let mut parts = Vec::new();
                    let mut cur = value;
                    while let Some((head, next)) = thread.list_cell(cur)? {
                        parts.push(display(thread, head)?);
                        cur = next;
                    }
                    format!("[{}]", parts.join(", "))
                }
                Some(ManagedObject::Instance { class, .. }) => {
                    format!("<{}>", thread.table().qualified_name(class))
                }
                Some(ManagedObject::Closure { function, .. }) => {
                    format!("<closure {}>", thread.table().qualified_name(function))
                }
                Some(ManagedObject::Partial { callee, .. }) => {
                    format!("<partial {}>", display(thread, callee)?)
                }
                None => return Err(corrupt(messages::DANGLING_OBJECT)),
            }
        }
    })
}

fn lanes(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("({})", parts.join(", "))
}
