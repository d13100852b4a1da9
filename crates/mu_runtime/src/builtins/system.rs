use super::BuiltinProvider;
use super::common::{arg, display, values_equal};
use crate::node::EvalResult;
use crate::registration::FunctionDecl;
use crate::thread::Thread;
use mu_core::Value;

fn print(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let mut text = display(thread, arg(args, 0)?)?;
    text.push('\n');
    thread.output(&text);
    Ok(Value::Void)
}

fn equal(_: &mut Thread, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(values_equal(arg(args, 0)?, arg(args, 1)?)))
}

fn not_equal(_: &mut Thread, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(!values_equal(arg(args, 0)?, arg(args, 1)?)))
}

/// Collects garbage now; yields the number of objects freed, or -1 when
/// another runtime thread on this native thread prevents it.
fn gc(thread: &mut Thread, _: &[Value]) -> EvalResult {
    let freed = thread.collect_garbage();
    Ok(Value::Int(freed.map_or(-1, |n| n as i32)))
}

pub(super) struct System;

impl BuiltinProvider for System {
    fn functions(&self) -> Vec<FunctionDecl> {
        vec![
            FunctionDecl::native("print", print, "void", &["'a"]),
            FunctionDecl::native("==", equal, "bool", &["'a", "'a"]),
            FunctionDecl::native("!=", not_equal, "bool", &["'a", "'a"]),
            FunctionDecl::native("gc", gc, "int", &[]),
        ]
    }
}
