//! Persistent lists and strings.

use super::BuiltinProvider;
use super::common::{arg, int_arg};
use crate::errors::Exception;
use crate::heap::ManagedObject;
use crate::node::{EvalResult, Flow};
use crate::registration::FunctionDecl;
use crate::thread::Thread;
use mu_core::Value;

fn cons(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let value = arg(args, 0)?;
    let next = arg(args, 1)?;
    // Checks that the tail is a list.
    thread.list_cell(next)?;
    Ok(Value::object(thread.alloc(ManagedObject::ListNode { value, next })))
}

fn cell(thread: &Thread, list: Value) -> Result<(Value, Value), Flow> {
    thread
        .list_cell(list)?
        .ok_or(Exception::NilReference.into())
}

fn head(thread: &mut Thread, args: &[Value]) -> EvalResult {
    Ok(cell(thread, arg(args, 0)?)?.0)
}

fn tail(thread: &mut Thread, args: &[Value]) -> EvalResult {
    Ok(cell(thread, arg(args, 0)?)?.1)
}

fn length(thread: &Thread, list: Value) -> Result<usize, Flow> {
    let mut n = 0;
    let mut cur = list;
    while let Some((_, next)) = thread.list_cell(cur)? {
        n += 1;
        cur = next;
    }
    Ok(n)
}

fn size(thread: &mut Thread, args: &[Value]) -> EvalResult {
    Ok(Value::Int(length(thread, arg(args, 0)?)? as i32))
}

fn is_empty(_: &mut Thread, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(arg(args, 0)?.is_nil()))
}

fn element(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let index = int_arg(args, 1)?;
    let out_of_range = || Flow::from(Exception::OutOfRange(index as i64));
    let mut remaining = usize::try_from(index).map_err(|_| out_of_range())?;
    let mut cur = arg(args, 0)?;
    while let Some((value, next)) = thread.list_cell(cur)? {
        if remaining == 0 {
            return Ok(value);
        }
        remaining -= 1;
        cur = next;
    }
    Err(out_of_range())
}

/// Pushes each element in order; the caller truncates the stack.
fn push_elements(thread: &mut Thread, list: Value) -> Result<(), Flow> {
    let mut cur = list;
    while let Some((value, next)) = thread.list_cell(cur)? {
        thread.push(value);
        cur = next;
    }
    Ok(())
}

fn build(thread: &mut Thread, base: usize, end: Value) -> Value {
    let elements: Vec<Value> = thread.stack_from(base).to_vec();
    let mut list = end;
    for value in elements.into_iter().rev() {
        list = Value::object(thread.alloc(ManagedObject::ListNode { value, next: list }));
    }
    list
}

fn reverse(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let mut reversed = Value::Nil;
    let mut cur = arg(args, 0)?;
    while let Some((value, next)) = thread.list_cell(cur)? {
        reversed = Value::object(thread.alloc(ManagedObject::ListNode {
            value,
            next: reversed,
        }));
        cur = next;
    }
    Ok(reversed)
}

/// Copies the first list in front of the second, which is shared.
fn append(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let second = arg(args, 1)?;
    thread.list_cell(second)?;
    let base = thread.stack_len();
    let pushed = push_elements(thread, arg(args, 0)?);
    let list = pushed.map(|()| build(thread, base, second));
    thread.truncate(base);
    list
}

pub(super) struct Lists;

impl BuiltinProvider for Lists {
    fn functions(&self) -> Vec<FunctionDecl> {
        vec![
            FunctionDecl::native("cons", cons, "['a]", &["'a", "['a]"]),
            FunctionDecl::native("head", head, "'a", &["['a]"]),
            FunctionDecl::native("tail", tail, "['a]", &["['a]"]),
            FunctionDecl::native("size", size, "int", &["['a]"]),
            FunctionDecl::native("is_empty", is_empty, "bool", &["['a]"]),
            FunctionDecl::native("[]", element, "'a", &["['a]", "int"]),
            FunctionDecl::native("reverse", reverse, "['a]", &["['a]"]),
            FunctionDecl::native("+", append, "['a]", &["['a]", "['a]"]),
        ]
    }
}

fn concat(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let a = thread.string(arg(args, 0)?)?;
    let b = thread.string(arg(args, 1)?)?;
    let mut text = String::with_capacity(a.len() + b.len());
    text.push_str(&a);
    text.push_str(&b);
    Ok(thread.alloc_string(&text))
}

fn string_size(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let s = thread.string(arg(args, 0)?)?;
    Ok(Value::Int(s.chars().count() as i32))
}

fn string_char(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let s = thread.string(arg(args, 0)?)?;
    let index = int_arg(args, 1)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| s.chars().nth(i))
        .map(Value::Char)
        .ok_or(Exception::OutOfRange(index as i64).into())
}

fn string_equal(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let (a, b) = (arg(args, 0)?, arg(args, 1)?);
    if a.is_nil() || b.is_nil() {
        return Ok(Value::Bool(a.is_nil() && b.is_nil()));
    }
    Ok(Value::Bool(thread.string(a)? == thread.string(b)?))
}

fn string_not_equal(thread: &mut Thread, args: &[Value]) -> EvalResult {
    let equal = string_equal(thread, args)?;
    Ok(Value::Bool(equal == Value::Bool(false)))
}

pub(super) struct Strings;

impl BuiltinProvider for Strings {
    fn functions(&self) -> Vec<FunctionDecl> {
        let pair = ["string", "string"];
        vec![
            FunctionDecl::native("+", concat, "string", &pair),
            FunctionDecl::native("size", string_size, "int", &["string"]),
            FunctionDecl::native("[]", string_char, "char", &["string", "int"]),
            FunctionDecl::native("==", string_equal, "bool", &pair),
            FunctionDecl::native("!=", string_not_equal, "bool", &pair),
        ]
    }
}
