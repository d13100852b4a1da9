//! Blocks, branches, loops and exceptions.
//!
//! Non-local exits travel as `Flow` values. Every construct that stops a
//! flow (loops for `Break`/`Continue`, `try` for `Throw`) first truncates the
//! value stack to its height at entry.

use crate::errors::{Exception, InternalError, messages};
use crate::heap::ManagedObject;
use crate::node::{EvalResult, Flow, Node};
use crate::thread::Thread;
use mu_core::{Location, Value};

/// Evaluates the arguments in order and yields the last value.
pub fn block(node: &Node, thread: &mut Thread) -> EvalResult {
    thread.safe_point();
    let mut last = Value::Void;
    for arg in &node.args {
        last = arg.eval(thread)?;
    }
    Ok(last)
}

/// A block owning a frame of locals. `args[0]` is a constant holding the
/// frame size; the remaining arguments are the statements.
pub fn fixed_frame_block(node: &Node, thread: &mut Thread) -> EvalResult {
    let size = match node.arg(0)?.data {
        Some(Value::Int(n)) if n >= 0 => n as usize,
        _ => return Err(InternalError::CorruptValue(messages::FRAME_SIZE).into()),
    };
    let saved = thread.open_frame(size);
    thread.safe_point();
    let mut result = Ok(Value::Void);
    for arg in &node.args[1..] {
        result = arg.eval(thread);
        if result.is_err() {
            break;
        }
    }
    thread.close_frame(saved);
    result
}

fn condition(node: &Node, index: usize, thread: &mut Thread) -> Result<bool, Flow> {
    node.eval_arg(index, thread)?
        .as_bool()
        .ok_or(Flow::Internal(InternalError::CorruptValue(messages::NOT_A_BOOL)))
}

/// `args[0] ? args[1] : args[2]`. Without an else branch the node yields
/// void when the condition fails.
pub fn if_else(node: &Node, thread: &mut Thread) -> EvalResult {
    if condition(node, 0, thread)? {
        node.eval_arg(1, thread)
    } else if node.args.len() > 2 {
        node.eval_arg(2, thread)
    } else {
        Ok(Value::Void)
    }
}

/// Runs one loop body. `Ok(false)` means the loop was broken.
fn loop_body(body: &Node, thread: &mut Thread, height: usize) -> Result<bool, Flow> {
    match body.eval(thread) {
        Ok(_) => Ok(true),
        Err(Flow::Continue) => {
            thread.truncate(height);
            Ok(true)
        }
        Err(Flow::Break) => {
            thread.truncate(height);
            Ok(false)
        }
        Err(other) => Err(other),
    }
}

pub fn while_loop(node: &Node, thread: &mut Thread) -> EvalResult {
    let height = thread.stack_len();
    let body = node.arg(1)?;
    loop {
        thread.safe_point();
        if !condition(node, 0, thread)? || !loop_body(body, thread, height)? {
            break;
        }
    }
    Ok(Value::Void)
}

/// Iterates the list in `args[0]`, storing each element in the frame slot
/// given by the operand before running `args[1]`.
pub fn for_each_list(node: &Node, thread: &mut Thread) -> EvalResult {
    let slot = node.operand()?;
    let list = node.eval_arg(0, thread)?;
    let body = node.arg(1)?;
    // The remaining list lives on the stack so the collector sees it.
    thread.push(list);
    let cursor = Location::Stack((thread.stack_len() - 1) as u32);
    let height = thread.stack_len();
    loop {
        thread.safe_point();
        let current = thread.load(cursor)?;
        let Some((value, next)) = thread.list_cell(current)? else {
            break;
        };
        thread.store(cursor, next)?;
        thread.set_local(slot, value)?;
        if !loop_body(body, thread, height)? {
            break;
        }
    }
    thread.truncate(height - 1);
    Ok(Value::Void)
}

pub fn break_loop(_node: &Node, _thread: &mut Thread) -> EvalResult {
    Err(Flow::Break)
}

pub fn continue_loop(_node: &Node, _thread: &mut Thread) -> EvalResult {
    Err(Flow::Continue)
}

pub fn return_void(_node: &Node, _thread: &mut Thread) -> EvalResult {
    Err(Flow::Return(Value::Void))
}

/// Raises the value of `args[0]` as a user exception.
pub fn throw(node: &Node, thread: &mut Thread) -> EvalResult {
    let value = node.eval_arg(0, thread)?;
    log::trace!("thread {} throws {}", thread.id(), value);
    Err(Exception::User(value).into())
}

/// How a `try` handler selects the exceptions it catches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatchMode {
    All,
    /// Binds the exception message (or a thrown string) to a string
    /// variable.
    Message,
    /// Catches user exceptions whose value is of the handler variable's
    /// type.
    Typed,
}

impl CatchMode {
    pub fn encode(self) -> i32 {
        match self {
            CatchMode::All => 0,
            CatchMode::Message => 1,
            CatchMode::Typed => 2,
        }
    }

    fn decode(value: Option<Value>) -> Option<Self> {
        match value {
            Some(Value::Int(0)) => Some(CatchMode::All),
            Some(Value::Int(1)) => Some(CatchMode::Message),
            Some(Value::Int(2)) => Some(CatchMode::Typed),
            _ => None,
        }
    }
}

fn catches(thread: &mut Thread, handler: &Node, exception: &Exception) -> Result<Option<Value>, Flow> {
    let mode = CatchMode::decode(handler.data)
        .ok_or(Flow::Internal(InternalError::CorruptValue(messages::MISSING_OPERAND)))?;
    match mode {
        CatchMode::All => Ok(Some(Value::Void)),
        CatchMode::Message => match exception {
            Exception::User(v @ Value::Object(r)) => {
                let is_string = matches!(thread.memory().heap.get(r.id), Some(ManagedObject::Str(_)));
                if is_string {
                    Ok(Some(*v))
                } else {
                    Ok(Some(thread.alloc_string(&exception.to_string())))
                }
            }
            other => Ok(Some(thread.alloc_string(&other.to_string()))),
        },
        CatchMode::Typed => {
            let Exception::User(value) = exception else {
                return Ok(None);
            };
            let Some(ty) = handler.symbol else {
                return Ok(None);
            };
            let table = thread.table();
            if !table.rep(ty).accepts(value) {
                return Ok(None);
            }
            let Value::Object(r) = *value else {
                return Ok(Some(*value));
            };
            let class = match thread.memory().heap.get(r.id) {
                Some(ManagedObject::Instance { class, .. }) => Some(*class),
                _ => None,
            };
            Ok(match (class, table.class(ty)) {
                (Some(c), Some(_)) => table
                    .dynamic_cast(c, ty)
                    .map(|offset| Value::Object(r.with_base(offset))),
                (None, None) => Some(*value),
                _ => None,
            })
        }
    }
}

/// Evaluates `args[0]`; a thrown exception the handler `args[1]` accepts is
/// stored in the handler's variable slot (if any) and the handler runs.
/// Internal errors and other flows pass through.
pub fn try_catch(node: &Node, thread: &mut Thread) -> EvalResult {
    let height = thread.stack_len();
    match node.eval_arg(0, thread) {
        Err(Flow::Throw(exception)) => {
            thread.truncate(height);
            let handler = node.arg(1)?;
            let Some(caught) = catches(thread, handler, &exception)? else {
                return Err(Flow::Throw(exception));
            };
            log::trace!("thread {} caught {}", thread.id(), exception);
            if let Some(Value::Int(slot @ 0..)) = handler.args.first().and_then(|a| a.data) {
                thread.set_local(slot as u32, caught)?;
            }
            handler.eval_arg(1, thread)
        }
        other => other,
    }
}

/// Handler wrapper produced for `try`: `args[0]` is a constant holding the
/// variable slot (or `-1`), `args[1]` the handler body. The catch mode and
/// type are stored on the node itself.
pub fn handler(node: &Node, thread: &mut Thread) -> EvalResult {
    node.eval_arg(1, thread)
}

/// Short-circuit `&&`; installed as the call node's own function.
pub fn logical_and(node: &Node, thread: &mut Thread) -> EvalResult {
    Ok(Value::Bool(condition(node, 0, thread)? && condition(node, 1, thread)?))
}

/// Short-circuit `||`.
pub fn logical_or(node: &Node, thread: &mut Thread) -> EvalResult {
    Ok(Value::Bool(condition(node, 0, thread)? || condition(node, 1, thread)?))
}
