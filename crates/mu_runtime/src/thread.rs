//! Threads: one logical call stack each, bound to a native thread.
//!
//! A thread is `Running` only while it evaluates. Suspension is cooperative:
//! a suspend request is honoured at the next safe point (function entry,
//! loop iteration, block entry), where the thread publishes its stack roots
//! and blocks until every request is released.

use crate::context::Context;
use crate::errors::{Exception, InternalError, RunError, messages};
use crate::heap::{ManagedObject, Memory};
use crate::node::{EvalResult, Flow, Node};
use crate::process::ProcessShared;
use crate::symbols::{FunctionAttrs, FunctionBody, FunctionCode, SymbolTable};
use mu_core::{Location, ObjRef, ObjectId, SymbolId, Value};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLockReadGuard};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Remaining native stack below which a call body moves to a new segment.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// What a function object calls, copied out of the heap.
enum Callee {
    Closure(SymbolId, SmallVec<[Value; 8]>),
    Partial(Value, SmallVec<[Value; 8]>, u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Idle,
    Running,
    Suspended,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadKind {
    /// Pooled worker owned by the process.
    Process,
    /// Created for one external call on the caller's native thread.
    Application,
}

/// The part of a thread other threads may observe and signal.
pub struct ThreadControl {
    id: u32,
    kind: ThreadKind,
    state: Mutex<ThreadState>,
    cond: Condvar,
    suspend_requests: AtomicU32,
    roots: Mutex<Vec<ObjectId>>,
    native: Mutex<Option<std::thread::ThreadId>>,
}

impl ThreadControl {
    pub(crate) fn new(id: u32, kind: ThreadKind) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            state: Mutex::new(ThreadState::Idle),
            cond: Condvar::new(),
            suspend_requests: AtomicU32::new(0),
            roots: Mutex::new(Vec::new()),
            native: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> ThreadKind {
        self.kind
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
        self.cond.notify_all();
    }

    pub(crate) fn bind_native(&self) {
        *self.native.lock() = Some(std::thread::current().id());
    }

    pub(crate) fn is_bound_to(&self, native: std::thread::ThreadId) -> bool {
        *self.native.lock() == Some(native)
    }

    pub(crate) fn request_suspend(&self) {
        let _state = self.state.lock();
        self.suspend_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn release_suspend(&self) {
        let mut state = self.state.lock();
        let previous = self
            .suspend_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous == 1 && *state == ThreadState::Suspended {
            *state = ThreadState::Running;
        }
        self.cond.notify_all();
    }

    /// Blocks until the thread is no longer running.
    pub(crate) fn wait_until_stopped(&self) {
        let mut state = self.state.lock();
        while *state == ThreadState::Running {
            self.cond.wait(&mut state);
        }
    }

    pub(crate) fn published_roots(&self) -> Vec<ObjectId> {
        self.roots.lock().clone()
    }

    fn has_requests(&self) -> bool {
        self.suspend_requests.load(Ordering::SeqCst) > 0
    }
}

pub struct Thread {
    shared: Arc<ProcessShared>,
    control: Arc<ThreadControl>,
    stack: Vec<Value>,
    frame_base: usize,
    depth: u32,
    coordination_depth: u32,
    suspended: Vec<Vec<Arc<ThreadControl>>>,
}

impl Thread {
    pub(crate) fn new(shared: Arc<ProcessShared>, control: Arc<ThreadControl>) -> Self {
        let stack = Vec::with_capacity(shared.config.stack_capacity);
        Self {
            shared,
            control,
            stack,
            frame_base: 0,
            depth: 0,
            coordination_depth: 0,
            suspended: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.control.id
    }

    pub fn kind(&self) -> ThreadKind {
        self.control.kind
    }

    pub fn state(&self) -> ThreadState {
        self.control.state()
    }

    pub fn control(&self) -> &Arc<ThreadControl> {
        &self.control
    }

    pub fn context(&self) -> &Context {
        &self.shared.context
    }

    pub fn table(&self) -> RwLockReadGuard<'_, SymbolTable> {
        self.shared.context.read()
    }

    pub fn memory(&self) -> MutexGuard<'_, Memory> {
        self.shared.memory.lock()
    }

    /// States of every registered thread of the process, by id.
    pub fn thread_states(&self) -> Vec<(u32, ThreadState)> {
        self.shared.thread_states()
    }

    /// Appends text to the process output buffer.
    pub fn output(&self, text: &str) {
        self.shared.output.lock().push_str(text);
    }

    // --- value stack -----------------------------------------------------

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Value, Flow> {
        self.stack
            .pop()
            .ok_or(Flow::Internal(InternalError::StackUnderflow))
    }

    #[inline]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.stack.truncate(len);
    }

    pub(crate) fn stack_from(&self, start: usize) -> &[Value] {
        self.stack.get(start..).unwrap_or(&[])
    }

    pub(crate) fn swap_top(&mut self) {
        let n = self.stack.len();
        if n >= 2 {
            self.stack.swap(n - 1, n - 2);
        }
    }

    #[inline]
    pub fn frame_base(&self) -> usize {
        self.frame_base
    }

    #[inline]
    pub fn local(&self, slot: u32) -> EvalResult {
        self.stack
            .get(self.frame_base + slot as usize)
            .copied()
            .ok_or(Flow::Internal(InternalError::StackUnderflow))
    }

    #[inline]
    pub fn set_local(&mut self, slot: u32, value: Value) -> Result<(), Flow> {
        let index = self.frame_base + slot as usize;
        let cell = self
            .stack
            .get_mut(index)
            .ok_or(Flow::Internal(InternalError::StackUnderflow))?;
        *cell = value;
        Ok(())
    }

    /// Starts a frame of `size` slots at the top of the stack and returns the
    /// previous frame base for `close_frame`.
    pub(crate) fn open_frame(&mut self, size: usize) -> usize {
        let saved = self.frame_base;
        self.frame_base = self.stack.len();
        self.stack.resize(self.frame_base + size, Value::Void);
        saved
    }

    pub(crate) fn close_frame(&mut self, saved: usize) {
        self.stack.truncate(self.frame_base);
        self.frame_base = saved;
    }

    pub(crate) fn set_stack(&mut self, index: usize, value: Value) -> Result<(), Flow> {
        let cell = self
            .stack
            .get_mut(index)
            .ok_or(Flow::Internal(InternalError::StackUnderflow))?;
        *cell = value;
        Ok(())
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Result<Value, Flow> {
        if index < self.stack.len() {
            Ok(self.stack.remove(index))
        } else {
            Err(InternalError::StackUnderflow.into())
        }
    }

    /// Absolute stack location of a frame slot.
    pub fn local_location(&self, slot: u32) -> Location {
        Location::Stack((self.frame_base + slot as usize) as u32)
    }

    fn stack_roots(&self) -> Vec<ObjectId> {
        self.stack.iter().filter_map(Value::referent).collect()
    }

    // --- memory ----------------------------------------------------------

    pub fn alloc(&mut self, obj: ManagedObject) -> ObjectId {
        let mut memory = self.memory();
        let id = memory.alloc(obj);
        if memory.heap.should_collect() {
            self.shared.gc_requested.store(true, Ordering::Release);
        }
        id
    }

    pub fn alloc_string(&mut self, text: &str) -> Value {
        Value::object(self.alloc(ManagedObject::Str(Arc::from(text))))
    }

    pub fn string(&self, value: Value) -> Result<Arc<str>, Flow> {
        let r = self.object_ref(value)?;
        match self.memory().heap.get(r.id) {
            Some(ManagedObject::Str(s)) => Ok(s.clone()),
            Some(_) => Err(InternalError::CorruptValue(messages::NOT_A_STRING).into()),
            None => Err(InternalError::CorruptValue(messages::DANGLING_OBJECT).into()),
        }
    }

    /// `(value, next)` of a list cell, `None` for the empty list.
    pub fn list_cell(&self, list: Value) -> Result<Option<(Value, Value)>, Flow> {
        match list {
            Value::Nil => Ok(None),
            Value::Object(r) => match self.memory().heap.get(r.id) {
                Some(ManagedObject::ListNode { value, next }) => Ok(Some((*value, *next))),
                Some(_) => Err(InternalError::CorruptValue(messages::NOT_A_LIST).into()),
                None => Err(InternalError::CorruptValue(messages::DANGLING_OBJECT).into()),
            },
            _ => Err(InternalError::CorruptValue(messages::NOT_A_LIST).into()),
        }
    }

    pub fn object_ref(&self, value: Value) -> Result<ObjRef, Flow> {
        match value {
            Value::Object(r) => Ok(r),
            Value::Nil => Err(Exception::NilReference.into()),
            _ => Err(InternalError::CorruptValue(messages::NOT_AN_OBJECT).into()),
        }
    }

    /// Class of the instance an object reference points into.
    pub fn runtime_class(&self, r: ObjRef) -> Result<SymbolId, Flow> {
        match self.memory().heap.get(r.id) {
            Some(ManagedObject::Instance { class, .. }) => Ok(*class),
            Some(_) => Err(InternalError::CorruptValue(messages::NOT_AN_OBJECT).into()),
            None => Err(InternalError::CorruptValue(messages::DANGLING_OBJECT).into()),
        }
    }

    fn global_index_checked(&self, index: u32) {
        if self.memory().heap.global(index).is_none() {
            let zeros = self.table().global_zeros().to_vec();
            self.memory().heap.sync_globals(&zeros);
        }
    }

    pub fn load(&mut self, location: Location) -> EvalResult {
        match location {
            Location::Stack(i) => self
                .stack
                .get(i as usize)
                .copied()
                .ok_or(Flow::Internal(InternalError::StackUnderflow)),
            Location::Global(i) => {
                self.global_index_checked(i);
                self.memory()
                    .heap
                    .global(i)
                    .ok_or(Flow::Internal(InternalError::CorruptValue(messages::BAD_SLOT)))
            }
            Location::Field { obj, slot } => self
                .memory()
                .load_slot(obj, slot)
                .ok_or(Flow::Internal(InternalError::CorruptValue(messages::BAD_SLOT))),
        }
    }

    pub fn store(&mut self, location: Location, value: Value) -> Result<(), Flow> {
        let stored = match location {
            Location::Stack(i) => self.stack.get_mut(i as usize).map(|cell| *cell = value),
            Location::Global(i) => {
                self.global_index_checked(i);
                self.memory().store_global(i, value)
            }
            Location::Field { obj, slot } => self.memory().store_slot(obj, slot, value),
        };
        stored.ok_or(Flow::Internal(InternalError::CorruptValue(messages::BAD_SLOT)))
    }

    pub fn pin(&self, value: Value) {
        if let Some(id) = value.referent() {
            self.memory().heap.pin(id);
        }
    }

    pub fn unpin(&self, value: Value) {
        if let Some(id) = value.referent() {
            self.memory().heap.unpin(id);
        }
    }

    // --- calls -----------------------------------------------------------

    /// Calls `function` with the `argc` values on top of the stack, which
    /// the call consumes.
    pub(crate) fn invoke(&mut self, function: SymbolId, argc: usize, captured: &[Value]) -> EvalResult {
        let body = {
            let table = self.table();
            match table.function(function) {
                Some(f) => Ok(f.body.clone()),
                None => Err(table.qualified_name(function)),
            }
        };
        let base = self
            .stack
            .len()
            .checked_sub(argc)
            .ok_or(Flow::Internal(InternalError::StackUnderflow))?;
        let body = match body {
            Ok(body) => body,
            Err(name) => {
                self.stack.truncate(base);
                return Err(InternalError::MissingBody(name).into());
            }
        };
        match body {
            FunctionBody::Native(native) => {
                let args: SmallVec<[Value; 8]> = SmallVec::from_slice(&self.stack[base..]);
                let result = native(self, &args);
                self.stack.truncate(base);
                result
            }
            FunctionBody::Code(code) => self.enter(&code, base, captured),
            FunctionBody::Inline(_) | FunctionBody::Pending | FunctionBody::Abstract => {
                self.stack.truncate(base);
                let name = self.table().qualified_name(function);
                Err(InternalError::MissingBody(name).into())
            }
        }
    }

    fn enter(&mut self, code: &FunctionCode, base: usize, captured: &[Value]) -> EvalResult {
        if self.depth >= self.shared.config.max_call_depth {
            self.stack.truncate(base);
            return Err(Exception::StackOverflow.into());
        }
        let saved = self.frame_base;
        self.frame_base = base;
        self.stack.resize(base + code.frame_size as usize, Value::Void);
        for (&slot, &value) in code.capture_slots.iter().zip(captured) {
            self.stack[base + slot as usize] = value;
        }
        self.depth += 1;
        self.safe_point();
        // Grows the native stack on demand; only `max_call_depth` bounds recursion.
        let result =
            stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || code.root.eval(self));
        self.depth -= 1;
        self.stack.truncate(base);
        self.frame_base = saved;
        match result {
            Ok(v) | Err(Flow::Return(v)) => Ok(if code.result_rep.accepts(&v) {
                v
            } else {
                code.result_rep.zero()
            }),
            Err(Flow::Break) => Err(InternalError::MisplacedControlFlow("break").into()),
            Err(Flow::Continue) => Err(InternalError::MisplacedControlFlow("continue").into()),
            Err(other) => Err(other),
        }
    }

    pub fn call_function(&mut self, function: SymbolId, args: &[Value]) -> EvalResult {
        self.stack.extend_from_slice(args);
        self.invoke(function, args.len(), &[])
    }

    /// Calls a function value: a function symbol or a closure object.
    pub fn call_value(&mut self, callee: Value, args: &[Value]) -> EvalResult {
        self.stack.extend_from_slice(args);
        self.invoke_value(callee, args.len())
    }

    pub(crate) fn invoke_value(&mut self, callee: Value, argc: usize) -> EvalResult {
        match callee {
            Value::Symbol(f) => self.invoke(f, argc, &[]),
            Value::Object(r) => {
                let target = match self.memory().heap.get(r.id) {
                    Some(ManagedObject::Closure { function, captured }) => Some(Callee::Closure(
                        *function,
                        SmallVec::from_slice(captured),
                    )),
                    Some(ManagedObject::Partial {
                        callee,
                        bound,
                        holes,
                    }) => Some(Callee::Partial(*callee, SmallVec::from_slice(bound), *holes)),
                    _ => None,
                };
                match target {
                    Some(Callee::Closure(function, captured)) => {
                        self.invoke(function, argc, &captured)
                    }
                    Some(Callee::Partial(inner, bound, holes)) => {
                        let base = self.stack.len().saturating_sub(argc);
                        let supplied: SmallVec<[Value; 8]> = self.stack.drain(base..).collect();
                        let total = supplied.len() + bound.len();
                        let mut supplied = supplied.into_iter();
                        let mut bound = bound.into_iter();
                        for i in 0..total {
                            let value = if holes & (1 << i) != 0 {
                                supplied.next()
                            } else {
                                bound.next()
                            };
                            self.stack.push(value.unwrap_or(Value::Nil));
                        }
                        self.invoke_value(inner, total)
                    }
                    None => {
                        let len = self.stack.len().saturating_sub(argc);
                        self.stack.truncate(len);
                        Err(InternalError::CorruptValue(messages::NOT_A_FUNCTION).into())
                    }
                }
            }
            Value::Nil => {
                let len = self.stack.len().saturating_sub(argc);
                self.stack.truncate(len);
                Err(Exception::NilReference.into())
            }
            _ => {
                let len = self.stack.len().saturating_sub(argc);
                self.stack.truncate(len);
                Err(InternalError::CorruptValue(messages::NOT_A_FUNCTION).into())
            }
        }
    }

    // --- running ---------------------------------------------------------

    fn begin_run(&mut self) {
        self.control.set_state(ThreadState::Running);
        if self.control.has_requests() {
            self.park();
        }
    }

    fn end_run(&mut self) {
        self.stack.clear();
        self.frame_base = 0;
        self.depth = 0;
        while !self.suspended.is_empty() {
            log::warn!("thread {} finished without resuming suspended threads", self.id());
            self.resume_all();
        }
        self.control.set_state(ThreadState::Idle);
    }

    fn finish(result: EvalResult) -> Result<Value, RunError> {
        match result {
            Ok(v) | Err(Flow::Return(v)) => Ok(v),
            Err(Flow::Throw(e)) => Err(RunError::Exception(e)),
            Err(Flow::Internal(e)) => {
                log::error!("internal error: {e}");
                Err(RunError::Internal(e))
            }
            Err(Flow::Break) => Err(InternalError::MisplacedControlFlow("break").into()),
            Err(Flow::Continue) => Err(InternalError::MisplacedControlFlow("continue").into()),
        }
    }

    /// Evaluates a resolved tree on this thread.
    pub fn run(&mut self, node: &Node) -> Result<Value, RunError> {
        self.begin_run();
        let result = node.eval(self);
        self.end_run();
        Self::finish(result)
    }

    /// Calls `function` with `args` on this thread.
    pub fn run_function(&mut self, function: SymbolId, args: &[Value]) -> Result<Value, RunError> {
        self.begin_run();
        let result = self.call_function(function, args);
        self.end_run();
        Self::finish(result)
    }

    /// Calls a function value with `args` on this thread.
    pub fn run_value(&mut self, callee: Value, args: &[Value]) -> Result<Value, RunError> {
        self.begin_run();
        let result = self.call_value(callee, args);
        self.end_run();
        Self::finish(result)
    }

    /// Calls the method `name` on `receiver`, looked up from the receiver's
    /// runtime class.
    pub fn run_method(&mut self, receiver: Value, name: &str, args: &[Value]) -> Result<Value, RunError> {
        self.begin_run();
        let result = self.call_method(receiver, name, args);
        self.end_run();
        Self::finish(result)
    }

    fn call_method(&mut self, receiver: Value, name: &str, args: &[Value]) -> EvalResult {
        let r = match receiver {
            Value::Nil => return Err(Exception::NilMethodInvocation(name.to_string()).into()),
            other => self.object_ref(other)?,
        };
        let class = self.runtime_class(r)?;
        let target = {
            let table = self.table();
            let methods = match table.lookup_name(name) {
                Some(n) => table.methods_named(class, &n),
                None => Vec::new(),
            };
            methods.into_iter().find_map(|(m, declaring)| {
                let f = table.function(m)?;
                if f.explicit_params().len() != args.len()
                    || f.attrs.contains(FunctionAttrs::CONSTRUCTOR)
                {
                    return None;
                }
                table.offset_of(class, declaring).map(|offset| (m, offset))
            })
        };
        let Some((function, offset)) = target else {
            let class = self.table().qualified_name(class);
            return Err(Exception::NoSuchMethod {
                name: name.to_string(),
                class,
            }
            .into());
        };
        self.stack.push(Value::Object(r.with_base(offset)));
        self.stack.extend_from_slice(args);
        self.invoke(function, args.len() + 1, &[])
    }

    // --- suspension and collection ---------------------------------------

    /// Honours pending suspend requests and runs a requested collection.
    pub fn safe_point(&mut self) {
        if self.control.has_requests() {
            self.park();
        }
        if self.shared.gc_requested.load(Ordering::Acquire) {
            self.collect_at_safe_point();
        }
    }

    fn park(&mut self) {
        *self.control.roots.lock() = self.stack_roots();
        {
            let mut state = self.control.state.lock();
            if self.control.suspend_requests.load(Ordering::SeqCst) > 0 {
                *state = ThreadState::Suspended;
                self.control.cond.notify_all();
                log::trace!("thread {} suspended", self.control.id);
                while self.control.suspend_requests.load(Ordering::SeqCst) > 0 {
                    self.control.cond.wait(&mut state);
                }
                *state = ThreadState::Running;
                log::trace!("thread {} resumed", self.control.id);
            }
        }
        self.control.roots.lock().clear();
    }

    fn acquire_coordination(&mut self) {
        let id = self.control.id;
        loop {
            match self
                .shared
                .coordinator
                .compare_exchange(0, id, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(owner) if owner == id => break,
                Err(_) => {
                    if self.control.has_requests() {
                        self.park();
                    }
                    std::thread::yield_now();
                }
            }
        }
        self.coordination_depth += 1;
    }

    fn try_acquire_coordination(&mut self) -> bool {
        let id = self.control.id;
        match self
            .shared
            .coordinator
            .compare_exchange(0, id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(owner) if owner == id => {}
            Err(_) => return false,
        }
        self.coordination_depth += 1;
        true
    }

    fn release_coordination(&mut self) {
        self.coordination_depth = self.coordination_depth.saturating_sub(1);
        if self.coordination_depth == 0 {
            self.shared.coordinator.store(0, Ordering::Release);
        }
    }

    /// Asks every other thread not bound to this native thread to stop at
    /// its next safe point, and waits until none of them is running.
    pub fn suspend_all(&mut self) {
        self.acquire_coordination();
        let targets = self.shared.suspend_others(self.control.id);
        self.suspended.push(targets);
    }

    /// Releases the threads stopped by the matching `suspend_all`.
    pub fn resume_all(&mut self) {
        if let Some(targets) = self.suspended.pop() {
            self.shared.resume(&targets);
            self.release_coordination();
        }
    }

    fn collect_at_safe_point(&mut self) {
        if !self.try_acquire_coordination() {
            return;
        }
        if self.shared.nested_running(self.control.id) {
            log::trace!("collection deferred: nested thread on the same native thread");
        } else if self.shared.gc_requested.swap(false, Ordering::AcqRel) {
            self.collect_now();
        }
        self.release_coordination();
    }

    fn collect_now(&mut self) -> usize {
        let targets = self.shared.suspend_others(self.control.id);
        let mut roots = self.stack_roots();
        for t in &targets {
            roots.extend(t.published_roots());
        }
        let freed = self.memory().collect(&roots);
        self.shared.resume(&targets);
        freed
    }

    /// Collects garbage now, suspending the other threads for the duration.
    /// Returns the number of objects freed, or `None` when a nested thread on
    /// the same native thread makes the stacks unobservable.
    pub fn collect_garbage(&mut self) -> Option<usize> {
        self.acquire_coordination();
        let freed = if self.shared.nested_running(self.control.id) {
            None
        } else {
            Some(self.collect_now())
        };
        self.release_coordination();
        freed
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        while !self.suspended.is_empty() {
            self.resume_all();
        }
        self.control.set_state(ThreadState::Terminated);
        self.shared.unregister(self.control.id);
        log::debug!("thread {} ({:?}) terminated", self.control.id, self.control.kind);
    }
}
