//! Processes: an execution session over a shared context.
//!
//! A process owns the heap and globals, the root tree and its threads.
//! Process threads are pooled native workers fed through a job channel;
//! application threads run on the caller's native thread for one call.

use crate::archive::{self, Reader, Writer};
use crate::config::ProcessConfig;
use crate::context::Context;
use crate::docs::{Documentation, DocumentationLoader};
use crate::errors::{ArchiveError, RunError};
use crate::gc::new_collector;
use crate::heap::{Heap, Memory};
use crate::node::Node;
use crate::ast::AstUnit;
use crate::thread::{Thread, ThreadControl, ThreadKind, ThreadState};
use mu_core::{SymbolId, Value};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;

/// Coordinator id used when the host, not a runtime thread, suspends others.
pub(crate) const HOST_THREAD: u32 = u32::MAX;

pub(crate) struct ProcessShared {
    pub(crate) context: Arc<Context>,
    pub(crate) config: ProcessConfig,
    pub(crate) memory: Mutex<Memory>,
    threads: Mutex<Vec<Arc<ThreadControl>>>,
    next_thread_id: AtomicU32,
    /// Id of the thread currently suspending the others, 0 when none.
    pub(crate) coordinator: AtomicU32,
    pub(crate) gc_requested: AtomicBool,
    pub(crate) output: Mutex<String>,
    docs: Mutex<Documentation>,
    root: RwLock<Option<Arc<Node>>>,
    torn_down: AtomicBool,
}

impl ProcessShared {
    fn register(&self, kind: ThreadKind) -> Arc<ThreadControl> {
        let id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let control = ThreadControl::new(id, kind);
        self.threads.lock().push(control.clone());
        log::debug!("thread {} ({:?}) created", id, kind);
        control
    }

    pub(crate) fn unregister(&self, id: u32) {
        self.threads.lock().retain(|c| c.id() != id);
    }

    pub(crate) fn thread_states(&self) -> Vec<(u32, ThreadState)> {
        self.threads
            .lock()
            .iter()
            .map(|c| (c.id(), c.state()))
            .collect()
    }

    /// Whether a thread other than `except` is running on the calling
    /// native thread. Such a thread's stack cannot be observed.
    pub(crate) fn nested_running(&self, except: u32) -> bool {
        let native = std::thread::current().id();
        self.threads.lock().iter().any(|c| {
            c.id() != except && c.is_bound_to(native) && c.state() == ThreadState::Running
        })
    }

    /// Requests every thread except `requester` and those bound to the
    /// calling native thread to suspend, then waits until none of them runs.
    pub(crate) fn suspend_others(&self, requester: u32) -> Vec<Arc<ThreadControl>> {
        let native = std::thread::current().id();
        let targets: Vec<Arc<ThreadControl>> = self
            .threads
            .lock()
            .iter()
            .filter(|c| {
                c.id() != requester
                    && !c.is_bound_to(native)
                    && c.state() != ThreadState::Terminated
            })
            .cloned()
            .collect();
        for t in &targets {
            t.request_suspend();
        }
        for t in &targets {
            t.wait_until_stopped();
        }
        log::debug!("thread {} suspended {} threads", requester, targets.len());
        targets
    }

    pub(crate) fn resume(&self, targets: &[Arc<ThreadControl>]) {
        for t in targets {
            t.release_suspend();
        }
        log::debug!("resumed {} threads", targets.len());
    }

    fn acquire_host_coordination(&self) {
        while self
            .coordinator
            .compare_exchange(0, HOST_THREAD, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            std::thread::yield_now();
        }
    }

    fn release_host_coordination(&self) {
        self.coordinator.store(0, Ordering::Release);
    }
}

struct Job {
    function: Value,
    args: Vec<Value>,
    reply: mpsc::Sender<Result<Value, RunError>>,
}

struct Worker {
    control: Arc<ThreadControl>,
    busy: Arc<AtomicBool>,
    jobs: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

/// Handle to a job running on a process thread.
pub struct ThreadJoin {
    control: Arc<ThreadControl>,
    result: mpsc::Receiver<Result<Value, RunError>>,
}

impl ThreadJoin {
    pub fn thread_id(&self) -> u32 {
        self.control.id()
    }

    pub fn state(&self) -> ThreadState {
        self.control.state()
    }

    /// Blocks until the job finishes.
    pub fn join(self) -> Result<Value, RunError> {
        self.result.recv().unwrap_or(Err(RunError::TornDown))
    }
}

pub struct Process {
    shared: Arc<ProcessShared>,
    workers: Mutex<Vec<Worker>>,
    host_suspended: Mutex<Vec<Vec<Arc<ThreadControl>>>>,
}

impl Process {
    pub fn new(context: Arc<Context>) -> Self {
        Self::with_config(context, ProcessConfig::default())
    }

    pub fn with_config(context: Arc<Context>, config: ProcessConfig) -> Self {
        let mut heap = Heap::new(config.gc_threshold, config.gc_min_threshold);
        heap.sync_globals(context.read().global_zeros());
        let memory = Memory::new(heap, new_collector(config.collector));
        Self::from_parts(context, config, memory, None)
    }

    fn from_parts(
        context: Arc<Context>,
        config: ProcessConfig,
        memory: Memory,
        root: Option<Arc<Node>>,
    ) -> Self {
        log::debug!("process created with {} collector", memory.collector_name());
        Self {
            shared: Arc::new(ProcessShared {
                context,
                config,
                memory: Mutex::new(memory),
                threads: Mutex::new(Vec::new()),
                next_thread_id: AtomicU32::new(1),
                coordinator: AtomicU32::new(0),
                gc_requested: AtomicBool::new(false),
                output: Mutex::new(String::new()),
                docs: Mutex::new(Documentation::default()),
                root: RwLock::new(root),
                torn_down: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::new()),
            host_suspended: Mutex::new(Vec::new()),
        }
    }

    /// A new process over the same context with a copy of this one's heap,
    /// globals and root. Pinned objects are not pinned in the copy.
    pub fn duplicate(&self) -> Process {
        let memory = self.shared.memory.lock().duplicate();
        let root = self.shared.root.read().clone();
        Self::from_parts(self.shared.context.clone(), self.shared.config, memory, root)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.shared.context
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.shared.config
    }

    fn check_alive(&self) -> Result<(), RunError> {
        if self.shared.torn_down.load(Ordering::Acquire) {
            return Err(RunError::TornDown);
        }
        Ok(())
    }

    // --- threads ---------------------------------------------------------

    /// A fresh thread for one external call on the calling native thread.
    /// Pair with `release_application_thread`.
    pub fn new_application_thread(&self) -> Result<Thread, RunError> {
        self.check_alive()?;
        let control = self.shared.register(ThreadKind::Application);
        control.bind_native();
        Ok(Thread::new(self.shared.clone(), control))
    }

    pub fn release_application_thread(&self, thread: Thread) {
        drop(thread);
    }

    /// Runs a function value on a pooled process thread, reusing an idle
    /// worker when one exists. Object arguments stay pinned until the job
    /// finishes.
    pub fn spawn(&self, function: Value, args: Vec<Value>) -> Result<ThreadJoin, RunError> {
        self.check_alive()?;
        {
            let mut memory = self.shared.memory.lock();
            for id in std::iter::once(&function).chain(&args).filter_map(Value::referent) {
                memory.heap.pin(id);
            }
        }
        let (reply, result) = mpsc::channel();
        let job = Job {
            function,
            args,
            reply,
        };
        let mut workers = self.workers.lock();
        let idle = workers.iter().position(|w| {
            !w.busy.load(Ordering::Acquire) && w.control.state() != ThreadState::Terminated
        });
        let index = match idle {
            Some(i) => i,
            None if workers.len() < self.shared.config.max_process_threads => {
                workers.push(self.start_worker());
                workers.len() - 1
            }
            None => {
                drop(workers);
                self.unpin_job(&job);
                return Err(RunError::ThreadLimit(self.shared.config.max_process_threads));
            }
        };
        let worker = &workers[index];
        worker.busy.store(true, Ordering::Release);
        let control = worker.control.clone();
        let sent = worker.jobs.as_ref().map(|tx| tx.send(job));
        match sent {
            Some(Ok(())) => Ok(ThreadJoin { control, result }),
            Some(Err(mpsc::SendError(job))) => {
                worker.busy.store(false, Ordering::Release);
                drop(workers);
                self.unpin_job(&job);
                Err(RunError::TornDown)
            }
            None => Err(RunError::TornDown),
        }
    }

    /// Spawns a call to `function` with `args`.
    pub fn spawn_function(&self, function: SymbolId, args: Vec<Value>) -> Result<ThreadJoin, RunError> {
        self.spawn(Value::Symbol(function), args)
    }

    fn unpin_job(&self, job: &Job) {
        let mut memory = self.shared.memory.lock();
        for id in std::iter::once(&job.function)
            .chain(&job.args)
            .filter_map(Value::referent)
        {
            memory.heap.unpin(id);
        }
    }

    fn start_worker(&self) -> Worker {
        let control = self.shared.register(ThreadKind::Process);
        let busy = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<Job>();
        let shared = self.shared.clone();
        let thread_control = control.clone();
        let thread_busy = busy.clone();
        let handle = std::thread::Builder::new()
            .name(format!("mu-worker-{}", control.id()))
            .stack_size(self.shared.config.worker_stack_size)
            .spawn(move || {
                thread_control.bind_native();
                let mut thread = Thread::new(shared.clone(), thread_control);
                while let Ok(job) = rx.recv() {
                    let result = thread.run_value(job.function, &job.args);
                    {
                        let mut memory = shared.memory.lock();
                        for id in std::iter::once(&job.function)
                            .chain(&job.args)
                            .filter_map(Value::referent)
                        {
                            memory.heap.unpin(id);
                        }
                    }
                    thread_busy.store(false, Ordering::Release);
                    let _ = job.reply.send(result);
                }
            })
            .map_err(|e| log::error!("failed to start worker thread: {e}"))
            .ok();
        Worker {
            control,
            busy,
            jobs: Some(tx),
            handle,
        }
    }

    /// States of every registered thread, by id.
    pub fn thread_states(&self) -> Vec<(u32, ThreadState)> {
        self.shared.thread_states()
    }

    /// Suspends every runtime thread not bound to the calling native thread.
    pub fn suspend_all(&self) {
        self.shared.acquire_host_coordination();
        let targets = self.shared.suspend_others(HOST_THREAD);
        self.host_suspended.lock().push(targets);
    }

    pub fn resume_all(&self) {
        let targets = self.host_suspended.lock().pop();
        if let Some(targets) = targets {
            self.shared.resume(&targets);
            if self.host_suspended.lock().is_empty() {
                self.shared.release_host_coordination();
            }
        }
    }

    // --- evaluation ------------------------------------------------------

    pub fn set_root(&self, node: Node) {
        *self.shared.root.write() = Some(Arc::new(node));
    }

    pub fn root(&self) -> Option<Arc<Node>> {
        self.shared.root.read().clone()
    }

    /// Evaluates the root tree on a fresh application thread.
    pub fn run(&self) -> Result<Value, RunError> {
        let root = self.root().ok_or(RunError::NoRoot)?;
        let mut thread = self.new_application_thread()?;
        let result = thread.run(&root);
        self.release_application_thread(thread);
        result
    }

    /// Resolves a unit, installs it as the root and runs it. A unit that
    /// fails to resolve leaves the previous root in place.
    pub fn evaluate(&self, unit: AstUnit) -> Result<Value, RunError> {
        self.check_alive()?;
        let root = self.shared.context.assemble(unit)?;
        self.sync_globals();
        self.set_root(root);
        self.run()
    }

    /// Makes globals declared since the process was created addressable.
    pub fn sync_globals(&self) {
        let zeros = self.shared.context.read().global_zeros().to_vec();
        self.shared.memory.lock().heap.sync_globals(&zeros);
    }

    pub fn global(&self, symbol: SymbolId) -> Option<Value> {
        let index = self.shared.context.global_index(symbol)?;
        self.sync_globals();
        self.shared.memory.lock().heap.global(index)
    }

    pub fn set_global(&self, symbol: SymbolId, value: Value) -> Option<()> {
        let index = self.shared.context.global_index(symbol)?;
        self.sync_globals();
        self.shared.memory.lock().store_global(index, value)
    }

    /// Text written by `print` since the last call.
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.shared.output.lock())
    }

    // --- memory ----------------------------------------------------------

    pub fn pin(&self, value: Value) {
        if let Some(id) = value.referent() {
            self.shared.memory.lock().heap.pin(id);
        }
    }

    pub fn unpin(&self, value: Value) {
        if let Some(id) = value.referent() {
            self.shared.memory.lock().heap.unpin(id);
        }
    }

    pub fn live_objects(&self) -> usize {
        self.shared.memory.lock().heap.live_count()
    }

    pub fn collector_name(&self) -> &'static str {
        self.shared.memory.lock().collector_name()
    }

    /// Collects garbage from the host, suspending every runtime thread for
    /// the duration. Returns `None` when a runtime thread is running on the
    /// calling native thread.
    pub fn collect_garbage(&self) -> Option<usize> {
        self.shared.acquire_host_coordination();
        let freed = if self.shared.nested_running(HOST_THREAD) {
            None
        } else {
            let targets = self.shared.suspend_others(HOST_THREAD);
            let roots: Vec<_> = targets.iter().flat_map(|t| t.published_roots()).collect();
            let freed = self.shared.memory.lock().collect(&roots);
            self.shared.resume(&targets);
            Some(freed)
        };
        self.shared.gc_requested.store(false, Ordering::Release);
        self.shared.release_host_coordination();
        freed
    }

    // --- documentation ---------------------------------------------------

    pub fn set_documentation_loader(&self, loader: Box<dyn DocumentationLoader>) {
        self.shared.docs.lock().set_loader(loader);
    }

    pub fn add_documentation(&self, symbol: SymbolId, doc: impl Into<Arc<str>>) {
        self.shared.docs.lock().add(symbol, doc.into());
    }

    /// Documentation of a symbol, asking the loader for its module first
    /// if that module has not been loaded yet.
    pub fn document_symbol(&self, symbol: SymbolId) -> Option<Arc<str>> {
        let table = self.shared.context.read();
        self.shared.docs.lock().lookup(&table, symbol)
    }

    // --- archive ---------------------------------------------------------

    pub fn serialize(&self, value: Value, ty: SymbolId) -> Result<Vec<u8>, ArchiveError> {
        let table = self.shared.context.read();
        let memory = self.shared.memory.lock();
        let mut writer = Writer::new();
        archive::write_value(&mut writer, &table, &memory, value, ty)?;
        Ok(writer.into_bytes())
    }

    /// Reads a value written by `serialize`. Objects in the result are
    /// pinned; unpin them once they are reachable from a root.
    pub fn deserialize(&self, bytes: &[u8], ty: SymbolId) -> Result<Value, ArchiveError> {
        let table = self.shared.context.read();
        let mut memory = self.shared.memory.lock();
        let mut reader = Reader::new(bytes);
        let value = archive::read_value(&mut reader, &table, &mut memory, ty)?;
        if let Some(id) = value.referent() {
            memory.heap.pin(id);
        }
        Ok(value)
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        self.shared.torn_down.store(true, Ordering::Release);
        let mut workers = std::mem::take(&mut *self.workers.lock());
        for w in &mut workers {
            w.jobs = None;
        }
        for w in &mut workers {
            if let Some(handle) = w.handle.take() {
                if handle.join().is_err() {
                    log::error!("worker thread {} panicked", w.control.id());
                }
            }
        }
        log::debug!("process torn down");
    }
}
