//! Process configuration.

/// Which collector a process uses for its heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorKind {
    /// Mark and sweep over the arena at safe points. Reclaims cycles.
    Tracing,
    /// Deferred reference counting with a zero-count table. Cycles leak.
    RefCount,
}

impl Default for CollectorKind {
    fn default() -> Self {
        if cfg!(feature = "tracing-gc") {
            CollectorKind::Tracing
        } else {
            CollectorKind::RefCount
        }
    }
}

/// Process configuration options.
#[derive(Clone, Copy, Debug)]
pub struct ProcessConfig {
    /// Initial capacity of each thread's value stack.
    pub stack_capacity: usize,
    /// Allocations between collection requests.
    pub gc_threshold: usize,
    /// Floor for the adaptive threshold after a collection.
    pub gc_min_threshold: usize,
    pub collector: CollectorKind,
    /// Maximum number of pooled process threads.
    pub max_process_threads: usize,
    /// Call depth at which evaluation raises a stack overflow.
    pub max_call_depth: u32,
    /// Native stack size of pooled worker threads, in bytes.
    pub worker_stack_size: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            stack_capacity: 1024,
            gc_threshold: 100_000,
            gc_min_threshold: 1024,
            collector: CollectorKind::default(),
            max_process_threads: 16,
            max_call_depth: 2048,
            worker_stack_size: 8 * 1024 * 1024,
        }
    }
}
