//! Collection strategies.
//!
//! The type system never asks which collector is active. Both strategies see
//! the same interface: allocation and write-barrier notifications, and a
//! `collect` call at a safe point with the roots of every thread.

use crate::config::CollectorKind;
use crate::heap::Heap;
use mu_core::{FastHashMap, FastHashSet, ObjectId, Value};

pub trait Collector: Send {
    fn name(&self) -> &'static str;

    fn kind(&self) -> CollectorKind;

    /// Takes over a heap that already holds objects.
    fn adopt(&mut self, heap: &Heap);

    fn on_alloc(&mut self, heap: &Heap, id: ObjectId);

    /// A heap or global cell changed from `old` to `new`.
    fn write_barrier(&mut self, old: Value, new: Value);

    /// Reclaims unreachable objects. `roots` holds thread stack references
    /// and pinned objects; globals are found by the collector. Returns the
    /// number of objects freed.
    fn collect(&mut self, heap: &mut Heap, roots: &[ObjectId]) -> usize;

    /// A new, empty collector of the same kind.
    fn fresh(&self) -> Box<dyn Collector>;
}

pub fn new_collector(kind: CollectorKind) -> Box<dyn Collector> {
    match kind {
        CollectorKind::Tracing => Box::new(TracingCollector),
        CollectorKind::RefCount => Box::new(RefCountCollector::default()),
    }
}

/// Mark and sweep over the arena's live-set bitmap.
pub struct TracingCollector;

impl Collector for TracingCollector {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn kind(&self) -> CollectorKind {
        CollectorKind::Tracing
    }

    fn adopt(&mut self, _heap: &Heap) {}

    fn on_alloc(&mut self, _heap: &Heap, _id: ObjectId) {}

    fn write_barrier(&mut self, _old: Value, _new: Value) {}

    fn collect(&mut self, heap: &mut Heap, roots: &[ObjectId]) -> usize {
        heap.clear_marks();
        let mut pending: Vec<ObjectId> = roots.to_vec();
        pending.extend(heap.globals().iter().filter_map(Value::referent));
        while let Some(id) = pending.pop() {
            if !heap.contains(id) || !heap.set_mark(id) {
                continue;
            }
            pending.extend(heap.children(id));
        }
        heap.sweep()
    }

    fn fresh(&self) -> Box<dyn Collector> {
        Box::new(TracingCollector)
    }
}

/// Deferred reference counting.
///
/// Only heap and global references are counted. Objects whose count drops to
/// zero wait in the zero-count table until the next collection, where those
/// not referenced from a thread stack are freed. Cycles are never reclaimed.
#[derive(Default)]
pub struct RefCountCollector {
    counts: FastHashMap<ObjectId, u32>,
    zero: FastHashSet<ObjectId>,
}

impl RefCountCollector {
    fn increment(&mut self, id: ObjectId) {
        *self.counts.entry(id).or_insert(0) += 1;
        self.zero.remove(&id);
    }

    fn decrement(&mut self, id: ObjectId) {
        if let Some(count) = self.counts.get_mut(&id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.zero.insert(id);
            }
        }
    }

    pub fn count(&self, id: ObjectId) -> u32 {
        self.counts.get(&id).copied().unwrap_or(0)
    }
}

impl Collector for RefCountCollector {
    fn name(&self) -> &'static str {
        "refcount"
    }

    fn kind(&self) -> CollectorKind {
        CollectorKind::RefCount
    }

    fn adopt(&mut self, heap: &Heap) {
        self.counts.clear();
        self.zero.clear();
        for id in heap.ids() {
            self.counts.entry(id).or_insert(0);
        }
        for id in heap.ids().collect::<Vec<_>>() {
            for child in heap.children(id) {
                self.increment(child);
            }
        }
        for global in heap.globals().iter().filter_map(Value::referent) {
            self.increment(global);
        }
        for (&id, &count) in &self.counts {
            if count == 0 {
                self.zero.insert(id);
            }
        }
    }

    fn on_alloc(&mut self, heap: &Heap, id: ObjectId) {
        self.counts.insert(id, 0);
        self.zero.insert(id);
        for child in heap.children(id) {
            self.increment(child);
        }
    }

    fn write_barrier(&mut self, old: Value, new: Value) {
        if let Some(id) = new.referent() {
            self.increment(id);
        }
        if let Some(id) = old.referent() {
            self.decrement(id);
        }
    }

    fn collect(&mut self, heap: &mut Heap, roots: &[ObjectId]) -> usize {
        let roots: FastHashSet<ObjectId> = roots.iter().copied().collect();
        let mut freed = 0;
        let mut pending: Vec<ObjectId> = self
            .zero
            .iter()
            .copied()
            .filter(|id| !roots.contains(id))
            .collect();
        while let Some(id) = pending.pop() {
            if self.count(id) != 0 || !self.zero.remove(&id) {
                continue;
            }
            let Some(obj) = heap.free(id) else {
                self.counts.remove(&id);
                continue;
            };
            self.counts.remove(&id);
            freed += 1;
            for child in obj.children() {
                self.decrement(child);
                if self.count(child) == 0 && !roots.contains(&child) {
                    pending.push(child);
                }
            }
        }
        heap.after_collection(heap.live_count());
        freed
    }

    fn fresh(&self) -> Box<dyn Collector> {
        Box::new(RefCountCollector::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{ManagedObject, Memory};

    fn node(value: Value, next: Value) -> ManagedObject {
        ManagedObject::ListNode { value, next }
    }

    #[test]
    fn refcount_frees_unrooted_chain() {
        let mut m = Memory::new(Heap::new(16, 16), Box::new(RefCountCollector::default()));
        let tail = m.alloc(node(Value::Int(2), Value::Nil));
        let head = m.alloc(node(Value::Int(1), Value::object(tail)));
        assert_eq!(m.collect(&[head]), 0);
        assert_eq!(m.heap.live_count(), 2);
        assert_eq!(m.collect(&[]), 2);
        assert_eq!(m.heap.live_count(), 0);
    }

    #[test]
    fn tracing_keeps_globals() {
        let mut m = Memory::new(Heap::new(16, 16), Box::new(TracingCollector));
        m.heap.sync_globals(&[Value::Nil]);
        let id = m.alloc(node(Value::Int(1), Value::Nil));
        m.store_global(0, Value::object(id));
        assert_eq!(m.collect(&[]), 0);
        m.store_global(0, Value::Nil);
        assert_eq!(m.collect(&[]), 1);
    }
}
