//! Process heap: an index-addressed arena of managed objects.

use crate::gc::Collector;
use mu_core::{FastHashMap, ObjectId, SymbolId, Value};
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum ManagedObject {
    Instance {
        class: SymbolId,
        slots: Box<[Value]>,
        /// Slots holding object pointers, shared with the class layout.
        pointers: Arc<[u32]>,
    },
    ListNode {
        value: Value,
        next: Value,
    },
    Closure {
        function: SymbolId,
        captured: Box<[Value]>,
    },
    /// `callee` with some arguments fixed. Bit `i` of `holes` marks
    /// parameter `i` as supplied at call time; the rest come from `bound`
    /// in order.
    Partial {
        callee: Value,
        bound: Box<[Value]>,
        holes: u32,
    },
    Str(Arc<str>),
}

impl ManagedObject {
    /// Objects this one refers to.
    pub fn children(&self) -> SmallVec<[ObjectId; 8]> {
        let mut out = SmallVec::new();
        match self {
            ManagedObject::Instance {
                slots, pointers, ..
            } => {
                for &p in pointers.iter() {
                    if let Some(id) = slots.get(p as usize).and_then(Value::referent) {
                        out.push(id);
                    }
                }
            }
            ManagedObject::ListNode { value, next } => {
                out.extend(value.referent());
                out.extend(next.referent());
            }
            ManagedObject::Closure { captured, .. } => {
                out.extend(captured.iter().filter_map(Value::referent));
            }
            ManagedObject::Partial { callee, bound, .. } => {
                out.extend(callee.referent());
                out.extend(bound.iter().filter_map(Value::referent));
            }
            ManagedObject::Str(_) => {}
        }
        out
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ManagedObject::Instance { .. } => "instance",
            ManagedObject::ListNode { .. } => "list",
            ManagedObject::Closure { .. } => "closure",
            ManagedObject::Partial { .. } => "partial",
            ManagedObject::Str(_) => "string",
        }
    }
}

pub struct Heap {
    objects: Vec<Option<ManagedObject>>,
    free_list: Vec<u32>,
    marks: Vec<u64>,
    globals: Vec<Value>,
    pinned: FastHashMap<ObjectId, u32>,
    pub(crate) alloc_count: usize,
    pub(crate) gc_threshold: usize,
    gc_min_threshold: usize,
}

impl Heap {
    pub fn new(gc_threshold: usize, gc_min_threshold: usize) -> Self {
        Self {
            objects: Vec::with_capacity(1024),
            free_list: Vec::new(),
            marks: Vec::new(),
            globals: Vec::new(),
            pinned: FastHashMap::default(),
            alloc_count: 0,
            gc_threshold,
            gc_min_threshold,
        }
    }

    pub fn alloc(&mut self, obj: ManagedObject) -> ObjectId {
        self.alloc_count += 1;
        if let Some(id) = self.free_list.pop() {
            self.objects[id as usize] = Some(obj);
            ObjectId(id)
        } else {
            let id = self.objects.len() as u32;
            self.objects.push(Some(obj));
            ObjectId(id)
        }
    }

    pub fn should_collect(&self) -> bool {
        self.alloc_count >= self.gc_threshold
    }

    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<&ManagedObject> {
        self.objects.get(id.index())?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ManagedObject> {
        self.objects.get_mut(id.index())?.as_mut()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Removes an object and returns its slot to the free list.
    pub fn free(&mut self, id: ObjectId) -> Option<ManagedObject> {
        let obj = self.objects.get_mut(id.index())?.take()?;
        self.free_list.push(id.0);
        Some(obj)
    }

    pub fn live_count(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_some())
            .map(|(i, _)| ObjectId(i as u32))
    }

    pub fn children(&self, id: ObjectId) -> SmallVec<[ObjectId; 8]> {
        self.get(id).map(ManagedObject::children).unwrap_or_default()
    }

    pub fn is_marked(&self, id: ObjectId) -> bool {
        let word = id.index() >> 6;
        let bit = id.index() & 63;
        self.marks.get(word).is_some_and(|w| (w & (1 << bit)) != 0)
    }

    /// Sets the mark bit; false if it was already set.
    pub(crate) fn set_mark(&mut self, id: ObjectId) -> bool {
        let word = id.index() >> 6;
        let bit = id.index() & 63;
        if word >= self.marks.len() {
            self.marks.resize(word + 1, 0);
        }
        let w = &mut self.marks[word];
        let mask = 1 << bit;
        if (*w & mask) != 0 {
            return false;
        }
        *w |= mask;
        true
    }

    pub(crate) fn clear_marks(&mut self) {
        self.marks.clear();
    }

    /// Frees every unmarked object, then clears the marks and adapts the
    /// collection threshold to the live set. Returns the number freed.
    pub(crate) fn sweep(&mut self) -> usize {
        let mut freed = 0;
        let mut live = 0;
        self.free_list.clear();
        for i in 0..self.objects.len() {
            let id = ObjectId(i as u32);
            if self.objects[i].is_some() {
                if self.is_marked(id) {
                    live += 1;
                } else {
                    self.objects[i] = None;
                    self.free_list.push(id.0);
                    freed += 1;
                }
            } else {
                self.free_list.push(id.0);
            }
        }
        while self.objects.last().is_some_and(|o| o.is_none()) {
            self.objects.pop();
        }
        let len = self.objects.len() as u32;
        self.free_list.retain(|&i| i < len);
        self.marks.clear();
        self.after_collection(live);
        freed
    }

    pub(crate) fn after_collection(&mut self, live: usize) {
        self.alloc_count = 0;
        self.gc_threshold = (live * 2).max(self.gc_min_threshold);
    }

    pub fn global(&self, index: u32) -> Option<Value> {
        self.globals.get(index as usize).copied()
    }

    pub(crate) fn globals_mut(&mut self) -> &mut Vec<Value> {
        &mut self.globals
    }

    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Extends the globals with the zero values of newly declared ones.
    pub fn sync_globals(&mut self, zeros: &[Value]) {
        if self.globals.len() < zeros.len() {
            let start = self.globals.len();
            self.globals.extend_from_slice(&zeros[start..]);
        }
    }

    pub fn pin(&mut self, id: ObjectId) {
        *self.pinned.entry(id).or_insert(0) += 1;
    }

    pub fn unpin(&mut self, id: ObjectId) {
        if let Some(count) = self.pinned.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.pinned.remove(&id);
            }
        }
    }

    pub fn pinned(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.pinned.keys().copied()
    }
}

impl Clone for Heap {
    fn clone(&self) -> Self {
        Self {
            objects: self.objects.clone(),
            free_list: self.free_list.clone(),
            marks: Vec::new(),
            globals: self.globals.clone(),
            pinned: FastHashMap::default(),
            alloc_count: 0,
            gc_threshold: self.gc_threshold,
            gc_min_threshold: self.gc_min_threshold,
        }
    }
}

/// The heap together with the collector that owns its reclamation policy.
pub struct Memory {
    pub heap: Heap,
    collector: Box<dyn Collector>,
}

impl Memory {
    pub fn new(heap: Heap, collector: Box<dyn Collector>) -> Self {
        let mut memory = Self { heap, collector };
        memory.collector.adopt(&memory.heap);
        memory
    }

    pub fn collector_name(&self) -> &'static str {
        self.collector.name()
    }

    pub fn alloc(&mut self, obj: ManagedObject) -> ObjectId {
        let id = self.heap.alloc(obj);
        self.collector.on_alloc(&self.heap, id);
        id
    }

    /// Writes an instance slot through the collector's write barrier.
    pub fn store_slot(&mut self, id: ObjectId, slot: u32, value: Value) -> Option<()> {
        let old = match self.heap.get_mut(id)? {
            ManagedObject::Instance { slots, .. } => {
                let cell = slots.get_mut(slot as usize)?;
                std::mem::replace(cell, value)
            }
            _ => return None,
        };
        self.collector.write_barrier(old, value);
        Some(())
    }

    pub fn load_slot(&self, id: ObjectId, slot: u32) -> Option<Value> {
        match self.heap.get(id)? {
            ManagedObject::Instance { slots, .. } => slots.get(slot as usize).copied(),
            _ => None,
        }
    }

    /// Fills a list node created empty, as the archive reader does.
    pub fn set_list_node(&mut self, id: ObjectId, value: Value, next: Value) -> Option<()> {
        let (old_value, old_next) = match self.heap.get_mut(id)? {
            ManagedObject::ListNode {
                value: v,
                next: n,
            } => (std::mem::replace(v, value), std::mem::replace(n, next)),
            _ => return None,
        };
        self.collector.write_barrier(old_value, value);
        self.collector.write_barrier(old_next, next);
        Some(())
    }

    pub fn store_global(&mut self, index: u32, value: Value) -> Option<()> {
        let cell = self.heap.globals_mut().get_mut(index as usize)?;
        let old = std::mem::replace(cell, value);
        self.collector.write_barrier(old, value);
        Some(())
    }

    /// Runs the collector with the given extra roots. Returns the number of
    /// objects freed.
    pub fn collect(&mut self, roots: &[ObjectId]) -> usize {
        let mut all: Vec<ObjectId> = roots.to_vec();
        all.extend(self.heap.pinned());
        let freed = self.collector.collect(&mut self.heap, &all);
        log::trace!(
            "{} collection freed {} objects, {} live",
            self.collector.name(),
            freed,
            self.heap.live_count()
        );
        freed
    }

    /// Copies the heap under a fresh collector of the same kind.
    pub fn duplicate(&self) -> Memory {
        Memory::new(self.heap.clone(), self.collector.fresh())
    }
}
