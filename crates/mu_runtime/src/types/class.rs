//! Classes: layout, inheritance queries and dispatch tables.
//!
//! A class is laid out as its primary super-class's sub-object, then its own
//! fields, then one header slot plus sub-object per secondary super-class.
//! Header slots hold the secondary class's symbol and are never traced.
//! Views of the primary lineage start at slot 0, so only secondary ancestors
//! need an offset adjustment when a pointer is converted.

use crate::errors::RegistrationError;
use crate::symbols::{FunctionAttrs, Storage, SymbolTable};
use mu_core::{HashTable, HashTraits, MachineRep, Name, SymbolId, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// Dispatch table entry: the function to call and where its `this`
/// sub-object starts inside the instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VEntry {
    pub function: SymbolId,
    pub this_offset: u32,
}

/// Dispatch table for the sub-object at `offset`.
#[derive(Clone, Debug)]
pub struct DispatchView {
    pub offset: u32,
    pub table: Vec<VEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuperOffset {
    pub class: SymbolId,
    pub slot: u32,
    pub byte: u32,
}

/// Instance layout computed by `freeze`.
#[derive(Clone, Debug)]
pub struct Layout {
    pub slot_count: u32,
    pub instance_size: u32,
    pub alignment: u32,
    pub slot_reps: Vec<MachineRep>,
    /// Field type per slot; `None` marks a header slot.
    pub slot_types: Vec<Option<SymbolId>>,
    pub byte_offsets: Vec<u32>,
    /// Slots the tracing collector and the archive follow. Shared with
    /// every instance of the class.
    pub pointer_slots: Arc<[u32]>,
    pub headers: Vec<(u32, SymbolId)>,
    /// Initial slot values of a new instance.
    pub template: Vec<Value>,
    pub super_offsets: Vec<SuperOffset>,
    /// `views[0]` is the primary table at offset 0.
    pub views: Vec<DispatchView>,
}

struct Conformance {
    iface: SymbolId,
    entries: Option<Arc<[VEntry]>>,
}

struct ByInterface;

impl HashTraits<Conformance> for ByInterface {
    fn hash(item: &Conformance) -> u64 {
        (item.iface.0 as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    }

    fn equals(a: &Conformance, b: &Conformance) -> bool {
        a.iface == b.iface
    }
}

pub struct ClassInfo {
    pub supers: Vec<SymbolId>,
    /// Own member variables in declaration order.
    pub fields: Vec<SymbolId>,
    /// Own member functions in declaration order.
    pub methods: Vec<SymbolId>,
    /// Classes naming this one as a direct super-class.
    pub children: Vec<SymbolId>,
    layout: Option<Layout>,
    conformance: Mutex<HashTable<Conformance, ByInterface>>,
}

impl ClassInfo {
    pub fn new(supers: Vec<SymbolId>) -> Self {
        Self {
            supers,
            fields: Vec::new(),
            methods: Vec::new(),
            children: Vec::new(),
            layout: None,
            conformance: Mutex::new(HashTable::new()),
        }
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.layout.is_some()
    }

    #[inline]
    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn instance_size(&self) -> Option<u32> {
        self.layout.as_ref().map(|l| l.instance_size)
    }

    pub fn clear_conformance(&self) {
        self.conformance.lock().clear();
    }

    /// Entry `index` of the table for the sub-object viewed at `base`.
    pub fn dispatch(&self, base: u32, index: u32) -> Option<VEntry> {
        let layout = self.layout.as_ref()?;
        let view = layout.views.iter().find(|v| v.offset == base)?;
        view.table.get(index as usize).copied()
    }
}

#[derive(Default)]
struct LayoutBuilder {
    slot_reps: Vec<MachineRep>,
    slot_types: Vec<Option<SymbolId>>,
    byte_offsets: Vec<u32>,
    pointer_slots: Vec<u32>,
    headers: Vec<(u32, SymbolId)>,
    template: Vec<Value>,
    cursor: u32,
    alignment: u32,
}

fn align_up(n: u32, align: u32) -> u32 {
    n.div_ceil(align) * align
}

impl LayoutBuilder {
    fn push_slot(&mut self, rep: MachineRep, ty: Option<SymbolId>, initial: Value) -> u32 {
        let align = rep.alignment().max(1);
        self.cursor = align_up(self.cursor, align);
        self.alignment = self.alignment.max(align);
        let slot = self.slot_reps.len() as u32;
        self.slot_reps.push(rep);
        self.slot_types.push(ty);
        self.byte_offsets.push(self.cursor);
        self.template.push(initial);
        if rep.is_pointer() && ty.is_some() {
            self.pointer_slots.push(slot);
        }
        self.cursor += rep.size();
        slot
    }

    fn push_sub(&mut self, sub: &Layout) -> (u32, u32) {
        let align = sub.alignment.max(1);
        self.cursor = align_up(self.cursor, align);
        self.alignment = self.alignment.max(align);
        let slot0 = self.slot_reps.len() as u32;
        let byte0 = self.cursor;
        self.slot_reps.extend_from_slice(&sub.slot_reps);
        self.slot_types.extend_from_slice(&sub.slot_types);
        self.byte_offsets
            .extend(sub.byte_offsets.iter().map(|b| byte0 + b));
        self.template.extend_from_slice(&sub.template);
        self.pointer_slots
            .extend(sub.pointer_slots.iter().map(|s| slot0 + s));
        self.headers
            .extend(sub.headers.iter().map(|(s, c)| (slot0 + s, *c)));
        self.cursor = byte0 + sub.instance_size;
        (slot0, byte0)
    }
}

struct FreezePlan {
    layout: Layout,
    field_slots: Vec<(SymbolId, u32)>,
    method_indices: Vec<(SymbolId, u32)>,
}

impl SymbolTable {
    /// Computes the layout and dispatch tables of `class`, freezing its
    /// super-classes first. Freezing twice is a no-op.
    pub fn freeze(&mut self, class: SymbolId) -> Result<(), RegistrationError> {
        let Some(info) = self.class(class) else {
            return Err(RegistrationError::NotAClass(self.type_name(class)));
        };
        if info.is_frozen() {
            return Ok(());
        }
        for s in info.supers.clone() {
            self.freeze(s)?;
        }
        let plan = self.plan_freeze(class)?;
        for (field, slot) in plan.field_slots {
            if let Some(v) = self.variable_mut(field) {
                v.storage = Storage::Member(Some(slot));
            }
        }
        for (method, index) in plan.method_indices {
            if let Some(f) = self.function_mut(method) {
                f.method_index = Some(index);
            }
        }
        log::debug!(
            "froze class {} ({} slots, {} bytes, {} methods)",
            self.qualified_name(class),
            plan.layout.slot_count,
            plan.layout.instance_size,
            plan.layout.views[0].table.len()
        );
        if let Some(info) = self.class_mut(class) {
            info.layout = Some(plan.layout);
        }
        Ok(())
    }

    fn is_constructor(&self, class: SymbolId, function: SymbolId) -> bool {
        self.function(function).is_some_and(|f| {
            f.attrs.contains(FunctionAttrs::CONSTRUCTOR) || self.name(function) == self.name(class)
        })
    }

    /// Whether method `f` overrides method `g`: same name, same explicit
    /// parameters. `this` is not compared.
    fn overrides(&self, f: SymbolId, g: SymbolId) -> bool {
        if f == g || self.name(f) != self.name(g) {
            return false;
        }
        match (self.function(f), self.function(g)) {
            (Some(a), Some(b)) => {
                a.is_method() && b.is_method() && a.explicit_params() == b.explicit_params()
            }
            _ => false,
        }
    }

    fn plan_freeze(&self, class: SymbolId) -> Result<FreezePlan, RegistrationError> {
        let Some(info) = self.class(class) else {
            return Err(RegistrationError::NotAClass(self.type_name(class)));
        };
        let frozen_super = |s: SymbolId| {
            self.class(s)
                .and_then(|c| c.layout())
                .ok_or_else(|| RegistrationError::NotAClass(self.type_name(s)))
        };

        let mut b = LayoutBuilder {
            alignment: 1,
            ..LayoutBuilder::default()
        };
        let mut super_offsets = Vec::with_capacity(info.supers.len());
        let mut views: Vec<DispatchView> = vec![DispatchView {
            offset: 0,
            table: Vec::new(),
        }];

        if let Some(&primary) = info.supers.first() {
            let sub = frozen_super(primary)?;
            let (slot, byte) = b.push_sub(sub);
            super_offsets.push(SuperOffset {
                class: primary,
                slot,
                byte,
            });
            views[0].table = sub.views[0].table.clone();
            views.extend(sub.views[1..].iter().cloned());
        }

        let mut field_slots = Vec::with_capacity(info.fields.len());
        for &field in &info.fields {
            let ty = self.variable(field).map(|v| v.ty).unwrap_or(self.prims().void);
            let rep = self.rep(ty);
            let slot = b.push_slot(rep, Some(ty), rep.zero());
            field_slots.push((field, slot));
        }

        for &secondary in info.supers.iter().skip(1) {
            let sub = frozen_super(secondary)?;
            let header = b.push_slot(MachineRep::Pointer, None, Value::Symbol(secondary));
            b.headers.push((header, secondary));
            let (slot, byte) = b.push_sub(sub);
            super_offsets.push(SuperOffset {
                class: secondary,
                slot,
                byte,
            });
            for view in &sub.views {
                views.push(DispatchView {
                    offset: slot + view.offset,
                    table: view
                        .table
                        .iter()
                        .map(|e| VEntry {
                            function: e.function,
                            this_offset: e.this_offset + slot,
                        })
                        .collect(),
                });
            }
        }

        let mut method_indices = Vec::new();
        for &method in &info.methods {
            if self.is_constructor(class, method) {
                continue;
            }
            let own = VEntry {
                function: method,
                this_offset: 0,
            };
            let mut index = None;
            for view in views.iter_mut() {
                for (k, entry) in view.table.iter_mut().enumerate() {
                    if self.overrides(method, entry.function) {
                        *entry = own;
                        if view.offset == 0 && index.is_none() {
                            index = Some(k as u32);
                        }
                    }
                }
            }
            let index = match index {
                Some(i) => i,
                None => {
                    views[0].table.push(own);
                    (views[0].table.len() - 1) as u32
                }
            };
            method_indices.push((method, index));
        }

        let slot_count = b.slot_reps.len() as u32;
        let instance_size = align_up(b.cursor, b.alignment);
        Ok(FreezePlan {
            layout: Layout {
                slot_count,
                instance_size,
                alignment: b.alignment,
                slot_reps: b.slot_reps,
                slot_types: b.slot_types,
                byte_offsets: b.byte_offsets,
                pointer_slots: b.pointer_slots.into(),
                headers: b.headers,
                template: b.template,
                super_offsets,
                views,
            },
            field_slots,
            method_indices,
        })
    }

    /// Whether `class` is `ancestor` or derives from it.
    pub fn is_a(&self, class: SymbolId, ancestor: SymbolId) -> bool {
        if class == ancestor {
            return true;
        }
        self.class(class)
            .is_some_and(|c| c.supers.iter().any(|&s| self.is_a(s, ancestor)))
    }

    /// Whether a pointer to `class` can be used as `ancestor` without an
    /// offset adjustment, i.e. `ancestor` lies on the primary lineage.
    pub fn substitutable(&self, class: SymbolId, ancestor: SymbolId) -> bool {
        if class == ancestor {
            return true;
        }
        self.is_a(class, ancestor)
            && self
                .class(class)
                .and_then(|c| c.supers.first())
                .is_some_and(|&s| self.substitutable(s, ancestor))
    }

    /// Slot offset of the `ancestor` sub-object inside `class`, searching
    /// the primary super-class first. Requires `class` to be frozen.
    pub fn offset_of(&self, class: SymbolId, ancestor: SymbolId) -> Option<u32> {
        if class == ancestor {
            return Some(0);
        }
        let layout = self.class(class)?.layout()?;
        layout.super_offsets.iter().find_map(|so| {
            self.offset_of(so.class, ancestor)
                .map(|inner| so.slot + inner)
        })
    }

    /// Offset of the `target` sub-object of an instance whose runtime class
    /// is `runtime`, or `None` when the instance is not a `target`.
    pub fn dynamic_cast(&self, runtime: SymbolId, target: SymbolId) -> Option<u32> {
        if !self.is_a(runtime, target) {
            return None;
        }
        self.offset_of(runtime, target)
    }

    /// Finds the member function `name` taking `params` (without `this`),
    /// searching `class` first and then its super-classes in declaration
    /// order. Returns the function and the class declaring it.
    pub fn find_function(
        &self,
        class: SymbolId,
        name: &Name,
        params: &[SymbolId],
    ) -> Option<(SymbolId, SymbolId)> {
        let info = self.class(class)?;
        for &m in self.members(class, name) {
            if self
                .function(m)
                .is_some_and(|f| f.explicit_params() == params)
            {
                return Some((m, class));
            }
        }
        info.supers
            .iter()
            .find_map(|&s| self.find_function(s, name, params))
    }

    /// All member functions called `name` visible from `class`, most derived
    /// first. Overridden functions are hidden by their overrides.
    pub fn methods_named(&self, class: SymbolId, name: &Name) -> Vec<(SymbolId, SymbolId)> {
        let mut found: Vec<(SymbolId, SymbolId)> = Vec::new();
        let mut pending = vec![class];
        while let Some(c) = pending.first().copied() {
            pending.remove(0);
            for &m in self.members(c, name) {
                let Some(f) = self.function(m) else { continue };
                let hidden = found.iter().any(|&(g, _)| {
                    self.function(g)
                        .is_some_and(|gf| gf.explicit_params() == f.explicit_params())
                });
                if !hidden {
                    found.push((m, c));
                }
            }
            if let Some(info) = self.class(c) {
                pending.extend(info.supers.iter().copied());
            }
        }
        found
    }

    /// Member variable `name` of `class` or its ancestors, with its
    /// declaring class.
    pub fn field_named(&self, class: SymbolId, name: &Name) -> Option<(SymbolId, SymbolId)> {
        let info = self.class(class)?;
        for &m in self.members(class, name) {
            if self.variable(m).is_some() {
                return Some((m, class));
            }
        }
        info.supers.iter().find_map(|&s| self.field_named(s, name))
    }

    /// Slot of a member variable relative to `view`, which must be the
    /// declaring class or derived from it.
    pub fn field_slot(&self, view: SymbolId, field: SymbolId) -> Option<u32> {
        let declaring = self.get(field).scope?;
        let Storage::Member(Some(slot)) = self.variable(field)?.storage else {
            return None;
        };
        Some(self.offset_of(view, declaring)? + slot)
    }

    /// Whether `class` provides every member function of `iface`.
    pub fn conforms(&self, class: SymbolId, iface: SymbolId) -> bool {
        let Some(info) = self.interface(iface) else {
            return false;
        };
        info.methods.iter().all(|&m| {
            self.function(m).is_some_and(|f| {
                self.find_function(class, self.name(m), f.explicit_params())
                    .is_some()
            })
        })
    }

    /// Dispatch entries implementing `iface` on a frozen `class`, in the
    /// interface's member order. Results are cached per class until a
    /// member is added to the class or one of its ancestors.
    pub fn implementation(&self, class: SymbolId, iface: SymbolId) -> Option<Arc<[VEntry]>> {
        let info = self.class(class)?;
        info.layout()?;
        let probe = Conformance {
            iface,
            entries: None,
        };
        if let Some(hit) = info.conformance.lock().find(&probe) {
            return hit.entries.clone();
        }
        let methods = &self.interface(iface)?.methods;
        let mut entries = Vec::with_capacity(methods.len());
        let mut complete = true;
        for &m in methods {
            let found = self.function(m).and_then(|f| {
                self.find_function(class, self.name(m), f.explicit_params())
            });
            match found.and_then(|(function, declaring)| {
                Some(VEntry {
                    function,
                    this_offset: self.offset_of(class, declaring)?,
                })
            }) {
                Some(e) => entries.push(e),
                None => {
                    complete = false;
                    break;
                }
            }
        }
        let entries: Option<Arc<[VEntry]>> = complete.then(|| entries.into());
        log::trace!(
            "conformance of {} to {}: {}",
            self.qualified_name(class),
            self.qualified_name(iface),
            entries.is_some()
        );
        info.conformance.lock().insert(Conformance {
            iface,
            entries: entries.clone(),
        });
        entries
    }
}
