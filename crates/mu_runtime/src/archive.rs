//! Binary archives of runtime values.
//!
//! Values are written by static type. Primitives are little-endian at their
//! representation's size. Strings, list cells and instances are written the
//! first time they are reached and referenced by index afterwards, so
//! sharing and cycles survive a round trip. Instances record their runtime
//! class by qualified name followed by every non-header slot.

use crate::errors::ArchiveError;
use crate::heap::{ManagedObject, Memory};
use crate::symbols::SymbolTable;
use crate::types::TypeKind;
use mu_core::{FastHashMap, ObjRef, ObjectId, SymbolId, Value};
use std::sync::Arc;

const NIL: u8 = 0;
const SEEN: u8 = 1;
const NEW: u8 = 2;

#[derive(Default)]
pub struct Writer {
    bytes: Vec<u8>,
    objects: FastHashMap<ObjectId, u32>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.bytes.extend_from_slice(s.as_bytes());
    }

    /// Writes the reference tag of an object; `true` when its payload must
    /// follow.
    fn object_tag(&mut self, id: ObjectId) -> bool {
        if let Some(&index) = self.objects.get(&id) {
            self.write_u8(SEEN);
            self.write_u32(index);
            return false;
        }
        let index = self.objects.len() as u32;
        self.objects.insert(id, index);
        self.write_u8(NEW);
        true
    }
}

pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    objects: Vec<ObjectId>,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            objects: Vec::new(),
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ArchiveError> {
        let end = self.pos + N;
        let chunk = self
            .bytes
            .get(self.pos..end)
            .ok_or(ArchiveError::UnexpectedEof)?;
        self.pos = end;
        let mut out = [0; N];
        out.copy_from_slice(chunk);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ArchiveError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ArchiveError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ArchiveError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, ArchiveError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ArchiveError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, ArchiveError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_str(&mut self) -> Result<String, ArchiveError> {
        let len = self.read_u32()? as usize;
        let end = self.pos + len;
        let bytes = self
            .bytes
            .get(self.pos..end)
            .ok_or(ArchiveError::UnexpectedEof)?;
        self.pos = end;
        String::from_utf8(bytes.to_vec()).map_err(|_| ArchiveError::BadString)
    }

    fn seen(&mut self) -> Result<ObjectId, ArchiveError> {
        let index = self.read_u32()?;
        self.objects
            .get(index as usize)
            .copied()
            .ok_or(ArchiveError::UnknownObject(index))
    }
}

fn mismatch(table: &SymbolTable, value: Value, ty: SymbolId) -> ArchiveError {
    ArchiveError::Mismatch(format!(
        "{} value for type {}",
        value.kind_name(),
        table.type_name(ty)
    ))
}

fn object<'m>(memory: &'m Memory, id: ObjectId) -> Result<&'m ManagedObject, ArchiveError> {
    memory
        .heap
        .get(id)
        .ok_or(ArchiveError::Mismatch("collected object".into()))
}

/// Writes `value`, whose static type is `ty`.
pub fn write_value(
    w: &mut Writer,
    table: &SymbolTable,
    memory: &Memory,
    value: Value,
    ty: SymbolId,
) -> Result<(), ArchiveError> {
    let Some(kind) = table.type_kind(ty) else {
        return Err(ArchiveError::Unsupported(table.qualified_name(ty)));
    };
    match (kind, value) {
        (TypeKind::Void, _) => Ok(()),
        (TypeKind::List(element), _) => write_list(w, table, memory, value, *element),
        (TypeKind::String | TypeKind::Class(_) | TypeKind::Interface(_) | TypeKind::Nil, Value::Nil) => {
            w.write_u8(NIL);
            Ok(())
        }
        (TypeKind::String, Value::Object(r)) => {
            if w.object_tag(r.id) {
                match object(memory, r.id)? {
                    ManagedObject::Str(s) => w.write_str(s),
                    _ => return Err(mismatch(table, value, ty)),
                }
            }
            Ok(())
        }
        (TypeKind::Class(_) | TypeKind::Interface(_), Value::Object(r)) => {
            write_instance(w, table, memory, r)?;
            w.write_u32(r.base);
            Ok(())
        }
        (TypeKind::Primitive | TypeKind::Vector { .. }, _) => write_scalar(w, table, value, ty),
        _ => Err(ArchiveError::Unsupported(table.type_name(ty))),
    }
}

fn write_scalar(w: &mut Writer, table: &SymbolTable, value: Value, ty: SymbolId) -> Result<(), ArchiveError> {
    match value {
        Value::Bool(b) => w.write_u8(b as u8),
        Value::Byte(b) => w.write_u8(b),
        Value::Char(c) => w.write_u32(c as u32),
        Value::Short(i) => w.write_u16(i as u16),
        Value::Int(i) => w.write_u32(i as u32),
        Value::Int64(i) => w.write_u64(i as u64),
        Value::Float(f) => w.write_f32(f),
        Value::Double(d) => w.write_f64(d),
        Value::Vec2(v) => v.iter().for_each(|&x| w.write_f32(x)),
        Value::Vec3(v) => v.iter().for_each(|&x| w.write_f32(x)),
        Value::Vec4(v) => v.iter().for_each(|&x| w.write_f32(x)),
        _ => return Err(mismatch(table, value, ty)),
    }
    Ok(())
}

fn write_list(
    w: &mut Writer,
    table: &SymbolTable,
    memory: &Memory,
    list: Value,
    element: SymbolId,
) -> Result<(), ArchiveError> {
    let mut cur = list;
    loop {
        let r = match cur {
            Value::Nil => {
                w.write_u8(NIL);
                return Ok(());
            }
            Value::Object(r) => r,
            other => return Err(ArchiveError::Mismatch(format!("{} value for a list", other.kind_name()))),
        };
        if !w.object_tag(r.id) {
            return Ok(());
        }
        let (value, next) = match object(memory, r.id)? {
            ManagedObject::ListNode { value, next } => (*value, *next),
            _ => return Err(ArchiveError::Mismatch("list type for a non-list object".into())),
        };
        write_value(w, table, memory, value, element)?;
        cur = next;
    }
}

fn write_instance(w: &mut Writer, table: &SymbolTable, memory: &Memory, r: ObjRef) -> Result<(), ArchiveError> {
    if !w.object_tag(r.id) {
        return Ok(());
    }
    let (class, slots) = match object(memory, r.id)? {
        ManagedObject::Instance { class, slots, .. } => (*class, slots),
        _ => return Err(ArchiveError::Mismatch("class type for a non-instance object".into())),
    };
    let layout = table
        .class(class)
        .and_then(|c| c.layout())
        .ok_or_else(|| ArchiveError::UnknownClass(table.qualified_name(class)))?;
    w.write_str(&table.qualified_name(class));
    for (slot, ty) in layout.slot_types.iter().enumerate() {
        let Some(ty) = *ty else { continue };
        let value = slots.get(slot).copied().unwrap_or_default();
        write_value(w, table, memory, value, ty)?;
    }
    Ok(())
}

/// Reads a value of static type `ty`, allocating its objects in `memory`.
pub fn read_value(
    r: &mut Reader<'_>,
    table: &SymbolTable,
    memory: &mut Memory,
    ty: SymbolId,
) -> Result<Value, ArchiveError> {
    let Some(kind) = table.type_kind(ty) else {
        return Err(ArchiveError::Unsupported(table.qualified_name(ty)));
    };
    match kind {
        TypeKind::Void => Ok(Value::Void),
        TypeKind::Nil => match r.read_u8()? {
            NIL => Ok(Value::Nil),
            tag => Err(ArchiveError::Mismatch(format!("tag {tag} for nil"))),
        },
        TypeKind::List(element) => read_list(r, table, memory, *element),
        TypeKind::String => match r.read_u8()? {
            NIL => Ok(Value::Nil),
            SEEN => Ok(Value::object(r.seen()?)),
            NEW => {
                let text = r.read_str()?;
                let id = memory.alloc(ManagedObject::Str(Arc::from(text)));
                r.objects.push(id);
                Ok(Value::object(id))
            }
            tag => Err(ArchiveError::Mismatch(format!("object tag {tag}"))),
        },
        TypeKind::Class(_) | TypeKind::Interface(_) => {
            let id = match r.read_u8()? {
                NIL => return Ok(Value::Nil),
                SEEN => r.seen()?,
                NEW => read_instance(r, table, memory)?,
                tag => return Err(ArchiveError::Mismatch(format!("object tag {tag}"))),
            };
            let base = r.read_u32()?;
            Ok(Value::Object(ObjRef::new(id).with_base(base)))
        }
        TypeKind::Primitive | TypeKind::Vector { .. } => read_scalar(r, table, ty),
        _ => Err(ArchiveError::Unsupported(table.type_name(ty))),
    }
}

fn read_scalar(r: &mut Reader<'_>, table: &SymbolTable, ty: SymbolId) -> Result<Value, ArchiveError> {
    use mu_core::MachineRep;
    Ok(match table.rep(ty) {
        MachineRep::Bool => Value::Bool(r.read_u8()? != 0),
        MachineRep::Byte => Value::Byte(r.read_u8()?),
        MachineRep::Char => {
            let code = r.read_u32()?;
            Value::Char(char::from_u32(code).ok_or(ArchiveError::BadString)?)
        }
        MachineRep::Short => Value::Short(r.read_u16()? as i16),
        MachineRep::Int => Value::Int(r.read_u32()? as i32),
        MachineRep::Int64 => Value::Int64(r.read_u64()? as i64),
        MachineRep::Float => Value::Float(r.read_f32()?),
        MachineRep::Double => Value::Double(r.read_f64()?),
        MachineRep::Vec2f => Value::Vec2([r.read_f32()?, r.read_f32()?]),
        MachineRep::Vec3f => Value::Vec3([r.read_f32()?, r.read_f32()?, r.read_f32()?]),
        MachineRep::Vec4f => Value::Vec4([r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?]),
        other => return Err(ArchiveError::Unsupported(other.name().to_string())),
    })
}

fn read_list(
    r: &mut Reader<'_>,
    table: &SymbolTable,
    memory: &mut Memory,
    element: SymbolId,
) -> Result<Value, ArchiveError> {
    let mut head = Value::Nil;
    // Cell whose `next` is filled by the following tag, with its value.
    let mut open: Option<(ObjectId, Value)> = None;
    loop {
        let link = match r.read_u8()? {
            NIL => Value::Nil,
            SEEN => Value::object(r.seen()?),
            NEW => {
                let id = memory.alloc(ManagedObject::ListNode {
                    value: Value::Nil,
                    next: Value::Nil,
                });
                r.objects.push(id);
                let value = read_value(r, table, memory, element)?;
                let link = Value::object(id);
                close(memory, open.replace((id, value)), link, &mut head)?;
                continue;
            }
            tag => return Err(ArchiveError::Mismatch(format!("list tag {tag}"))),
        };
        close(memory, open.take(), link, &mut head)?;
        return Ok(head);
    }
}

/// Links the open cell (or the list head) to `link`.
fn close(
    memory: &mut Memory,
    open: Option<(ObjectId, Value)>,
    link: Value,
    head: &mut Value,
) -> Result<(), ArchiveError> {
    match open {
        Some((id, value)) => memory
            .set_list_node(id, value, link)
            .ok_or(ArchiveError::Mismatch("list cell".into())),
        None => {
            *head = link;
            Ok(())
        }
    }
}

fn read_instance(r: &mut Reader<'_>, table: &SymbolTable, memory: &mut Memory) -> Result<ObjectId, ArchiveError> {
    let name = r.read_str()?;
    let class = table
        .find_qualified(&name)
        .filter(|&c| table.class(c).is_some())
        .ok_or_else(|| ArchiveError::UnknownClass(name.clone()))?;
    let layout = table
        .class(class)
        .and_then(|c| c.layout())
        .ok_or(ArchiveError::UnknownClass(name))?;
    let id = memory.alloc(ManagedObject::Instance {
        class,
        slots: layout.template.clone().into_boxed_slice(),
        pointers: layout.pointer_slots.clone(),
    });
    r.objects.push(id);
    for (slot, ty) in layout.slot_types.iter().enumerate() {
        let Some(ty) = *ty else { continue };
        let value = read_value(r, table, memory, ty)?;
        memory
            .store_slot(id, slot as u32, value)
            .ok_or(ArchiveError::Mismatch("instance slot".into()))?;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_little_endian() {
        let mut w = Writer::new();
        w.write_u32(0x0102_0304);
        w.write_u16(0x0506);
        assert_eq!(w.into_bytes(), vec![4, 3, 2, 1, 6, 5]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut r = Reader::new(&[1, 2]);
        assert_eq!(r.read_u32(), Err(ArchiveError::UnexpectedEof));
    }
}
