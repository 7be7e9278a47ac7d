//! Collected object storage.
//!
//! Objects live in a slot vector with generation tracking. Freeing a slot
//! bumps its generation, so a [`GcRef`] held past the object's lifetime is
//! detected instead of aliasing whatever reuses the slot.

use std::any::{Any as StdAny, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use super::{Table, Value};
use crate::TypeHash;
use crate::trampoline::NativeCallback;

/// Generational reference to a collected object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GcRef {
    index: u32,
    generation: u32,
}

impl GcRef {
    /// Slot index, used for display addresses.
    pub fn index(self) -> u32 {
        self.index
    }
}

/// A native closure.
pub(crate) struct Function {
    pub(crate) callback: NativeCallback,
    pub(crate) upvalues: Vec<Value>,
}

/// Storage of a userdata value and its pending destructor.
///
/// Dereferences to the `RefCell` handed out through [`BoundRef`]. When the
/// value is still borrowed at finalization, the destructor runs once the
/// last handle to the cell drops.
///
/// [`BoundRef`]: crate::BoundRef
pub struct UserCell<T> {
    value: RefCell<T>,
    dtor: Cell<Option<fn(&mut T)>>,
}

impl<T> UserCell<T> {
    pub(crate) fn new(value: T, dtor: Option<fn(&mut T)>) -> Self {
        UserCell {
            value: RefCell::new(value),
            dtor: Cell::new(dtor),
        }
    }

    /// Run the destructor now, or leave it pending while borrowed.
    fn finalize(&self) {
        let Some(dtor) = self.dtor.take() else {
            return;
        };
        match self.value.try_borrow_mut() {
            Ok(mut value) => dtor(&mut value),
            Err(_) => self.dtor.set(Some(dtor)),
        }
    }
}

impl<T> Deref for UserCell<T> {
    type Target = RefCell<T>;

    fn deref(&self) -> &RefCell<T> {
        &self.value
    }
}

impl<T> Drop for UserCell<T> {
    fn drop(&mut self) {
        if let Some(dtor) = self.dtor.take() {
            dtor(self.value.get_mut());
        }
    }
}

/// Type-erased [`UserCell::finalize`].
pub(crate) fn finalize_cell<T: 'static>(data: &dyn StdAny) {
    if let Some(cell) = data.downcast_ref::<UserCell<T>>() {
        cell.finalize();
    }
}

/// Host value owned by the VM.
pub(crate) struct Userdata {
    /// Concretely an `Rc<UserCell<T>>`.
    pub(crate) data: Rc<dyn StdAny>,
    pub(crate) type_id: TypeId,
    pub(crate) tag: TypeHash,
    pub(crate) metatable: Option<GcRef>,
    pub(crate) finalizer: Option<fn(&dyn StdAny)>,
}

impl Userdata {
    /// Run the destructor if it has not run yet.
    pub(crate) fn finalize(&mut self) {
        if let Some(finalizer) = self.finalizer.take() {
            finalizer(&*self.data);
        }
    }
}

pub(crate) enum Object {
    Table(Table),
    Function(Function),
    Userdata(Userdata),
    /// Slot held for an object under construction.
    Reserved,
}

impl Object {
    fn trace(&self, out: &mut Vec<GcRef>) {
        match self {
            Object::Table(table) => {
                for (key, value) in table.iter() {
                    out.extend(key.to_value().gc_ref());
                    out.extend(value.gc_ref());
                }
                out.extend(table.metatable);
            }
            Object::Function(function) => {
                out.extend(function.upvalues.iter().filter_map(Value::gc_ref));
            }
            Object::Userdata(userdata) => out.extend(userdata.metatable),
            Object::Reserved => {}
        }
    }
}

struct HeapSlot {
    generation: u32,
    object: Option<Object>,
    marked: bool,
}

pub(crate) struct Heap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
    max_objects: Option<usize>,
}

impl Heap {
    pub(crate) fn new(max_objects: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
            max_objects,
        }
    }

    /// Number of live objects, reservations included.
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Allocate an object, or `None` when the object limit is reached.
    pub(crate) fn allocate(&mut self, object: Object) -> Option<GcRef> {
        if self.max_objects.is_some_and(|max| self.live >= max) {
            return None;
        }
        Some(self.insert(object))
    }

    /// Allocate an object regardless of the object limit.
    pub(crate) fn insert(&mut self, object: Object) -> GcRef {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            GcRef {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                object: Some(object),
                marked: false,
            });
            GcRef {
                index,
                generation: 0,
            }
        }
    }

    /// Reserve a slot to be filled once construction succeeds.
    pub(crate) fn reserve(&mut self) -> Option<GcRef> {
        self.allocate(Object::Reserved)
    }

    /// Fill a reserved slot. Returns false if `r` is not a reservation.
    pub(crate) fn fill(&mut self, r: GcRef, object: Object) -> bool {
        match self.get_mut(r) {
            Some(slot @ Object::Reserved) => {
                *slot = object;
                true
            }
            _ => false,
        }
    }

    /// Free a slot immediately, returning its object.
    pub(crate) fn release(&mut self, r: GcRef) -> Option<Object> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(r.index);
        self.live -= 1;
        Some(object)
    }

    pub(crate) fn get(&self, r: GcRef) -> Option<&Object> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.object.as_ref()
    }

    pub(crate) fn get_mut(&mut self, r: GcRef) -> Option<&mut Object> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.object.as_mut()
    }

    pub(crate) fn table(&self, r: GcRef) -> Option<&Table> {
        match self.get(r)? {
            Object::Table(table) => Some(table),
            _ => None,
        }
    }

    pub(crate) fn table_mut(&mut self, r: GcRef) -> Option<&mut Table> {
        match self.get_mut(r)? {
            Object::Table(table) => Some(table),
            _ => None,
        }
    }

    pub(crate) fn function(&self, r: GcRef) -> Option<&Function> {
        match self.get(r)? {
            Object::Function(function) => Some(function),
            _ => None,
        }
    }

    pub(crate) fn userdata(&self, r: GcRef) -> Option<&Userdata> {
        match self.get(r)? {
            Object::Userdata(userdata) => Some(userdata),
            _ => None,
        }
    }

    pub(crate) fn userdata_mut(&mut self, r: GcRef) -> Option<&mut Userdata> {
        match self.get_mut(r)? {
            Object::Userdata(userdata) => Some(userdata),
            _ => None,
        }
    }

    /// Metatable of a table or userdata.
    pub(crate) fn metatable_of(&self, r: GcRef) -> Option<GcRef> {
        match self.get(r)? {
            Object::Table(table) => table.metatable,
            Object::Userdata(userdata) => userdata.metatable,
            _ => None,
        }
    }

    /// Mark everything reachable from `roots`, then free the rest.
    ///
    /// Reservations are always kept. Swept objects are returned so the
    /// caller can finalize them without holding the heap borrowed.
    pub(crate) fn collect(&mut self, roots: Vec<GcRef>) -> Vec<Object> {
        let mut gray = roots;
        while let Some(r) = gray.pop() {
            let Some(slot) = self.slots.get_mut(r.index as usize) else {
                continue;
            };
            if slot.generation != r.generation || slot.marked {
                continue;
            }
            slot.marked = true;
            if let Some(object) = &slot.object {
                object.trace(&mut gray);
            }
        }

        let mut swept = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let marked = std::mem::replace(&mut slot.marked, false);
            let keep = marked || matches!(slot.object, Some(Object::Reserved) | None);
            if keep {
                continue;
            }
            if let Some(object) = slot.object.take() {
                swept.push(object);
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
                self.live -= 1;
            }
        }
        swept
    }

    /// Take every live userdata out of the heap, for state close.
    pub(crate) fn drain_userdata(&mut self) -> Vec<Userdata> {
        let mut drained = Vec::new();
        for slot in &mut self.slots {
            if matches!(slot.object, Some(Object::Userdata(_)))
                && let Some(Object::Userdata(userdata)) = slot.object.take()
            {
                drained.push(userdata);
                slot.generation = slot.generation.wrapping_add(1);
                self.live -= 1;
            }
        }
        drained
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Key;

    fn table() -> Object {
        Object::Table(Table::new())
    }

    #[test]
    fn stale_refs_are_detected() {
        let mut heap = Heap::new(None);
        let a = heap.insert(table());
        assert!(heap.table(a).is_some());

        assert!(heap.release(a).is_some());
        assert!(heap.get(a).is_none());

        let b = heap.insert(table());
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(heap.get(a).is_none());
        assert!(heap.get(b).is_some());
    }

    #[test]
    fn object_limit() {
        let mut heap = Heap::new(Some(1));
        assert!(heap.allocate(table()).is_some());
        assert!(heap.allocate(table()).is_none());
        assert!(heap.reserve().is_none());
        // The limit does not apply to forced inserts.
        heap.insert(table());
        assert_eq!(heap.live(), 2);
    }

    #[test]
    fn reservation_fill_and_release() {
        let mut heap = Heap::new(None);
        let r = heap.reserve().unwrap();
        assert!(matches!(heap.get(r), Some(Object::Reserved)));
        assert!(heap.fill(r, table()));
        assert!(!heap.fill(r, table()));

        let r2 = heap.reserve().unwrap();
        assert!(heap.release(r2).is_some());
        assert_eq!(heap.live(), 1);
    }

    #[test]
    fn collect_keeps_reachable_objects() {
        let mut heap = Heap::new(None);
        let root = heap.insert(table());
        let child = heap.insert(table());
        let orphan = heap.insert(table());
        let reserved = heap.reserve().unwrap();

        heap.table_mut(root)
            .unwrap()
            .set(Key::string("child"), Value::Table(child));

        let swept = heap.collect(vec![root]);
        assert_eq!(swept.len(), 1);
        assert!(heap.get(root).is_some());
        assert!(heap.get(child).is_some());
        assert!(heap.get(orphan).is_none());
        assert!(heap.get(reserved).is_some());
        assert_eq!(heap.live(), 3);
    }

    #[test]
    fn collect_follows_metatables_and_cycles() {
        let mut heap = Heap::new(None);
        let a = heap.insert(table());
        let b = heap.insert(table());
        heap.table_mut(a).unwrap().metatable = Some(b);
        heap.table_mut(b)
            .unwrap()
            .set(Key::string("back"), Value::Table(a));

        assert!(heap.collect(vec![a]).is_empty());
        assert_eq!(heap.collect(Vec::new()).len(), 2);
        assert_eq!(heap.live(), 0);
    }
}
