//! Persistent references.
//!
//! A [`Reference`] keeps a VM value alive across calls. The state owns the
//! reference table; every `Reference` shares it and frees its slot on drop.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::Value;

#[derive(Debug, Default)]
pub(crate) struct RefSlots {
    values: Vec<Option<Value>>,
    free: Vec<usize>,
    live: usize,
}

impl RefSlots {
    pub(crate) fn insert(&mut self, value: Value) -> i32 {
        self.live += 1;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.values[slot] = Some(value);
                slot
            }
            None => {
                self.values.push(Some(value));
                self.values.len() - 1
            }
        };
        slot as i32 + 1
    }

    pub(crate) fn get(&self, id: i32) -> Option<&Value> {
        let slot = usize::try_from(id).ok()?.checked_sub(1)?;
        self.values.get(slot)?.as_ref()
    }

    fn remove(&mut self, id: i32) {
        let Some(slot) = usize::try_from(id).ok().and_then(|i| i.checked_sub(1)) else {
            return;
        };
        if let Some(entry) = self.values.get_mut(slot)
            && entry.take().is_some()
        {
            self.free.push(slot);
            self.live -= 1;
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().flatten()
    }
}

/// Owned handle to a value in a state's reference table.
///
/// Dropping the reference releases its slot; [`Reference::release`] does
/// the same explicitly. An empty reference (created from nil) pushes nil.
pub struct Reference {
    id: i32,
    slots: Option<Rc<RefCell<RefSlots>>>,
}

impl Reference {
    pub(crate) fn new(id: i32, slots: Rc<RefCell<RefSlots>>) -> Self {
        Self {
            id,
            slots: Some(slots),
        }
    }

    /// A reference to nothing.
    pub fn empty() -> Self {
        Self { id: 0, slots: None }
    }

    /// Check if this reference holds no value.
    pub fn is_empty(&self) -> bool {
        self.slots.is_none()
    }

    /// Slot id in the reference table (0 for an empty reference).
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Release the slot now.
    pub fn release(self) {
        drop(self);
    }

    /// The referenced value, if this reference belongs to `slots`.
    pub(crate) fn value_in(&self, slots: &Rc<RefCell<RefSlots>>) -> Option<Value> {
        let own = self.slots.as_ref()?;
        if !Rc::ptr_eq(own, slots) {
            return None;
        }
        own.borrow().get(self.id).cloned()
    }
}

impl Default for Reference {
    fn default() -> Self {
        Self::empty()
    }
}

impl Clone for Reference {
    fn clone(&self) -> Self {
        let Some(slots) = &self.slots else {
            return Self::empty();
        };
        let value = slots.borrow().get(self.id).cloned();
        match value {
            Some(value) => {
                let id = slots.borrow_mut().insert(value);
                Self::new(id, Rc::clone(slots))
            }
            None => Self::empty(),
        }
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.take() {
            slots.borrow_mut().remove(self.id);
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Reference(empty)")
        } else {
            write!(f, "Reference({})", self.id)
        }
    }
}
