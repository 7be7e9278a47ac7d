use std::borrow::Cow;
use std::cell::{Ref, RefMut};
use std::fmt;
use std::rc::Rc;

use super::{FromStack, Push};
use crate::Any;
use crate::error::{Error, Result};
use crate::vm::{Reference, State, UserCell};

/// Handle to a host object owned by the VM.
///
/// Holding a `BoundRef` keeps the userdata alive. Access goes through
/// [`with_ref`](Self::with_ref) / [`with_mut`](Self::with_mut), which fail
/// with [`Error::AlreadyBorrowed`] instead of panicking when the object is
/// already borrowed incompatibly (e.g. `a:combine(a)` with `&mut self`).
///
/// A borrow may outlive the [`State`]; the destructor then runs when the
/// last handle drops.
pub struct BoundRef<T> {
    reference: Reference,
    cell: Rc<UserCell<T>>,
}

impl<T: Any> BoundRef<T> {
    /// Borrow the object for reading.
    pub fn borrow(&self) -> Result<Ref<'_, T>> {
        self.cell.try_borrow().map_err(|_| Error::AlreadyBorrowed {
            type_name: T::type_name(),
        })
    }

    /// Borrow the object for writing.
    pub fn borrow_mut(&self) -> Result<RefMut<'_, T>> {
        self.cell.try_borrow_mut().map_err(|_| Error::AlreadyBorrowed {
            type_name: T::type_name(),
        })
    }

    /// Run `f` with a shared borrow of the object.
    pub fn with_ref<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        Ok(f(&*self.borrow()?))
    }

    /// Run `f` with an exclusive borrow of the object.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        Ok(f(&mut *self.borrow_mut()?))
    }

    /// Clone the object out of the VM.
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.with_ref(T::clone)
    }
}

impl<T> BoundRef<T> {
    /// The reference keeping the userdata alive.
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> Clone for BoundRef<T> {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: Any> fmt::Debug for BoundRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundRef")
            .field("type", &T::type_name())
            .field("reference", &self.reference)
            .finish()
    }
}

/// Accepts only userdata tagged with `T`'s type hash.
impl<T: Any> FromStack for BoundRef<T> {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        if state.userdata_tag(index)? != T::type_hash() {
            return None;
        }
        let cell = state.userdata_cell::<T>(index)?;
        Some(BoundRef {
            reference: state.create_ref(index),
            cell,
        })
    }

    fn type_name() -> Cow<'static, str> {
        T::type_name().into()
    }
}

impl<T> Push for BoundRef<T> {
    fn push(self, state: &mut State) {
        state.push_reference(&self.reference);
    }
}

impl<T> Push for &BoundRef<T> {
    fn push(self, state: &mut State) {
        state.push_reference(&self.reference);
    }
}
