//! Conversion between host values and VM stack slots.
//!
//! This module provides the traits the rest of the workspace builds on:
//! - [`Push`]: push a host value as one or more stack slots
//! - [`FromStack`]: read a host value back from one or more slots
//! - [`FromArg`]: fetch a host function parameter (stack argument, upvalue
//!   or the rest of the arguments)
//!
//! Every conversion moves exactly `SLOTS` slots: 1 for scalars, strings,
//! tables, functions and references, 0 for `()`, and the sum of the
//! elements for tuples.
//!
//! ## Example
//!
//! ```ignore
//! state.push((1, "two", 3.0));
//! let (a, b, c): (i32, String, f64) = state.pop().unwrap();
//! ```

mod args;
mod bound;
mod from_stack;
mod guard;
mod push;
mod vector;

use std::borrow::Cow;

pub use args::{ArgCursor, ArgKind, FromArg, Rest, Upvalue, validate_arg_layout};
pub use bound::BoundRef;
pub use guard::StackGuard;
pub use vector::Vector;

use crate::error::{Error, Result};
use crate::vm::{State, TypeTag};

/// Push a host value onto the VM stack.
///
/// Pushing never fails: when the VM cannot allocate a table or userdata,
/// nil is pushed in its place so the slot count still holds.
pub trait Push {
    /// Number of stack slots pushed.
    const SLOTS: usize = 1;

    /// Push `self` as `SLOTS` values.
    fn push(self, state: &mut State);
}

/// Read a host value from the VM stack.
pub trait FromStack: Sized {
    /// Number of stack slots read.
    const SLOTS: usize = 1;

    /// Read `Self` from the `SLOTS` slots starting at the absolute (or
    /// pseudo) `index`. Returns `None` if a slot has the wrong type.
    ///
    /// Implementations may push temporaries but must leave the stack as
    /// they found it.
    fn from_stack(state: &mut State, index: i32) -> Option<Self>;

    /// Name of the expected type, for error messages.
    fn type_name() -> Cow<'static, str>;
}

impl State {
    /// Push a host value.
    pub fn push<T: Push>(&mut self, value: T) {
        value.push(self);
    }

    /// Pop a host value from the top `T::SLOTS` slots.
    ///
    /// The slots are removed even when the conversion fails.
    pub fn pop<T: FromStack>(&mut self) -> Option<T> {
        let top = self.top();
        let first = top - T::SLOTS as i32 + 1;
        let value = if first >= 1 {
            T::from_stack(self, first)
        } else {
            None
        };
        self.discard(T::SLOTS.min(top as usize));
        value
    }

    /// Read a host value at `index` without popping it.
    pub fn to_value<T: FromStack>(&mut self, index: i32) -> Option<T> {
        let index = self.abs_index(index);
        T::from_stack(self, index)
    }

    /// Read argument `index` of the running function.
    ///
    /// A mismatch yields [`Error::BadArgument`] naming the 1-based position
    /// and the expected type.
    pub fn check_arg<T: FromStack>(&mut self, index: i32) -> Result<T> {
        let index = self.abs_index(index);
        T::from_stack(self, index).ok_or_else(|| Error::BadArgument {
            position: index.max(0) as usize,
            expected: T::type_name().into_owned(),
            actual: self.type_of(index).name(),
        })
    }

    /// Call the function on top of the stack with `args` and read its
    /// results as `R`.
    pub fn call_function<A: Push, R: FromStack>(&mut self, args: A) -> Result<R> {
        self.push(args);
        self.call(A::SLOTS, R::SLOTS as i32)?;
        self.pop_result()
    }

    /// Push `function` and call it with `args`.
    pub fn invoke<F: Push, A: Push, R: FromStack>(&mut self, function: F, args: A) -> Result<R> {
        self.push(function);
        self.call_function(args)
    }

    /// Call the global function `name`.
    pub fn call_global<A: Push, R: FromStack>(&mut self, name: &str, args: A) -> Result<R> {
        self.get_global(name);
        self.call_function(args)
    }

    /// Call method `name` of the value at `index`, passing the value as
    /// the first argument.
    pub fn call_method<A: Push, R: FromStack>(
        &mut self,
        index: i32,
        name: &str,
        args: A,
    ) -> Result<R> {
        let object = self.abs_index(index);
        self.get_field(object, name)?;
        self.push_copy(object);
        self.push(args);
        self.call(A::SLOTS + 1, R::SLOTS as i32)?;
        self.pop_result()
    }

    fn pop_result<R: FromStack>(&mut self) -> Result<R> {
        let actual = if R::SLOTS == 0 {
            TypeTag::None
        } else {
            self.type_of(-(R::SLOTS as i32))
        };
        self.pop::<R>().ok_or_else(|| Error::BadResult {
            expected: R::type_name().into_owned(),
            actual: actual.name(),
        })
    }

    /// Guard that restores the current top when dropped.
    pub fn guard(&mut self) -> StackGuard<'_> {
        StackGuard::new(self)
    }
}
