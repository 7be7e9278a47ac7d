//! Typed marshalling and native object bindings for an embedded stack VM.
//!
//! `stackbind` ties the workspace together:
//!
//! - [`stackbind_core`]: the VM facade ([`State`]), the stack marshaller
//!   ([`Push`], [`FromStack`], [`FromArg`]) and host function trampolines
//!   ([`NativeFunction`])
//! - [`stackbind_registry`]: native object types ([`BoundType`],
//!   [`register_bound_type`])
//! - [`stackbind_macros`]: `#[derive(Any)]`, `#[derive(Table)]` and
//!   `#[methods]`
//!
//! # Example
//!
//! ```ignore
//! use stackbind::prelude::*;
//!
//! let mut state = State::new();
//! let add = state.wrap_function(|_: &mut State, a: i64, b: i64| a + b);
//! state.push(add);
//! state.set_global("add");
//!
//! let sum: i64 = state.call_global("add", (2, 3))?;
//! assert_eq!(sum, 5);
//! ```

pub use stackbind_core::*;
pub use stackbind_registry::{
    BoundEntry, BoundType, MethodClassification, Registration, construct, constructor,
    is_registered, push_bound, push_descriptor, register_bound_type,
};

pub use stackbind_macros::{Any, Table, methods};

/// Commonly used items.
pub mod prelude {
    pub use stackbind_core::{
        Any, BoundRef, Error, FromStack, NativeFunction, Push, Reference, Rest, Result, State,
        StateOptions, TypeTag, Upvalue, Value, Vector,
    };
    pub use stackbind_macros::{Any, Table, methods};
    pub use stackbind_registry::{BoundType, register_bound_type};
}
