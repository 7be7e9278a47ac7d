//! Core of the stackbind workspace.
//!
//! This crate contains three layers:
//!
//! - [`vm`]: the embedded stack VM facade the bindings are written against
//!   (value stack, tables, registry, userdata, closures, protected calls).
//! - [`marshal`]: the stack marshaller, converting Rust values to and from
//!   VM stack slots ([`Push`], [`FromStack`], [`FromArg`]).
//! - [`trampoline`]: wrapping typed Rust functions as VM-callable natives
//!   ([`HostFunction`], [`NativeFunction`]).
//!
//! Type identity for bound types lives in [`any`] and [`type_hash`], and the
//! operator catalogue shared with the binding generator in [`metamethod`].

pub mod any;
pub mod assert_handler;
pub mod error;
pub mod marshal;
pub mod metamethod;
pub mod trampoline;
pub mod type_hash;
pub mod vm;

pub use any::Any;
pub use assert_handler::{AssertAction, AssertHandler, AssertInfo, set_assert_handler};
pub use error::{Error, RegistrationError, Result};
pub use marshal::{
    ArgCursor, ArgKind, BoundRef, FromArg, FromStack, Push, Rest, StackGuard, Upvalue, Vector,
    validate_arg_layout,
};
pub use metamethod::{ArithOp, CompareOp, Metamethod, MetamethodCategory, MetamethodSet};
pub use trampoline::{HostFunction, IntoResults, NativeCallback, NativeFunction};
pub use type_hash::TypeHash;
pub use vm::{
    GLOBALS_INDEX, GcRef, InterruptHandle, Key, LightUserdata, MULTRET, REGISTRY_INDEX,
    Reference, State, StateOptions, TypeTag, UserCell, VECTOR_SIZE, Value, VmString,
    upvalue_index,
};
