//! The embedded stack VM facade.
//!
//! This is the native API the binding layer consumes: a per-state value
//! stack addressed by slot indices, tables, a registry, tagged userdata with
//! destructors, native closures with upvalues, protected calls, persistent
//! references and a mark/sweep collector. It has no bytecode or compiler;
//! host code drives it through [`State`] only.
//!
//! # Stack indices
//!
//! Positive indices count from the current call frame's base (1 is the first
//! argument), negative ones from the top (-1 is the topmost value). The
//! pseudo-indices [`REGISTRY_INDEX`], [`GLOBALS_INDEX`] and
//! [`upvalue_index`] address the registry table, the globals table and the
//! running closure's upvalues.

mod heap;
mod ops;
mod refs;
mod state;
mod table;
mod value;

pub use heap::{GcRef, UserCell};
pub use refs::Reference;
pub use state::{InterruptHandle, State, StateOptions};
pub use value::{Key, LightUserdata, TypeTag, Value, VmString};

pub(crate) use heap::{Function, Object, Userdata};
pub(crate) use table::Table;

/// Width of the VM's native float vector.
#[cfg(not(feature = "vector4"))]
pub const VECTOR_SIZE: usize = 3;

/// Width of the VM's native float vector.
#[cfg(feature = "vector4")]
pub const VECTOR_SIZE: usize = 4;

/// Pseudo-index of the registry table.
pub const REGISTRY_INDEX: i32 = -10_000;

/// Pseudo-index of the globals table.
pub const GLOBALS_INDEX: i32 = -10_002;

/// Result count asking [`State::call`] to keep every result.
pub const MULTRET: i32 = -1;

/// Pseudo-index of the running closure's `n`th upvalue (1-based).
pub const fn upvalue_index(n: i32) -> i32 {
    GLOBALS_INDEX - n
}

/// Whether `index` addresses an upvalue rather than a stack slot.
pub(crate) const fn is_upvalue_index(index: i32) -> bool {
    index < GLOBALS_INDEX
}

/// Whether `index` is any pseudo-index.
pub(crate) const fn is_pseudo_index(index: i32) -> bool {
    index <= REGISTRY_INDEX
}
