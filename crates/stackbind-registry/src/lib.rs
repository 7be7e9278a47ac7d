//! Native object types for the stackbind VM.
//!
//! A host struct becomes a VM object type by implementing [`BoundType`]
//! (normally generated by `#[methods]` from `stackbind-macros`) and being
//! registered once per state with [`register_bound_type`]. Registration
//! builds the type's descriptor, a metatable stored in the VM registry
//! under the type's name, holding:
//!
//! - `__index`, pointing back at the descriptor unless the type supplies its
//!   own `__index` metamethod
//! - `__type`, the type name
//! - every instance and static method under its name
//! - the constructor under `new`
//! - every metamethod in its reserved slot
//!
//! Instances are userdata tagged with the type's [`TypeHash`], carrying the
//! descriptor as metatable and the type's destructor. The collector runs
//! the destructor once the instance becomes unreachable, or when the state
//! is dropped.
//!
//! [`TypeHash`]: stackbind_core::TypeHash

mod bound;
mod construct;
mod registry;

pub use bound::{BoundEntry, BoundType, MethodClassification, Registration};
pub use construct::{construct, constructor, push_bound};
pub use registry::{is_registered, push_descriptor, register_bound_type};
