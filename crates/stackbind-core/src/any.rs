//! Any trait for bindable types.
//!
//! Every host type exposed to the VM as a bound object implements [`Any`],
//! which supplies the name its descriptor is registered under and the
//! [`TypeHash`] its userdata is tagged with.
//!
//! # Example
//!
//! ```
//! use stackbind_core::{Any, TypeHash};
//!
//! struct Counter {
//!     value: i64,
//! }
//!
//! impl Any for Counter {
//!     fn type_name() -> &'static str {
//!         "Counter"
//!     }
//! }
//!
//! assert_eq!(Counter::type_hash(), TypeHash::from_name("Counter"));
//! ```
//!
//! With the derive macro from `stackbind-macros`:
//!
//! ```ignore
//! #[derive(Any)]
//! #[stackbind(name = "Counter")]
//! pub struct Counter {
//!     value: i64,
//! }
//! ```

use crate::TypeHash;

/// Trait for types that can be bound into a VM state.
pub trait Any: 'static {
    /// The name scripts see, and the registry key of the type's descriptor.
    fn type_name() -> &'static str;

    /// The tag carried by userdata of this type.
    fn type_hash() -> TypeHash {
        TypeHash::from_name(Self::type_name())
    }
}
