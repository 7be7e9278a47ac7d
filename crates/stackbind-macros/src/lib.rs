//! stackbind proc macros
//!
//! This crate provides the compile-time half of the binding layer:
//!
//! - `#[derive(Any)]` - give a type its VM name and type hash
//! - `#[derive(Table)]` - marshal a struct as a table of its fields
//! - `#[methods]` - expose an inherent impl block as a native object type,
//!   checking metamethod signatures at compile time
//!
//! Generated code refers to `stackbind_core` and `stackbind_registry`, so
//! both must be dependencies of the crate using the macros.
//!
//! # Example
//!
//! ```ignore
//! use stackbind::{Any, methods};
//!
//! #[derive(Any)]
//! pub struct Counter {
//!     value: i64,
//! }
//!
//! #[methods]
//! impl Counter {
//!     pub fn new(value: i64) -> Self {
//!         Counter { value }
//!     }
//!
//!     pub fn increment(&mut self) -> i64 {
//!         self.value += 1;
//!         self.value
//!     }
//!
//!     pub fn __len(&self) -> i64 {
//!         self.value
//!     }
//! }
//! ```

use proc_macro::TokenStream;

mod attrs;
mod derive_any;
mod derive_table;
mod methods;
mod validate;

/// Derive the `Any` trait for a type.
///
/// # Attributes
///
/// - `#[stackbind(name = "...")]` - Override the VM type name
#[proc_macro_derive(Any, attributes(stackbind))]
pub fn derive_any(input: TokenStream) -> TokenStream {
    derive_any::derive_any_impl(input)
}

/// Derive `Push` and `FromStack` for a struct, mapping it to a table.
///
/// Named fields become string keys, tuple fields 1-based integer keys.
/// Every field must be a single-slot value.
///
/// # Field Attributes
///
/// - `#[stackbind(name = "...")]` - Override the key of a named field
/// - `#[stackbind(skip)]` - Leave the field out (read back as `Default`)
///
/// # Example
///
/// ```ignore
/// #[derive(Table)]
/// pub struct Settings {
///     pub width: u32,
///     #[stackbind(name = "title")]
///     pub caption: String,
///     #[stackbind(skip)]
///     pub dirty: bool,
/// }
/// ```
#[proc_macro_derive(Table, attributes(stackbind))]
pub fn derive_table(input: TokenStream) -> TokenStream {
    derive_table::derive_table_impl(input)
}

/// Expose an inherent impl block as a native VM object type.
///
/// Implements `BoundType` (descriptor entries and destructor) and `Push`
/// (by-value instances become userdata) for the impl's type. The type must
/// also implement `Any`.
///
/// # Classification
///
/// - `fn __dtor(&mut self)` - destructor, run when an instance is collected
/// - `__index`, `__newindex`, `__len`, `__tostring`, `__add`, `__sub`,
///   `__mul`, `__div`, `__idiv`, `__mod`, `__pow`, `__unm`, `__eq`, `__lt`,
///   `__le`, `__concat` - metamethods, signature-checked
/// - returns `Self` or `Result<Self, E>` with no receiver and no `Self`
///   parameter - the constructor, installed as `new` (at most one)
/// - takes `self`, `&self`, `&mut self` or a `Self`-typed first parameter -
///   instance method
/// - anything else - static method
///
/// Only `pub` functions are exposed.
///
/// # Method Attributes
///
/// - `#[stackbind(name = "...")]` - Override the entry name
/// - `#[stackbind(skip)]` - Do not expose the method
#[proc_macro_attribute]
pub fn methods(attr: TokenStream, item: TokenStream) -> TokenStream {
    methods::methods_impl(attr, item)
}
