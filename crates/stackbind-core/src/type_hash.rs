//! Deterministic hash-based type identity.
//!
//! [`TypeHash`] is a 64-bit hash computed from a bound type's name. The VM
//! facade stores it as the tag of every userdata allocated for a bound type,
//! so a handle can be validated against the tag before its payload is
//! downcast.
//!
//! # Examples
//!
//! ```
//! use stackbind_core::TypeHash;
//!
//! let a = TypeHash::from_name("Counter");
//! let b = TypeHash::from_name("Counter");
//! assert_eq!(a, b);
//! assert_ne!(a, TypeHash::from_name("Vec2"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain marker mixed into every type hash.
const TYPE_DOMAIN: u64 = 0x2fac10b63a6cc57c;

/// A deterministic 64-bit hash identifying a bound type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Tag of userdata that does not belong to a bound type.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(TYPE_DOMAIN ^ xxh64(name.as_bytes(), 0))
    }

    /// Check if this is the empty tag.
    #[inline]
    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_is_deterministic() {
        assert_eq!(TypeHash::from_name("Counter"), TypeHash::from_name("Counter"));
    }

    #[test]
    fn different_names_differ() {
        assert_ne!(TypeHash::from_name("Counter"), TypeHash::from_name("counter"));
    }

    #[test]
    fn empty_tag() {
        assert!(TypeHash::EMPTY.is_empty());
        assert!(!TypeHash::from_name("").is_empty());
    }

    #[test]
    fn debug_and_display_are_hex() {
        let hash = TypeHash(0x10);
        assert_eq!(format!("{}", hash), "0x0000000000000010");
        assert_eq!(format!("{:?}", hash), "TypeHash(0x0000000000000010)");
    }
}
