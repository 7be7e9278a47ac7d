//! [`Push`] implementations for host types.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{CStr, CString, c_void};
use std::hash::BuildHasher;

use super::Push;
use crate::vm::{LightUserdata, Reference, State, Value, VmString};

// ============================================================================
// Scalars
// ============================================================================

impl Push for bool {
    fn push(self, state: &mut State) {
        state.push_boolean(self);
    }
}

macro_rules! impl_push_int {
    ($($ty:ty),*) => {
        $(
            impl Push for $ty {
                fn push(self, state: &mut State) {
                    state.push_integer(self as i64);
                }
            }
        )*
    };
}

impl_push_int!(i8, i16, i32, i64, isize, u8, u16, u32);

// u64 and usize above i64::MAX do not fit the integer slot and are pushed
// as the nearest float number.
impl Push for u64 {
    fn push(self, state: &mut State) {
        match i64::try_from(self) {
            Ok(n) => state.push_integer(n),
            Err(_) => state.push_number(self as f64),
        }
    }
}

impl Push for usize {
    fn push(self, state: &mut State) {
        (self as u64).push(state);
    }
}

impl Push for f32 {
    fn push(self, state: &mut State) {
        state.push_number(self as f64);
    }
}

impl Push for f64 {
    fn push(self, state: &mut State) {
        state.push_number(self);
    }
}

impl Push for () {
    const SLOTS: usize = 0;

    fn push(self, _state: &mut State) {}
}

// ============================================================================
// Strings
// ============================================================================

impl Push for &str {
    fn push(self, state: &mut State) {
        state.push_lstring(self.as_bytes());
    }
}

impl Push for String {
    fn push(self, state: &mut State) {
        state.push_lstring(self.as_bytes());
    }
}

impl Push for &String {
    fn push(self, state: &mut State) {
        state.push_lstring(self.as_bytes());
    }
}

impl Push for Cow<'_, str> {
    fn push(self, state: &mut State) {
        state.push_lstring(self.as_bytes());
    }
}

impl Push for char {
    fn push(self, state: &mut State) {
        let mut buf = [0u8; 4];
        state.push_lstring(self.encode_utf8(&mut buf).as_bytes());
    }
}

impl Push for VmString {
    fn push(self, state: &mut State) {
        state.push_value(Value::String(self));
    }
}

impl Push for &CStr {
    fn push(self, state: &mut State) {
        state.push_cstring(self);
    }
}

impl Push for CString {
    fn push(self, state: &mut State) {
        state.push_cstring(&self);
    }
}

// ============================================================================
// Option and tuples
// ============================================================================

impl<T: Push> Push for Option<T> {
    fn push(self, state: &mut State) {
        const { assert!(T::SLOTS == 1, "Option<T> requires a single-slot T") };
        match self {
            Some(value) => value.push(state),
            None => state.push_nil(),
        }
    }
}

macro_rules! impl_push_tuple {
    ($($name:ident),+) => {
        impl<$($name: Push),+> Push for ($($name,)+) {
            const SLOTS: usize = 0 $(+ $name::SLOTS)+;

            #[allow(non_snake_case)]
            fn push(self, state: &mut State) {
                let ($($name,)+) = self;
                $($name.push(state);)+
            }
        }
    };
}

impl_push_tuple!(A);
impl_push_tuple!(A, B);
impl_push_tuple!(A, B, C);
impl_push_tuple!(A, B, C, D);
impl_push_tuple!(A, B, C, D, E);
impl_push_tuple!(A, B, C, D, E, F);
impl_push_tuple!(A, B, C, D, E, F, G);
impl_push_tuple!(A, B, C, D, E, F, G, H);
impl_push_tuple!(A, B, C, D, E, F, G, H, I);
impl_push_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_push_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_push_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

// ============================================================================
// Sequences and maps
// ============================================================================

/// Push a table with the items at keys 1..=n.
#[cfg_attr(feature = "profiling", profiling::function)]
fn push_sequence<T: Push>(state: &mut State, items: impl ExactSizeIterator<Item = T>) {
    const { assert!(T::SLOTS == 1, "table elements must be single-slot") };
    if !state.create_table(items.len(), 0) {
        return;
    }
    for (i, item) in items.enumerate() {
        item.push(state);
        state.raw_set_index(-2, i as i64 + 1);
    }
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn push_map<K: Push, V: Push>(state: &mut State, entries: impl ExactSizeIterator<Item = (K, V)>) {
    const { assert!(K::SLOTS == 1 && V::SLOTS == 1, "map entries must be single-slot") };
    if !state.create_table(0, entries.len()) {
        return;
    }
    for (key, value) in entries {
        key.push(state);
        value.push(state);
        let stored = state.raw_set(-3).is_ok();
        crate::vm_check!(stored, "push_map");
    }
}

impl<T: Push> Push for Vec<T> {
    fn push(self, state: &mut State) {
        push_sequence(state, self.into_iter());
    }
}

impl<T: Push + Clone> Push for &[T] {
    fn push(self, state: &mut State) {
        push_sequence(state, self.iter().cloned());
    }
}

impl<T: Push, const N: usize> Push for [T; N] {
    fn push(self, state: &mut State) {
        push_sequence(state, self.into_iter());
    }
}

/// An entry whose key pushes as nil or NaN cannot be stored; it is reported
/// through the assert handler and left out of the table.
impl<K: Push, V: Push, S: BuildHasher> Push for HashMap<K, V, S> {
    fn push(self, state: &mut State) {
        push_map(state, self.into_iter());
    }
}

/// Keys that push as nil or NaN are reported like those of `HashMap`.
impl<K: Push, V: Push> Push for BTreeMap<K, V> {
    fn push(self, state: &mut State) {
        push_map(state, self.into_iter());
    }
}

// ============================================================================
// VM values
// ============================================================================

impl Push for Value {
    fn push(self, state: &mut State) {
        state.push_value(self);
    }
}

impl Push for &Value {
    fn push(self, state: &mut State) {
        state.push_value(self.clone());
    }
}

impl Push for Reference {
    fn push(self, state: &mut State) {
        state.push_reference(&self);
    }
}

impl Push for &Reference {
    fn push(self, state: &mut State) {
        state.push_reference(self);
    }
}

impl Push for LightUserdata {
    fn push(self, state: &mut State) {
        state.push_value(Value::LightUserdata(self));
    }
}

impl<T> Push for *const T {
    fn push(self, state: &mut State) {
        state.push_light_userdata(self as *mut c_void);
    }
}

impl<T> Push for *mut T {
    fn push(self, state: &mut State) {
        state.push_light_userdata(self as *mut c_void);
    }
}
