//! [`FromStack`] implementations for host types.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{CString, c_void};
use std::hash::{BuildHasher, Hash};

use super::FromStack;
use crate::vm::{LightUserdata, Reference, State, TypeTag, Value, VmString};

// ============================================================================
// Scalars
// ============================================================================

impl FromStack for bool {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        match state.value_at(index)? {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }

    fn type_name() -> Cow<'static, str> {
        "boolean".into()
    }
}

macro_rules! impl_from_stack_int {
    ($($ty:ty),*) => {
        $(
            impl FromStack for $ty {
                fn from_stack(state: &mut State, index: i32) -> Option<Self> {
                    // Out-of-range values are a mismatch, not a truncation.
                    <$ty>::try_from(state.to_integer(index)?).ok()
                }

                fn type_name() -> Cow<'static, str> {
                    "number".into()
                }
            }
        )*
    };
}

impl_from_stack_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromStack for f64 {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        state.to_number(index)
    }

    fn type_name() -> Cow<'static, str> {
        "number".into()
    }
}

impl FromStack for f32 {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        state.to_number(index).map(|n| n as f32)
    }

    fn type_name() -> Cow<'static, str> {
        "number".into()
    }
}

impl FromStack for () {
    const SLOTS: usize = 0;

    fn from_stack(_state: &mut State, _index: i32) -> Option<Self> {
        Some(())
    }

    fn type_name() -> Cow<'static, str> {
        "nothing".into()
    }
}

// ============================================================================
// Strings
// ============================================================================

impl FromStack for VmString {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        state.to_bytes(index)
    }

    fn type_name() -> Cow<'static, str> {
        "string".into()
    }
}

impl FromStack for String {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        state.to_bytes(index)?.to_str().map(str::to_owned)
    }

    fn type_name() -> Cow<'static, str> {
        "string".into()
    }
}

impl FromStack for CString {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        CString::new(state.to_bytes(index)?.as_bytes()).ok()
    }

    fn type_name() -> Cow<'static, str> {
        "string".into()
    }
}

impl FromStack for char {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        let s = state.to_bytes(index)?;
        let mut chars = s.to_str()?.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }

    fn type_name() -> Cow<'static, str> {
        "character".into()
    }
}

// ============================================================================
// Option and tuples
// ============================================================================

/// Nil, no value and a failed conversion all read as `None`.
impl<T: FromStack> FromStack for Option<T> {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        const { assert!(T::SLOTS == 1, "Option<T> requires a single-slot T") };
        if state.is_none_or_nil(index) {
            return Some(None);
        }
        Some(T::from_stack(state, index))
    }

    fn type_name() -> Cow<'static, str> {
        format!("{}?", T::type_name()).into()
    }
}

macro_rules! impl_from_stack_tuple {
    ($($name:ident),+) => {
        impl<$($name: FromStack),+> FromStack for ($($name,)+) {
            const SLOTS: usize = 0 $(+ $name::SLOTS)+;

            #[allow(non_snake_case, unused_assignments)]
            fn from_stack(state: &mut State, index: i32) -> Option<Self> {
                let mut at = index;
                $(
                    let $name = $name::from_stack(state, at)?;
                    at += $name::SLOTS as i32;
                )+
                Some(($($name,)+))
            }

            fn type_name() -> Cow<'static, str> {
                let names: Vec<String> = vec![$($name::type_name().into_owned()),+];
                format!("({})", names.join(", ")).into()
            }
        }
    };
}

impl_from_stack_tuple!(A);
impl_from_stack_tuple!(A, B);
impl_from_stack_tuple!(A, B, C);
impl_from_stack_tuple!(A, B, C, D);
impl_from_stack_tuple!(A, B, C, D, E);
impl_from_stack_tuple!(A, B, C, D, E, F);
impl_from_stack_tuple!(A, B, C, D, E, F, G);
impl_from_stack_tuple!(A, B, C, D, E, F, G, H);
impl_from_stack_tuple!(A, B, C, D, E, F, G, H, I);
impl_from_stack_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_from_stack_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_from_stack_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

// ============================================================================
// Sequences and maps
// ============================================================================

/// Read the table at `index` as its items 1..=border.
#[cfg_attr(feature = "profiling", profiling::function)]
fn read_sequence<T: FromStack>(state: &mut State, index: i32) -> Option<Vec<T>> {
    const { assert!(T::SLOTS == 1, "table elements must be single-slot") };
    if state.type_of(index) != TypeTag::Table {
        return None;
    }
    let len = state.raw_len(index);
    let mut items = Vec::with_capacity(len);
    for i in 1..=len {
        state.raw_get_index(index, i as i64);
        items.push(state.pop::<T>()?);
    }
    Some(items)
}

/// Visit every key/value pair of the table at `index`.
#[cfg_attr(feature = "profiling", profiling::function)]
fn read_map<K: FromStack, V: FromStack>(
    state: &mut State,
    index: i32,
    mut insert: impl FnMut(K, V),
) -> Option<()> {
    const { assert!(K::SLOTS == 1 && V::SLOTS == 1, "map entries must be single-slot") };
    if state.type_of(index) != TypeTag::Table {
        return None;
    }
    let top = state.top();
    state.push_nil();
    let complete = loop {
        match state.next(index) {
            Ok(true) => {}
            Ok(false) => break true,
            Err(_) => break false,
        }
        let key_index = state.top() - 1;
        let key = K::from_stack(state, key_index);
        let value = V::from_stack(state, key_index + 1);
        state.discard(1);
        match (key, value) {
            (Some(key), Some(value)) => insert(key, value),
            _ => break false,
        }
    };
    state.set_top(top);
    complete.then_some(())
}

impl<T: FromStack> FromStack for Vec<T> {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        read_sequence(state, index)
    }

    fn type_name() -> Cow<'static, str> {
        format!("{{{}}}", T::type_name()).into()
    }
}

impl<T: FromStack, const N: usize> FromStack for [T; N] {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        read_sequence(state, index)?.try_into().ok()
    }

    fn type_name() -> Cow<'static, str> {
        format!("{{{}}}", T::type_name()).into()
    }
}

impl<K, V, S> FromStack for HashMap<K, V, S>
where
    K: FromStack + Eq + Hash,
    V: FromStack,
    S: BuildHasher + Default,
{
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        let mut map = HashMap::default();
        read_map(state, index, |k, v| {
            map.insert(k, v);
        })?;
        Some(map)
    }

    fn type_name() -> Cow<'static, str> {
        format!("{{[{}]: {}}}", K::type_name(), V::type_name()).into()
    }
}

impl<K: FromStack + Ord, V: FromStack> FromStack for BTreeMap<K, V> {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        let mut map = BTreeMap::new();
        read_map(state, index, |k, v| {
            map.insert(k, v);
        })?;
        Some(map)
    }

    fn type_name() -> Cow<'static, str> {
        format!("{{[{}]: {}}}", K::type_name(), V::type_name()).into()
    }
}

// ============================================================================
// VM values
// ============================================================================

/// Any value, including nil. Never fails; no value reads as nil.
impl FromStack for Value {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        Some(state.value_at(index).unwrap_or_default())
    }

    fn type_name() -> Cow<'static, str> {
        "any".into()
    }
}

impl FromStack for Reference {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        Some(state.create_ref(index))
    }

    fn type_name() -> Cow<'static, str> {
        "any".into()
    }
}

impl FromStack for LightUserdata {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        state.to_light_userdata(index)
    }

    fn type_name() -> Cow<'static, str> {
        "userdata".into()
    }
}

impl<T> FromStack for *const T {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        state
            .to_light_userdata(index)
            .map(|p| p.0 as *const c_void as *const T)
    }

    fn type_name() -> Cow<'static, str> {
        "userdata".into()
    }
}

impl<T> FromStack for *mut T {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        state.to_light_userdata(index).map(|p| p.0 as *mut T)
    }

    fn type_name() -> Cow<'static, str> {
        "userdata".into()
    }
}
