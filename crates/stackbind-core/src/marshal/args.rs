//! Host function parameter fetching.

use std::ops::{Deref, DerefMut};

use super::FromStack;
use crate::error::{Error, Result};
use crate::vm::{State, Value, upvalue_index};

/// Where a parameter comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// The next positional stack argument.
    Stack,
    /// The next closure upvalue.
    Upvalue,
    /// All remaining stack arguments.
    Rest,
}

/// Check a parameter layout: upvalues lead, and at most one [`Rest`]
/// comes last.
pub const fn validate_arg_layout(kinds: &[ArgKind]) -> bool {
    let mut seen_argument = false;
    let mut i = 0;
    while i < kinds.len() {
        match kinds[i] {
            ArgKind::Upvalue => {
                if seen_argument {
                    return false;
                }
            }
            ArgKind::Rest => {
                if i + 1 != kinds.len() {
                    return false;
                }
                seen_argument = true;
            }
            ArgKind::Stack => seen_argument = true,
        }
        i += 1;
    }
    true
}

/// Position of the next argument and upvalue to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgCursor {
    next_arg: i32,
    next_upvalue: i32,
}

impl ArgCursor {
    pub fn new() -> Self {
        Self {
            next_arg: 1,
            next_upvalue: 1,
        }
    }

    /// Claim `slots` stack arguments, returning the first position.
    pub fn take_args(&mut self, slots: usize) -> i32 {
        let index = self.next_arg;
        self.next_arg += slots as i32;
        index
    }

    /// Claim the next upvalue, returning its 1-based number.
    pub fn take_upvalue(&mut self) -> i32 {
        let n = self.next_upvalue;
        self.next_upvalue += 1;
        n
    }
}

impl Default for ArgCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// A value a host function can take as a parameter.
pub trait FromArg: Sized {
    /// Where the parameter is fetched from.
    const KIND: ArgKind = ArgKind::Stack;

    /// Fetch the parameter, advancing `cursor`.
    fn from_arg(state: &mut State, cursor: &mut ArgCursor) -> Result<Self>;
}

impl<T: FromStack> FromArg for T {
    fn from_arg(state: &mut State, cursor: &mut ArgCursor) -> Result<Self> {
        let index = cursor.take_args(T::SLOTS);
        state.check_arg(index)
    }
}

/// A parameter read from the running closure's upvalues.
///
/// Upvalue parameters must precede every stack parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Upvalue<T>(pub T);

impl<T> Upvalue<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Upvalue<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Upvalue<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: FromStack> FromArg for Upvalue<T> {
    const KIND: ArgKind = ArgKind::Upvalue;

    fn from_arg(state: &mut State, cursor: &mut ArgCursor) -> Result<Self> {
        const { assert!(T::SLOTS == 1, "upvalues are single-slot") };
        let n = cursor.take_upvalue();
        let index = upvalue_index(n);
        T::from_stack(state, index)
            .map(Upvalue)
            .ok_or_else(|| Error::BadUpvalue {
                position: n as usize,
                expected: T::type_name().into_owned(),
                actual: state.type_of(index).name(),
            })
    }
}

/// The remaining arguments of a call, as a cursor.
///
/// Fetching a `Rest` does not copy the arguments; values are converted on
/// demand with [`Rest::next`]. [`Rest::reset`] restarts the iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rest {
    base: i32,
    index: i32,
    count: i32,
}

impl Rest {
    /// Total number of arguments covered.
    pub fn count(&self) -> usize {
        self.count as usize
    }

    /// Arguments not yet consumed.
    pub fn remaining(&self) -> usize {
        (self.count - self.index).max(0) as usize
    }

    /// Stack position of the first covered argument.
    pub fn base(&self) -> i32 {
        self.base
    }

    /// Restart from the first argument.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Convert the next argument(s), or `None` when exhausted.
    pub fn next<T: FromStack>(&mut self, state: &mut State) -> Option<Result<T>> {
        if self.index >= self.count {
            return None;
        }
        let position = self.base + self.index;
        self.index += T::SLOTS.max(1) as i32;
        Some(state.check_arg(position))
    }

    /// The remaining arguments as raw values.
    pub fn values<'s>(&self, state: &'s State) -> impl Iterator<Item = Value> + 's {
        let (start, end) = (self.base + self.index, self.base + self.count);
        (start..end).map(move |i| state.value_at(i).unwrap_or_default())
    }
}

impl FromArg for Rest {
    const KIND: ArgKind = ArgKind::Rest;

    fn from_arg(state: &mut State, cursor: &mut ArgCursor) -> Result<Self> {
        let base = cursor.take_args(0);
        let count = (state.top() - base + 1).max(0);
        cursor.take_args(count as usize);
        Ok(Rest {
            base,
            index: 0,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts() {
        use ArgKind::*;
        assert!(validate_arg_layout(&[]));
        assert!(validate_arg_layout(&[Upvalue, Upvalue, Stack, Rest]));
        assert!(validate_arg_layout(&[Rest]));
        assert!(!validate_arg_layout(&[Stack, Upvalue]));
        assert!(!validate_arg_layout(&[Rest, Stack]));
        assert!(!validate_arg_layout(&[Rest, Rest]));
    }

    #[test]
    fn layout_is_usable_in_const_context() {
        const OK: bool = validate_arg_layout(&[ArgKind::Upvalue, ArgKind::Stack]);
        assert!(OK);
    }

    #[test]
    fn cursor_advances_by_slots() {
        let mut state = State::new();
        state.push((1, 2, "x"));
        let mut cursor = ArgCursor::new();
        let pair = <(i32, i32)>::from_arg(&mut state, &mut cursor).unwrap();
        assert_eq!(pair, (1, 2));
        let s = String::from_arg(&mut state, &mut cursor).unwrap();
        assert_eq!(s, "x");
        let err = bool::from_arg(&mut state, &mut cursor).unwrap_err();
        assert_eq!(
            err.to_string(),
            "bad argument #4 (boolean expected, got no value)"
        );
    }

    #[test]
    fn rest_iterates_and_resets() {
        let mut state = State::new();
        state.push((10, 20, "thirty"));
        let mut cursor = ArgCursor::new();
        let first = i32::from_arg(&mut state, &mut cursor).unwrap();
        let mut rest = Rest::from_arg(&mut state, &mut cursor).unwrap();
        assert_eq!(first, 10);
        assert_eq!(rest.count(), 2);

        assert_eq!(rest.next::<i32>(&mut state), Some(Ok(20)));
        let err = rest.next::<i32>(&mut state).unwrap().unwrap_err();
        assert!(matches!(err, Error::BadArgument { position: 3, .. }));
        assert!(rest.next::<i32>(&mut state).is_none());

        rest.reset();
        assert_eq!(rest.remaining(), 2);
        assert_eq!(rest.values(&state).count(), 2);
    }

    #[test]
    fn empty_rest() {
        let mut state = State::new();
        let mut cursor = ArgCursor::new();
        let mut rest = Rest::from_arg(&mut state, &mut cursor).unwrap();
        assert_eq!(rest.count(), 0);
        assert!(rest.next::<Value>(&mut state).is_none());
    }
}
