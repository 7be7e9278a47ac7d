use std::borrow::Cow;

use super::{FromStack, Push};
use crate::vm::{State, VECTOR_SIZE};

/// A native VM float vector.
///
/// The arity must equal [`VECTOR_SIZE`]; any other `N` fails to compile
/// when the vector is pushed or read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector<const N: usize = VECTOR_SIZE>(pub [f32; N]);

impl<const N: usize> Vector<N> {
    const ARITY_MATCHES: () = assert!(N == VECTOR_SIZE, "vector arity must match the VM vector width");
}

impl<const N: usize> From<[f32; N]> for Vector<N> {
    fn from(components: [f32; N]) -> Self {
        Vector(components)
    }
}

impl<const N: usize> Push for Vector<N> {
    fn push(self, state: &mut State) {
        let () = Self::ARITY_MATCHES;
        let mut components = [0.0; VECTOR_SIZE];
        components.copy_from_slice(&self.0);
        state.push_vector(components);
    }
}

impl<const N: usize> FromStack for Vector<N> {
    fn from_stack(state: &mut State, index: i32) -> Option<Self> {
        let () = Self::ARITY_MATCHES;
        let components = state.to_vector(index)?;
        let mut out = [0.0; N];
        out.copy_from_slice(&components);
        Some(Vector(out))
    }

    fn type_name() -> Cow<'static, str> {
        "vector".into()
    }
}
