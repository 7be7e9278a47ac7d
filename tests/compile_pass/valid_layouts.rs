//! Upvalues first, rest last, single-slot options and full-width vectors.

use stackbind::prelude::*;
use stackbind::VECTOR_SIZE;

fn main() {
    let mut state = State::new();
    let total = state.wrap_function_with(
        |state: &mut State, Upvalue(scale): Upvalue<i64>, first: i64, mut rest: Rest| {
            let mut sum = first;
            while let Some(value) = rest.next::<i64>(state) {
                sum += value?;
            }
            Ok::<_, Error>(sum * scale)
        },
        2,
    );
    let sum: i64 = state.invoke(total, (1, 2, 3)).unwrap();
    assert_eq!(sum, 12);

    state.push(Vector::from([1.0_f32; VECTOR_SIZE]));
    assert_eq!(state.pop::<Vector>(), Some(Vector([1.0; VECTOR_SIZE])));

    state.push(Some(3_i64));
    assert_eq!(state.pop::<Option<i64>>(), Some(Some(3)));
}
