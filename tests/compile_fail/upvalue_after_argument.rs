//! Upvalue parameter after a stack argument.

use stackbind::prelude::*;

fn main() {
    let mut state = State::new();
    let _ = state.wrap_function_with(
        |_: &mut State, n: i64, Upvalue(factor): Upvalue<i64>| n * factor,
        3,
    );
}
