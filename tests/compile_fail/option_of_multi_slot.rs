//! Option of a value spanning two stack slots.

use stackbind::prelude::*;

fn main() {
    let mut state = State::new();
    state.push((1, 2));
    let _: Option<Option<(i64, i64)>> = state.pop();
}
