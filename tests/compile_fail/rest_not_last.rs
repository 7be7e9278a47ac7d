//! Rest parameter followed by another argument.

use stackbind::prelude::*;

fn main() {
    let state = State::new();
    let _ = state.wrap_function(|_: &mut State, _rest: Rest, n: i64| n);
}
