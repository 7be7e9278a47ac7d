//! Parameter type with no stack mapping.

use std::time::Instant;

use stackbind::prelude::*;

fn main() {
    let state = State::new();
    let _ = state.wrap_function(|_: &mut State, started: Instant| started.elapsed().as_secs());
}
