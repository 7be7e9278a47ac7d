//! Vector arity other than the VM vector width.

use stackbind::prelude::*;

fn main() {
    let mut state = State::new();
    state.push(Vector([0.0_f32; 2]));
}
