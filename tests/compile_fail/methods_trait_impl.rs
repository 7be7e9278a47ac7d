//! The attribute only applies to inherent impls.

use stackbind::{Any, methods};

#[derive(Any)]
pub struct Meter {
    reading: f64,
}

#[methods]
impl Default for Meter {
    fn default() -> Self {
        Meter { reading: 0.0 }
    }
}

fn main() {}
