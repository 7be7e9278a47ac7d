//! Binary metamethod with a single parameter.

use stackbind::{Any, methods};

#[derive(Any)]
pub struct Meter {
    reading: f64,
}

#[methods]
impl Meter {
    pub fn __add(&self) -> Meter {
        Meter { reading: self.reading }
    }
}

fn main() {}
