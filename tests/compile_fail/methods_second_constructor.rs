//! Two constructors in one bound type.

use stackbind::{Any, methods};

#[derive(Any)]
pub struct Meter {
    reading: f64,
}

#[methods]
impl Meter {
    pub fn new() -> Self {
        Meter { reading: 0.0 }
    }

    pub fn calibrated(reading: f64) -> Meter {
        Meter { reading }
    }
}

fn main() {}
