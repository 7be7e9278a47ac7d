//! Metamethods keep their event name.

use stackbind::{Any, methods};

#[derive(Any)]
pub struct Meter {
    reading: f64,
}

#[methods]
impl Meter {
    #[stackbind(name = "length")]
    pub fn __len(&self) -> i64 {
        self.reading as i64
    }
}

fn main() {}
