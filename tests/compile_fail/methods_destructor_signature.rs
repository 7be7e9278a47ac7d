//! Destructors take only `&mut self`.

use stackbind::{Any, methods};

#[derive(Any)]
pub struct Meter {
    reading: f64,
}

#[methods]
impl Meter {
    pub fn __dtor(&mut self, flush: bool) {
        if flush {
            self.reading = 0.0;
        }
    }
}

fn main() {}
