//! Two entries exposed under one name.

use stackbind::{Any, methods};

#[derive(Any)]
pub struct Meter {
    reading: f64,
}

#[methods]
impl Meter {
    #[stackbind(name = "read")]
    pub fn reading(&self) -> f64 {
        self.reading
    }

    #[stackbind(name = "read")]
    pub fn rounded(&self) -> i64 {
        self.reading.round() as i64
    }
}

fn main() {}
