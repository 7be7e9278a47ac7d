//! Table layout only exists for structs.

use stackbind::Table;

#[derive(Table)]
pub enum Mode {
    Fast,
    Slow,
}

fn main() {}
