//! Integration tests for bound native object types.

use std::cell::Cell;

use stackbind::prelude::*;
use stackbind::{
    ArithOp, CompareOp, Metamethod, RegistrationError, is_registered, push_descriptor,
};

thread_local! {
    static DROPPED: Cell<usize> = const { Cell::new(0) };
}

fn dropped() -> usize {
    DROPPED.with(Cell::get)
}

#[derive(Debug, Clone, PartialEq, Any)]
pub struct Counter {
    value: i64,
}

#[methods]
impl Counter {
    pub fn new(start: i64) -> Result<Counter, String> {
        if start < 0 {
            return Err(format!("negative start: {start}"));
        }
        Ok(Counter { value: start })
    }

    pub fn increment(&mut self, by: Option<i64>) -> i64 {
        self.value += by.unwrap_or(1);
        self.value
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    #[stackbind(name = "describe")]
    pub fn label(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.value)
    }

    pub fn limit() -> i64 {
        1_000
    }

    pub fn __len(&self) -> i64 {
        self.value
    }

    pub fn __tostring(&self) -> String {
        format!("Counter({})", self.value)
    }

    pub fn __eq(&self, other: &Counter) -> bool {
        self.value == other.value
    }

    pub fn __add(&self, other: &Counter) -> Counter {
        Counter {
            value: self.value + other.value,
        }
    }

    pub fn __dtor(&mut self) {
        DROPPED.with(|d| d.set(d.get() + 1));
    }

    #[stackbind(skip)]
    pub fn reset(&mut self) {
        self.value = 0;
    }

    #[allow(dead_code)]
    fn internal(&self) -> i64 {
        self.value * 2
    }
}

/// Call `Counter.new(start)`, leaving the result on the stack.
fn new_counter(state: &mut State, start: i64) -> stackbind::Result<()> {
    assert!(push_descriptor::<Counter>(state));
    state.get_field(-1, "new")?;
    state.remove(-2);
    state.push(start);
    state.call(1, 1)
}

fn counter_at(state: &mut State, index: i32) -> Counter {
    state
        .to_value::<BoundRef<Counter>>(index)
        .expect("counter userdata")
        .get()
        .unwrap()
}

#[test]
fn registration_summary() {
    let mut state = State::new();
    let info = register_bound_type::<Counter>(&mut state).unwrap();

    assert_eq!(info.name, "Counter");
    assert!(info.has_constructor);
    // increment, value, describe, limit
    assert_eq!(info.methods, 4);
    assert!(info.has_metamethod(Metamethod::Len));
    assert!(info.has_metamethod(Metamethod::ToString));
    assert!(info.has_metamethod(Metamethod::Eq));
    assert!(info.has_metamethod(Metamethod::Add));
    assert!(!info.has_metamethod(Metamethod::Index));
    assert!(is_registered::<Counter>(&state));
    assert_eq!(state.top(), 0);
}

#[test]
fn descriptor_holds_only_public_entries() {
    let mut state = State::new();
    register_bound_type::<Counter>(&mut state).unwrap();
    assert!(push_descriptor::<Counter>(&mut state));

    for name in ["new", "increment", "value", "describe", "limit", "__len", "__add"] {
        assert_eq!(state.raw_get_field(1, name), TypeTag::Function, "{name}");
        state.discard(1);
    }
    for name in ["label", "reset", "internal", "__dtor"] {
        assert_eq!(state.raw_get_field(1, name), TypeTag::Nil, "{name}");
        state.discard(1);
    }
    assert_eq!(state.raw_get_field(1, "__index"), TypeTag::Table);
    assert!(state.raw_equal(1, 2));
}

#[test]
fn instance_lifecycle() {
    DROPPED.with(|d| d.set(0));
    {
        let mut state = State::new();
        register_bound_type::<Counter>(&mut state).unwrap();

        new_counter(&mut state, 5).unwrap();
        assert_eq!(state.type_of(1), TypeTag::Userdata);

        let next: i64 = state.call_method(1, "increment", ()).unwrap();
        assert_eq!(next, 6);
        let next: i64 = state.call_method(1, "increment", 10).unwrap();
        assert_eq!(next, 16);
        let value: i64 = state.call_method(1, "value", ()).unwrap();
        assert_eq!(value, 16);
        let text: String = state.call_method(1, "describe", "n=").unwrap();
        assert_eq!(text, "n=16");
        assert_eq!(state.top(), 1);

        state.len(1).unwrap();
        assert_eq!(state.pop::<i64>(), Some(16));
        assert_eq!(state.to_display(1).unwrap(), "Counter(16)");
        assert_eq!(counter_at(&mut state, 1), Counter { value: 16 });

        assert_eq!(dropped(), 0);
    }
    assert_eq!(dropped(), 1);
}

#[test]
fn destructor_follows_a_borrow_that_outlives_the_state() {
    DROPPED.with(|d| d.set(0));
    let mut state = State::new();
    register_bound_type::<Counter>(&mut state).unwrap();
    new_counter(&mut state, 8).unwrap();
    let counter = state.to_value::<BoundRef<Counter>>(1).unwrap();
    let borrowed = counter.borrow().unwrap();

    drop(state);
    assert_eq!(dropped(), 0);
    assert_eq!(borrowed.value, 8);

    drop(borrowed);
    drop(counter);
    assert_eq!(dropped(), 1);
}

#[test]
fn static_methods_need_no_instance() {
    let mut state = State::new();
    register_bound_type::<Counter>(&mut state).unwrap();
    assert!(push_descriptor::<Counter>(&mut state));
    state.get_field(1, "limit").unwrap();
    let limit: i64 = state.call_function(()).unwrap();
    assert_eq!(limit, 1_000);
}

#[test]
fn operators_dispatch_to_metamethods() {
    DROPPED.with(|d| d.set(0));
    {
        let mut state = State::new();
        register_bound_type::<Counter>(&mut state).unwrap();
        new_counter(&mut state, 2).unwrap();
        new_counter(&mut state, 2).unwrap();
        new_counter(&mut state, 3).unwrap();

        assert!(!state.raw_equal(1, 2));
        assert!(state.compare(1, 2, CompareOp::Eq).unwrap());
        assert!(!state.compare(1, 3, CompareOp::Eq).unwrap());

        state.push_copy(1);
        state.push_copy(3);
        state.arith(ArithOp::Add).unwrap();
        assert_eq!(state.top(), 4);
        assert_eq!(counter_at(&mut state, 4), Counter { value: 5 });

        let err = state.compare(1, 3, CompareOp::Lt).unwrap_err();
        assert_eq!(err.to_string(), "attempt to compare userdata with userdata");
    }
    // Three constructed, one produced by __add.
    assert_eq!(dropped(), 4);
}

#[test]
fn failed_constructor_creates_nothing() {
    DROPPED.with(|d| d.set(0));
    let mut state = State::new();
    register_bound_type::<Counter>(&mut state).unwrap();
    let objects = state.object_count();

    let err = new_counter(&mut state, -1).unwrap_err();
    assert_eq!(err, Error::Runtime("negative start: -1".into()));
    assert_eq!(state.top(), 0);
    assert_eq!(state.object_count(), objects);
    drop(state);
    assert_eq!(dropped(), 0);
}

#[derive(Debug, Any)]
pub struct Fragile {
    size: i64,
}

#[methods]
impl Fragile {
    pub fn new(size: i64) -> Fragile {
        assert!(size >= 0, "negative size");
        Fragile { size }
    }

    pub fn size(&self) -> i64 {
        self.size
    }
}

#[test]
fn panicking_constructor_creates_nothing() {
    let mut state = State::new();
    register_bound_type::<Fragile>(&mut state).unwrap();
    let objects = state.object_count();

    for _ in 0..3 {
        assert!(push_descriptor::<Fragile>(&mut state));
        state.get_field(-1, "new").unwrap();
        state.remove(-2);
        state.push(-1);
        let err = state.call(1, 1).unwrap_err();
        assert_eq!(err, Error::Runtime("negative size".into()));
    }
    state.set_top(0);
    state.collect_garbage();
    assert_eq!(state.object_count(), objects);

    let size: i64 = {
        assert!(push_descriptor::<Fragile>(&mut state));
        state.get_field(-1, "new").unwrap();
        state.remove(-2);
        state.push(4);
        state.call(1, 1).unwrap();
        state.call_method(-1, "size", ()).unwrap()
    };
    assert_eq!(size, 4);
}

#[test]
fn collected_instances_run_their_destructor_once() {
    DROPPED.with(|d| d.set(0));
    let mut state = State::new();
    register_bound_type::<Counter>(&mut state).unwrap();
    new_counter(&mut state, 1).unwrap();
    new_counter(&mut state, 2).unwrap();

    state.discard(1);
    state.collect_garbage();
    assert_eq!(dropped(), 1);
    state.collect_garbage();
    assert_eq!(dropped(), 1);

    drop(state);
    assert_eq!(dropped(), 2);
}

#[test]
fn wrong_self_is_a_bad_argument() {
    let mut state = State::new();
    register_bound_type::<Counter>(&mut state).unwrap();
    assert!(push_descriptor::<Counter>(&mut state));
    state.get_field(1, "value").unwrap();
    state.new_table();
    let err = state.call(1, 1).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #1 (Counter expected, got table)");
    assert_eq!(state.top(), 1);
}

#[test]
fn host_values_push_as_instances() {
    let mut state = State::new();
    register_bound_type::<Counter>(&mut state).unwrap();

    state.push(Counter { value: 41 });
    let next: i64 = state.call_method(1, "increment", ()).unwrap();
    assert_eq!(next, 42);

    let peek = state.wrap_function(|_: &mut State, counter: BoundRef<Counter>| {
        counter.with_ref(|c| c.value)
    });
    state.push(peek);
    state.push_copy(1);
    state.call(1, 1).unwrap();
    assert_eq!(state.pop::<i64>(), Some(42));
}

#[test]
fn unregistered_instances_have_no_methods() {
    let mut state = State::new();
    state.push(Counter { value: 1 });
    assert_eq!(state.type_of(1), TypeTag::Userdata);
    let err = state.call_method::<_, i64>(1, "value", ()).unwrap_err();
    assert_eq!(err.to_string(), "attempt to index a userdata value");
}

#[test]
fn second_registration_fails() {
    let mut state = State::new();
    register_bound_type::<Counter>(&mut state).unwrap();
    let err = register_bound_type::<Counter>(&mut state).unwrap_err();
    assert_eq!(err, RegistrationError::DuplicateType("Counter".into()));
    assert_eq!(
        err.to_string(),
        "duplicate registration: type 'Counter' is already registered"
    );
    assert_eq!(state.top(), 0);
}

#[test]
fn exhausted_heap_yields_nil_instances() {
    let mut probe = State::new();
    register_bound_type::<Counter>(&mut probe).unwrap();
    let registered = probe.object_count();

    let mut state = State::with_options(StateOptions::default().with_max_objects(registered + 1));
    register_bound_type::<Counter>(&mut state).unwrap();
    new_counter(&mut state, 1).unwrap();
    assert_eq!(state.type_of(1), TypeTag::Userdata);
    new_counter(&mut state, 2).unwrap();
    assert_eq!(state.type_of(2), TypeTag::Nil);
}

#[derive(Debug, Any)]
#[stackbind(name = "Temperature")]
pub struct Celsius(f64);

#[methods]
impl Celsius {
    pub fn __index(&self, key: String) -> Option<f64> {
        match key.as_str() {
            "kelvin" => Some(self.0 + 273.15),
            "fahrenheit" => Some(self.0 * 9.0 / 5.0 + 32.0),
            _ => None,
        }
    }

    pub fn __newindex(&mut self, key: String, value: f64) {
        if key == "kelvin" {
            self.0 = value - 273.15;
        }
    }

    pub fn __unm(&self) -> Celsius {
        Celsius(-self.0)
    }
}

#[test]
fn custom_index_and_newindex() {
    let mut state = State::new();
    let info = register_bound_type::<Celsius>(&mut state).unwrap();
    assert_eq!(info.name, "Temperature");
    assert!(!info.has_constructor);
    assert_eq!(info.methods, 0);

    state.push(Celsius(0.0));
    assert_eq!(state.get_field(1, "kelvin").unwrap(), TypeTag::Number);
    assert_eq!(state.pop::<f64>(), Some(273.15));
    assert_eq!(state.get_field(1, "fahrenheit").unwrap(), TypeTag::Number);
    assert_eq!(state.pop::<f64>(), Some(32.0));
    assert_eq!(state.get_field(1, "rankine").unwrap(), TypeTag::Nil);
    state.discard(1);

    state.push(0.0);
    state.set_field(1, "kelvin").unwrap();
    assert_eq!(state.get_field(1, "kelvin").unwrap(), TypeTag::Number);
    assert_eq!(state.pop::<f64>(), Some(0.0));
    assert_eq!(state.top(), 1);

    state.push_copy(1);
    state.arith(ArithOp::Unm).unwrap();
    assert_eq!(state.userdata_tag(-1), Some(Celsius::type_hash()));
    assert!(state.to_display(-1).unwrap().starts_with("Temperature: "));
    assert_eq!(state.get_field(-1, "kelvin").unwrap(), TypeTag::Number);
    assert_eq!(state.pop::<f64>(), Some(546.3));
}

#[derive(Debug, Clone, Any)]
pub struct Gauge {
    level: i64,
}

#[methods]
impl Gauge {
    pub fn __eq(&self, other: &Gauge) -> bool {
        self.level == other.level
    }
}

#[test]
fn equality_across_bound_types_is_false() {
    let mut state = State::new();
    register_bound_type::<Counter>(&mut state).unwrap();
    register_bound_type::<Gauge>(&mut state).unwrap();
    register_bound_type::<Celsius>(&mut state).unwrap();

    state.push(Counter { value: 3 });
    state.push(Gauge { level: 3 });
    state.push(Gauge { level: 3 });
    state.push(Celsius(3.0));

    assert!(!state.compare(1, 2, CompareOp::Eq).unwrap());
    assert!(!state.compare(2, 1, CompareOp::Eq).unwrap());
    assert!(state.compare(2, 3, CompareOp::Eq).unwrap());
    assert!(!state.compare(1, 4, CompareOp::Eq).unwrap());
    assert!(!state.compare(4, 2, CompareOp::Eq).unwrap());
    assert_eq!(state.top(), 4);
}
