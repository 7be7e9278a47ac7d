//! Dynamically typed VM values.

use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use ordered_float::OrderedFloat;

use super::{GcRef, VECTOR_SIZE};

/// Dynamic type tag of a stack slot.
///
/// `None` is reported for indices past the top of the stack, which lets a
/// caller tell an absent argument from an explicit nil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum TypeTag {
    None = -1,
    Nil = 0,
    Boolean = 1,
    LightUserdata = 2,
    Number = 3,
    Vector = 4,
    String = 5,
    Table = 6,
    Function = 7,
    Userdata = 8,
}

impl TypeTag {
    /// Human-readable type name, as used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            TypeTag::None => "no value",
            TypeTag::Nil => "nil",
            TypeTag::Boolean => "boolean",
            TypeTag::LightUserdata | TypeTag::Userdata => "userdata",
            TypeTag::Number => "number",
            TypeTag::Vector => "vector",
            TypeTag::String => "string",
            TypeTag::Table => "table",
            TypeTag::Function => "function",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable, shared VM byte string.
///
/// VM strings are byte sequences; they are not required to be UTF-8.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VmString(Rc<[u8]>);

impl VmString {
    /// Create a string from raw bytes.
    pub fn new(bytes: &[u8]) -> Self {
        VmString(Rc::from(bytes))
    }

    /// The string's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The string as UTF-8, if it is valid UTF-8.
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for VmString {
    fn from(s: &str) -> Self {
        VmString::new(s.as_bytes())
    }
}

impl From<&[u8]> for VmString {
    fn from(bytes: &[u8]) -> Self {
        VmString::new(bytes)
    }
}

impl fmt::Debug for VmString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for VmString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// An unmanaged pointer visible to the VM.
///
/// Light userdata is invisible to the collector; whoever pushes it owns
/// the pointee's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightUserdata(pub *mut c_void);

/// A dynamically typed VM value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    /// Integral number.
    Integer(i64),
    /// Floating-point number.
    Number(f64),
    Vector([f32; VECTOR_SIZE]),
    String(VmString),
    Table(GcRef),
    Function(GcRef),
    Userdata(GcRef),
    LightUserdata(LightUserdata),
}

impl Value {
    /// The value's dynamic type tag.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Nil => TypeTag::Nil,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Integer(_) | Value::Number(_) => TypeTag::Number,
            Value::Vector(_) => TypeTag::Vector,
            Value::String(_) => TypeTag::String,
            Value::Table(_) => TypeTag::Table,
            Value::Function(_) => TypeTag::Function,
            Value::Userdata(_) => TypeTag::Userdata,
            Value::LightUserdata(_) => TypeTag::LightUserdata,
        }
    }

    /// The value's type name.
    pub fn type_name(&self) -> &'static str {
        self.type_tag().name()
    }

    /// Check if the value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Truthiness: everything except nil and false is true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// The value as a float, if it is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The heap object this value refers to, if any.
    pub fn gc_ref(&self) -> Option<GcRef> {
        match self {
            Value::Table(r) | Value::Function(r) | Value::Userdata(r) => Some(*r),
            _ => None,
        }
    }

    /// Raw equality: no metamethods, integers and floats compare numerically.
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Integer(_) | Value::Number(_), Value::Integer(_) | Value::Number(_)) => {
                self.as_number() == other.as_number()
            }
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b))
            | (Value::Function(a), Value::Function(b))
            | (Value::Userdata(a), Value::Userdata(b)) => a == b,
            (Value::LightUserdata(a), Value::LightUserdata(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(VmString::from(s))
    }
}

/// A hashable table key.
///
/// Floats with an exact integer value are normalized to [`Key::Integer`],
/// so `t[1]` and `t[1.0]` address the same entry. Nil and NaN are not
/// valid keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Boolean(bool),
    Integer(i64),
    Number(OrderedFloat<f64>),
    Vector([OrderedFloat<f32>; VECTOR_SIZE]),
    String(VmString),
    Table(GcRef),
    Function(GcRef),
    Userdata(GcRef),
    LightUserdata(LightUserdata),
}

impl Key {
    /// Convert a value to a key, or `None` for nil and NaN.
    pub fn from_value(value: &Value) -> Option<Key> {
        Some(match value {
            Value::Nil => return None,
            Value::Boolean(b) => Key::Boolean(*b),
            Value::Integer(i) => Key::Integer(*i),
            Value::Number(n) => {
                if n.is_nan() {
                    return None;
                }
                match float_to_integer(*n) {
                    Some(i) => Key::Integer(i),
                    None => Key::Number(OrderedFloat(*n)),
                }
            }
            Value::Vector(v) => Key::Vector(v.map(OrderedFloat)),
            Value::String(s) => Key::String(s.clone()),
            Value::Table(r) => Key::Table(*r),
            Value::Function(r) => Key::Function(*r),
            Value::Userdata(r) => Key::Userdata(*r),
            Value::LightUserdata(p) => Key::LightUserdata(*p),
        })
    }

    /// A string key.
    pub fn string(s: &str) -> Key {
        Key::String(VmString::from(s))
    }

    /// Convert the key back to a value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Boolean(b) => Value::Boolean(*b),
            Key::Integer(i) => Value::Integer(*i),
            Key::Number(n) => Value::Number(n.0),
            Key::Vector(v) => Value::Vector(v.map(|c| c.0)),
            Key::String(s) => Value::String(s.clone()),
            Key::Table(r) => Value::Table(*r),
            Key::Function(r) => Value::Function(*r),
            Key::Userdata(r) => Value::Userdata(*r),
            Key::LightUserdata(p) => Value::LightUserdata(*p),
        }
    }
}

/// Exact float-to-integer conversion.
pub(crate) fn float_to_integer(n: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or beyond it overflows i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if n.fract() == 0.0 && n >= -LIMIT && n < LIMIT {
        Some(n as i64)
    } else {
        None
    }
}
