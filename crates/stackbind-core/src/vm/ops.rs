//! Metamethod-aware operations.
//!
//! Indexing, arithmetic, comparison, length and string conversion fall back to the operand's metatable when the primitive
//! operation is not defined for it.

use super::{State, TypeTag, Value};
use crate::error::{Error, Result};
use crate::metamethod::{ArithOp, CompareOp, Metamethod};

/// Maximum `__index` / `__newindex` indirections before giving up.
const MAX_META_CHAIN: usize = 100;

impl State {
    /// A field of the value's metatable, if present and non-nil.
    pub(crate) fn metafield(&self, value: &Value, event: &str) -> Option<Value> {
        let metatable = value.gc_ref().and_then(|r| self.heap.metatable_of(r))?;
        let handler = self.heap.table(metatable)?.get_str(event);
        (!handler.is_nil()).then_some(handler)
    }

    fn call_handler(&mut self, handler: Value, args: &[Value]) -> Result<Value> {
        self.push_value(handler);
        for arg in args {
            self.push_value(arg.clone());
        }
        self.call(args.len(), 1)?;
        Ok(self.take_top())
    }

    pub(crate) fn index_value(&mut self, object: Value, key: Value) -> Result<Value> {
        let mut current = object;
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let raw = self.raw_get_value(*t, &key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    match self.metafield(&current, Metamethod::Index.name()) {
                        Some(handler) => handler,
                        None => return Ok(Value::Nil),
                    }
                }
                _ => match self.metafield(&current, Metamethod::Index.name()) {
                    Some(handler) => handler,
                    None => {
                        return Err(Error::InvalidOperation {
                            operation: "index",
                            type_name: current.type_name(),
                        });
                    }
                },
            };
            if let Value::Function(_) = handler {
                return self.call_handler(handler, &[current, key]);
            }
            current = handler;
        }
        Err(Error::runtime("'__index' chain too long; possible loop"))
    }

    pub(crate) fn new_index_value(&mut self, object: Value, key: Value, value: Value) -> Result<()> {
        let mut current = object;
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let t = *t;
                    let existing = self.raw_get_value(t, &key);
                    match self.metafield(&current, Metamethod::NewIndex.name()) {
                        Some(handler) if existing.is_nil() => handler,
                        _ => return self.raw_set_value(t, key, value),
                    }
                }
                _ => match self.metafield(&current, Metamethod::NewIndex.name()) {
                    Some(handler) => handler,
                    None => {
                        return Err(Error::InvalidOperation {
                            operation: "index",
                            type_name: current.type_name(),
                        });
                    }
                },
            };
            if let Value::Function(_) = handler {
                self.push_value(handler);
                self.push_value(current);
                self.push_value(key);
                self.push_value(value);
                return self.call(3, 0);
            }
            current = handler;
        }
        Err(Error::runtime("'__newindex' chain too long; possible loop"))
    }

    /// Pop a key and push `t[key]`, honoring `__index`.
    pub fn get_table(&mut self, index: i32) -> Result<TypeTag> {
        let object = self.value_at(index);
        crate::vm_check!(object.is_some(), "get_table");
        let key = self.take_top();
        let value = self.index_value(object.unwrap_or_default(), key)?;
        let tag = value.type_tag();
        self.push_value(value);
        Ok(tag)
    }

    /// Push `t[name]`, honoring `__index`.
    pub fn get_field(&mut self, index: i32, name: &str) -> Result<TypeTag> {
        let object = self.value_at(index);
        crate::vm_check!(object.is_some(), "get_field");
        let value = self.index_value(object.unwrap_or_default(), Value::from(name))?;
        let tag = value.type_tag();
        self.push_value(value);
        Ok(tag)
    }

    /// Pop a value and a key (value on top) and set `t[key] = value`,
    /// honoring `__newindex`.
    pub fn set_table(&mut self, index: i32) -> Result<()> {
        let object = self.value_at(index);
        crate::vm_check!(object.is_some(), "set_table");
        let value = self.take_top();
        let key = self.take_top();
        self.new_index_value(object.unwrap_or_default(), key, value)
    }

    /// Pop a value and set `t[name]`, honoring `__newindex`.
    pub fn set_field(&mut self, index: i32, name: &str) -> Result<()> {
        let object = self.value_at(index);
        crate::vm_check!(object.is_some(), "set_field");
        let value = self.take_top();
        self.new_index_value(object.unwrap_or_default(), Value::from(name), value)
    }

    /// Push the length of the value at `index`, honoring `__len`.
    pub fn len(&mut self, index: i32) -> Result<()> {
        let value = self.value_at(index).unwrap_or_default();
        let length = if let Value::String(s) = &value {
            Value::Integer(s.len() as i64)
        } else if let Some(handler) = self.metafield(&value, Metamethod::Len.name()) {
            self.call_handler(handler, &[value])?
        } else if let Value::Table(_) = value {
            Value::Integer(self.raw_len(index) as i64)
        } else {
            return Err(Error::InvalidOperation {
                operation: "get length of",
                type_name: value.type_name(),
            });
        };
        self.push_value(length);
        Ok(())
    }

    /// String form of the value at `index`, honoring `__tostring`.
    pub fn to_display(&mut self, index: i32) -> Result<String> {
        let value = self.value_at(index).unwrap_or_default();
        if let Some(handler) = self.metafield(&value, Metamethod::ToString.name()) {
            return match self.call_handler(handler, &[value])? {
                Value::String(s) => Ok(s.to_string()),
                _ => Err(Error::runtime("'__tostring' must return a string")),
            };
        }
        Ok(match &value {
            Value::Nil => "nil".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Vector(v) => v
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            Value::String(s) => s.to_string(),
            Value::Table(r) | Value::Function(r) | Value::Userdata(r) => {
                let name = match self.metafield(&value, "__type") {
                    Some(Value::String(s)) => s.to_string(),
                    _ => value.type_name().to_string(),
                };
                format!("{name}: 0x{:08x}", r.index())
            }
            Value::LightUserdata(p) => format!("userdata: {:p}", p.0),
        })
    }

    /// Pop the operands of `op` and push the result, honoring the
    /// arithmetic metamethods.
    pub fn arith(&mut self, op: ArithOp) -> Result<()> {
        let (a, b) = if op.operands() == 2 {
            let b = self.take_top();
            (self.take_top(), b)
        } else {
            let a = self.take_top();
            (a.clone(), a)
        };
        let result = match arith_values(op, &a, &b)? {
            Some(result) => result,
            None => {
                let event = op.metamethod().name();
                let handler = self
                    .metafield(&a, event)
                    .or_else(|| self.metafield(&b, event));
                match handler {
                    Some(handler) => self.call_handler(handler, &[a, b])?,
                    None => {
                        let culprit = if is_arith_operand(&a) { &b } else { &a };
                        return Err(Error::InvalidOperation {
                            operation: "perform arithmetic on",
                            type_name: culprit.type_name(),
                        });
                    }
                }
            }
        };
        self.push_value(result);
        Ok(())
    }

    /// Primitive equality of two slots, without metamethods.
    pub fn raw_equal(&self, index1: i32, index2: i32) -> bool {
        match (self.value_at(index1), self.value_at(index2)) {
            (Some(a), Some(b)) => a.raw_equal(&b),
            _ => false,
        }
    }

    /// Compare two slots, honoring `__eq`, `__lt` and `__le`.
    ///
    /// Invalid indices compare false.
    pub fn compare(&mut self, index1: i32, index2: i32, op: CompareOp) -> Result<bool> {
        let (Some(a), Some(b)) = (self.value_at(index1), self.value_at(index2)) else {
            return Ok(false);
        };
        let event = op.metamethod().name();
        if op == CompareOp::Eq {
            if a.raw_equal(&b) {
                return Ok(true);
            }
            let same_kind = matches!(
                (&a, &b),
                (Value::Table(_), Value::Table(_)) | (Value::Userdata(_), Value::Userdata(_))
            );
            if !same_kind {
                return Ok(false);
            }
            // Objects of different types never share a handler.
            let handler = match (self.metafield(&a, event), self.metafield(&b, event)) {
                (Some(left), Some(right)) if left.raw_equal(&right) => left,
                _ => return Ok(false),
            };
            return Ok(self.call_handler(handler, &[a, b])?.is_truthy());
        }

        let ordering = match (&a, &b) {
            (Value::Integer(x), Value::Integer(y)) => Some(x.partial_cmp(y)),
            (Value::String(x), Value::String(y)) => Some(x.partial_cmp(y)),
            _ => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Some(x.partial_cmp(&y)),
                _ => None,
            },
        };
        if let Some(ordering) = ordering {
            return Ok(match op {
                CompareOp::Lt => ordering.is_some_and(|o| o.is_lt()),
                _ => ordering.is_some_and(|o| o.is_le()),
            });
        }

        let handler = self
            .metafield(&a, event)
            .or_else(|| self.metafield(&b, event));
        match handler {
            Some(handler) => Ok(self.call_handler(handler, &[a, b])?.is_truthy()),
            None => Err(Error::InvalidComparison {
                left: a.type_name(),
                right: b.type_name(),
            }),
        }
    }

    /// Call the metafield `event` of the value at `index` with the value as
    /// its only argument and push the result. Returns false (pushing
    /// nothing) if there is no such metafield.
    pub fn call_meta(&mut self, index: i32, event: &str) -> Result<bool> {
        let Some(value) = self.value_at(index) else {
            return Ok(false);
        };
        match self.metafield(&value, event) {
            Some(handler) => {
                let result = self.call_handler(handler, &[value])?;
                self.push_value(result);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn is_arith_operand(value: &Value) -> bool {
    value.as_number().is_some() || matches!(value, Value::Vector(_))
}

fn arith_values(op: ArithOp, a: &Value, b: &Value) -> Result<Option<Value>> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => integer_arith(op, *x, *y).map(Some),
        (Value::Vector(x), Value::Vector(y)) => Ok(vector_arith(op, x, |i| y[i])),
        (Value::Vector(x), scalar) => Ok(scalar
            .as_number()
            .filter(|_| matches!(op, ArithOp::Mul | ArithOp::Div | ArithOp::IDiv))
            .and_then(|s| vector_arith(op, x, |_| s as f32))),
        (scalar, Value::Vector(y)) => Ok(scalar
            .as_number()
            .filter(|_| matches!(op, ArithOp::Mul | ArithOp::Div | ArithOp::IDiv))
            .and_then(|s| {
                let lhs = [s as f32; crate::VECTOR_SIZE];
                vector_arith(op, &lhs, |i| y[i])
            })),
        _ => Ok(match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Some(Value::Number(float_arith(op, x, y))),
            _ => None,
        }),
    }
}

fn integer_arith(op: ArithOp, x: i64, y: i64) -> Result<Value> {
    Ok(match op {
        ArithOp::Add => Value::Integer(x.wrapping_add(y)),
        ArithOp::Sub => Value::Integer(x.wrapping_sub(y)),
        ArithOp::Mul => Value::Integer(x.wrapping_mul(y)),
        ArithOp::Div => Value::Number(x as f64 / y as f64),
        ArithOp::IDiv => {
            if y == 0 {
                return Err(Error::runtime("attempt to perform 'n//0'"));
            }
            let q = x.wrapping_div(y);
            if x.wrapping_rem(y) != 0 && (x < 0) != (y < 0) {
                Value::Integer(q - 1)
            } else {
                Value::Integer(q)
            }
        }
        ArithOp::Mod => {
            if y == 0 {
                return Err(Error::runtime("attempt to perform 'n%0'"));
            }
            let r = x.wrapping_rem(y);
            if r != 0 && (r < 0) != (y < 0) {
                Value::Integer(r + y)
            } else {
                Value::Integer(r)
            }
        }
        ArithOp::Pow => Value::Number((x as f64).powf(y as f64)),
        ArithOp::Unm => Value::Integer(x.wrapping_neg()),
    })
}

fn float_arith(op: ArithOp, x: f64, y: f64) -> f64 {
    match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::IDiv => (x / y).floor(),
        ArithOp::Mod => x - (x / y).floor() * y,
        ArithOp::Pow => x.powf(y),
        ArithOp::Unm => -x,
    }
}

fn vector_arith(
    op: ArithOp,
    x: &[f32; crate::VECTOR_SIZE],
    y: impl Fn(usize) -> f32,
) -> Option<Value> {
    let mut out = *x;
    for (i, c) in out.iter_mut().enumerate() {
        *c = match op {
            ArithOp::Add => *c + y(i),
            ArithOp::Sub => *c - y(i),
            ArithOp::Mul => *c * y(i),
            ArithOp::Div => *c / y(i),
            ArithOp::IDiv => (*c / y(i)).floor(),
            ArithOp::Unm => -*c,
            ArithOp::Mod | ArithOp::Pow => return None,
        };
    }
    Some(Value::Vector(out))
}
