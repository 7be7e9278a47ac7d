//! VM tables.

use rustc_hash::FxHashMap;

use super::{GcRef, Key, Value};
use crate::error::{Error, Result};

/// Insertion-ordered hash table.
///
/// Assigning nil to an existing key leaves a tombstone in place so that
/// traversal with [`Table::next`] stays valid while fields are cleared.
/// Tombstones are compacted away only when a new key is inserted.
#[derive(Debug, Default)]
pub(crate) struct Table {
    entries: Vec<(Key, Value)>,
    index: FxHashMap<Key, usize>,
    tombstones: usize,
    pub(crate) metatable: Option<GcRef>,
}

impl Table {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            tombstones: 0,
            metatable: None,
        }
    }

    pub(crate) fn get(&self, key: &Key) -> Value {
        self.index
            .get(key)
            .map_or(Value::Nil, |&i| self.entries[i].1.clone())
    }

    pub(crate) fn get_int(&self, n: i64) -> Value {
        self.get(&Key::Integer(n))
    }

    pub(crate) fn get_str(&self, name: &str) -> Value {
        self.get(&Key::string(name))
    }

    pub(crate) fn set(&mut self, key: Key, value: Value) {
        if let Some(&i) = self.index.get(&key) {
            let slot = &mut self.entries[i].1;
            match (slot.is_nil(), value.is_nil()) {
                (false, true) => self.tombstones += 1,
                (true, false) => self.tombstones -= 1,
                _ => {}
            }
            *slot = value;
            return;
        }
        if value.is_nil() {
            return;
        }
        if self.tombstones > self.entries.len() / 2 {
            self.compact();
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
    }

    fn compact(&mut self) {
        self.entries.retain(|(_, v)| !v.is_nil());
        self.index.clear();
        for (i, (key, _)) in self.entries.iter().enumerate() {
            self.index.insert(key.clone(), i);
        }
        self.tombstones = 0;
    }

    /// A border: `n` such that `t[n]` is non-nil and `t[n + 1]` is nil
    /// (or 0 when `t[1]` is nil).
    pub(crate) fn border(&self) -> usize {
        if self.get_int(1).is_nil() {
            return 0;
        }
        let (mut lo, mut hi) = (1i64, 2i64);
        while !self.get_int(hi).is_nil() {
            lo = hi;
            match hi.checked_mul(2) {
                Some(next) => hi = next,
                None => {
                    // Pathological: fall back to a linear scan.
                    let mut n = 1;
                    while !self.get_int(n + 1).is_nil() {
                        n += 1;
                    }
                    return n as usize;
                }
            }
        }
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.get_int(mid).is_nil() {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo as usize
    }

    /// The entry after `key` in traversal order, or the first entry.
    pub(crate) fn next(&self, key: Option<&Key>) -> Result<Option<(Key, Value)>> {
        let start = match key {
            None => 0,
            Some(key) => match self.index.get(key) {
                Some(&i) => i + 1,
                None => return Err(Error::runtime("invalid key to 'next'")),
            },
        };
        Ok(self.entries[start..]
            .iter()
            .find(|(_, v)| !v.is_nil())
            .cloned())
    }

    /// Live entries in traversal order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k, v))
    }

    /// Number of live entries.
    pub(crate) fn count(&self) -> usize {
        self.entries.len() - self.tombstones
    }
}
