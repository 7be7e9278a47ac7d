//! Per-VM state: the value stack and everything reachable from it.

use std::any::{Any as StdAny, TypeId};
use std::cell::RefCell;
use std::ffi::{CStr, c_void};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::heap::{Heap, UserCell, finalize_cell};
use super::refs::RefSlots;
use super::{
    Function, GLOBALS_INDEX, GcRef, Key, LightUserdata, MULTRET, Object, REGISTRY_INDEX,
    Reference, Table, TypeTag, Userdata, VECTOR_SIZE, Value, VmString, is_pseudo_index,
    is_upvalue_index,
};
use crate::TypeHash;
use crate::error::{Error, Result};
use crate::trampoline::NativeCallback;

/// Runtime limits of a [`State`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateOptions {
    /// Maximum number of live heap objects; allocation beyond it fails.
    pub max_objects: Option<usize>,
    /// Maximum nesting of [`State::call`].
    pub max_call_depth: usize,
    /// Maximum number of stack slots.
    pub max_stack: usize,
}

impl StateOptions {
    /// Limit the number of live heap objects.
    pub fn with_max_objects(mut self, max_objects: usize) -> Self {
        self.max_objects = Some(max_objects);
        self
    }

    /// Limit call nesting.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Limit the stack size.
    pub fn with_max_stack(mut self, slots: usize) -> Self {
        self.max_stack = slots;
        self
    }
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            max_objects: None,
            max_call_depth: 200,
            max_stack: 1_000_000,
        }
    }
}

/// Thread-safe handle that aborts a state's execution at the next call.
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    /// Request an abort. The next [`State::call`] fails with
    /// [`Error::Interrupted`].
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if an interrupt is pending.
    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Absolute stack position of the frame's first argument.
    base: usize,
    function: Option<GcRef>,
}

/// A VM state.
///
/// Host code talks to the VM exclusively through the state's stack. A state
/// is single-threaded (`!Send`); use [`State::interrupt_handle`] to abort it
/// from another thread.
pub struct State {
    pub(crate) stack: Vec<Value>,
    frames: Vec<Frame>,
    pub(crate) heap: Heap,
    registry: GcRef,
    globals: GcRef,
    pub(crate) refs: Rc<RefCell<RefSlots>>,
    interrupt: Arc<AtomicBool>,
    options: StateOptions,
}

impl State {
    /// Create a state with default options.
    pub fn new() -> Self {
        Self::with_options(StateOptions::default())
    }

    /// Create a state with the given limits.
    pub fn with_options(options: StateOptions) -> Self {
        let mut heap = Heap::new(options.max_objects);
        let registry = heap.insert(Object::Table(Table::new()));
        let globals = heap.insert(Object::Table(Table::new()));
        Self {
            stack: Vec::new(),
            frames: vec![Frame {
                base: 0,
                function: None,
            }],
            heap,
            registry,
            globals,
            refs: Rc::new(RefCell::new(RefSlots::default())),
            interrupt: Arc::new(AtomicBool::new(false)),
            options,
        }
    }

    /// The state's limits.
    pub fn options(&self) -> &StateOptions {
        &self.options
    }

    // ---- stack positions -------------------------------------------------

    fn base(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.base)
    }

    /// Absolute stack position of a (non-pseudo) index.
    pub(crate) fn slot(&self, index: i32) -> Option<usize> {
        let base = self.base();
        if index > 0 {
            let abs = base + index as usize - 1;
            (abs < self.stack.len()).then_some(abs)
        } else if index < 0 && !is_pseudo_index(index) {
            let abs = self.stack.len() as isize + index as isize;
            (abs >= base as isize).then_some(abs as usize)
        } else {
            None
        }
    }

    /// Number of values in the current frame.
    pub fn top(&self) -> i32 {
        (self.stack.len() - self.base()) as i32
    }

    /// Convert a relative index to an absolute one. Pseudo-indices are
    /// returned unchanged.
    pub fn abs_index(&self, index: i32) -> i32 {
        if index > 0 || is_pseudo_index(index) {
            index
        } else {
            self.top() + index + 1
        }
    }

    /// Set the frame's top, filling new slots with nil.
    pub fn set_top(&mut self, index: i32) {
        let base = self.base();
        let mut len = if index >= 0 {
            base + index as usize
        } else {
            let len = self.stack.len() as isize + index as isize + 1;
            if crate::vm_check!(len >= base as isize, "set_top") {
                len as usize
            } else {
                base
            }
        };
        if !crate::vm_check!(len <= self.options.max_stack, "set_top") {
            len = self.options.max_stack.max(base);
        }
        self.stack.resize(len, Value::Nil);
    }

    /// Pop `n` values.
    pub fn discard(&mut self, n: usize) {
        let top = self.top() as usize;
        let n = if crate::vm_check!(n <= top, "discard") {
            n
        } else {
            top
        };
        self.stack.truncate(self.stack.len() - n);
    }

    /// Check that `n` more values fit on the stack.
    pub fn check_stack(&self, n: usize) -> bool {
        self.stack.len() + n <= self.options.max_stack
    }

    /// Pop the top value.
    pub(crate) fn take_top(&mut self) -> Value {
        if crate::vm_check!(self.top() > 0, "pop") {
            self.stack.pop().unwrap_or_default()
        } else {
            Value::Nil
        }
    }

    /// The value at `index`, or `None` if the index holds no value.
    pub fn value_at(&self, index: i32) -> Option<Value> {
        match index {
            REGISTRY_INDEX => Some(Value::Table(self.registry)),
            GLOBALS_INDEX => Some(Value::Table(self.globals)),
            i if is_upvalue_index(i) => {
                let n = (GLOBALS_INDEX - i) as usize;
                let function = self.frames.last()?.function?;
                self.heap.function(function)?.upvalues.get(n - 1).cloned()
            }
            _ => self.slot(index).map(|slot| self.stack[slot].clone()),
        }
    }

    /// The dynamic type at `index`; [`TypeTag::None`] past the top.
    pub fn type_of(&self, index: i32) -> TypeTag {
        self.value_at(index)
            .map_or(TypeTag::None, |value| value.type_tag())
    }

    /// Check if `index` holds nil or no value.
    pub fn is_none_or_nil(&self, index: i32) -> bool {
        matches!(self.type_of(index), TypeTag::None | TypeTag::Nil)
    }

    /// Move the top value into `index`, shifting values up.
    pub fn insert(&mut self, index: i32) {
        let Some(slot) = self.slot(index) else {
            crate::vm_check!(false, "insert");
            return;
        };
        let value = self.take_top();
        self.stack.insert(slot, value);
    }

    /// Remove the value at `index`, shifting values down.
    pub fn remove(&mut self, index: i32) {
        match self.slot(index) {
            Some(slot) => {
                self.stack.remove(slot);
            }
            None => {
                crate::vm_check!(false, "remove");
            }
        }
    }

    /// Pop the top value into `index`.
    pub fn replace(&mut self, index: i32) {
        let slot = self.slot(index);
        crate::vm_check!(slot.is_some(), "replace");
        let value = self.take_top();
        if let Some(slot) = slot
            && slot < self.stack.len()
        {
            self.stack[slot] = value;
        }
    }

    /// Push a copy of the value at `index`.
    pub fn push_copy(&mut self, index: i32) {
        let value = self.value_at(index);
        crate::vm_check!(value.is_some(), "push_copy");
        self.push_value(value.unwrap_or_default());
    }

    // ---- raw pushes --------------------------------------------------------

    /// Push a value as-is.
    pub fn push_value(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn push_nil(&mut self) {
        self.push_value(Value::Nil);
    }

    pub fn push_boolean(&mut self, b: bool) {
        self.push_value(Value::Boolean(b));
    }

    pub fn push_integer(&mut self, n: i64) {
        self.push_value(Value::Integer(n));
    }

    pub fn push_number(&mut self, n: f64) {
        self.push_value(Value::Number(n));
    }

    pub fn push_vector(&mut self, v: [f32; VECTOR_SIZE]) {
        self.push_value(Value::Vector(v));
    }

    /// Push a string by length. The bytes need not be UTF-8.
    pub fn push_lstring(&mut self, bytes: &[u8]) {
        self.push_value(Value::String(VmString::new(bytes)));
    }

    pub fn push_string(&mut self, s: &str) {
        self.push_lstring(s.as_bytes());
    }

    /// Push a null-terminated string.
    pub fn push_cstring(&mut self, s: &CStr) {
        self.push_lstring(s.to_bytes());
    }

    pub fn push_light_userdata(&mut self, ptr: *mut c_void) {
        self.push_value(Value::LightUserdata(LightUserdata(ptr)));
    }

    // ---- raw reads ---------------------------------------------------------

    /// Integer at `index`; integral floats convert, nothing else does.
    pub fn to_integer(&self, index: i32) -> Option<i64> {
        match self.value_at(index)? {
            Value::Integer(n) => Some(n),
            Value::Number(n) => super::value::float_to_integer(n),
            _ => None,
        }
    }

    pub fn to_number(&self, index: i32) -> Option<f64> {
        self.value_at(index)?.as_number()
    }

    pub fn to_boolean(&self, index: i32) -> bool {
        self.value_at(index).is_some_and(|v| v.is_truthy())
    }

    /// String at `index`. Numbers are not converted.
    pub fn to_bytes(&self, index: i32) -> Option<VmString> {
        match self.value_at(index)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_vector(&self, index: i32) -> Option<[f32; VECTOR_SIZE]> {
        match self.value_at(index)? {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_light_userdata(&self, index: i32) -> Option<LightUserdata> {
        match self.value_at(index)? {
            Value::LightUserdata(p) => Some(p),
            _ => None,
        }
    }

    // ---- tables ------------------------------------------------------------

    pub(crate) fn table_ref(&self, index: i32) -> Option<GcRef> {
        match self.value_at(index)? {
            Value::Table(r) => Some(r),
            _ => None,
        }
    }

    /// Allocate a heap object. Pushes nil and returns `None` on failure.
    fn allocate_pushed(&mut self, object: Object, wrap: fn(GcRef) -> Value) -> Option<GcRef> {
        match self.heap.allocate(object) {
            Some(r) => {
                self.push_value(wrap(r));
                Some(r)
            }
            None => {
                self.push_nil();
                None
            }
        }
    }

    /// Push a new empty table. On allocation failure pushes nil and
    /// returns false.
    pub fn new_table(&mut self) -> bool {
        self.create_table(0, 0)
    }

    /// Push a new table with preallocated space.
    pub fn create_table(&mut self, narr: usize, nrec: usize) -> bool {
        self.allocate_pushed(Object::Table(Table::with_capacity(narr + nrec)), Value::Table)
            .is_some()
    }

    pub(crate) fn raw_get_value(&self, table: GcRef, key: &Value) -> Value {
        match (Key::from_value(key), self.heap.table(table)) {
            (Some(key), Some(t)) => t.get(&key),
            _ => Value::Nil,
        }
    }

    pub(crate) fn raw_set_value(&mut self, table: GcRef, key: Value, value: Value) -> Result<()> {
        let key = match Key::from_value(&key) {
            Some(key) => key,
            None if key.is_nil() => return Err(Error::runtime("table index is nil")),
            None => return Err(Error::runtime("table index is NaN")),
        };
        if let Some(t) = self.heap.table_mut(table) {
            t.set(key, value);
        }
        Ok(())
    }

    fn checked_table(&self, index: i32, function: &str) -> Option<GcRef> {
        let table = self.table_ref(index);
        crate::vm_check!(table.is_some(), function);
        table
    }

    /// Pop a key and push `t[key]` without metamethods.
    pub fn raw_get(&mut self, index: i32) -> TypeTag {
        let table = self.checked_table(index, "raw_get");
        let key = self.take_top();
        let value = table.map_or(Value::Nil, |t| self.raw_get_value(t, &key));
        let tag = value.type_tag();
        self.push_value(value);
        tag
    }

    /// Pop a value and a key (value on top) and set `t[key] = value`
    /// without metamethods.
    pub fn raw_set(&mut self, index: i32) -> Result<()> {
        let table = self.checked_table(index, "raw_set");
        let value = self.take_top();
        let key = self.take_top();
        match table {
            Some(t) => self.raw_set_value(t, key, value),
            None => Ok(()),
        }
    }

    /// Push `t[n]` without metamethods.
    pub fn raw_get_index(&mut self, index: i32, n: i64) -> TypeTag {
        let value = self
            .checked_table(index, "raw_get_index")
            .and_then(|t| self.heap.table(t))
            .map_or(Value::Nil, |t| t.get_int(n));
        let tag = value.type_tag();
        self.push_value(value);
        tag
    }

    /// Pop a value and set `t[n]` without metamethods.
    pub fn raw_set_index(&mut self, index: i32, n: i64) {
        let table = self.checked_table(index, "raw_set_index");
        let value = self.take_top();
        if let Some(t) = table.and_then(|t| self.heap.table_mut(t)) {
            t.set(Key::Integer(n), value);
        }
    }

    /// Push `t[name]` without metamethods.
    pub fn raw_get_field(&mut self, index: i32, name: &str) -> TypeTag {
        let value = self
            .checked_table(index, "raw_get_field")
            .and_then(|t| self.heap.table(t))
            .map_or(Value::Nil, |t| t.get_str(name));
        let tag = value.type_tag();
        self.push_value(value);
        tag
    }

    /// Pop a value and set `t[name]` without metamethods.
    pub fn raw_set_field(&mut self, index: i32, name: &str) {
        let table = self.checked_table(index, "raw_set_field");
        let value = self.take_top();
        if let Some(t) = table.and_then(|t| self.heap.table_mut(t)) {
            t.set(Key::string(name), value);
        }
    }

    /// Raw length: string byte length or table border; 0 otherwise.
    pub fn raw_len(&self, index: i32) -> usize {
        match self.value_at(index) {
            Some(Value::String(s)) => s.len(),
            Some(Value::Table(r)) => self.heap.table(r).map_or(0, Table::border),
            _ => 0,
        }
    }

    /// Pop a key and push the next key/value pair of the table at `index`.
    /// Returns false (pushing nothing) at the end of the traversal. Start
    /// a traversal with a nil key.
    pub fn next(&mut self, index: i32) -> Result<bool> {
        let table = self.checked_table(index, "next");
        let key = self.take_top();
        let Some(table) = table.and_then(|t| self.heap.table(t)) else {
            return Ok(false);
        };
        let key = if key.is_nil() {
            None
        } else {
            Some(Key::from_value(&key).ok_or_else(|| Error::runtime("invalid key to 'next'"))?)
        };
        match table.next(key.as_ref())? {
            Some((key, value)) => {
                self.push_value(key.to_value());
                self.push_value(value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ---- globals -----------------------------------------------------------

    /// Push the global `name`.
    pub fn get_global(&mut self, name: &str) -> TypeTag {
        self.raw_get_field(GLOBALS_INDEX, name)
    }

    /// Pop a value into the global `name`.
    pub fn set_global(&mut self, name: &str) {
        self.raw_set_field(GLOBALS_INDEX, name);
    }

    // ---- metatables --------------------------------------------------------

    /// Push the registry metatable `name`, creating it if needed.
    ///
    /// Returns true if the metatable was created, false if it already
    /// existed (or could not be allocated, in which case nil is pushed).
    pub fn new_metatable(&mut self, name: &str) -> bool {
        let existing = self.raw_get_value(self.registry, &Value::from(name));
        if !existing.is_nil() {
            self.push_value(existing);
            return false;
        }
        if !self.new_table() {
            return false;
        }
        self.push_copy(-1);
        self.raw_set_field(REGISTRY_INDEX, name);
        true
    }

    /// Push the registry metatable `name` (nil if absent).
    pub fn get_metatable_named(&mut self, name: &str) -> TypeTag {
        self.raw_get_field(REGISTRY_INDEX, name)
    }

    /// The registry metatable `name`, without touching the stack.
    pub fn find_metatable(&self, name: &str) -> Option<GcRef> {
        match self.heap.table(self.registry)?.get_str(name) {
            Value::Table(r) => Some(r),
            _ => None,
        }
    }

    /// Pop a table (or nil) and make it the metatable of the table or
    /// userdata at `index`. Returns false if the target cannot carry one.
    pub fn set_metatable(&mut self, index: i32) -> bool {
        let target = self.value_at(index);
        let metatable = match self.take_top() {
            Value::Table(r) => Some(r),
            Value::Nil => None,
            _ => {
                crate::vm_check!(false, "set_metatable");
                return false;
            }
        };
        match target.and_then(|v| v.gc_ref()).and_then(|r| self.heap.get_mut(r)) {
            Some(Object::Table(table)) => {
                table.metatable = metatable;
                true
            }
            Some(Object::Userdata(userdata)) => {
                userdata.metatable = metatable;
                true
            }
            _ => false,
        }
    }

    /// Push the metatable of the value at `index`. Pushes nothing and
    /// returns false if it has none.
    pub fn get_metatable(&mut self, index: i32) -> bool {
        let metatable = self
            .value_at(index)
            .and_then(|v| v.gc_ref())
            .and_then(|r| self.heap.metatable_of(r));
        match metatable {
            Some(mt) => {
                self.push_value(Value::Table(mt));
                true
            }
            None => false,
        }
    }

    // ---- functions ---------------------------------------------------------

    pub(crate) fn push_closure_values(
        &mut self,
        callback: NativeCallback,
        upvalues: Vec<Value>,
    ) -> bool {
        self.allocate_pushed(
            Object::Function(Function { callback, upvalues }),
            Value::Function,
        )
        .is_some()
    }

    /// Push a native function without upvalues.
    pub fn push_function(&mut self, callback: NativeCallback) -> bool {
        self.push_closure_values(callback, Vec::new())
    }

    /// Pop `n` values and push a native closure capturing them as upvalues
    /// 1..=n.
    pub fn push_closure(&mut self, callback: NativeCallback, n: usize) -> bool {
        let top = self.top() as usize;
        let n = if crate::vm_check!(n <= top, "push_closure") {
            n
        } else {
            top
        };
        let upvalues = self.stack.split_off(self.stack.len() - n);
        self.push_closure_values(callback, upvalues)
    }

    /// Call the function below the top `nargs` values.
    ///
    /// On success the function and arguments are replaced by `nresults`
    /// results (all of them with [`MULTRET`]). On failure the stack is
    /// truncated to the function's slot.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&mut self, nargs: usize, nresults: i32) -> Result<()> {
        let mut nargs = nargs;
        if !crate::vm_check!(nargs < self.top() as usize, "call") {
            if self.top() == 0 {
                self.push_nil();
            }
            nargs = self.top() as usize - 1;
        }
        let func_slot = self.stack.len() - nargs - 1;

        if let Err(err) = self.check_interrupt() {
            self.stack.truncate(func_slot);
            return Err(err);
        }
        if self.frames.len() > self.options.max_call_depth {
            self.stack.truncate(func_slot);
            return Err(Error::StackOverflow);
        }

        let callee = match &self.stack[func_slot] {
            Value::Function(r) => self
                .heap
                .function(*r)
                .map(|f| (*r, Rc::clone(&f.callback))),
            _ => None,
        };
        let Some((function, callback)) = callee else {
            let type_name = self.stack[func_slot].type_name();
            self.stack.truncate(func_slot);
            return Err(Error::NotCallable(type_name));
        };

        let depth = self.frames.len();
        self.frames.push(Frame {
            base: func_slot + 1,
            function: Some(function),
        });
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(self)));
        self.frames.truncate(depth);

        let produced = match outcome {
            Ok(Ok(n)) => usize::try_from(n).unwrap_or(0),
            Ok(Err(err)) => {
                self.stack.truncate(func_slot);
                return Err(err);
            }
            Err(payload) => {
                self.stack.truncate(func_slot);
                return Err(Error::Runtime(panic_message(payload)));
            }
        };

        let available = self.stack.len().saturating_sub(func_slot + 1);
        let produced = if crate::vm_check!(produced <= available, "call") {
            produced
        } else {
            available
        };
        let results = self.stack.split_off(self.stack.len() - produced);
        self.stack.truncate(func_slot);
        self.stack.extend(results);
        if nresults != MULTRET {
            self.stack
                .resize(func_slot + nresults.max(0) as usize, Value::Nil);
        }
        Ok(())
    }

    /// Like [`State::call`], but on failure also pushes the error message.
    pub fn pcall(&mut self, nargs: usize, nresults: i32) -> Result<()> {
        self.call(nargs, nresults).inspect_err(|err| {
            self.push_string(&err.to_string());
        })
    }

    // ---- references ----------------------------------------------------

    /// Create a persistent reference to the value at `index`. The value
    /// stays on the stack. Nil (or no value) yields an empty reference.
    pub fn create_ref(&mut self, index: i32) -> Reference {
        match self.value_at(index) {
            None | Some(Value::Nil) => Reference::empty(),
            Some(value) => {
                let id = self.refs.borrow_mut().insert(value);
                Reference::new(id, Rc::clone(&self.refs))
            }
        }
    }

    /// Push the referenced value; nil for empty or foreign references.
    pub fn push_reference(&mut self, reference: &Reference) {
        let value = reference.value_in(&self.refs).unwrap_or_default();
        self.push_value(value);
    }

    /// Number of live references.
    pub fn reference_count(&self) -> usize {
        self.refs.borrow().live()
    }

    // ---- userdata ----------------------------------------------------------

    /// Push a new userdata owning `value`.
    ///
    /// On allocation failure pushes nil and returns false; `value` is
    /// dropped without running `dtor`.
    pub fn new_userdata<T: 'static>(
        &mut self,
        value: T,
        tag: TypeHash,
        dtor: Option<fn(&mut T)>,
    ) -> bool {
        match self.reserve_userdata() {
            Some(slot) => self.fill_userdata(slot, value, tag, dtor, None),
            None => {
                self.push_nil();
                false
            }
        }
    }

    /// Reserve a heap slot for a userdata under construction.
    pub fn reserve_userdata(&mut self) -> Option<GcRef> {
        self.heap.reserve()
    }

    /// Move `value` into a reserved slot and push the userdata.
    pub fn fill_userdata<T: 'static>(
        &mut self,
        slot: GcRef,
        value: T,
        tag: TypeHash,
        dtor: Option<fn(&mut T)>,
        metatable: Option<GcRef>,
    ) -> bool {
        let userdata = Userdata {
            data: Rc::new(UserCell::new(value, dtor)),
            type_id: TypeId::of::<T>(),
            tag,
            metatable,
            finalizer: dtor.map(|_| finalize_cell::<T> as fn(&dyn StdAny)),
        };
        if self.heap.fill(slot, Object::Userdata(userdata)) {
            self.push_value(Value::Userdata(slot));
            true
        } else {
            crate::vm_check!(false, "fill_userdata");
            self.push_nil();
            false
        }
    }

    /// Give back a reservation that will not be filled.
    pub fn release_userdata(&mut self, slot: GcRef) {
        if matches!(self.heap.get(slot), Some(Object::Reserved)) {
            self.heap.release(slot);
        }
    }

    /// Shared cell of the userdata at `index`, if it holds a `T`.
    pub fn userdata_cell<T: 'static>(&self, index: i32) -> Option<Rc<UserCell<T>>> {
        let Some(Value::Userdata(r)) = self.value_at(index) else {
            return None;
        };
        let userdata = self.heap.userdata(r)?;
        if userdata.type_id != TypeId::of::<T>() {
            return None;
        }
        Rc::downcast::<UserCell<T>>(Rc::clone(&userdata.data)).ok()
    }

    /// Tag of the userdata at `index`.
    pub fn userdata_tag(&self, index: i32) -> Option<TypeHash> {
        let Some(Value::Userdata(r)) = self.value_at(index) else {
            return None;
        };
        self.heap.userdata(r).map(|u| u.tag)
    }

    // ---- collection --------------------------------------------------------

    /// Number of live heap objects (registry and globals included).
    pub fn object_count(&self) -> usize {
        self.heap.live()
    }

    /// Run a full collection. Returns the number of objects freed.
    ///
    /// Roots are the stack, the registry, the globals, live references and
    /// running closures. Unreachable userdata run their destructor before
    /// their storage is freed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn collect_garbage(&mut self) -> usize {
        let mut roots: Vec<GcRef> = self.stack.iter().filter_map(Value::gc_ref).collect();
        roots.push(self.registry);
        roots.push(self.globals);
        roots.extend(self.frames.iter().filter_map(|frame| frame.function));
        roots.extend(self.refs.borrow().values().filter_map(Value::gc_ref));

        let swept = self.heap.collect(roots);
        let freed = swept.len();
        for object in swept {
            if let Object::Userdata(mut userdata) = object {
                userdata.finalize();
            }
        }
        freed
    }

    // ---- interrupts --------------------------------------------------------

    /// Handle for aborting this state from any thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupt))
    }

    /// Consume a pending interrupt as [`Error::Interrupted`].
    pub fn check_interrupt(&mut self) -> Result<()> {
        if self.interrupt.swap(false, Ordering::AcqRel) {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for State {
    fn drop(&mut self) {
        self.stack.clear();
        for mut userdata in self.heap.drain_userdata() {
            userdata.finalize();
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("top", &self.top())
            .field("depth", &self.frames.len())
            .field("heap", &self.heap)
            .field("references", &self.reference_count())
            .finish()
    }
}

fn panic_message(payload: Box<dyn StdAny + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "host function panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::upvalue_index;
    use std::cell::Cell;

    fn callback(f: impl Fn(&mut State) -> Result<i32> + 'static) -> NativeCallback {
        Rc::new(f)
    }

    #[test]
    fn push_and_inspect() {
        let mut state = State::new();
        state.push_integer(1);
        state.push_string("two");
        state.push_nil();
        assert_eq!(state.top(), 3);
        assert_eq!(state.type_of(1), TypeTag::Number);
        assert_eq!(state.type_of(-2), TypeTag::String);
        assert_eq!(state.type_of(3), TypeTag::Nil);
        assert_eq!(state.type_of(4), TypeTag::None);
        assert_eq!(state.abs_index(-1), 3);
        assert_eq!(state.to_bytes(2).unwrap().to_str(), Some("two"));
        assert!(state.to_bytes(1).is_none());
    }

    #[test]
    fn set_top_and_discard() {
        let mut state = State::new();
        state.set_top(3);
        assert_eq!(state.top(), 3);
        assert_eq!(state.type_of(3), TypeTag::Nil);
        state.set_top(-2);
        assert_eq!(state.top(), 2);
        state.discard(2);
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn insert_remove_replace() {
        let mut state = State::new();
        for n in 1..=3 {
            state.push_integer(n);
        }
        state.insert(1);
        assert_eq!(state.to_integer(1), Some(3));
        state.remove(1);
        assert_eq!(state.to_integer(1), Some(1));
        state.push_integer(9);
        state.replace(1);
        assert_eq!(state.to_integer(1), Some(9));
        assert_eq!(state.top(), 3);
    }

    #[test]
    fn integral_floats_read_as_integers() {
        let mut state = State::new();
        state.push_number(4.0);
        state.push_number(4.5);
        assert_eq!(state.to_integer(1), Some(4));
        assert_eq!(state.to_integer(2), None);
        assert_eq!(state.to_number(2), Some(4.5));
    }

    #[test]
    fn raw_table_access() {
        let mut state = State::new();
        assert!(state.new_table());
        state.push_integer(5);
        state.raw_set_field(1, "five");
        state.push_string("one");
        state.raw_set_index(1, 1);
        state.push_boolean(true);
        state.push_integer(7);
        state.raw_set(1).unwrap();

        assert_eq!(state.raw_get_field(1, "five"), TypeTag::Number);
        assert_eq!(state.to_integer(-1), Some(5));
        state.discard(1);
        state.push_boolean(true);
        state.raw_get(1);
        assert_eq!(state.to_integer(-1), Some(7));
        state.discard(1);
        assert_eq!(state.raw_len(1), 1);

        state.push_nil();
        state.push_integer(1);
        assert!(state.raw_set(1).is_err());
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn next_visits_every_entry() {
        let mut state = State::new();
        state.new_table();
        for n in 1..=3 {
            state.push_integer(n * 2);
            state.raw_set_index(1, n);
        }
        let mut sum = 0;
        state.push_nil();
        while state.next(1).unwrap() {
            sum += state.to_integer(-1).unwrap();
            state.discard(1);
        }
        assert_eq!(sum, 12);
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn globals_and_registry() {
        let mut state = State::new();
        state.push_integer(3);
        state.set_global("answer");
        assert_eq!(state.get_global("answer"), TypeTag::Number);
        assert_eq!(state.type_of(REGISTRY_INDEX), TypeTag::Table);
        assert_eq!(state.type_of(GLOBALS_INDEX), TypeTag::Table);
    }

    #[test]
    fn metatables() {
        let mut state = State::new();
        assert!(state.new_metatable("Thing"));
        assert!(!state.new_metatable("Thing"));
        assert!(state.value_at(1).unwrap().raw_equal(&state.value_at(2).unwrap()));
        state.set_top(0);

        state.new_table();
        assert!(!state.get_metatable(1));
        state.get_metatable_named("Thing");
        assert!(state.set_metatable(1));
        assert!(state.get_metatable(1));
        assert_eq!(
            state.value_at(-1).and_then(|v| v.gc_ref()),
            state.find_metatable("Thing")
        );
    }

    #[test]
    fn call_adjusts_results() {
        let mut state = State::new();
        state.push_function(callback(|s| {
            let a = s.to_integer(1).unwrap_or(0);
            let b = s.to_integer(2).unwrap_or(0);
            s.push_integer(a + b);
            s.push_integer(a * b);
            Ok(2)
        }));
        state.push_integer(3);
        state.push_integer(4);
        state.call(2, 1).unwrap();
        assert_eq!(state.top(), 1);
        assert_eq!(state.to_integer(1), Some(7));

        state.set_top(0);
        state.push_function(callback(|_| Ok(0)));
        state.call(0, 2).unwrap();
        assert_eq!(state.top(), 2);
        assert_eq!(state.type_of(2), TypeTag::Nil);
    }

    #[test]
    fn call_frames_see_only_their_arguments() {
        let mut state = State::new();
        state.push_string("outer");
        state.push_function(callback(|s| {
            assert_eq!(s.top(), 1);
            s.push_integer(s.top() as i64);
            Ok(1)
        }));
        state.push_boolean(true);
        state.call(1, MULTRET).unwrap();
        assert_eq!(state.top(), 2);
        assert_eq!(state.to_integer(2), Some(1));
    }

    #[test]
    fn call_errors_truncate_to_function_slot() {
        let mut state = State::new();
        state.push_integer(1);
        state.push_function(callback(|s| {
            s.push_integer(99);
            Err(Error::runtime("boom"))
        }));
        state.push_integer(2);
        let err = state.call(1, 1).unwrap_err();
        assert_eq!(err, Error::Runtime("boom".into()));
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn panics_become_runtime_errors() {
        let mut state = State::new();
        state.push_function(callback(|_| panic!("host exploded")));
        let err = state.call(0, 0).unwrap_err();
        assert_eq!(err, Error::Runtime("host exploded".into()));
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn calling_a_non_function() {
        let mut state = State::new();
        state.push_integer(1);
        assert_eq!(state.call(0, 0), Err(Error::NotCallable("number")));
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn pcall_pushes_message() {
        let mut state = State::new();
        state.push_boolean(false);
        assert!(state.pcall(0, 0).is_err());
        assert_eq!(
            state.to_bytes(-1).unwrap().to_str(),
            Some("attempt to call a boolean value")
        );
    }

    #[test]
    fn recursion_hits_depth_limit() {
        let mut state = State::with_options(StateOptions::default().with_max_call_depth(10));
        state.push_function(callback(|s| {
            s.get_global("recurse");
            s.call(0, 0)?;
            Ok(0)
        }));
        state.set_global("recurse");
        state.get_global("recurse");
        assert_eq!(state.call(0, 0), Err(Error::StackOverflow));
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn upvalues_are_addressable() {
        let mut state = State::new();
        state.push_integer(10);
        state.push_string("up");
        state.push_closure(
            callback(|s| {
                assert_eq!(s.to_integer(upvalue_index(1)), Some(10));
                assert_eq!(s.type_of(upvalue_index(2)), TypeTag::String);
                assert_eq!(s.type_of(upvalue_index(3)), TypeTag::None);
                Ok(0)
            }),
            2,
        );
        assert_eq!(state.top(), 1);
        state.call(0, 0).unwrap();
    }

    #[test]
    fn interrupt_aborts_next_call_once() {
        let mut state = State::new();
        let handle = state.interrupt_handle();
        handle.interrupt();
        assert!(handle.is_pending());

        state.push_function(callback(|_| Ok(0)));
        assert!(state.call(0, 0).unwrap_err().is_interrupted());
        assert!(!handle.is_pending());

        state.push_function(callback(|_| Ok(0)));
        assert!(state.call(0, 0).is_ok());
    }

    #[test]
    fn references_keep_values_alive() {
        let mut state = State::new();
        state.new_table();
        let reference = state.create_ref(-1);
        state.discard(1);
        assert_eq!(state.reference_count(), 1);

        state.collect_garbage();
        state.push_reference(&reference);
        assert_eq!(state.type_of(-1), TypeTag::Table);
        state.discard(1);

        drop(reference);
        assert_eq!(state.reference_count(), 0);
        assert_eq!(state.collect_garbage(), 1);

        state.push_nil();
        assert!(state.create_ref(-1).is_empty());
    }

    thread_local! {
        static DROPS: Cell<u32> = const { Cell::new(0) };
    }

    fn count_drop(_: &mut u8) {
        DROPS.with(|d| d.set(d.get() + 1));
    }

    #[test]
    fn collection_runs_userdata_destructors() {
        DROPS.with(|d| d.set(0));
        let mut state = State::new();
        assert!(state.new_userdata(1u8, TypeHash::from_name("u8"), Some(count_drop)));
        assert!(state.new_userdata(2u8, TypeHash::from_name("u8"), Some(count_drop)));
        assert_eq!(*state.userdata_cell::<u8>(-1).unwrap().borrow(), 2);
        assert!(state.userdata_cell::<u16>(-1).is_none());

        state.discard(1);
        state.collect_garbage();
        assert_eq!(DROPS.with(|d| d.get()), 1);

        drop(state);
        assert_eq!(DROPS.with(|d| d.get()), 2);
    }

    #[test]
    fn object_limit_pushes_nil() {
        let mut state = State::with_options(StateOptions::default().with_max_objects(3));
        assert!(state.new_table());
        assert!(!state.new_table());
        assert_eq!(state.type_of(-1), TypeTag::Nil);
        assert_eq!(state.top(), 2);
        assert!(state.reserve_userdata().is_none());
    }

    #[test]
    fn released_reservation_frees_slot() {
        let mut state = State::new();
        let before = state.object_count();
        let slot = state.reserve_userdata().unwrap();
        assert_eq!(state.object_count(), before + 1);
        state.collect_garbage();
        assert_eq!(state.object_count(), before + 1);
        state.release_userdata(slot);
        assert_eq!(state.object_count(), before);
    }
}
