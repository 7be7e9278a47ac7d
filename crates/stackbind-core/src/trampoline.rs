//! Host functions as VM-callable natives.
//!
//! A [`HostFunction`] is any `Fn(&mut State, A1, .., An) -> R` whose
//! parameters implement [`FromArg`] and whose result implements
//! [`IntoResults`]. [`NativeFunction`] erases it into the callback the VM
//! stores in a closure.
//!
//! ## Example
//!
//! ```ignore
//! let add = state.wrap_function(|_: &mut State, a: i64, b: i64| a + b);
//! state.push(add);
//! state.set_global("add");
//! ```

use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::marshal::{ArgCursor, FromArg, Push, validate_arg_layout};
use crate::vm::{State, Value};

/// Type-erased native function body.
///
/// Reads its arguments from the current frame, pushes its results and
/// returns how many it pushed.
pub type NativeCallback = Rc<dyn Fn(&mut State) -> Result<i32>>;

/// Conversion of a host function's return value into VM results.
pub trait IntoResults {
    /// Push the results, returning their count.
    fn into_results(self, state: &mut State) -> Result<i32>;
}

impl<T: Push> IntoResults for T {
    fn into_results(self, state: &mut State) -> Result<i32> {
        self.push(state);
        Ok(T::SLOTS as i32)
    }
}

/// `Err` raises a VM error; VM errors keep their identity.
impl<T: IntoResults, E: fmt::Display + 'static> IntoResults for Result<T, E> {
    fn into_results(self, state: &mut State) -> Result<i32> {
        match self {
            Ok(value) => value.into_results(state),
            Err(err) => Err(Error::from_host(err)),
        }
    }
}

/// A host function callable from the VM.
///
/// `Args` is the tuple of parameter types after the leading `&mut State`.
pub trait HostFunction<Args, Ret>: 'static {
    /// Fetch the arguments from the current frame and run the function.
    fn call_host(&self, state: &mut State) -> Result<Ret>;
}

macro_rules! impl_host_function {
    ($($arg:ident),*) => {
        impl<Func, Ret, $($arg,)*> HostFunction<($($arg,)*), Ret> for Func
        where
            Func: Fn(&mut State, $($arg),*) -> Ret + 'static,
            $($arg: FromArg,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call_host(&self, state: &mut State) -> Result<Ret> {
                const {
                    assert!(
                        validate_arg_layout(&[$($arg::KIND),*]),
                        "upvalue parameters must lead and a rest parameter must come last"
                    )
                };
                let mut cursor = ArgCursor::new();
                $(let $arg = $arg::from_arg(state, &mut cursor)?;)*
                Ok(self(state, $($arg),*))
            }
        }
    };
}

impl_host_function!();
impl_host_function!(A);
impl_host_function!(A, B);
impl_host_function!(A, B, C);
impl_host_function!(A, B, C, D);
impl_host_function!(A, B, C, D, E);
impl_host_function!(A, B, C, D, E, F);
impl_host_function!(A, B, C, D, E, F, G);
impl_host_function!(A, B, C, D, E, F, G, H);
impl_host_function!(A, B, C, D, E, F, G, H, I);
impl_host_function!(A, B, C, D, E, F, G, H, I, J);
impl_host_function!(A, B, C, D, E, F, G, H, I, J, K);
impl_host_function!(A, B, C, D, E, F, G, H, I, J, K, L);

#[cfg_attr(feature = "profiling", profiling::function)]
fn run_host<F, Args, Ret>(function: &F, state: &mut State) -> Result<i32>
where
    F: HostFunction<Args, Ret>,
    Ret: IntoResults,
{
    function.call_host(state)?.into_results(state)
}

/// A native closure ready to be pushed.
///
/// Captured upvalues are plain values until the function is pushed; heap
/// objects among them are not rooted in the meantime.
#[derive(Clone)]
pub struct NativeFunction {
    callback: NativeCallback,
    upvalues: Vec<Value>,
}

impl NativeFunction {
    /// Wrap a host function.
    pub fn new<F, Args, Ret>(function: F) -> Self
    where
        F: HostFunction<Args, Ret>,
        Args: 'static,
        Ret: IntoResults + 'static,
    {
        Self::from_callback(Self::callback(function))
    }

    /// Erase a host function into a callback.
    pub fn callback<F, Args, Ret>(function: F) -> NativeCallback
    where
        F: HostFunction<Args, Ret>,
        Args: 'static,
        Ret: IntoResults + 'static,
    {
        Rc::new(move |state: &mut State| run_host(&function, state))
    }

    /// Wrap a raw callback.
    pub fn from_callback(callback: NativeCallback) -> Self {
        Self {
            callback,
            upvalues: Vec::new(),
        }
    }

    /// Replace the captured upvalues.
    pub fn with_upvalues(mut self, upvalues: Vec<Value>) -> Self {
        self.upvalues = upvalues;
        self
    }

    /// Number of captured upvalues.
    pub fn upvalue_count(&self) -> usize {
        self.upvalues.len()
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("upvalues", &self.upvalues)
            .finish_non_exhaustive()
    }
}

impl Push for NativeFunction {
    fn push(self, state: &mut State) {
        state.push_closure_values(self.callback, self.upvalues);
    }
}

impl State {
    /// Wrap a host function as a VM function.
    pub fn wrap_function<F, Args, Ret>(&self, function: F) -> NativeFunction
    where
        F: HostFunction<Args, Ret>,
        Args: 'static,
        Ret: IntoResults + 'static,
    {
        NativeFunction::new(function)
    }

    /// Wrap a host function, capturing `upvalues` (e.g. a tuple) as the
    /// closure's upvalues 1..=`U::SLOTS`.
    pub fn wrap_function_with<F, Args, Ret, U>(&mut self, function: F, upvalues: U) -> NativeFunction
    where
        F: HostFunction<Args, Ret>,
        Args: 'static,
        Ret: IntoResults + 'static,
        U: Push,
    {
        let start = self.stack.len();
        self.push(upvalues);
        let captured = self.stack.split_off(start);
        NativeFunction::new(function).with_upvalues(captured)
    }
}
