//! Creating instances of bound types.

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use stackbind_core::{HostFunction, NativeFunction, Result, State};

use crate::BoundType;

/// Wrap a constructor body as the descriptor's `new` entry.
///
/// `f` produces the value; [`construct`] takes care of the userdata.
pub fn constructor<T, F, Args>(f: F) -> NativeFunction
where
    T: BoundType,
    F: HostFunction<Args, Result<T>>,
    Args: 'static,
{
    NativeFunction::from_callback(Rc::new(move |state: &mut State| construct(state, &f)))
}

/// Run a constructor and push the new instance.
///
/// The userdata slot is reserved before `f` runs: if the VM is out of
/// objects, `f` is never called and no result is produced. If `f` fails or
/// panics the reservation is released before the error or panic propagates.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn construct<T, F, Args>(state: &mut State, f: &F) -> Result<i32>
where
    T: BoundType,
    F: HostFunction<Args, Result<T>>,
{
    let Some(slot) = state.reserve_userdata() else {
        return Ok(0);
    };
    let metatable = state.find_metatable(T::type_name());
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| f.call_host(state))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            state.release_userdata(slot);
            panic::resume_unwind(payload);
        }
    };
    let value = match outcome.and_then(|result| result) {
        Ok(value) => value,
        Err(err) => {
            state.release_userdata(slot);
            return Err(err);
        }
    };
    state.fill_userdata(slot, value, T::type_hash(), T::destructor(), metatable);
    Ok(1)
}

/// Push `value` as an instance of its bound type.
///
/// Pushes nil and returns false when the VM is out of objects.
pub fn push_bound<T: BoundType>(state: &mut State, value: T) -> bool {
    match state.reserve_userdata() {
        Some(slot) => {
            let metatable = state.find_metatable(T::type_name());
            state.fill_userdata(slot, value, T::type_hash(), T::destructor(), metatable)
        }
        None => {
            state.push_nil();
            false
        }
    }
}
