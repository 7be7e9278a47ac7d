//! Hook for VM API misuse.
//!
//! The VM facade checks stack discipline on entry to its raw API (popping
//! more slots than exist, moving the top past the stack, calling with too
//! few values). A failed check reports an [`AssertInfo`] to the handler
//! installed on the current thread. The handler decides whether to abort
//! (panic) or let the operation clamp and continue. With no handler
//! installed, misuse panics.

use std::cell::Cell;

/// What to do after a failed API check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertAction {
    /// Panic with the assertion message.
    Abort,
    /// Clamp the operation and continue.
    Continue,
}

/// Location and expression of a failed API check.
#[derive(Debug, Clone, Copy)]
pub struct AssertInfo<'a> {
    pub expression: &'a str,
    pub file: &'static str,
    pub line: u32,
    pub function: &'a str,
}

/// Handler invoked on a failed API check.
pub type AssertHandler = fn(&AssertInfo<'_>) -> AssertAction;

thread_local! {
    static HANDLER: Cell<Option<AssertHandler>> = const { Cell::new(None) };
}

/// Install (or with `None`, remove) the assert handler for this thread.
///
/// Returns the previously installed handler.
pub fn set_assert_handler(handler: Option<AssertHandler>) -> Option<AssertHandler> {
    HANDLER.with(|h| h.replace(handler))
}

/// Report a failed check. Returns only if the handler chose to continue.
#[doc(hidden)]
pub fn report(info: &AssertInfo<'_>) {
    let action = HANDLER
        .with(|h| h.get())
        .map_or(AssertAction::Abort, |handler| handler(info));

    if action == AssertAction::Abort {
        panic!(
            "VM API check failed: {} ({}:{} in {})",
            info.expression, info.file, info.line, info.function
        );
    }
}

/// Check a VM API precondition, reporting to the thread's assert handler.
///
/// Evaluates to `true` when the condition holds. When it does not and the
/// handler continues, evaluates to `false` so the caller can clamp.
#[macro_export]
#[doc(hidden)]
macro_rules! vm_check {
    ($cond:expr, $function:expr) => {{
        let ok = $cond;
        if !ok {
            $crate::assert_handler::report(&$crate::assert_handler::AssertInfo {
                expression: stringify!($cond),
                file: file!(),
                line: line!(),
                function: $function,
            });
        }
        ok
    }};
}
