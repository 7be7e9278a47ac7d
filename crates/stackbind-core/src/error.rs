//! Error types for the VM facade and the binding layer.
//!
//! ## Error Hierarchy
//!
//! ```text
//! Error (raised inside the VM, propagated with `?`)
//! ├── BadArgument / BadUpvalue - checked parameter conversion failed
//! ├── BadResult                - typed call returned an unexpected type
//! ├── NotCallable / InvalidOperation / InvalidComparison - VM operation errors
//! ├── AlreadyBorrowed          - bound object re-entrantly borrowed mutably
//! ├── StackOverflow            - call depth limit reached
//! ├── Interrupted              - abrupt abort requested through an InterruptHandle
//! ├── Runtime                  - host function error (message only)
//! └── Registration             - RegistrationError
//! ```
//!
//! A VM-level "raise" is an `Err` travelling up through `?` until the
//! nearest [`State::call`](crate::State::call) frame, which truncates the
//! stack back to the callee slot before handing the error to its caller.

use std::any::Any as StdAny;
use std::fmt;

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by VM operations and host functions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A checked argument did not have the expected dynamic type.
    #[error("bad argument #{position} ({expected} expected, got {actual})")]
    BadArgument {
        /// 1-based argument position.
        position: usize,
        /// Name of the expected type.
        expected: String,
        /// Name of the dynamic type actually found.
        actual: &'static str,
    },

    /// A closure upvalue did not have the expected dynamic type.
    #[error("bad upvalue #{position} ({expected} expected, got {actual})")]
    BadUpvalue {
        /// 1-based upvalue position.
        position: usize,
        /// Name of the expected type.
        expected: String,
        /// Name of the dynamic type actually found.
        actual: &'static str,
    },

    /// A call returned a value of the wrong type.
    #[error("bad result ({expected} expected, got {actual})")]
    BadResult {
        /// Name of the expected type.
        expected: String,
        /// Name of the dynamic type actually returned.
        actual: &'static str,
    },

    /// A non-function value was called.
    #[error("attempt to call a {0} value")]
    NotCallable(&'static str),

    /// An operation is not defined for a value.
    #[error("attempt to {operation} a {type_name} value")]
    InvalidOperation {
        /// What was attempted ("index", "perform arithmetic on", ...).
        operation: &'static str,
        /// Dynamic type of the offending value.
        type_name: &'static str,
    },

    /// Two values cannot be ordered.
    #[error("attempt to compare {left} with {right}")]
    InvalidComparison {
        /// Dynamic type of the left operand.
        left: &'static str,
        /// Dynamic type of the right operand.
        right: &'static str,
    },

    /// A bound object was borrowed while already mutably borrowed.
    #[error("{type_name} object is already borrowed")]
    AlreadyBorrowed {
        /// Name of the bound type.
        type_name: &'static str,
    },

    /// The call depth limit was reached.
    #[error("stack overflow")]
    StackOverflow,

    /// Execution was aborted through an interrupt handle.
    #[error("execution interrupted")]
    Interrupted,

    /// A host function reported failure.
    #[error("{0}")]
    Runtime(String),

    /// A type registration failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl Error {
    /// Create a runtime error from a message.
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }

    /// Convert an error returned by a host function.
    ///
    /// VM errors pass through unchanged, so an interrupt raised inside a
    /// nested call stays an interrupt. Anything else becomes a
    /// [`Error::Runtime`] carrying the error's display text.
    pub fn from_host<E: fmt::Display + 'static>(err: E) -> Self {
        match (&err as &dyn StdAny).downcast_ref::<Error>() {
            Some(vm_err) => vm_err.clone(),
            None => Error::Runtime(err.to_string()),
        }
    }

    /// Check if this error is an interrupt.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }
}

/// Errors that occur while registering bound types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A descriptor for this type name already exists in the state.
    #[error("duplicate registration: type '{0}' is already registered")]
    DuplicateType(String),

    /// The VM could not allocate the descriptor table.
    #[error("out of memory while registering type '{0}'")]
    OutOfMemory(String),
}
