//! Runtime error types.
//!
//! Decoding failures live in [`crate::decode::DecodeError`] and are only
//! produced while an instruction sequence is being constructed. Everything
//! that can go wrong after that point is a [`RunError`]: errors unwind
//! through the frame protocol (which restores the frame stack and program
//! counter on every exit path) and surface to the caller of `eval`. Nothing
//! is retried and nothing is recovered internally.

use std::{fmt, rc::Rc};

use strum::{Display, IntoStaticStr};

use crate::value::Value;

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Exception classes the host runtime can raise from a delegated call.
///
/// The string representation matches the class name exactly
/// (e.g. `NoMethodError` -> "NoMethodError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum HostExcClass {
    NoMethodError,
    TypeError,
    ZeroDivisionError,
    NameError,
    ArgumentError,
}

/// An error raised by the host runtime during a delegated `send`, constant
/// lookup, or global import. Propagated unchanged through the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostException {
    pub class: HostExcClass,
    pub message: String,
}

impl HostException {
    pub fn new(class: HostExcClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// NoMethodError naming the receiver the way the host renders it,
    /// e.g. "undefined method `foo' for main:Object".
    #[must_use]
    pub fn no_method(receiver: &Value, mid: &str) -> Self {
        Self::new(
            HostExcClass::NoMethodError,
            format!(
                "undefined method `{mid}' for {}:{}",
                receiver.inspect(),
                receiver.type_tag()
            ),
        )
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(HostExcClass::TypeError, message)
    }

    #[must_use]
    pub fn coerce_error(given: &Value, wanted: &'static str) -> Self {
        Self::type_error(format!("{} can't be coerced into {wanted}", given.type_tag()))
    }

    #[must_use]
    pub fn zero_division() -> Self {
        Self::new(HostExcClass::ZeroDivisionError, "divided by 0")
    }

    /// NameError for a missing host constant.
    #[must_use]
    pub fn uninitialized_constant(name: &str) -> Self {
        Self::new(HostExcClass::NameError, format!("uninitialized constant {name}"))
    }

    /// ArgumentError for a host method called with the wrong argument count.
    #[must_use]
    pub fn arity(given: usize, expected: usize) -> Self {
        Self::new(
            HostExcClass::ArgumentError,
            format!("wrong number of arguments (given {given}, expected {expected})"),
        )
    }
}

impl fmt::Display for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

impl std::error::Error for HostException {}

/// Errors produced while executing a decoded program.
#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    /// A local variable slot was read before anything was stored in it.
    UndefinedLocal {
        /// Name of the local, taken from the owning sequence's locals list.
        name: Rc<str>,
        /// `inspect` rendering of the owning sequence's self value.
        receiver: String,
    },

    /// A user-defined method was invoked with an argument shape its
    /// sequence does not accept.
    ArityMismatch {
        mid: Rc<str>,
        expected: usize,
        given: usize,
    },

    /// An error raised by the host runtime, passed through unchanged.
    Host(HostException),

    /// Stack underflow, an unresolvable label, or a program counter outside
    /// the current sequence. Unreachable for decoder-produced sequences;
    /// reaching it indicates a bug.
    Internal(String),
}

impl RunError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<HostException> for RunError {
    fn from(exc: HostException) -> Self {
        Self::Host(exc)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedLocal { name, receiver } => {
                write!(f, "undefined local variable `{name}' for {receiver}")
            }
            Self::ArityMismatch { mid, expected, given } => {
                write!(
                    f,
                    "wrong number of arguments calling `{mid}' (given {given}, expected {expected})"
                )
            }
            Self::Host(exc) => write!(f, "{exc}"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for RunError {}
