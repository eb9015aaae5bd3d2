//! Error types for the bailout engine core
//!
//! Two failure classes exist side by side:
//!
//! - **Recoverable** errors are values of [`Error`]. Language-level exceptions raised by
//!   the inline cache miss handlers (`TypeError`, `ReferenceError`) travel as
//!   [`Error::RuntimeError`] together with the name of the message template that
//!   produced them. An aborted on-stack replacement is [`Error::Osr`].
//! - **Structural** violations (a malformed translation, a missing deoptimization
//!   entry) are bugs in the code generator. They are logged through `tracing` and then
//!   abort the process via [`fatal`].

use std::fmt;
use thiserror::Error;

/// Main error type for the engine core
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Language-level exception raised while resolving an access
    #[error("{kind}: {message}")]
    RuntimeError {
        kind: ErrorKind,
        /// Name of the message template, e.g. `non_object_property_load`
        template: &'static str,
        message: String,
    },

    /// Internal engine error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Invalid engine configuration
    #[error("ConfigError: {0}")]
    ConfigError(String),

    /// Malformed serialized input handed to tooling
    #[error("DecodeError: {0}")]
    DecodeError(String),

    /// IO error
    #[error("IOError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// On-stack replacement was abandoned; the interpreted frame is untouched
    #[error("OsrAborted: {0}")]
    Osr(OsrAbort),
}

/// JavaScript error kinds raised by the miss handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum ErrorKind {
    /// TypeError - wrong type for operation
    TypeError,
    /// ReferenceError - undefined variable
    ReferenceError,
    /// RangeError - value out of range
    RangeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ReferenceError => write!(f, "ReferenceError"),
            ErrorKind::RangeError => write!(f, "RangeError"),
        }
    }
}

/// Why an on-stack replacement attempt gave up
#[derive(Debug, Clone, PartialEq)]
pub struct OsrAbort {
    /// Input slot index the failing command read from
    pub input_index: usize,
    pub reason: OsrAbortReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OsrAbortReason {
    /// An interpreted value could not be represented as an int32
    NotInt32(String),
    /// An interpreted value could not be represented as a uint32
    NotUint32(String),
    /// A double slot held a value that is not a number
    NotNumber(String),
    /// The interpreted frame holds a non-tagged word where a value was expected
    UntaggedInput,
}

impl fmt::Display for OsrAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            OsrAbortReason::NotInt32(v) => {
                write!(f, "input slot {} holds {} which is not an int32", self.input_index, v)
            }
            OsrAbortReason::NotUint32(v) => {
                write!(f, "input slot {} holds {} which is not a uint32", self.input_index, v)
            }
            OsrAbortReason::NotNumber(v) => {
                write!(f, "input slot {} holds {} which is not a number", self.input_index, v)
            }
            OsrAbortReason::UntaggedInput => {
                write!(f, "input slot {} is not a tagged value", self.input_index)
            }
        }
    }
}

impl Error {
    /// Create a TypeError from a message template
    pub fn type_error(template: &'static str, message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind: ErrorKind::TypeError,
            template,
            message: message.into(),
        }
    }

    /// Create a ReferenceError from a message template
    pub fn reference_error(template: &'static str, message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind: ErrorKind::ReferenceError,
            template,
            message: message.into(),
        }
    }

    /// Create a RangeError from a message template
    pub fn range_error(template: &'static str, message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind: ErrorKind::RangeError,
            template,
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::InternalError(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigError(message.into())
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Error::DecodeError(message.into())
    }

    /// The error kind, for language-level exceptions
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::RuntimeError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The message template name, for language-level exceptions
    pub fn template(&self) -> Option<&'static str> {
        match self {
            Error::RuntimeError { template, .. } => Some(template),
            _ => None,
        }
    }
}

/// Result type alias for the engine core
pub type Result<T> = std::result::Result<T, Error>;

/// Report a structural violation and abort.
///
/// Structural violations mean the code generator emitted metadata the runtime cannot
/// interpret; there is no state to recover to.
#[track_caller]
pub fn fatal(message: impl fmt::Display) -> ! {
    tracing::error!(target: "bailout::fatal", "{}", message);
    panic!("fatal error: {}", message)
}

/// Message templates used by the miss handlers.
///
/// Each template has a stable name (carried in [`Error::RuntimeError`]) and a helper
/// that formats the user-facing message.
pub mod messages {
    pub const NON_OBJECT_PROPERTY_LOAD: &str = "non_object_property_load";
    pub const NON_OBJECT_PROPERTY_STORE: &str = "non_object_property_store";
    pub const NON_OBJECT_PROPERTY_CALL: &str = "non_object_property_call";
    pub const NOT_DEFINED: &str = "not_defined";
    pub const UNDEFINED_METHOD: &str = "undefined_method";
    pub const PROPERTY_NOT_FUNCTION: &str = "property_not_function";
    pub const STRICT_READ_ONLY_PROPERTY: &str = "strict_read_only_property";
    pub const CALLED_NON_CALLABLE: &str = "called_non_callable";

    /// Format a "Cannot read property 'X' of Y" error message
    pub fn non_object_property_load(name: &str, receiver: &str) -> String {
        format!("Cannot read property '{}' of {}", name, receiver)
    }

    /// Format a "Cannot set property 'X' of Y" error message
    pub fn non_object_property_store(name: &str, receiver: &str) -> String {
        format!("Cannot set property '{}' of {}", name, receiver)
    }

    /// Format a "Cannot call method 'X' of Y" error message
    pub fn non_object_property_call(name: &str, receiver: &str) -> String {
        format!("Cannot call method '{}' of {}", name, receiver)
    }

    /// Format a "X is not defined" error message
    pub fn not_defined(name: &str) -> String {
        format!("{} is not defined", name)
    }

    /// Format an "Object Y has no method 'X'" error message
    pub fn undefined_method(name: &str, receiver: &str) -> String {
        format!("Object {} has no method '{}'", receiver, name)
    }

    /// Format a "Property 'X' of object Y is not a function" error message
    pub fn property_not_function(name: &str, receiver: &str) -> String {
        format!("Property '{}' of object {} is not a function", name, receiver)
    }

    /// Format a "Cannot assign to read only property 'X' of Y" error message
    pub fn strict_read_only_property(name: &str, receiver: &str) -> String {
        format!("Cannot assign to read only property '{}' of {}", name, receiver)
    }

    /// Format a "X is not a function" error message
    pub fn called_non_callable(what: &str) -> String {
        format!("{} is not a function", what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let err = Error::type_error(
            messages::NON_OBJECT_PROPERTY_LOAD,
            messages::non_object_property_load("x", "undefined"),
        );
        assert_eq!(err.to_string(), "TypeError: Cannot read property 'x' of undefined");
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
        assert_eq!(err.template(), Some("non_object_property_load"));
    }

    #[test]
    fn test_reference_error_display() {
        let err = Error::reference_error(messages::NOT_DEFINED, messages::not_defined("foo"));
        assert_eq!(err.to_string(), "ReferenceError: foo is not defined");
    }

    #[test]
    fn test_osr_abort_display() {
        let err = Error::Osr(OsrAbort {
            input_index: 3,
            reason: OsrAbortReason::NotInt32("1.5".to_string()),
        });
        assert_eq!(err.to_string(), "OsrAborted: input slot 3 holds 1.5 which is not an int32");
        assert_eq!(err.kind(), None);
    }

    #[test]
    #[should_panic(expected = "fatal error: broken translation")]
    fn test_fatal_panics() {
        fatal("broken translation");
    }
}
