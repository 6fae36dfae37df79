//! Error types for the hot-swap registry.

use thiserror::Error;

use super::RegistryKey;

/// Errors raised while invoking a hot-swappable callable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error("expected {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },

    #[error("method called without a receiver")]
    MissingReceiver,

    #[error("'{class}' has no member '{member}'")]
    NoSuchMember { class: String, member: String },

    #[error("member '{member}' is not callable")]
    NotCallable { member: String },

    #[error("name '{name}' is not defined")]
    Unbound { name: String },

    #[error("unsupported operand types for {op}: {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("{0}")]
    Raised(String),
}

/// Errors from registering definitions.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Only functions and classes can be hot-swapped.
    #[error("{kind} value '{key}' cannot be hot-swapped")]
    UnsupportedKind { key: RegistryKey, kind: &'static str },

    /// A re-initialization hook failed after the class members were swapped.
    #[error("re-initialization of an instance of '{key}' failed: {source}")]
    Hook {
        key: RegistryKey,
        #[source]
        source: CallError,
    },
}
