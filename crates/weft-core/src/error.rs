use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintParseError),
}

/// Failures reading typed values out of a [`Context`](crate::Context).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context variable \"{0}\" not found")]
    VariableNotFound(String),
    #[error("context variable \"{name}\" holds {actual}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintParseError {
    #[error("fingerprint must be 32 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex digit {digit:?} at offset {offset}")]
    InvalidDigit { digit: char, offset: usize },
}
