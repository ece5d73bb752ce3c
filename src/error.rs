use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Error taxonomy of the codec core.
///
/// Every variant carries a one-sentence diagnostic naming the offending
/// offset, marker or field where one exists. Errors bubble up from the
/// deepest point that recognises them; there is no recovery inside the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A caller violated a documented precondition (dimensions, bit depths,
    /// ranges).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The codestream is malformed (missing SOC, bad marker, wrong segment
    /// length).
    #[error("invalid codestream data: {0}")]
    InvalidData(String),

    /// The codestream is structurally valid but semantically inconsistent.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// An internal invariant was violated during encode.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An optional feature this implementation does not provide.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// The cancellation token was tripped.
    #[error("operation cancelled")]
    Cancelled,
}

impl CodecError {
    pub(crate) fn invalid_parameter(msg: impl Into<String>) -> Self {
        CodecError::InvalidParameter(msg.into())
    }

    pub(crate) fn invalid_data(msg: impl Into<String>) -> Self {
        CodecError::InvalidData(msg.into())
    }

    pub(crate) fn decoding(msg: impl Into<String>) -> Self {
        CodecError::Decoding(msg.into())
    }

    pub(crate) fn encoding(msg: impl Into<String>) -> Self {
        CodecError::Encoding(msg.into())
    }
}
