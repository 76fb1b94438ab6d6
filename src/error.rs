/// Failure of a raw cursor read.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error("end of stream at bit {at}: wanted {wanted} bits, {remaining} remaining")]
    EndOfStream { at: u64, wanted: u64, remaining: u64 },
    #[error("cannot read {width} bits into a 64-bit value")]
    WidthOutOfRange { width: u32 },
}

/// Errors that unwind a decode. Everything else is recorded as a
/// non-fatal diagnostic and decoding carries on.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("end of stream at bit {at}: wanted {wanted} bits, {remaining} remaining")]
    EndOfStream { at: u64, wanted: u64, remaining: u64 },
    #[error("cannot read {width} bits into a 64-bit value")]
    InvalidWidth { width: u32 },
    #[error("decode cancelled at bit {at}")]
    Cancelled { at: u64 },
    #[error("format has no dependency named {0:?}")]
    UnresolvedFormat(String),
    #[error("nesting deeper than {limit} levels")]
    DepthExceeded { limit: usize },
    /// Raised by a decode routine rejecting its input.
    #[error("{0}")]
    Invalid(String),
}

impl From<ReadError> for DecodeError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::EndOfStream { at, wanted, remaining } => {
                DecodeError::EndOfStream { at, wanted, remaining }
            }
            ReadError::WidthOutOfRange { width } => DecodeError::InvalidWidth { width },
        }
    }
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Registration and lookup errors. These describe a misconfigured registry
/// or a bad request, never malformed input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("format {0:?} is already registered")]
    DuplicateFormat(String),
    #[error("unresolved dependencies: {}", .missing.join(", "))]
    UnresolvedDependency { missing: Vec<String> },
    #[error("unknown format {0:?}")]
    UnknownFormat(String),
    #[error("registry has not been resolved")]
    NotResolved,
}
