// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    codec::{DecodeError, EncodeError},
    substrate::SubstrateError,
};

/// Errors that can occur while operating on a rolling segment.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The segment, or a sub-segment blob required to serve the request, does not exist.
    NotExists,

    /// `create` was called against a name that already has a non-empty or sealed blob.
    AlreadyExists,

    /// The operation requires writing to a sealed segment.
    Sealed,

    /// A write offset did not equal the segment's current length.
    BadOffset,

    /// A header append was rejected by substrate fencing — another writer holds the segment.
    NotPrimary,

    /// A read spans a sub-segment whose backing blob has been deleted.
    Truncated,

    /// A precondition on a composite operation (e.g. concat) was not met.
    IllegalState(String),

    /// An unclassified substrate I/O failure.
    IoError(std::io::Error),

    /// Header serialization failed.
    Encode(EncodeError),

    /// Header deserialization failed.
    Decode(DecodeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotExists => write!(f, "segment or sub-segment does not exist"),
            Self::AlreadyExists => write!(f, "segment already exists"),
            Self::Sealed => write!(f, "segment is sealed"),
            Self::BadOffset => write!(f, "write offset does not match segment length"),
            Self::NotPrimary => write!(f, "header append rejected: another writer is active"),
            Self::Truncated => write!(f, "read spans a truncated sub-segment"),
            Self::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            Self::IoError(e) => write!(f, "I/O error: {e}"),
            Self::Encode(e) => write!(f, "header encode error: {e:?}"),
            Self::Decode(e) => write!(f, "header decode error: {e:?}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<SubstrateError> for Error {
    fn from(value: SubstrateError) -> Self {
        match value {
            SubstrateError::NotExists => Self::NotExists,
            SubstrateError::AlreadyExists => Self::AlreadyExists,
            SubstrateError::Sealed => Self::Sealed,
            SubstrateError::BadOffset => Self::BadOffset,
            SubstrateError::Truncated => Self::Truncated,
            SubstrateError::IoError(e) => Self::IoError(e),
        }
    }
}

/// Rolling storage result.
pub type Result<T> = std::result::Result<T, Error>;
