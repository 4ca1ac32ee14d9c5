// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The capability record the rolling layer consumes from the underlying
//! blob store. The rolling layer never depends on a concrete
//! implementation — only on this trait.

/// Errors a [`Substrate`] implementation may signal.
#[derive(Debug)]
#[non_exhaustive]
pub enum SubstrateError {
    /// The named blob does not exist.
    NotExists,

    /// `create` was called against a name that already exists.
    AlreadyExists,

    /// The blob is sealed and cannot be written or concatenated into.
    Sealed,

    /// The requested write/concat offset did not match the blob's current length.
    BadOffset,

    /// I/O error from the underlying substrate.
    IoError(std::io::Error),

    /// A read spans data that is no longer present.
    Truncated,
}

impl std::fmt::Display for SubstrateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for SubstrateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SubstrateError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

/// Substrate result.
pub type SubstrateResult<T> = std::result::Result<T, SubstrateError>;

/// Point-in-time metadata about a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobStat {
    /// The blob's name.
    pub name: String,

    /// The blob's current length in bytes.
    pub length: u64,

    /// Whether the blob is sealed (no further writes accepted).
    pub sealed: bool,
}

/// A generic synchronous blob-storage substrate.
///
/// Implementations are expected to provide fencing: a stale writer's
/// attempt to write or concat at an offset that no longer matches the
/// blob's current length must fail with [`SubstrateError::BadOffset`],
/// never silently succeed or overwrite.
pub trait Substrate {
    /// An opaque handle to an open blob.
    type Handle: Clone;

    /// Creates a new, empty, unsealed blob. Fails [`SubstrateError::AlreadyExists`]
    /// if a blob by this name already exists.
    fn create(&self, name: &str) -> SubstrateResult<Self::Handle>;

    /// Opens an existing blob for reading.
    fn open_read(&self, name: &str) -> SubstrateResult<Self::Handle>;

    /// Opens an existing blob for writing (regardless of sealed state — writes
    /// against a sealed blob must fail at write time, not at open time).
    fn open_write(&self, name: &str) -> SubstrateResult<Self::Handle>;

    /// Reads into `buf` starting at `offset`, returning the number of bytes
    /// actually read (which may be less than `buf.len()` at end-of-blob).
    fn read(&self, handle: &Self::Handle, offset: u64, buf: &mut [u8]) -> SubstrateResult<usize>;

    /// Writes `data` at `offset`. Implementations only need to support strict
    /// append (`offset` equal to the blob's current length); any other offset
    /// is a fencing violation and must fail with [`SubstrateError::BadOffset`].
    fn write(&self, handle: &Self::Handle, offset: u64, data: &[u8]) -> SubstrateResult<()>;

    /// Seals a blob. Idempotent.
    fn seal(&self, handle: &Self::Handle) -> SubstrateResult<()>;

    /// Atomically appends the blob named `source_name` onto `target` at
    /// `offset` (which must equal `target`'s current length), and deletes
    /// the source.
    fn concat(&self, target: &Self::Handle, offset: u64, source_name: &str) -> SubstrateResult<()>;

    /// Deletes a blob by name.
    fn delete(&self, name: &str) -> SubstrateResult<()>;

    /// Returns whether a blob by this name exists.
    fn exists(&self, name: &str) -> SubstrateResult<bool>;

    /// Returns current metadata for a blob.
    fn stat(&self, name: &str) -> SubstrateResult<BlobStat>;
}
