// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An in-memory [`Substrate`] implementation, used as the test fixture for
//! this crate's own test suite and available to downstream crates that want
//! to exercise [`crate::store::RollingStore`] without a real blob store.

use crate::substrate::{BlobStat, Substrate, SubstrateError, SubstrateResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Blob {
    data: Vec<u8>,
    sealed: bool,
}

/// An in-memory, process-local [`Substrate`].
///
/// Fencing is enforced the same way a real substrate would: `write` and
/// `concat` only succeed at the blob's current length, and fail with
/// [`SubstrateError::BadOffset`] otherwise.
#[derive(Clone, Default)]
pub struct InMemorySubstrate {
    blobs: Arc<RwLock<HashMap<String, Blob>>>,
}

impl InMemorySubstrate {
    /// Creates an empty substrate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Substrate for InMemorySubstrate {
    type Handle = String;

    fn create(&self, name: &str) -> SubstrateResult<Self::Handle> {
        let mut blobs = self.blobs.write().expect("lock is poisoned");
        if blobs.contains_key(name) {
            return Err(SubstrateError::AlreadyExists);
        }
        blobs.insert(name.to_owned(), Blob::default());
        Ok(name.to_owned())
    }

    fn open_read(&self, name: &str) -> SubstrateResult<Self::Handle> {
        let blobs = self.blobs.read().expect("lock is poisoned");
        if blobs.contains_key(name) {
            Ok(name.to_owned())
        } else {
            Err(SubstrateError::NotExists)
        }
    }

    fn open_write(&self, name: &str) -> SubstrateResult<Self::Handle> {
        self.open_read(name)
    }

    fn read(&self, handle: &Self::Handle, offset: u64, buf: &mut [u8]) -> SubstrateResult<usize> {
        let blobs = self.blobs.read().expect("lock is poisoned");
        let blob = blobs.get(handle).ok_or(SubstrateError::NotExists)?;

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        if offset > blob.data.len() {
            return Err(SubstrateError::Truncated);
        }

        let available = &blob.data[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn write(&self, handle: &Self::Handle, offset: u64, data: &[u8]) -> SubstrateResult<()> {
        let mut blobs = self.blobs.write().expect("lock is poisoned");
        let blob = blobs.get_mut(handle).ok_or(SubstrateError::NotExists)?;

        if blob.sealed {
            return Err(SubstrateError::Sealed);
        }

        #[allow(clippy::cast_possible_truncation)]
        let current_len = blob.data.len() as u64;
        if offset != current_len {
            return Err(SubstrateError::BadOffset);
        }

        blob.data.extend_from_slice(data);
        Ok(())
    }

    fn seal(&self, handle: &Self::Handle) -> SubstrateResult<()> {
        let mut blobs = self.blobs.write().expect("lock is poisoned");
        let blob = blobs.get_mut(handle).ok_or(SubstrateError::NotExists)?;
        blob.sealed = true;
        Ok(())
    }

    fn concat(&self, target: &Self::Handle, offset: u64, source_name: &str) -> SubstrateResult<()> {
        let mut blobs = self.blobs.write().expect("lock is poisoned");

        let source_data = {
            let source = blobs.get(source_name).ok_or(SubstrateError::NotExists)?;
            source.data.clone()
        };

        {
            let target_blob = blobs.get_mut(target).ok_or(SubstrateError::NotExists)?;
            if target_blob.sealed {
                return Err(SubstrateError::Sealed);
            }

            #[allow(clippy::cast_possible_truncation)]
            let current_len = target_blob.data.len() as u64;
            if offset != current_len {
                return Err(SubstrateError::BadOffset);
            }

            target_blob.data.extend_from_slice(&source_data);
        }

        blobs.remove(source_name);
        Ok(())
    }

    fn delete(&self, name: &str) -> SubstrateResult<()> {
        let mut blobs = self.blobs.write().expect("lock is poisoned");
        blobs.remove(name).ok_or(SubstrateError::NotExists)?;
        Ok(())
    }

    fn exists(&self, name: &str) -> SubstrateResult<bool> {
        let blobs = self.blobs.read().expect("lock is poisoned");
        Ok(blobs.contains_key(name))
    }

    fn stat(&self, name: &str) -> SubstrateResult<BlobStat> {
        let blobs = self.blobs.read().expect("lock is poisoned");
        let blob = blobs.get(name).ok_or(SubstrateError::NotExists)?;

        Ok(BlobStat {
            name: name.to_owned(),
            #[allow(clippy::cast_possible_truncation)]
            length: blob.data.len() as u64,
            sealed: blob.sealed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn create_then_write_then_read() {
        let substrate = InMemorySubstrate::new();
        let handle = substrate.create("a").expect("should create");
        substrate.write(&handle, 0, b"hello").expect("should write");

        let mut buf = [0u8; 5];
        let n = substrate.read(&handle, 0, &mut buf).expect("should read");
        assert_eq!(5, n);
        assert_eq!(b"hello", &buf);
    }

    #[test]
    fn write_at_wrong_offset_fails() {
        let substrate = InMemorySubstrate::new();
        let handle = substrate.create("a").expect("should create");
        substrate.write(&handle, 0, b"hello").expect("should write");

        let err = substrate.write(&handle, 0, b"oops").unwrap_err();
        assert!(matches!(err, SubstrateError::BadOffset));
    }

    #[test]
    fn write_after_seal_fails() {
        let substrate = InMemorySubstrate::new();
        let handle = substrate.create("a").expect("should create");
        substrate.seal(&handle).expect("should seal");

        let err = substrate.write(&handle, 0, b"oops").unwrap_err();
        assert!(matches!(err, SubstrateError::Sealed));
    }

    #[test]
    fn concat_appends_and_removes_source() {
        let substrate = InMemorySubstrate::new();
        let a = substrate.create("a").expect("should create");
        substrate.write(&a, 0, b"foo").expect("should write");

        let b = substrate.create("b").expect("should create");
        substrate.write(&b, 0, b"bar").expect("should write");

        substrate.concat(&a, 3, "b").expect("should concat");

        let mut buf = [0u8; 6];
        substrate.read(&a, 0, &mut buf).expect("should read");
        assert_eq!(b"foobar", &buf);

        assert!(!substrate.exists("b").expect("should check"));
    }

    #[test]
    fn create_twice_fails() {
        let substrate = InMemorySubstrate::new();
        substrate.create("a").expect("should create");
        let err = substrate.create("a").unwrap_err();
        assert!(matches!(err, SubstrateError::AlreadyExists));
    }
}
