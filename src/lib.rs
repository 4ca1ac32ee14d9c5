// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A size-bounded, crash-consistent segmentation layer over a generic
//! synchronous blob-storage substrate.
//!
//! [`RollingStore`] exposes a single logical append-only segment whose
//! physical backing is an ordered chain of fixed-size sub-segments
//! described by a durable header. It supports concurrent-safe rollover at
//! a configured maximum size, native concatenation of two segments without
//! rewriting data, precise truncation, and legacy (header-less) segments.
//!
//! The store never talks to a concrete storage backend directly — it is
//! generic over anything implementing [`Substrate`], a small synchronous
//! capability record (`create`/`open_read`/`open_write`/`read`/`write`/
//! `seal`/`concat`/`delete`/`exists`/`stat`). [`InMemorySubstrate`] ships as
//! a test fixture.
//!
//! # Example usage
//!
//! ```
//! use rolling_store::{InMemorySubstrate, RollingPolicy, RollingStore};
//!
//! # fn main() -> rolling_store::Result<()> {
//! let store = RollingStore::new(InMemorySubstrate::new());
//! store.create("my-segment", RollingPolicy::bounded(64))?;
//!
//! let mut writer = store.open_write("my-segment")?;
//! store.write(&mut writer, 0, b"hello world")?;
//!
//! let mut reader = store.open_read("my-segment")?;
//! let mut buf = [0u8; 11];
//! store.read(&mut reader, 0, &mut buf)?;
//! assert_eq!(b"hello world", &buf);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod codec;
mod error;
mod handle;
mod naming;
mod policy;
mod store;
mod sub_segment;
mod substrate;

#[doc(hidden)]
pub mod mock;

pub use error::{Error, Result};
pub use handle::RollingHandle;
pub use policy::RollingPolicy;
pub use store::{RollingStore, SegmentInfo};
pub use sub_segment::SubSegment;
pub use substrate::{BlobStat, Substrate, SubstrateError, SubstrateResult};

#[doc(hidden)]
pub use mock::InMemorySubstrate;
