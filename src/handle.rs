// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The in-memory view of one logical segment, mirroring the teacher's
//! approach of keeping a lightweight handle struct around an `Arc`-shared
//! substrate handle plus whatever index state is needed to serve reads
//! without re-parsing the header on every call.

use crate::policy::RollingPolicy;
use crate::substrate::Substrate;
use crate::sub_segment::SubSegment;

/// A handle to an open logical segment.
///
/// `header_handle.is_none()` is the single source of truth for "this is a
/// legacy, header-less segment" throughout [`crate::store::RollingStore`].
pub struct RollingHandle<S: Substrate> {
    /// The logical segment name.
    pub(crate) segment_name: String,

    /// The open substrate handle to the header blob, or `None` for a legacy
    /// segment that predates the header layer.
    pub(crate) header_handle: Option<S::Handle>,

    /// Current length of the header blob, used to append new entries at the
    /// correct offset.
    pub(crate) header_length: u64,

    /// Number of top-level entries in this segment's own header. Distinct
    /// from `sub_segments.len()` whenever the header contains a nested
    /// `ConcatBegin`. Needed so that if this segment later becomes a concat
    /// source itself, the new `ConcatBegin` written onto its target encodes
    /// the count the recursive parser actually expects.
    pub(crate) header_entry_count: u32,

    /// The rolling policy in effect for this segment.
    pub(crate) policy: RollingPolicy,

    /// The ordered, contiguous table of sub-segments backing this segment.
    /// Entries are never removed once added, even by truncation — see
    /// `RollingStore::truncate`.
    pub(crate) sub_segments: Vec<SubSegment>,

    /// The open substrate handle to the active (tail) sub-segment, if this
    /// handle was opened for writing and the segment is not sealed.
    pub(crate) active_writer_handle: Option<S::Handle>,

    /// Whether this handle was opened read-only.
    pub(crate) read_only: bool,

    /// Whether the segment as a whole is sealed (no further writes, ever).
    pub(crate) sealed: bool,

    /// Whether this segment has been deleted out from under this handle.
    /// Set by the staleness-refresh protocol in `RollingStore::read`.
    pub(crate) deleted: bool,
}

impl<S: Substrate> RollingHandle<S> {
    /// The logical segment's current total length: the sum of its
    /// sub-segment lengths, including those now flagged non-existent by
    /// truncation (truncation never shrinks this value).
    #[must_use]
    pub fn length(&self) -> u64 {
        self.sub_segments.iter().map(|s| s.length).sum()
    }

    /// The segment's logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.segment_name
    }

    /// Whether the segment is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Whether this is a legacy, header-less segment.
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.header_handle.is_none()
    }
}
