// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The rolling storage engine itself: open/read/write/seal/concat/delete/
//! truncate over a generic [`Substrate`].

use crate::codec;
use crate::error::{Error, Result};
use crate::handle::RollingHandle;
use crate::naming::{header_name, sub_name};
use crate::policy::RollingPolicy;
use crate::substrate::{Substrate, SubstrateError};
use crate::sub_segment::SubSegment;
use std::sync::Arc;

/// Summary information about a segment, returned by `create` and `info`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentInfo {
    /// The segment's logical name.
    pub name: String,

    /// Whether the segment is sealed.
    pub sealed: bool,

    /// The segment's current length.
    pub length: u64,
}

struct RollingStoreInner<S: Substrate> {
    substrate: S,
}

/// Size-bounded, crash-consistent segmentation layer over a synchronous
/// blob [`Substrate`].
///
/// Cheaply [`Clone`]able; clones share the same underlying substrate
/// reference, mirroring the way the underlying value-log store shares one
/// `Arc`-wrapped inner across handles.
pub struct RollingStore<S: Substrate>(Arc<RollingStoreInner<S>>);

impl<S: Substrate> Clone for RollingStore<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: Substrate> RollingStore<S> {
    /// Wraps a substrate in a new store.
    pub fn new(substrate: S) -> Self {
        Self(Arc::new(RollingStoreInner { substrate }))
    }

    fn substrate(&self) -> &S {
        &self.0.substrate
    }

    /// Creates a new, empty segment under the given rolling policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if a non-empty or sealed header or
    /// legacy blob already exists under this name.
    pub fn create(&self, name: &str, policy: RollingPolicy) -> Result<SegmentInfo> {
        let hdr_name = header_name(name);

        match self.substrate().stat(&hdr_name) {
            Ok(stat) if stat.length > 0 || stat.sealed => return Err(Error::AlreadyExists),
            Ok(_) => {
                log::debug!("reusing empty unsealed header blob as crash remnant: {hdr_name}");
            }
            Err(SubstrateError::NotExists) => {
                if let Ok(stat) = self.substrate().stat(name) {
                    if stat.length > 0 || stat.sealed {
                        return Err(Error::AlreadyExists);
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }

        let header_handle = match self.substrate().create(&hdr_name) {
            Ok(handle) => handle,
            Err(SubstrateError::AlreadyExists) => self.substrate().open_write(&hdr_name)?,
            Err(e) => return Err(e.into()),
        };

        let result = (|| -> Result<()> {
            let bytes = codec::encode_header(&policy)?;
            self.substrate().write(&header_handle, 0, &bytes)?;
            Ok(())
        })();

        if let Err(err) = result {
            if let Err(delete_err) = self.substrate().delete(&hdr_name) {
                log::warn!("failed to clean up header blob after create failure: {delete_err}");
            }
            return Err(err);
        }

        log::info!("created segment {name}");

        Ok(SegmentInfo {
            name: name.to_owned(),
            sealed: false,
            length: 0,
        })
    }

    /// Opens a segment for reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotExists`] if neither a header nor a legacy blob
    /// exists under this name.
    pub fn open_read(&self, name: &str) -> Result<RollingHandle<S>> {
        self.open(name, false)
    }

    /// Opens a segment for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotExists`] if neither a header nor a legacy blob
    /// exists under this name.
    pub fn open_write(&self, name: &str) -> Result<RollingHandle<S>> {
        self.open(name, true)
    }

    fn open(&self, name: &str, writable: bool) -> Result<RollingHandle<S>> {
        let hdr_name = header_name(name);

        match self.substrate().stat(&hdr_name) {
            Ok(stat) if stat.length > 0 => self.open_headered(name, &hdr_name, writable),
            _ => self.open_legacy(name, writable),
        }
    }

    fn open_headered(&self, name: &str, hdr_name: &str, writable: bool) -> Result<RollingHandle<S>> {
        let header_handle = if writable {
            self.substrate().open_write(hdr_name)?
        } else {
            self.substrate().open_read(hdr_name)?
        };

        let stat = self.substrate().stat(hdr_name)?;

        let mut buf = vec![0u8; usize::try_from(stat.length).unwrap_or(usize::MAX)];
        self.substrate().read(&header_handle, 0, &mut buf)?;

        let (policy, mut sub_segments, header_entry_count) = codec::parse_header(&mut &buf[..])?;

        self.fix_up_sub_segments(&mut sub_segments)?;

        let active_writer_handle = if writable && !stat.sealed {
            sub_segments
                .last()
                .filter(|tail| !tail.sealed)
                .map(|tail| self.substrate().open_write(&tail.name))
                .transpose()?
        } else {
            None
        };

        Ok(RollingHandle {
            segment_name: name.to_owned(),
            header_handle: Some(header_handle),
            header_length: stat.length,
            header_entry_count,
            policy,
            sub_segments,
            active_writer_handle,
            read_only: !writable,
            sealed: stat.sealed,
            deleted: false,
        })
    }

    fn open_legacy(&self, name: &str, writable: bool) -> Result<RollingHandle<S>> {
        let stat = self.substrate().stat(name)?;

        let handle = if writable {
            self.substrate().open_write(name)?
        } else {
            self.substrate().open_read(name)?
        };

        let sub_segments = vec![SubSegment {
            name: name.to_owned(),
            start_offset: 0,
            length: stat.length,
            sealed: stat.sealed,
            exists: true,
        }];

        let active_writer_handle = if writable && !stat.sealed {
            Some(handle)
        } else {
            None
        };

        Ok(RollingHandle {
            segment_name: name.to_owned(),
            header_handle: None,
            header_length: 0,
            header_entry_count: 0,
            policy: RollingPolicy::unbounded(),
            sub_segments,
            active_writer_handle,
            read_only: !writable,
            sealed: stat.sealed,
            deleted: false,
        })
    }

    /// Stats every sub-segment to fix up lengths and sealed flags: for
    /// non-tail entries these are derived from the next entry's start
    /// offset (and are always sealed); for the tail they come directly
    /// from the substrate.
    fn fix_up_sub_segments(&self, sub_segments: &mut [SubSegment]) -> Result<()> {
        let last_index = sub_segments.len().saturating_sub(1);

        for i in 0..sub_segments.len() {
            if i == last_index {
                let stat = self.substrate().stat(&sub_segments[i].name)?;
                sub_segments[i].length = stat.length;
                sub_segments[i].sealed = stat.sealed;
            } else {
                let next_start = sub_segments[i + 1].start_offset;
                sub_segments[i].length = next_start - sub_segments[i].start_offset;
                sub_segments[i].sealed = true;
            }
        }

        Ok(())
    }

    /// Reads `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if a sub-segment covering the range
    /// has been deleted, or [`Error::NotExists`] if the whole segment has
    /// been deleted out from under this handle.
    pub fn read(&self, handle: &mut RollingHandle<S>, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if handle.deleted {
            return Err(Error::NotExists);
        }

        let len = buf.len() as u64;

        if handle.read_only && !handle.sealed && offset + len > handle.length() {
            self.refresh(handle)?;
        }

        if handle.deleted {
            return Err(Error::NotExists);
        }

        if len == 0 {
            if offset > handle.length() {
                return Err(Error::BadOffset);
            }
            return Ok(0);
        }

        if offset >= handle.length() || offset + len > handle.length() {
            return Err(Error::BadOffset);
        }

        let mut index = match self.locate(handle, offset) {
            Some(i) => i,
            None => return Err(Error::BadOffset),
        };

        let mut read_so_far = 0u64;
        let mut cursor = offset;

        while read_so_far < len {
            if index >= handle.sub_segments.len() {
                return Err(Error::Truncated);
            }

            if handle.sub_segments[index].length == 0 {
                index += 1;
                continue;
            }

            let sub = handle.sub_segments[index].clone();

            if !sub.exists {
                return self.on_read_gap(handle);
            }

            let local_offset = cursor - sub.start_offset;
            let want = (len - read_so_far).min(sub.length - local_offset);

            #[allow(clippy::cast_possible_truncation)]
            let want_usize = want as usize;
            let read_so_far_usize = usize::try_from(read_so_far).unwrap_or(usize::MAX);

            let dest = &mut buf[read_so_far_usize..read_so_far_usize + want_usize];

            match self.substrate().open_read(&sub.name) {
                Ok(blob_handle) => match self.substrate().read(&blob_handle, local_offset, dest) {
                    Ok(n) if (n as u64) < want => {
                        return self.on_read_gap(handle);
                    }
                    Ok(_) => {}
                    Err(SubstrateError::NotExists | SubstrateError::Truncated) => {
                        return self.on_read_gap(handle);
                    }
                    Err(e) => return Err(e.into()),
                },
                Err(SubstrateError::NotExists) => {
                    return self.on_read_gap(handle);
                }
                Err(e) => return Err(e.into()),
            }

            read_so_far += want;
            cursor += want;
            index += 1;
        }

        Ok(usize::try_from(read_so_far).unwrap_or(usize::MAX))
    }

    /// Handles a mid-read discovery that a sub-segment's backing blob is
    /// gone: refresh, then classify as `Truncated` or `NotExists`.
    fn on_read_gap(&self, handle: &mut RollingHandle<S>) -> Result<usize> {
        self.refresh(handle)?;
        if handle.deleted {
            Err(Error::NotExists)
        } else {
            Err(Error::Truncated)
        }
    }

    /// Re-opens the segment by name and patches `handle`'s sub-segment
    /// list, header length, and sealed flag in place.
    fn refresh(&self, handle: &mut RollingHandle<S>) -> Result<()> {
        match self.open_read(&handle.segment_name) {
            Ok(fresh) => {
                handle.sub_segments = fresh.sub_segments;
                handle.header_length = fresh.header_length;
                handle.header_entry_count = fresh.header_entry_count;
                handle.sealed = fresh.sealed;
                Ok(())
            }
            Err(Error::NotExists) => {
                handle.deleted = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Bisects the sub-segment table for the entry containing `offset`.
    fn locate(&self, handle: &RollingHandle<S>, offset: u64) -> Option<usize> {
        handle
            .sub_segments
            .iter()
            .position(|s| s.length > 0 && s.contains(offset))
    }

    /// Appends `data` at `offset`, which must equal the segment's current
    /// length (strict append only).
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadOffset`] if `offset != handle.length()`, or
    /// [`Error::Sealed`] if the segment is sealed.
    pub fn write(&self, handle: &mut RollingHandle<S>, offset: u64, data: &[u8]) -> Result<()> {
        if handle.deleted {
            return Err(Error::NotExists);
        }
        if handle.read_only {
            return Err(Error::Sealed);
        }
        if handle.sealed {
            return Err(Error::Sealed);
        }
        if offset != handle.length() {
            return Err(Error::BadOffset);
        }
        if data.is_empty() {
            return Ok(());
        }

        let mut written = 0usize;

        while written < data.len() {
            let needs_rollover = match handle.sub_segments.last() {
                None => true,
                Some(tail) => tail.sealed || tail.length >= handle.policy.max_sub_segment_length(),
            };

            if needs_rollover {
                self.rollover(handle)?;
            }

            let tail_index = handle.sub_segments.len() - 1;
            let tail_remaining = handle.policy.max_sub_segment_length() - handle.sub_segments[tail_index].length;
            let remaining_in_data = (data.len() - written) as u64;

            #[allow(clippy::cast_possible_truncation)]
            let chunk_len = tail_remaining.min(remaining_in_data) as usize;

            let local_offset = handle.sub_segments[tail_index].length;
            let writer_handle = handle
                .active_writer_handle
                .as_ref()
                .expect("rollover guarantees an active writer handle")
                .clone();

            self.substrate()
                .write(&writer_handle, local_offset, &data[written..written + chunk_len])?;

            handle.sub_segments[tail_index].length += chunk_len as u64;
            written += chunk_len;
        }

        Ok(())
    }

    /// Seals the current active tail, then creates a fresh sub-segment
    /// starting at `handle.length()`. The header append happens before the
    /// new tail is opened for writing, so a stale writer is caught by
    /// substrate fencing before any data lands in the wrong place.
    fn rollover(&self, handle: &mut RollingHandle<S>) -> Result<()> {
        if let Some(tail) = handle.sub_segments.last_mut() {
            if let Some(writer) = handle.active_writer_handle.take() {
                self.substrate().seal(&writer)?;
            }
            tail.sealed = true;
        }

        let new_start = handle.length();
        let new_name = sub_name(&handle.segment_name, new_start);

        match self.substrate().stat(&new_name) {
            Ok(stat) if stat.length == 0 && !stat.sealed => {
                log::debug!("reusing empty unsealed sub-segment as crash remnant: {new_name}");
            }
            Ok(_) => return Err(Error::IllegalState(format!("sub-segment {new_name} already in use"))),
            Err(SubstrateError::NotExists) => {
                self.substrate().create(&new_name)?;
            }
            Err(e) => return Err(e.into()),
        }

        let header_handle = handle
            .header_handle
            .as_ref()
            .expect("rollover is never called on a legacy handle")
            .clone();

        let entry = codec::encode_new_sub_segment_entry(new_start, &new_name)?;

        match self.substrate().write(&header_handle, handle.header_length, &entry) {
            Ok(()) => {}
            Err(SubstrateError::BadOffset) => return Err(Error::NotPrimary),
            Err(e) => return Err(e.into()),
        }

        handle.header_length += entry.len() as u64;
        handle.header_entry_count += 1;

        let writer_handle = self.substrate().open_write(&new_name)?;
        handle.active_writer_handle = Some(writer_handle);

        handle.sub_segments.push(SubSegment {
            name: new_name,
            start_offset: new_start,
            length: 0,
            sealed: false,
            exists: true,
        });

        log::debug!("rolled over {} at offset {new_start}", handle.segment_name);

        Ok(())
    }

    /// Seals the active tail and the header. Subsequent writes fail; reads
    /// continue to succeed.
    ///
    /// # Errors
    ///
    /// Propagates substrate errors encountered while sealing.
    pub fn seal(&self, handle: &mut RollingHandle<S>) -> Result<()> {
        if handle.deleted {
            return Err(Error::NotExists);
        }

        if let Some(writer) = handle.active_writer_handle.take() {
            self.substrate().seal(&writer)?;
        }
        if let Some(tail) = handle.sub_segments.last_mut() {
            tail.sealed = true;
        }

        if let Some(header_handle) = handle.header_handle.as_ref() {
            self.substrate().seal(header_handle)?;
        }

        handle.sealed = true;
        log::info!("sealed segment {}", handle.segment_name);

        Ok(())
    }

    /// Concatenates `source_name` onto `target` at `target_offset`, which
    /// must equal `target.length()`. Uses native concat when possible,
    /// falling back to a header merge otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the source is not sealed or is
    /// missing sub-segment data.
    pub fn concat(&self, target: &mut RollingHandle<S>, target_offset: u64, source_name: &str) -> Result<()> {
        if target.deleted {
            return Err(Error::NotExists);
        }
        if target.read_only || target.sealed {
            return Err(Error::Sealed);
        }
        if target_offset != target.length() {
            return Err(Error::BadOffset);
        }

        let mut source = self.open_write(source_name)?;
        if !source.sealed {
            return Err(Error::IllegalState("concat source is not sealed".to_owned()));
        }

        if source.length() == 0 {
            self.delete(&mut source)?;
            return Ok(());
        }

        for sub in &source.sub_segments {
            if !sub.exists {
                return Err(Error::IllegalState("concat source is truncated".to_owned()));
            }
            self.substrate().stat(&sub.name)?;
        }

        let native_eligible = source.sub_segments.len() == 1 && source.sub_segments[0].start_offset == 0;

        if native_eligible {
            let tail_sealed = target.sub_segments.last().map_or(true, |t| t.sealed);
            if tail_sealed {
                self.rollover(target)?;
            }

            let tail_len = target.sub_segments.last().map_or(0, |t| t.length);
            if tail_len + source.length() <= target.policy.max_sub_segment_length() {
                return self.concat_native(target, &source, source_name);
            }
        }

        self.concat_header_merge(target, &source, source_name)
    }

    fn concat_native(&self, target: &mut RollingHandle<S>, source: &RollingHandle<S>, source_name: &str) -> Result<()> {
        let tail_index = target.sub_segments.len() - 1;
        let tail_offset = target.sub_segments[tail_index].length;

        let writer_handle = target
            .active_writer_handle
            .as_ref()
            .expect("native concat requires a non-sealed tail")
            .clone();

        self.substrate().concat(&writer_handle, tail_offset, &source.sub_segments[0].name)?;
        target.sub_segments[tail_index].length += source.length();

        if source.header_handle.is_some() {
            let source_header_name = header_name(source_name);
            if let Err(e) = self.substrate().delete(&source_header_name) {
                log::warn!("failed to clean up source header after native concat: {e}");
            }
        }

        log::debug!("native concat of {source_name} onto {}", target.segment_name);

        Ok(())
    }

    fn concat_header_merge(&self, target: &mut RollingHandle<S>, source: &RollingHandle<S>, source_name: &str) -> Result<()> {
        if target.header_handle.is_none() {
            self.materialize_header(target)?;
        }

        let base_offset = target.length();
        let rebased: Vec<SubSegment> = source
            .sub_segments
            .iter()
            .map(|s| s.rebase(s.start_offset + base_offset))
            .collect();

        if let Some(writer) = target.active_writer_handle.take() {
            self.substrate().seal(&writer)?;
        }
        if let Some(tail) = target.sub_segments.last_mut() {
            tail.sealed = true;
        }

        // entry_count must be the number of top-level entries in source's own
        // header, not source.sub_segments.len(). Those diverge whenever
        // source's header itself contains a nested ConcatBegin, since the
        // recursive parser counts a nested ConcatBegin as one entry.
        let entry = codec::encode_concat_begin_entry(source.header_entry_count, base_offset)?;

        let header_handle = target
            .header_handle
            .as_ref()
            .expect("header was just materialized if absent")
            .clone();

        match self.substrate().write(&header_handle, target.header_length, &entry) {
            Ok(()) => {}
            Err(SubstrateError::BadOffset) => return Err(Error::NotPrimary),
            Err(e) => return Err(e.into()),
        }
        target.header_length += entry.len() as u64;
        target.header_entry_count += 1;

        let source_header_name = header_name(source_name);
        let source_header_length = self.substrate().stat(&source_header_name)?.length;

        match self.substrate().concat(&header_handle, target.header_length, &source_header_name) {
            Ok(()) => {}
            Err(SubstrateError::BadOffset) => return Err(Error::NotPrimary),
            Err(e) => return Err(e.into()),
        }

        target.header_length += source_header_length;
        target.sub_segments.extend(rebased);

        log::debug!("header-merge concat of {source_name} onto {}", target.segment_name);

        Ok(())
    }

    fn materialize_header(&self, handle: &mut RollingHandle<S>) -> Result<()> {
        let hdr_name = header_name(&handle.segment_name);

        let header_handle = match self.substrate().create(&hdr_name) {
            Ok(h) => h,
            Err(SubstrateError::AlreadyExists) => self.substrate().open_write(&hdr_name)?,
            Err(e) => return Err(e.into()),
        };

        let bytes = codec::encode_header(&handle.policy)?;
        self.substrate().write(&header_handle, 0, &bytes)?;
        let mut offset = bytes.len() as u64;

        for sub in &handle.sub_segments {
            let entry = codec::encode_new_sub_segment_entry(sub.start_offset, &sub.name)?;
            self.substrate().write(&header_handle, offset, &entry)?;
            offset += entry.len() as u64;
        }

        handle.header_length = offset;
        handle.header_entry_count = handle.sub_segments.len() as u32;
        handle.header_handle = Some(header_handle);

        Ok(())
    }

    /// Deletes the segment. Legacy segments delete their single blob;
    /// headered segments are sealed first (escalating to a writable handle
    /// if necessary), then every existing sub-segment is deleted, and
    /// finally the header blob. The handle is marked deleted even if some
    /// sub-segment deletion failed.
    ///
    /// # Errors
    ///
    /// Returns the first substrate error encountered, if any; the handle
    /// is marked deleted regardless.
    pub fn delete(&self, handle: &mut RollingHandle<S>) -> Result<()> {
        if handle.header_handle.is_none() && handle.sub_segments.len() == 1 {
            let name = handle.sub_segments[0].name.clone();
            handle.deleted = true;
            return match self.substrate().delete(&name) {
                Ok(()) | Err(SubstrateError::NotExists) => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        if !handle.sealed {
            let mut writable = self.open_write(&handle.segment_name)?;
            self.seal(&mut writable)?;
        }

        let mut first_error = None;

        for sub in &mut handle.sub_segments {
            if !sub.exists {
                continue;
            }
            match self.substrate().delete(&sub.name) {
                Ok(()) | Err(SubstrateError::NotExists) => {}
                Err(e) if first_error.is_none() => first_error = Some(Error::from(e)),
                Err(_) => {}
            }
            sub.exists = false;
        }

        if handle.header_handle.is_some() {
            let hdr_name = header_name(&handle.segment_name);
            match self.substrate().delete(&hdr_name) {
                Ok(()) | Err(SubstrateError::NotExists) => {}
                Err(e) if first_error.is_none() => first_error = Some(Error::from(e)),
                Err(_) => {}
            }
        }

        handle.deleted = true;
        log::info!("deleted segment {}", handle.segment_name);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deletes every sub-segment lying entirely below `truncation_offset`.
    /// A full truncation (`truncation_offset >= length`) first rolls over
    /// so a fresh empty tail pins the segment's length. No-op on legacy
    /// segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadOffset`] if `truncation_offset > handle.length()`.
    pub fn truncate(&self, handle: &mut RollingHandle<S>, truncation_offset: u64) -> Result<()> {
        if handle.deleted {
            return Err(Error::NotExists);
        }
        if handle.read_only {
            return Err(Error::Sealed);
        }
        if handle.header_handle.is_none() {
            return Ok(());
        }
        if truncation_offset > handle.length() {
            return Err(Error::BadOffset);
        }

        let last_offset = handle.sub_segments.last().map_or(0, SubSegment::last_offset);
        if truncation_offset >= last_offset {
            self.rollover(handle)?;
        }

        for sub in &mut handle.sub_segments {
            if !sub.exists {
                continue;
            }
            if sub.start_offset < truncation_offset && sub.last_offset() <= truncation_offset {
                match self.substrate().delete(&sub.name) {
                    Ok(()) | Err(SubstrateError::NotExists) => {}
                    Err(e) => return Err(e.into()),
                }
                sub.exists = false;
            }
        }

        log::debug!("truncated {} at offset {truncation_offset}", handle.segment_name);

        Ok(())
    }

    /// Returns whether a segment by this name exists.
    ///
    /// # Errors
    ///
    /// Propagates substrate errors other than `NotExists`.
    pub fn exists(&self, name: &str) -> Result<bool> {
        match self.open_read(name) {
            Ok(_) => Ok(true),
            Err(Error::NotExists) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Returns summary information about a segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotExists`] if the segment does not exist.
    pub fn info(&self, name: &str) -> Result<SegmentInfo> {
        let handle = self.open_read(name)?;
        Ok(SegmentInfo {
            name: name.to_owned(),
            sealed: handle.sealed,
            length: handle.length(),
        })
    }

    /// Always `true`: this store supports precise truncation.
    #[must_use]
    pub fn supports_truncation(&self) -> bool {
        true
    }
}
