// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The durable header wire format (spec §4.2, §6).
//!
//! Layout: magic (4 bytes) + version (1 byte) + policy (8 bytes,
//! little-endian, [`crate::policy::UNBOUNDED`] sentinel for "no rolling") +
//! an append-only stream of tagged entries.
//!
//! `ConcatBegin` is followed immediately by the nested source header's own
//! magic/version/policy prefix and then exactly `entry_count` further
//! entries — this is what the source's raw header bytes look like once
//! concatenated onto the target (see [`crate::store::RollingStore::concat`]).
//! Entries may recurse through nested `ConcatBegin`s, which is what makes
//! repeated concatenation associative without rewriting history.

use crate::{policy::RollingPolicy, sub_segment::SubSegment};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const MAGIC: &[u8; 4] = b"RSEG";
const VERSION: u8 = 1;

const TAG_NEW_SUB_SEGMENT: u8 = 1;
const TAG_CONCAT_BEGIN: u8 = 2;

/// Error during header serialization.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Error during header deserialization.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error.
    Io(std::io::Error),

    /// Magic prefix did not match.
    InvalidMagic,

    /// Version byte is not supported by this build.
    InvalidVersion(u8),

    /// Unknown entry tag.
    InvalidTag(u8),

    /// A sub-segment name was not valid UTF-8.
    InvalidName,

    /// Stream ended in the middle of a `ConcatBegin`'s declared entry count.
    UnexpectedEof,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for DecodeError {}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Serializes the fresh (zero-entry) header for a newly created segment.
///
/// # Errors
///
/// Will return `Err` if writing fails (never happens for an in-memory `Vec`).
pub fn encode_header(policy: &RollingPolicy) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(13);
    buf.write_all(MAGIC)?;
    buf.write_u8(VERSION)?;
    buf.write_u64::<LittleEndian>(policy.max_sub_segment_length())?;
    Ok(buf)
}

/// Serializes a `NewSubSegment` entry.
///
/// # Errors
///
/// Will return `Err` if writing fails (never happens for an in-memory `Vec`).
pub fn encode_new_sub_segment_entry(start_offset: u64, name: &str) -> Result<Vec<u8>, EncodeError> {
    let name_bytes = name.as_bytes();
    assert!(name_bytes.len() <= usize::from(u16::MAX), "sub-segment name too long");

    let mut buf = Vec::with_capacity(11 + name_bytes.len());
    buf.write_u8(TAG_NEW_SUB_SEGMENT)?;
    buf.write_u64::<LittleEndian>(start_offset)?;

    // NOTE: Truncation is okay, asserted above
    #[allow(clippy::cast_possible_truncation)]
    buf.write_u16::<LittleEndian>(name_bytes.len() as u16)?;

    buf.write_all(name_bytes)?;
    Ok(buf)
}

/// Serializes a `ConcatBegin` entry.
///
/// # Errors
///
/// Will return `Err` if writing fails (never happens for an in-memory `Vec`).
pub fn encode_concat_begin_entry(entry_count: u32, base_offset: u64) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(13);
    buf.write_u8(TAG_CONCAT_BEGIN)?;
    buf.write_u32::<LittleEndian>(entry_count)?;
    buf.write_u64::<LittleEndian>(base_offset)?;
    Ok(buf)
}

/// Parses a full header blob (magic + version + policy + entries) into a
/// policy, the flattened, in-order sub-segment table, and the number of
/// top-level entries the header itself holds.
///
/// The returned sub-segments carry `length = 0` and `sealed = false`;
/// [`crate::store::RollingStore`] fixes these up against the substrate
/// after parsing, per spec §4.3.
///
/// The top-level entry count is distinct from `entries.len()` whenever the
/// header contains a `ConcatBegin`: that single top-level entry can expand
/// into many flattened sub-segments. Callers that re-concatenate this
/// header as a future concat source must encode *this* count in the new
/// `ConcatBegin`, not the flattened sub-segment count, or the recursive
/// parser over- or under-reads the nested header.
///
/// # Errors
///
/// Will return `Err` if the magic/version don't match, an entry tag is
/// unrecognized, or the underlying reader fails.
pub fn parse_header<R: Read>(reader: &mut R) -> Result<(RollingPolicy, Vec<SubSegment>, u32), DecodeError> {
    read_header_prefix(reader)?;

    let raw_policy = reader.read_u64::<LittleEndian>()?;
    let policy = if raw_policy == crate::policy::UNBOUNDED {
        RollingPolicy::unbounded()
    } else {
        RollingPolicy::bounded(raw_policy)
    };

    let (entries, top_level_count) = parse_entries(reader, None)?;
    Ok((policy, entries, top_level_count))
}

/// Reads and validates a magic+version prefix, leaving the reader positioned
/// at the policy field. Shared between the top-level header and the nested
/// headers embedded by `ConcatBegin`.
fn read_header_prefix<R: Read>(reader: &mut R) -> Result<(), DecodeError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(DecodeError::InvalidMagic);
    }

    let version = reader.read_u8()?;
    if version != VERSION {
        return Err(DecodeError::InvalidVersion(version));
    }

    Ok(())
}

/// Reads one leading byte, distinguishing a clean end-of-stream (`Ok(None)`)
/// from an error.
fn read_tag<R: Read>(reader: &mut R) -> Result<Option<u8>, DecodeError> {
    let mut tag = [0u8; 1];
    match reader.read(&mut tag) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(tag[0])),
        Err(e) => Err(DecodeError::Io(e)),
    }
}

/// Parses a run of entries: exactly `count` entries if given, otherwise
/// until end-of-stream. `ConcatBegin` entries recurse into their own nested
/// header prefix and `entry_count`, rebasing whatever sub-segments they
/// produce by their `base_offset`. Returns the flattened sub-segments
/// alongside the number of top-level entries consumed at *this* level —
/// a nested `ConcatBegin` counts as one top-level entry regardless of how
/// many sub-segments its own recursion flattens out.
fn parse_entries<R: Read>(reader: &mut R, count: Option<u32>) -> Result<(Vec<SubSegment>, u32), DecodeError> {
    let mut out = Vec::new();
    let mut remaining = count;
    let mut top_level_count = 0u32;

    loop {
        if remaining == Some(0) {
            break;
        }

        let tag = match read_tag(reader)? {
            Some(tag) => tag,
            None => {
                if count.is_some() {
                    return Err(DecodeError::UnexpectedEof);
                }
                break;
            }
        };

        top_level_count += 1;

        match tag {
            TAG_NEW_SUB_SEGMENT => {
                let start_offset = reader.read_u64::<LittleEndian>()?;
                let name_len = reader.read_u16::<LittleEndian>()?;

                let mut name_buf = vec![0u8; usize::from(name_len)];
                reader.read_exact(&mut name_buf)?;
                let name = String::from_utf8(name_buf).map_err(|_| DecodeError::InvalidName)?;

                out.push(SubSegment {
                    name,
                    start_offset,
                    length: 0,
                    sealed: false,
                    exists: true,
                });
            }
            TAG_CONCAT_BEGIN => {
                let entry_count = reader.read_u32::<LittleEndian>()?;
                let base_offset = reader.read_u64::<LittleEndian>()?;

                // Skip the nested source header's own magic/version/policy prefix.
                read_header_prefix(reader)?;
                let _nested_policy = reader.read_u64::<LittleEndian>()?;

                let (nested, _nested_top_level_count) = parse_entries(reader, Some(entry_count))?;
                out.extend(nested.iter().map(|seg| seg.rebase(seg.start_offset + base_offset)));
            }
            other => return Err(DecodeError::InvalidTag(other)),
        }

        if let Some(r) = remaining.as_mut() {
            *r -= 1;
        }
    }

    Ok((out, top_level_count))
}
