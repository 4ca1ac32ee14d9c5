// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// One physical blob in the substrate, backing a contiguous offset range of
/// a logical segment.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SubSegment {
    /// The substrate blob name.
    pub name: String,

    /// Start offset within the logical segment.
    pub start_offset: u64,

    /// Length in bytes.
    pub length: u64,

    /// Whether this sub-segment is sealed (no further local writes).
    pub sealed: bool,

    /// Whether the backing blob still exists. Never reverts to `true`
    /// once cleared by truncation or deletion.
    pub exists: bool,
}

impl SubSegment {
    /// The offset just past the end of this sub-segment.
    #[must_use]
    pub fn last_offset(&self) -> u64 {
        self.start_offset + self.length
    }

    /// Whether `offset` falls within `[start_offset, last_offset)`.
    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start_offset && offset < self.last_offset()
    }

    /// Returns a copy of this sub-segment relocated to `new_start`, keeping
    /// its length and sealed state. Used when splicing a source segment's
    /// table into a target during concat.
    #[must_use]
    pub fn rebase(&self, new_start: u64) -> Self {
        Self {
            name: self.name.clone(),
            start_offset: new_start,
            length: self.length,
            sealed: self.sealed,
            exists: self.exists,
        }
    }
}
