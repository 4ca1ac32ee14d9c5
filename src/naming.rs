// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Deterministic derivation of substrate blob names from logical segment
//! names, per the naming conventions of spec §6: collision-free across
//! logical names, and injective on `(logical_name, start_offset)`.

/// Derives the name of the durable header blob for a logical segment.
#[must_use]
pub fn header_name(segment_name: &str) -> String {
    format!("{segment_name}.hdr")
}

/// Derives the name of the sub-segment blob starting at `start_offset`.
///
/// The offset is zero-padded to 20 digits (enough for any `u64`) so names
/// stay lexically sortable and distinct regardless of offset magnitude.
#[must_use]
pub fn sub_name(segment_name: &str, start_offset: u64) -> String {
    format!("{segment_name}.{start_offset:020}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn header_name_is_deterministic() {
        assert_eq!(header_name("foo"), header_name("foo"));
        assert_ne!(header_name("foo"), header_name("bar"));
    }

    #[test]
    fn sub_name_is_injective_on_offset() {
        assert_ne!(sub_name("foo", 0), sub_name("foo", 1));
        assert_ne!(sub_name("foo", 100), sub_name("foo", 1_000));
    }

    #[test]
    fn sub_name_sorts_lexically_by_offset() {
        let mut names = vec![sub_name("foo", 200), sub_name("foo", 0), sub_name("foo", 50)];
        names.sort();
        assert_eq!(
            vec![sub_name("foo", 0), sub_name("foo", 50), sub_name("foo", 200)],
            names
        );
    }
}
