use rolling_store::{InMemorySubstrate, RollingPolicy, RollingStore};
use test_log::test;

#[test]
fn native_concat_single_sub_segment_sources() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("a", RollingPolicy::bounded(100))?;
    store.create("b", RollingPolicy::bounded(100))?;

    let mut a_writer = store.open_write("a")?;
    store.write(&mut a_writer, 0, &[b'A'; 30])?;

    let mut b_writer = store.open_write("b")?;
    store.write(&mut b_writer, 0, &[b'B'; 40])?;
    store.seal(&mut b_writer)?;

    let mut a_target = store.open_write("a")?;
    store.concat(&mut a_target, 30, "b")?;

    assert_eq!(70, a_target.length());

    let mut reader = store.open_read("a")?;
    let mut buf = [0u8; 70];
    store.read(&mut reader, 0, &mut buf)?;
    assert_eq!(&[b'A'; 30], &buf[..30]);
    assert_eq!(&[b'B'; 40], &buf[30..]);

    Ok(())
}

#[test]
fn header_merge_concat_when_source_has_multiple_sub_segments() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("a", RollingPolicy::bounded(100))?;
    store.create("b", RollingPolicy::bounded(60))?;

    let mut a_writer = store.open_write("a")?;
    store.write(&mut a_writer, 0, &[b'A'; 80])?;

    let mut b_writer = store.open_write("b")?;
    store.write(&mut b_writer, 0, &[b'B'; 60])?;
    store.write(&mut b_writer, 60, &[b'C'; 40])?;
    store.seal(&mut b_writer)?;

    let mut a_target = store.open_write("a")?;
    store.concat(&mut a_target, 80, "b")?;

    assert_eq!(180, a_target.length());

    let mut reader = store.open_read("a")?;
    let mut buf = [0u8; 180];
    store.read(&mut reader, 0, &mut buf)?;
    assert_eq!(&[b'A'; 80], &buf[..80]);
    assert_eq!(&[b'B'; 60], &buf[80..140]);
    assert_eq!(&[b'C'; 40], &buf[140..]);

    Ok(())
}

#[test]
fn write_after_header_merge_concat_rolls_over_the_sealed_tail() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("a", RollingPolicy::bounded(100))?;
    store.create("b", RollingPolicy::bounded(60))?;

    let mut b_writer = store.open_write("b")?;
    store.write(&mut b_writer, 0, &[b'B'; 60])?;
    store.write(&mut b_writer, 60, &[b'C'; 40])?;
    store.seal(&mut b_writer)?;

    let mut a_writer = store.open_write("a")?;
    store.write(&mut a_writer, 0, &[b'A'; 80])?;
    store.concat(&mut a_writer, 80, "b")?;

    // The header-merge concat sealed A's tail but left the segment itself
    // unsealed; a further valid append must roll over onto a fresh tail
    // rather than trying to reuse the now-sealed, cleared writer handle.
    store.write(&mut a_writer, 180, &[b'D'; 5])?;

    assert_eq!(185, a_writer.length());

    let mut reader = store.open_read("a")?;
    let mut buf = [0u8; 185];
    store.read(&mut reader, 0, &mut buf)?;
    assert_eq!(&[b'D'; 5], &buf[180..]);

    Ok(())
}

#[test]
fn concat_of_unsealed_source_is_illegal() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("a", RollingPolicy::bounded(100))?;
    store.create("b", RollingPolicy::bounded(100))?;

    let mut b_writer = store.open_write("b")?;
    store.write(&mut b_writer, 0, b"unsealed")?;

    let mut a_target = store.open_write("a")?;
    let err = store.concat(&mut a_target, 0, "b").unwrap_err();
    assert!(matches!(err, rolling_store::Error::IllegalState(_)));

    Ok(())
}

#[test]
fn header_merge_concat_of_a_previously_header_merged_source_stays_readable() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("a", RollingPolicy::bounded(1_000))?;
    store.create("c", RollingPolicy::bounded(1_000))?;
    store.create("d", RollingPolicy::bounded(60))?;

    // D gets two sub-segments, forcing a header-merge concat onto C below.
    let mut d_writer = store.open_write("d")?;
    store.write(&mut d_writer, 0, &[b'D'; 60])?;
    store.write(&mut d_writer, 60, &[b'E'; 40])?;
    store.seal(&mut d_writer)?;

    let mut c_writer = store.open_write("c")?;
    store.write(&mut c_writer, 0, &[b'C'; 80])?;
    store.concat(&mut c_writer, 80, "d")?;

    // C's own header now contains a nested ConcatBegin: 2 top-level entries
    // (C's own NewSubSegment + D's ConcatBegin) flattening to 3 sub-segments.
    store.seal(&mut c_writer)?;

    let mut a_writer = store.open_write("a")?;
    store.write(&mut a_writer, 0, &[b'A'; 10])?;
    store.concat(&mut a_writer, 10, "c")?;

    assert_eq!(10 + 80 + 60 + 40, a_writer.length());

    let mut reader = store.open_read("a")?;
    let mut buf = [0u8; 190];
    store.read(&mut reader, 0, &mut buf)?;
    assert_eq!(&[b'A'; 10], &buf[..10]);
    assert_eq!(&[b'C'; 80], &buf[10..90]);
    assert_eq!(&[b'D'; 60], &buf[90..150]);
    assert_eq!(&[b'E'; 40], &buf[150..]);

    Ok(())
}

#[test]
fn concat_associativity_of_length() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());

    for name in ["a", "b", "c"] {
        store.create(name, RollingPolicy::bounded(1_000))?;
        let mut writer = store.open_write(name)?;
        store.write(&mut writer, 0, &[b'X'; 10])?;
    }

    // C must be sealed to act as a concat source.
    let mut c_writer = store.open_write("c")?;
    store.seal(&mut c_writer)?;

    // concat(B, C)
    let mut b_writer = store.open_write("b")?;
    store.concat(&mut b_writer, 10, "c")?;
    let bc_length = b_writer.length();

    // BC must be sealed to act as a concat source for A.
    store.seal(&mut b_writer)?;

    // concat(A, concat(B, C))
    let mut a_writer = store.open_write("a")?;
    store.concat(&mut a_writer, 10, "b")?;

    assert_eq!(10 + bc_length, a_writer.length());
    assert_eq!(30, a_writer.length());

    Ok(())
}
