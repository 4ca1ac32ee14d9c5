use rolling_store::{Error, InMemorySubstrate, RollingPolicy, RollingStore};
use test_log::test;

#[test]
fn seal_blocks_writes_but_not_reads() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("seg", RollingPolicy::bounded(100))?;

    let mut writer = store.open_write("seg")?;
    store.write(&mut writer, 0, b"0123456789")?;
    store.seal(&mut writer)?;

    let mut reader = store.open_read("seg")?;
    let mut buf = [0u8; 10];
    store.read(&mut reader, 0, &mut buf)?;
    assert_eq!(b"0123456789", &buf);

    let err = store.write(&mut writer, 10, b"X").unwrap_err();
    assert!(matches!(err, Error::Sealed));

    Ok(())
}

#[test]
fn zero_byte_read_at_length_succeeds() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("seg", RollingPolicy::bounded(100))?;

    let mut writer = store.open_write("seg")?;
    store.write(&mut writer, 0, b"hello")?;

    let mut reader = store.open_read("seg")?;
    let n = store.read(&mut reader, 5, &mut [])?;
    assert_eq!(0, n);

    Ok(())
}

#[test]
fn info_reports_length_and_sealed_state() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("seg", RollingPolicy::bounded(100))?;

    let mut writer = store.open_write("seg")?;
    store.write(&mut writer, 0, b"hello")?;
    store.seal(&mut writer)?;

    let info = store.info("seg")?;
    assert_eq!(5, info.length);
    assert!(info.sealed);

    Ok(())
}

#[test]
fn exists_reflects_segment_presence() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    assert!(!store.exists("seg")?);

    store.create("seg", RollingPolicy::bounded(100))?;
    assert!(store.exists("seg")?);

    Ok(())
}
