use rolling_store::{InMemorySubstrate, RollingPolicy, RollingStore, Substrate};
use test_log::test;

#[test]
fn create_after_crash_remnant_header_succeeds() -> rolling_store::Result<()> {
    let substrate = InMemorySubstrate::new();

    // Simulate a crash that created the header blob but never wrote to it.
    substrate
        .create("seg.hdr")
        .expect("crash remnant header should be creatable directly on the substrate");

    let store = RollingStore::new(substrate);
    let info = store.create("seg", RollingPolicy::bounded(100))?;
    assert_eq!("seg", info.name);
    assert_eq!(0, info.length);

    Ok(())
}

#[test]
fn create_twice_fails_already_exists() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("seg", RollingPolicy::bounded(100))?;

    let err = store.create("seg", RollingPolicy::bounded(100)).unwrap_err();
    assert!(matches!(err, rolling_store::Error::AlreadyExists));

    Ok(())
}

#[test]
fn legacy_segment_without_header_opens_as_single_sub_segment() -> rolling_store::Result<()> {
    let substrate = InMemorySubstrate::new();
    let handle = substrate.create("legacy-seg").expect("should create");
    substrate.write(&handle, 0, b"pre-existing data").expect("should write");

    let store = RollingStore::new(substrate);
    let mut reader = store.open_read("legacy-seg")?;
    assert_eq!(18, reader.length());
    assert!(reader.is_legacy());

    let mut buf = [0u8; 18];
    store.read(&mut reader, 0, &mut buf)?;
    assert_eq!(b"pre-existing data", &buf);

    Ok(())
}

#[test]
fn deleted_handle_rejects_further_operations() -> rolling_store::Result<()> {
    let store = RollingStore::new(InMemorySubstrate::new());
    store.create("seg", RollingPolicy::bounded(100))?;

    let mut writer = store.open_write("seg")?;
    store.write(&mut writer, 0, b"data")?;
    store.delete(&mut writer)?;

    let err = store.write(&mut writer, 4, b"more").unwrap_err();
    assert!(matches!(err, rolling_store::Error::NotExists));

    assert!(!store.exists("seg")?);

    Ok(())
}
