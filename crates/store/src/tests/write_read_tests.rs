use super::open_small;
use crate::{ColumnStore, StoreConfig, DEFAULT_CF};
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn open_creates_default_cf() -> Result<()> {
    let dir = tempdir()?;
    let store = open_small(dir.path(), &["phone", "mail"]);

    let names: Vec<&str> = store.cf_names().collect();
    assert!(names.contains(&"phone"));
    assert!(names.contains(&"mail"));
    assert!(names.contains(&DEFAULT_CF));
    assert!(store.has_cf("phone"));
    assert!(!store.has_cf("bogus"));
    Ok(())
}

#[test]
fn put_and_point_get_per_cf() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone", "mail"]);

    store.put("phone", b"key1".to_vec(), b"phone_value1".to_vec())?;
    store.put("mail", b"key1".to_vec(), b"mail_value1".to_vec())?;

    // Same key, independent values per CF
    assert_eq!(
        store.point_get("phone", b"key1")?,
        Some(b"phone_value1".to_vec())
    );
    assert_eq!(
        store.point_get("mail", b"key1")?,
        Some(b"mail_value1".to_vec())
    );
    assert_eq!(store.point_get("phone", b"key2")?, None);
    Ok(())
}

#[test]
fn unknown_cf_is_an_error() {
    let dir = tempdir().unwrap();
    let mut store = open_small(dir.path(), &["phone"]);

    assert!(store.put("nope", b"k".to_vec(), b"v".to_vec()).is_err());
    assert!(store.point_get("nope", b"k").is_err());
    assert!(store.enumerate_ssts("nope").is_err());
}

#[test]
fn empty_key_is_rejected() {
    let dir = tempdir().unwrap();
    let mut store = open_small(dir.path(), &["phone"]);
    assert!(store.put("phone", Vec::new(), b"v".to_vec()).is_err());
}

#[test]
fn delete_shadows_older_value() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone"]);

    store.put("phone", b"k".to_vec(), b"v".to_vec())?;
    store.flush("phone")?; // value now lives in an SSTable
    store.delete("phone", b"k".to_vec())?;

    // Tombstone in the memtable hides the flushed value
    assert_eq!(store.point_get("phone", b"k")?, None);
    Ok(())
}

#[test]
fn get_reads_across_levels() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone"]);

    store.put("phone", b"old".to_vec(), b"v-old".to_vec())?;
    store.flush("phone")?;
    store.compact("phone")?; // now in L1
    store.put("phone", b"new".to_vec(), b"v-new".to_vec())?;
    store.flush("phone")?; // now in L0
    store.put("phone", b"mem".to_vec(), b"v-mem".to_vec())?; // memtable

    assert_eq!(store.point_get("phone", b"old")?, Some(b"v-old".to_vec()));
    assert_eq!(store.point_get("phone", b"new")?, Some(b"v-new".to_vec()));
    assert_eq!(store.point_get("phone", b"mem")?, Some(b"v-mem".to_vec()));
    Ok(())
}

#[test]
fn newer_value_wins_across_sstables() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone"]);

    store.put("phone", b"k".to_vec(), b"stale".to_vec())?;
    store.flush("phone")?;
    store.put("phone", b"k".to_vec(), b"fresh".to_vec())?;
    store.flush("phone")?;

    assert_eq!(store.point_get("phone", b"k")?, Some(b"fresh".to_vec()));
    Ok(())
}

#[test]
fn auto_flush_on_threshold() -> Result<()> {
    let dir = tempdir()?;
    let mut store = ColumnStore::open(
        dir.path(),
        &["phone"],
        StoreConfig {
            flush_threshold: 64,
            wal_sync: false,
            l0_compaction_trigger: 0,
        },
    )?;

    for i in 0..20u32 {
        store.put(
            "phone",
            format!("key{:04}", i).into_bytes(),
            vec![b'v'; 32],
        )?;
    }

    assert!(store.sstable_count("phone")? >= 2, "writes should have flushed");
    // All values still readable
    for i in 0..20u32 {
        assert!(store
            .point_get("phone", format!("key{:04}", i).as_bytes())?
            .is_some());
    }
    Ok(())
}

#[test]
fn enumerate_ssts_lists_flushed_files() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone"]);

    assert!(store.enumerate_ssts("phone")?.is_empty());

    store.put("phone", b"a".to_vec(), b"1".to_vec())?;
    store.flush("phone")?;
    store.put("phone", b"b".to_vec(), b"2".to_vec())?;
    store.flush("phone")?;

    let ssts = store.enumerate_ssts("phone")?;
    assert_eq!(ssts.len(), 2);
    for p in &ssts {
        assert!(p.exists());
        assert_eq!(p.extension().unwrap(), "sst");
    }
    Ok(())
}
