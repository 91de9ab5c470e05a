use super::open_small;
use crate::{ColumnStore, StoreConfig};
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn compaction_merges_to_single_l1() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone"]);

    for i in 0..4u32 {
        store.put(
            "phone",
            format!("key{:04}", i).into_bytes(),
            format!("val{}", i).into_bytes(),
        )?;
        store.flush("phone")?;
    }
    assert_eq!(store.sstable_count("phone")?, 4);

    store.compact("phone")?;
    assert_eq!(store.sstable_count("phone")?, 1);

    for i in 0..4u32 {
        assert_eq!(
            store.point_get("phone", format!("key{:04}", i).as_bytes())?,
            Some(format!("val{}", i).into_bytes())
        );
    }
    Ok(())
}

#[test]
fn compaction_deletes_input_files() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone"]);

    store.put("phone", b"a".to_vec(), b"1".to_vec())?;
    store.flush("phone")?;
    store.put("phone", b"b".to_vec(), b"2".to_vec())?;
    store.flush("phone")?;

    let old = store.enumerate_ssts("phone")?;
    store.compact("phone")?;
    let new = store.enumerate_ssts("phone")?;

    assert_eq!(new.len(), 1);
    for p in &old {
        assert!(!p.exists(), "input file should be removed: {}", p.display());
    }
    Ok(())
}

#[test]
fn compaction_drops_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone"]);

    store.put("phone", b"keep".to_vec(), b"v".to_vec())?;
    store.put("phone", b"gone".to_vec(), b"v".to_vec())?;
    store.flush("phone")?;
    store.delete("phone", b"gone".to_vec())?;
    store.flush("phone")?;

    store.compact("phone")?;

    assert_eq!(store.point_get("phone", b"keep")?, Some(b"v".to_vec()));
    assert_eq!(store.point_get("phone", b"gone")?, None);

    // The merged table holds only the live key
    let ssts = store.enumerate_ssts("phone")?;
    assert_eq!(ssts.len(), 1);
    let reader = sstable::TableReader::open(&ssts[0])?;
    assert_eq!(reader.len(), 1);
    Ok(())
}

#[test]
fn compacting_everything_away_leaves_no_tables() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone"]);

    store.put("phone", b"k".to_vec(), b"v".to_vec())?;
    store.flush("phone")?;
    store.delete("phone", b"k".to_vec())?;
    store.flush("phone")?;

    store.compact("phone")?;
    assert_eq!(store.sstable_count("phone")?, 0);
    assert_eq!(store.point_get("phone", b"k")?, None);
    Ok(())
}

#[test]
fn auto_compaction_trigger_fires() -> Result<()> {
    let dir = tempdir()?;
    let mut store = ColumnStore::open(
        dir.path(),
        &["phone"],
        StoreConfig {
            flush_threshold: 1024 * 1024,
            wal_sync: false,
            l0_compaction_trigger: 3,
        },
    )?;

    for i in 0..3u32 {
        store.put(
            "phone",
            format!("key{:04}", i).into_bytes(),
            b"v".to_vec(),
        )?;
        store.flush("phone")?;
    }

    // Third flush hit the trigger and compacted everything into one L1 table
    assert_eq!(store.sstable_count("phone")?, 1);
    Ok(())
}

#[test]
fn compact_all_covers_every_cf() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), &["phone", "mail"]);

    for cf in ["phone", "mail"] {
        for i in 0..3u32 {
            store.put(cf, format!("key{:04}", i).into_bytes(), b"v".to_vec())?;
            store.flush(cf)?;
        }
    }
    store.compact_all()?;

    assert_eq!(store.sstable_count("phone")?, 1);
    assert_eq!(store.sstable_count("mail")?, 1);
    Ok(())
}
