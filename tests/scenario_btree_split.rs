//! Enough inserts on a small page force a split.

use std::sync::Arc;

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use tempfile::tempdir;

use deltalite::btree::BTree;
use deltalite::pagestore::Store;
use deltalite::value::{serialize, RecordMap, Value};

#[test]
fn twenty_inserts_on_small_pages_force_a_split() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(Store::open(dir.path().join("t.page"), 256)?);
    let tree = BTree::open(store)?;

    for i in 0..20u32 {
        let key = format!("key{i:02}");
        let mut record = RecordMap::new();
        record.insert("v".into(), Value::I32(i as i32));
        tree.write(key.as_bytes(), &serialize(&record)?)?;
    }

    let root_page = tree.store().read_page(tree.root_id())?;
    assert!(root_page.is_branch(), "root should have become a BRANCH");
    assert!(
        root_page.elements()?.len() >= 2,
        "root should have at least two children after a split"
    );

    let scanned = tree.scan(Some(b"key00"), Some(b"key20"))?.collect_all()?;
    assert_eq!(scanned.len(), 20);
    let mut sorted = scanned.clone();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(scanned, sorted, "scan must return records in key order");

    // Descend to the leftmost leaf directly and confirm every key is
    // visited exactly once, in order, via the sibling chain.
    let mut page_id = tree.root_id();
    loop {
        let page = tree.store().read_page(page_id)?;
        if page.is_leaf() {
            break;
        }
        let elements = page.elements()?;
        page_id = LittleEndian::read_u64(&elements[0].value);
    }
    let mut seen_keys = Vec::new();
    let mut current = Some(page_id);
    while let Some(id) = current {
        let page = tree.store().read_page(id)?;
        for el in page.elements()? {
            seen_keys.push(el.key);
        }
        current = {
            let next = page.next_page_id();
            if next == 0 { None } else { Some(next) }
        };
    }
    assert_eq!(seen_keys.len(), 20, "sibling chain should visit each key exactly once");
    let mut sorted_keys = seen_keys.clone();
    sorted_keys.sort();
    assert_eq!(seen_keys, sorted_keys);

    for i in 0..20u32 {
        let key = format!("key{i:02}");
        assert!(tree.read(key.as_bytes())?.is_some(), "lost key {key}");
    }
    Ok(())
}
