//! Partitions scanned items against the fingerprint snapshot into
//! new/modified/unchanged/deleted.

use crate::backend::ScannedItem;
use crate::model::FingerprintRecord;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    New,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Partition {
    pub changed: Vec<(ScannedItem, ChangeKind)>,
    pub unchanged: Vec<ScannedItem>,
    pub deleted: Vec<FingerprintRecord>,
}

/// Compares freshly scanned items against existing fingerprints.
/// `force` treats everything as changed regardless of hash equality.
pub fn partition(scanned: Vec<ScannedItem>, fingerprints: &[FingerprintRecord], force: bool) -> Partition {
    let mut by_key: HashMap<String, &FingerprintRecord> = HashMap::new();
    for fp in fingerprints {
        by_key.insert(FingerprintRecord::key(&fp.source_type, &fp.path), fp);
    }

    let mut seen_keys = std::collections::HashSet::new();
    let mut changed = Vec::new();
    let mut unchanged = Vec::new();

    for item in scanned {
        let key = FingerprintRecord::key(&item.source_type, &item.path);
        seen_keys.insert(key.clone());
        match by_key.get(&key) {
            None => changed.push((item, ChangeKind::New)),
            Some(fp) if force || fp.content_hash != item.content_hash => changed.push((item, ChangeKind::Modified)),
            Some(_) => unchanged.push(item),
        }
    }

    let deleted = fingerprints
        .iter()
        .filter(|fp| !seen_keys.contains(&FingerprintRecord::key(&fp.source_type, &fp.path)))
        .cloned()
        .collect();

    Partition { changed, unchanged, deleted }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str, hash: &str) -> ScannedItem {
        ScannedItem {
            source_type: "file".to_string(),
            path: path.to_string(),
            content_hash: hash.to_string(),
            size: 10,
            content: "x".to_string(),
        }
    }

    fn fingerprint(path: &str, hash: &str) -> FingerprintRecord {
        FingerprintRecord {
            source_type: "file".to_string(),
            path: path.to_string(),
            content_hash: hash.to_string(),
            size: 10,
            vectorized_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn absent_fingerprint_is_new() {
        let p = partition(vec![item("/a.md", "h1")], &[], false);
        assert_eq!(p.changed.len(), 1);
        assert_eq!(p.changed[0].1, ChangeKind::New);
    }

    #[test]
    fn differing_hash_is_modified() {
        let fps = vec![fingerprint("/a.md", "old")];
        let p = partition(vec![item("/a.md", "new")], &fps, false);
        assert_eq!(p.changed[0].1, ChangeKind::Modified);
    }

    #[test]
    fn matching_hash_is_unchanged() {
        let fps = vec![fingerprint("/a.md", "same")];
        let p = partition(vec![item("/a.md", "same")], &fps, false);
        assert!(p.changed.is_empty());
        assert_eq!(p.unchanged.len(), 1);
    }

    #[test]
    fn force_treats_unchanged_as_modified() {
        let fps = vec![fingerprint("/a.md", "same")];
        let p = partition(vec![item("/a.md", "same")], &fps, true);
        assert_eq!(p.changed.len(), 1);
        assert_eq!(p.changed[0].1, ChangeKind::Modified);
    }

    #[test]
    fn fingerprint_not_in_scan_is_deleted() {
        let fps = vec![fingerprint("/gone.md", "h1")];
        let p = partition(vec![], &fps, false);
        assert_eq!(p.deleted.len(), 1);
        assert_eq!(p.deleted[0].path, "/gone.md");
    }
}
