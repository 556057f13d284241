//! Persistent store for Fingerprint Records, keyed by `(source_type, path)`.

use crate::error::{ErrorCategory, RagentError, Result};
use crate::model::FingerprintRecord;
use rusqlite::Connection;
use std::sync::Mutex;

pub struct FingerprintStore {
    conn: Mutex<Connection>,
}

impl FingerprintStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| RagentError::new(ErrorCategory::FileRead, format!("opening fingerprint store: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS fingerprints (
                source_type TEXT NOT NULL,
                path TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                size INTEGER NOT NULL,
                vectorized_at TEXT NOT NULL,
                PRIMARY KEY (source_type, path)
            )",
        )
        .map_err(|e| RagentError::new(ErrorCategory::Unknown, format!("creating fingerprint table: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn get(&self, source_type: &str, path: &str) -> Result<Option<FingerprintRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT source_type, path, content_hash, size, vectorized_at FROM fingerprints WHERE source_type = ?1 AND path = ?2")
            .map_err(|e| RagentError::new(ErrorCategory::Unknown, e.to_string()))?;
        let mut rows = stmt
            .query_map((source_type, path), row_to_record)
            .map_err(|e| RagentError::new(ErrorCategory::Unknown, e.to_string()))?;
        match rows.next() {
            Some(r) => Ok(Some(r.map_err(|e| RagentError::new(ErrorCategory::Unknown, e.to_string()))?)),
            None => Ok(None),
        }
    }

    pub fn all(&self) -> Result<Vec<FingerprintRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT source_type, path, content_hash, size, vectorized_at FROM fingerprints")
            .map_err(|e| RagentError::new(ErrorCategory::Unknown, e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(|e| RagentError::new(ErrorCategory::Unknown, e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| RagentError::new(ErrorCategory::Unknown, e.to_string()))
    }

    pub fn upsert(&self, record: &FingerprintRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO fingerprints (source_type, path, content_hash, size, vectorized_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_type, path) DO UPDATE SET
                content_hash = excluded.content_hash,
                size = excluded.size,
                vectorized_at = excluded.vectorized_at",
            (
                &record.source_type,
                &record.path,
                &record.content_hash,
                record.size,
                record.vectorized_at.to_rfc3339(),
            ),
        )
        .map_err(|e| RagentError::new(ErrorCategory::Unknown, format!("upserting fingerprint: {e}")))?;
        Ok(())
    }

    pub fn remove(&self, source_type: &str, path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM fingerprints WHERE source_type = ?1 AND path = ?2",
            (source_type, path),
        )
        .map_err(|e| RagentError::new(ErrorCategory::Unknown, e.to_string()))?;
        Ok(())
    }

    /// Drops every fingerprint, forcing the next run to treat all
    /// scanned items as new regardless of content hash.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM fingerprints", [])
            .map_err(|e| RagentError::new(ErrorCategory::Unknown, e.to_string()))?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<FingerprintRecord> {
    let vectorized_at: String = row.get(4)?;
    Ok(FingerprintRecord {
        source_type: row.get(0)?,
        path: row.get(1)?,
        content_hash: row.get(2)?,
        size: row.get(3)?,
        vectorized_at: chrono::DateTime::parse_from_rfc3339(&vectorized_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str, hash: &str) -> FingerprintRecord {
        FingerprintRecord {
            source_type: "file".to_string(),
            path: path.to_string(),
            content_hash: hash.to_string(),
            size: 42,
            vectorized_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = FingerprintStore::in_memory().unwrap();
        store.upsert(&sample("/a.md", "hash1")).unwrap();
        let fetched = store.get("file", "/a.md").unwrap().unwrap();
        assert_eq!(fetched.content_hash, "hash1");
    }

    #[test]
    fn upsert_overwrites_existing_hash() {
        let store = FingerprintStore::in_memory().unwrap();
        store.upsert(&sample("/a.md", "hash1")).unwrap();
        store.upsert(&sample("/a.md", "hash2")).unwrap();
        let fetched = store.get("file", "/a.md").unwrap().unwrap();
        assert_eq!(fetched.content_hash, "hash2");
    }

    #[test]
    fn remove_deletes_the_record() {
        let store = FingerprintStore::in_memory().unwrap();
        store.upsert(&sample("/a.md", "hash1")).unwrap();
        store.remove("file", "/a.md").unwrap();
        assert!(store.get("file", "/a.md").unwrap().is_none());
    }

    #[test]
    fn all_returns_every_record() {
        let store = FingerprintStore::in_memory().unwrap();
        store.upsert(&sample("/a.md", "hash1")).unwrap();
        store.upsert(&sample("/b.md", "hash2")).unwrap();
        assert_eq!(store.all().unwrap().len(), 2);
    }

    #[test]
    fn clear_drops_every_record() {
        let store = FingerprintStore::in_memory().unwrap();
        store.upsert(&sample("/a.md", "hash1")).unwrap();
        store.upsert(&sample("/b.md", "hash2")).unwrap();
        store.clear().unwrap();
        assert!(store.all().unwrap().is_empty());
    }
}
