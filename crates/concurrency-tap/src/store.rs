//! Durable point store backed by SQLite, keyed by timestamp.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{DataPoint, TapResult};

/// Append-only store with first-write-wins semantics per timestamp.
pub struct PointStore {
    db: Connection,
}

impl PointStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> TapResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!("opening point store: {}", path.display());
        Self::init(Connection::open(path)?)
    }

    /// Open a throwaway store that lives only as long as this handle.
    pub fn open_in_memory() -> TapResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> TapResult<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS concurrent_users (
                timestamp TEXT PRIMARY KEY,
                user_count INTEGER,
                fetched_at TEXT
            );",
        )?;
        Ok(Self { db })
    }

    /// Insert the point unless its timestamp is already stored.
    ///
    /// Returns `true` when a row was written. An existing row is never touched.
    pub fn upsert_if_absent(&self, point: &DataPoint) -> TapResult<bool> {
        let rows = self.db.execute(
            "INSERT OR IGNORE INTO concurrent_users (timestamp, user_count, fetched_at)
             VALUES (?1, ?2, ?3)",
            params![point.timestamp, point.value, point.captured_at],
        )?;
        Ok(rows > 0)
    }

    /// All points, ordered by timestamp as plain strings (byte order).
    pub fn list_all(&self) -> TapResult<Vec<DataPoint>> {
        let mut stmt = self.db.prepare(
            "SELECT timestamp, user_count, fetched_at FROM concurrent_users
             ORDER BY timestamp COLLATE BINARY",
        )?;
        let points = stmt
            .query_map([], |row| {
                Ok(DataPoint {
                    timestamp: row.get(0)?,
                    value: row.get(1)?,
                    captured_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    /// Look up a single point.
    pub fn get(&self, timestamp: &str) -> TapResult<Option<DataPoint>> {
        let point = self
            .db
            .query_row(
                "SELECT timestamp, user_count, fetched_at FROM concurrent_users
                 WHERE timestamp = ?1",
                params![timestamp],
                |row| {
                    Ok(DataPoint {
                        timestamp: row.get(0)?,
                        value: row.get(1)?,
                        captured_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(point)
    }

    pub fn count(&self) -> TapResult<usize> {
        let n: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM concurrent_users", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// First and last timestamp in export order, if any.
    pub fn bounds(&self) -> TapResult<Option<(String, String)>> {
        let row: (Option<String>, Option<String>) = self.db.query_row(
            "SELECT MIN(timestamp COLLATE BINARY), MAX(timestamp COLLATE BINARY)
             FROM concurrent_users",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(match row {
            (Some(first), Some(last)) => Some((first, last)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ts: &str, value: i64, at: &str) -> DataPoint {
        DataPoint {
            timestamp: ts.to_string(),
            value,
            captured_at: at.to_string(),
        }
    }

    #[test]
    fn test_first_write_wins() {
        let store = PointStore::open_in_memory().unwrap();
        assert!(store.upsert_if_absent(&point("T1", 5000, "first")).unwrap());
        assert!(!store.upsert_if_absent(&point("T1", 9000, "second")).unwrap());

        let stored = store.get("T1").unwrap().unwrap();
        assert_eq!(stored.value, 5000);
        assert_eq!(stored.captured_at, "first");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_lexicographic_order() {
        let store = PointStore::open_in_memory().unwrap();
        for ts in ["b", "a", "10", "2"] {
            store.upsert_if_absent(&point(ts, 2000, "at")).unwrap();
        }
        let order: Vec<String> = store.list_all().unwrap().into_iter().map(|p| p.timestamp).collect();
        assert_eq!(order, ["10", "2", "a", "b"]);
        assert_eq!(store.bounds().unwrap(), Some(("10".to_string(), "b".to_string())));
    }

    #[test]
    fn test_empty_store() {
        let store = PointStore::open_in_memory().unwrap();
        assert!(store.list_all().unwrap().is_empty());
        assert_eq!(store.bounds().unwrap(), None);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("points.db");
        {
            let store = PointStore::open(&path).unwrap();
            store.upsert_if_absent(&point("T1", 5000, "run-1")).unwrap();
        }
        let store = PointStore::open(&path).unwrap();
        assert!(!store.upsert_if_absent(&point("T1", 7000, "run-2")).unwrap());
        store.upsert_if_absent(&point("T2", 7000, "run-2")).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.get("T1").unwrap().unwrap().captured_at, "run-1");
    }

    #[test]
    fn test_open_fails_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PointStore::open(dir.path()).is_err());
    }
}
