//! SQLite-backed `PersistenceDriver`, the native-host stand-in for the
//! browser's IndexedDB driver (spec §1, §4.2.1). Opens with the same PRAGMA
//! set and startup integrity check as the forwarder's journal, since both
//! are single-writer, best-effort local stores.

use crate::persistence::{PersistenceDriver, StoreError};
use hashswarm_protocol::Hash;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

pub struct SqlitePersistenceDriver {
    conn: Connection,
}

impl SqlitePersistenceDriver {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        apply_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA wal_autocheckpoint=1000;",
    )
    .map_err(|e| StoreError::Backend(e.to_string()))
}

fn run_integrity_check(conn: &Connection) -> Result<(), StoreError> {
    let result: String = conn
        .pragma_query_value(None, "integrity_check", |row| row.get(0))
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    if result != "ok" {
        return Err(StoreError::Backend(format!(
            "integrity_check failed: {result}"
        )));
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS blobs (
            hash TEXT PRIMARY KEY,
            bytes BLOB NOT NULL,
            last_used INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS blobs_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            clock INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO blobs_meta (id, clock) VALUES (0, 0);",
    )
    .map_err(|e| StoreError::Backend(e.to_string()))
}

impl SqlitePersistenceDriver {
    fn tick(&self) -> Result<i64, StoreError> {
        self.conn
            .execute("UPDATE blobs_meta SET clock = clock + 1 WHERE id = 0", [])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.conn
            .query_row("SELECT clock FROM blobs_meta WHERE id = 0", [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

impl PersistenceDriver for SqlitePersistenceDriver {
    fn put(&mut self, hash: &Hash, bytes: &[u8]) -> Result<(), StoreError> {
        let t = self.tick()?;
        self.conn
            .execute(
                "INSERT INTO blobs (hash, bytes, last_used) VALUES (?1, ?2, ?3)
                 ON CONFLICT(hash) DO UPDATE SET bytes = excluded.bytes, last_used = excluded.last_used",
                params![hash.to_hex(), bytes, t],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn get(&mut self, hash: &Hash) -> Result<Option<Vec<u8>>, StoreError> {
        let t = self.tick()?;
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT bytes FROM blobs WHERE hash = ?1",
                params![hash.to_hex()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if bytes.is_some() {
            self.conn
                .execute(
                    "UPDATE blobs SET last_used = ?1 WHERE hash = ?2",
                    params![t, hash.to_hex()],
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(bytes)
    }

    fn has(&self, hash: &Hash) -> Result<bool, StoreError> {
        self.conn
            .query_row(
                "SELECT 1 FROM blobs WHERE hash = ?1",
                params![hash.to_hex()],
                |_| Ok(()),
            )
            .optional()
            .map(|r| r.is_some())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn delete(&mut self, hash: &Hash) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM blobs WHERE hash = ?1", params![hash.to_hex()])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn count(&self) -> Result<u64, StoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn total_bytes(&self) -> Result<u64, StoreError> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(bytes)), 0) FROM blobs",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn evict(&mut self, max_bytes: u64) -> Result<Vec<Hash>, StoreError> {
        let mut evicted = Vec::new();
        loop {
            let total = self.total_bytes()?;
            if total <= max_bytes {
                break;
            }
            let row: Option<(String, i64)> = self
                .conn
                .query_row(
                    "SELECT hash, LENGTH(bytes) FROM blobs ORDER BY last_used ASC LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let Some((hex, _)) = row else { break };
            self.conn
                .execute("DELETE FROM blobs WHERE hash = ?1", params![hex])
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            evicted.push(Hash::from_hex(&hex).map_err(|e| StoreError::Backend(e.to_string()))?);
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> Hash {
        Hash([b; 32])
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut d = SqlitePersistenceDriver::open_in_memory().unwrap();
        d.put(&h(1), b"hello").unwrap();
        assert_eq!(d.get(&h(1)).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn evict_removes_least_recently_touched_first() {
        let mut d = SqlitePersistenceDriver::open_in_memory().unwrap();
        d.put(&h(1), &vec![0u8; 10]).unwrap();
        d.put(&h(2), &vec![0u8; 10]).unwrap();
        d.get(&h(1)).unwrap();
        let evicted = d.evict(10).unwrap();
        assert_eq!(evicted, vec![h(2)]);
        assert!(d.has(&h(1)).unwrap());
        assert!(!d.has(&h(2)).unwrap());
    }

    #[test]
    fn open_on_disk_path_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobs.sqlite3");
        {
            let mut d = SqlitePersistenceDriver::open(&path).unwrap();
            d.put(&h(3), b"abc").unwrap();
        }
        let mut reopened = SqlitePersistenceDriver::open(&path).unwrap();
        assert_eq!(reopened.get(&h(3)).unwrap(), Some(b"abc".to_vec()));
    }
}
