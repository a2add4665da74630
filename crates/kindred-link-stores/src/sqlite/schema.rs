//! SQLite schema for the relational link store.
//!
//! One table, `links`, keyed by the normalized id pair. Kind and status are
//! stored as their integer codes; timestamps are RFC 3339 UTC text with
//! nanosecond precision, so lexical order is temporal order.

use rusqlite::Connection;

use kindred_core::error::KindredResult;

use super::storage_error;

/// SQL for the links table.
pub const CREATE_LINKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS links (
    id1 TEXT NOT NULL,
    id2 TEXT NOT NULL,
    kind INTEGER NOT NULL,
    status INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    confidence REAL NOT NULL,
    PRIMARY KEY (id1, id2)
)
"#;

/// Index for lookups by the first id.
pub const CREATE_LINKS_ID1_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_links_id1 ON links(id1)
"#;

/// Index for lookups by the second id.
pub const CREATE_LINKS_ID2_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_links_id2 ON links(id2)
"#;

/// Index for change feeds.
pub const CREATE_LINKS_TIMESTAMP_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_links_timestamp ON links(timestamp)
"#;

/// Create the table and indexes if they do not exist.
pub fn init_schema(conn: &Connection) -> KindredResult<()> {
    conn.execute(CREATE_LINKS_TABLE, [])
        .map_err(|e| storage_error("create links table", e))?;
    conn.execute(CREATE_LINKS_ID1_INDEX, [])
        .map_err(|e| storage_error("create id1 index", e))?;
    conn.execute(CREATE_LINKS_ID2_INDEX, [])
        .map_err(|e| storage_error("create id2 index", e))?;
    conn.execute(CREATE_LINKS_TIMESTAMP_INDEX, [])
        .map_err(|e| storage_error("create timestamp index", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_creates_table() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let objects: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE tbl_name='links' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert!(objects.contains(&"links".to_string()));
        assert!(objects.contains(&"idx_links_id1".to_string()));
        assert!(objects.contains(&"idx_links_id2".to_string()));
        assert!(objects.contains(&"idx_links_timestamp".to_string()));
    }

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='links'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_pair_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let insert = "INSERT INTO links (id1, id2, kind, status, timestamp, confidence) \
                      VALUES ('a', 'b', 1, 2, '2024-01-01T00:00:00.000000000Z', 1.0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
