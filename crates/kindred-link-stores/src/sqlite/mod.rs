//! Relational link store on SQLite.
//!
//! Writes open a transaction lazily and stay pending until
//! [`LinkStore::commit`]. A connection that fails with an open or I/O error
//! is reopened once and the operation retried; writes that were pending on
//! the lost connection are gone and must be replayed by the caller.

mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use kindred_core::error::{KindredError, KindredResult};
use kindred_core::links::LinkStore;
use kindred_core::types::{Link, LinkKind, LinkStatus};

pub use schema::init_schema;

const LINK_COLUMNS: &str = "id1, id2, kind, status, timestamp, confidence";

type LinkRow = (String, String, i64, i64, String, f64);

fn storage_error(op: &str, err: rusqlite::Error) -> KindredError {
    KindredError::storage_with_source(format!("{} failed", op), err)
}

/// Whether an error means the connection itself is unusable.
fn is_connection_lost(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::SystemIoFailure
            )
    )
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LinkRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn to_link((id1, id2, kind, status, timestamp, confidence): LinkRow) -> KindredResult<Link> {
    let kind = LinkKind::from_code(kind).ok_or_else(|| {
        KindredError::storage(format!("unknown link kind {} for {}/{}", kind, id1, id2))
    })?;
    let status = LinkStatus::from_code(status).ok_or_else(|| {
        KindredError::storage(format!("unknown link status {} for {}/{}", status, id1, id2))
    })?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| {
            KindredError::storage_with_source(format!("bad timestamp for {}/{}", id1, id2), e)
        })?
        .with_timezone(&Utc);
    Ok(Link::new(id1, id2, kind, status, confidence).with_timestamp(timestamp))
}

fn to_links(rows: Vec<LinkRow>) -> KindredResult<Vec<Link>> {
    rows.into_iter().map(to_link).collect()
}

/// SQLite-backed [`LinkStore`].
pub struct SqliteLinkStore {
    conn: Mutex<Connection>,
    /// `None` for in-memory databases, which cannot be reopened.
    path: Option<PathBuf>,
    inference: bool,
}

impl SqliteLinkStore {
    /// Open (and if needed create) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> KindredResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Self::connect(&path)?;
        info!(path = %path.display(), "Opened SQLite link store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
            inference: false,
        })
    }

    /// Private in-memory database (useful for testing).
    pub fn in_memory() -> KindredResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KindredError::storage_with_source("open in-memory database", e))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            inference: false,
        })
    }

    pub fn with_inference(mut self, inference: bool) -> Self {
        self.inference = inference;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn connect(path: &Path) -> KindredResult<Connection> {
        let conn = Connection::open(path).map_err(|e| {
            KindredError::connection(format!("cannot open link database {}: {}", path.display(), e))
        })?;
        init_schema(&conn)?;
        Ok(conn)
    }

    fn reconnect(&self, conn: &mut Connection) -> KindredResult<()> {
        let Some(path) = &self.path else {
            return Err(KindredError::connection("in-memory link database was lost"));
        };
        warn!(path = %path.display(), "Link database connection lost, reconnecting");
        if !conn.is_autocommit() {
            // release the old connection's locks; failure means it is already gone
            let _ = conn.execute_batch("ROLLBACK");
        }
        *conn = Self::connect(path)?;
        Ok(())
    }

    /// Run `f` on the connection, reconnecting and retrying once if the
    /// connection turns out to be broken.
    fn with_conn<T>(
        &self,
        op: &str,
        f: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> KindredResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| KindredError::lock_poisoned("sqlite connection"))?;
        match f(&conn) {
            Ok(value) => Ok(value),
            Err(e) if is_connection_lost(&e) && self.path.is_some() => {
                debug!(op, error = %e, "Retrying after reconnect");
                self.reconnect(&mut conn)?;
                f(&conn).map_err(|e| storage_error(op, e))
            }
            Err(e) => Err(storage_error(op, e)),
        }
    }

    /// Like `with_conn`, inside the pending write transaction.
    fn write<T>(
        &self,
        op: &str,
        f: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> KindredResult<T> {
        self.with_conn(op, |conn| {
            if conn.is_autocommit() {
                conn.execute_batch("BEGIN")?;
            }
            f(conn)
        })
    }

    /// Reconnect if `check` fails on the current connection.
    fn revalidate(&self, check: impl Fn(&Connection) -> rusqlite::Result<()>) -> KindredResult<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| KindredError::lock_poisoned("sqlite connection"))?;
        match check(&conn) {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(error = %e, "Link database connection check failed");
                self.reconnect(&mut conn)
            }
        }
    }

    fn query_links(
        &self,
        op: &str,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> KindredResult<Vec<Link>> {
        let rows = self.with_conn(op, |conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt.query_map(params, read_row)?;
            let collected = rows.collect::<rusqlite::Result<Vec<_>>>();
            collected
        })?;
        to_links(rows)
    }
}

impl LinkStore for SqliteLinkStore {
    fn put_link(&self, link: Link) -> KindredResult<()> {
        let timestamp = format_timestamp(&link.timestamp);
        self.write("put link", |conn| {
            conn.execute(
                "INSERT INTO links (id1, id2, kind, status, timestamp, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (id1, id2) DO UPDATE SET
                     kind = excluded.kind,
                     status = excluded.status,
                     timestamp = excluded.timestamp,
                     confidence = excluded.confidence",
                params![
                    link.id1(),
                    link.id2(),
                    link.kind.code(),
                    link.status.code(),
                    timestamp,
                    link.confidence
                ],
            )
        })?;
        Ok(())
    }

    fn link_between(&self, id1: &str, id2: &str) -> KindredResult<Option<Link>> {
        let (id1, id2) = if id1 <= id2 { (id1, id2) } else { (id2, id1) };
        let sql = format!("SELECT {} FROM links WHERE id1 = ?1 AND id2 = ?2", LINK_COLUMNS);
        let row = self.with_conn("get link", |conn| {
            conn.query_row(&sql, params![id1, id2], read_row).optional()
        })?;
        row.map(to_link).transpose()
    }

    fn links_for(&self, id: &str) -> KindredResult<Vec<Link>> {
        let sql = format!("SELECT {} FROM links WHERE id1 = ?1 OR id2 = ?1", LINK_COLUMNS);
        let mut links = self.query_links("get links for id", &sql, &[&id])?;
        links.sort_by(|a, b| a.other_id(id).cmp(b.other_id(id)));
        Ok(links)
    }

    fn all_links(&self) -> KindredResult<Vec<Link>> {
        let sql = format!("SELECT {} FROM links ORDER BY id1, id2", LINK_COLUMNS);
        self.query_links("get all links", &sql, &[])
    }

    fn changes_since(
        &self,
        since: DateTime<Utc>,
        before: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> KindredResult<Vec<Link>> {
        let sql = format!(
            "SELECT {} FROM links
             WHERE timestamp > ?1 AND (?2 IS NULL OR timestamp <= ?2)
             ORDER BY timestamp DESC LIMIT ?3",
            LINK_COLUMNS
        );
        let since = format_timestamp(&since);
        let before = before.as_ref().map(format_timestamp);
        // a negative LIMIT means no limit
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        self.query_links("get changes", &sql, &[&since, &before, &limit])
    }

    fn clear(&self) -> KindredResult<()> {
        self.write("clear links", |conn| conn.execute("DELETE FROM links", []))?;
        Ok(())
    }

    fn inference_enabled(&self) -> bool {
        self.inference
    }

    fn validate_connection(&self) -> KindredResult<()> {
        self.revalidate(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).map(drop))
    }

    fn commit(&self) -> KindredResult<()> {
        self.with_conn("commit", |conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")?;
            }
            Ok(())
        })
    }

    fn close(&self) -> KindredResult<()> {
        self.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_core::error::ErrorCode;
    use std::cell::Cell;

    #[test]
    fn test_round_trip_preserves_fields() {
        let store = SqliteLinkStore::in_memory().unwrap();
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:20:30.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        store
            .put_link(Link::inferred("b", "a", LinkKind::MaybeSame, 0.75).with_timestamp(ts))
            .unwrap();

        let link = store.link_between("b", "a").unwrap().unwrap();
        assert_eq!(link.id1(), "a");
        assert_eq!(link.kind, LinkKind::MaybeSame);
        assert_eq!(link.status, LinkStatus::Inferred);
        assert_eq!(link.confidence, 0.75);
        assert_eq!(link.timestamp, ts);
    }

    #[test]
    fn test_upsert_keeps_one_row_per_pair() {
        let store = SqliteLinkStore::in_memory().unwrap();
        store.put_link(Link::inferred("a", "b", LinkKind::Same, 0.9)).unwrap();
        store.put_link(Link::asserted("b", "a", LinkKind::Different)).unwrap();

        let all = store.all_links().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].kind, LinkKind::Different);
        assert_eq!(all[0].status, LinkStatus::Asserted);
    }

    #[test]
    fn test_commit_ends_transaction() {
        let store = SqliteLinkStore::in_memory().unwrap();
        store.put_link(Link::asserted("a", "b", LinkKind::Same)).unwrap();
        assert!(!store.conn.lock().unwrap().is_autocommit());
        store.commit().unwrap();
        assert!(store.conn.lock().unwrap().is_autocommit());
        // nothing pending
        store.commit().unwrap();
    }

    #[test]
    fn test_unknown_codes_are_storage_errors() {
        let store = SqliteLinkStore::in_memory().unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO links VALUES ('a', 'b', 9, 2, '2024-01-01T00:00:00Z', 1.0)",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.link_between("a", "b"),
            Err(KindredError::Storage { .. })
        ));
    }

    #[test]
    fn test_validate_healthy_connection() {
        let store = SqliteLinkStore::in_memory().unwrap();
        store.validate_connection().unwrap();
    }

    fn lost_connection() -> rusqlite::Error {
        let code = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN);
        rusqlite::Error::SqliteFailure(code, None)
    }

    fn count_links(conn: &Connection) -> rusqlite::Result<i64> {
        conn.query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))
    }

    #[test]
    fn test_lost_connection_is_reopened_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLinkStore::open(dir.path().join("links.db")).unwrap();
        store.put_link(Link::asserted("a", "b", LinkKind::Same)).unwrap();
        store.commit().unwrap();
        store.put_link(Link::asserted("c", "d", LinkKind::Same)).unwrap();

        let attempts = Cell::new(0);
        let count = store
            .with_conn("count links", |conn| {
                attempts.set(attempts.get() + 1);
                if attempts.get() == 1 {
                    Err(lost_connection())
                } else {
                    count_links(conn)
                }
            })
            .unwrap();

        assert_eq!(attempts.get(), 2);
        // the pending write died with the old connection
        assert_eq!(count, 1);
        assert!(store.link_between("c", "d").unwrap().is_none());
        assert!(store.link_between("a", "b").unwrap().is_some());
    }

    #[test]
    fn test_retry_happens_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLinkStore::open(dir.path().join("links.db")).unwrap();

        let attempts = Cell::new(0);
        let err = store
            .with_conn("count links", |_| -> rusqlite::Result<i64> {
                attempts.set(attempts.get() + 1);
                Err(lost_connection())
            })
            .unwrap_err();
        assert_eq!(attempts.get(), 2);
        assert_eq!(err.code(), ErrorCode::StoOperationFailed);
    }

    #[test]
    fn test_in_memory_store_is_not_retried() {
        let store = SqliteLinkStore::in_memory().unwrap();
        let attempts = Cell::new(0);
        let result = store.with_conn("count links", |_| -> rusqlite::Result<i64> {
            attempts.set(attempts.get() + 1);
            Err(lost_connection())
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_failed_check_reopens_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLinkStore::open(dir.path().join("links.db")).unwrap();
        store.put_link(Link::asserted("a", "b", LinkKind::Same)).unwrap();
        store.commit().unwrap();
        store.put_link(Link::asserted("c", "d", LinkKind::Same)).unwrap();

        store.revalidate(|_| Err(lost_connection())).unwrap();

        assert!(store.conn.lock().unwrap().is_autocommit());
        assert_eq!(store.all_links().unwrap().len(), 1);
        store.validate_connection().unwrap();
    }

    #[test]
    fn test_failed_check_on_in_memory_store() {
        let store = SqliteLinkStore::in_memory().unwrap();
        let err = store.revalidate(|_| Err(lost_connection())).unwrap_err();
        assert_eq!(err.code(), ErrorCode::StoConnectionFailed);
    }
}
