//! Local embedded backend (SQLite).
//!
//! Each collection is one table holding the key, a few indexed columns, and
//! the full JSON document. Updates replace the whole document.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use geosip_types::{LandRecord, RecordId, User};

use crate::ops::{BackendKind, RecordStore};
use crate::{StoreError, StoreResult};

const SCHEMA: &str = r#"
-- Land records (one row per owner claim)
CREATE TABLE IF NOT EXISTS land_records (
    id TEXT PRIMARY KEY,
    survey_drawing_number TEXT NOT NULL,
    document_number TEXT NOT NULL,
    village TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_land_records_survey_drawing_number ON land_records(survey_drawing_number);
CREATE INDEX IF NOT EXISTS idx_land_records_document ON land_records(document_number);
CREATE INDEX IF NOT EXISTS idx_land_records_created ON land_records(created_at);

-- Users
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
"#;

const UPSERT_RECORD: &str = "INSERT INTO land_records (id, survey_drawing_number, document_number, village, status, created_at, body)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT(id) DO UPDATE SET
        survey_drawing_number = excluded.survey_drawing_number,
        document_number = excluded.document_number,
        village = excluded.village,
        status = excluded.status,
        created_at = excluded.created_at,
        body = excluded.body";

const INSERT_RECORD: &str = "INSERT INTO land_records (id, survey_drawing_number, document_number, village, status, created_at, body)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// Local SQLite record store.
///
/// The connection sits behind a `parking_lot::Mutex`; every operation is a
/// short synchronous statement.
pub struct LocalBackend {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend").finish_non_exhaustive()
    }
}

impl LocalBackend {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn write_record(conn: &Connection, sql: &str, record: &LandRecord) -> StoreResult<()> {
        let body = serde_json::to_string(record)?;
        conn.execute(
            sql,
            params![
                record.id.as_str(),
                record.survey_drawing_number.trim(),
                record.document_number,
                record.village,
                record.status.label(),
                record.created_at,
                body,
            ],
        )?;
        Ok(())
    }

    fn insert_record(conn: &Connection, record: &LandRecord) -> StoreResult<()> {
        match Self::write_record(conn, INSERT_RECORD, record) {
            Err(StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::already_exists(record.id.as_str()))
            }
            other => other,
        }
    }
}

#[async_trait]
impl RecordStore for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn list_records(&self) -> StoreResult<Vec<LandRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT body FROM land_records ORDER BY rowid")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    async fn get_record(&self, id: &RecordId) -> StoreResult<Option<LandRecord>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM land_records WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn create_record(&self, record: &LandRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        Self::insert_record(&conn, record)
    }

    async fn create_records(&self, records: &[LandRecord]) -> StoreResult<()> {
        let conn = self.conn.lock();
        for record in records {
            Self::insert_record(&conn, record)?;
        }
        Ok(())
    }

    async fn put_records(&self, records: &[LandRecord]) -> StoreResult<()> {
        let conn = self.conn.lock();
        for record in records {
            Self::write_record(&conn, UPSERT_RECORD, record)?;
        }
        Ok(())
    }

    async fn update_record(&self, record: &LandRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        Self::write_record(&conn, UPSERT_RECORD, record)
    }

    async fn delete_record(&self, id: &RecordId) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM land_records WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }

    async fn clear_records(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM land_records", [])?;
        Ok(())
    }

    async fn set_file_link_for_drawing(
        &self,
        drawing_number: &str,
        link: &str,
    ) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE land_records SET body = json_set(body, '$.fileLink', ?1) WHERE survey_drawing_number = ?2",
            params![link, drawing_number.trim()],
        )?;
        Ok(updated)
    }

    async fn get_user(&self, username: &str) -> StoreResult<Option<User>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT body FROM users ORDER BY username")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    async fn put_user(&self, user: &User) -> StoreResult<()> {
        let body = serde_json::to_string(user)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO users (username, email, body) VALUES (?1, ?2, ?3)",
            params![user.username, user.email, body],
        )?;
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM users WHERE username = ?1", params![username])?;
        Ok(())
    }
}
