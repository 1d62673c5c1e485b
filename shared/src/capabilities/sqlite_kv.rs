use crux_kv::error::KeyValueError;
use crux_kv::{KeyValueOperation, KeyValueResponse, KeyValueResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;
const LIST_PAGE_SIZE: usize = 100;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);
";

/// Shell-side executor for `KeyValue` effects, backed by a single SQLite
/// file. Calls block; async shells go through [`SqliteKv::run`].
pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKv").finish_non_exhaustive()
    }
}

fn io_err(e: impl std::fmt::Display) -> KeyValueError {
    KeyValueError::Io {
        message: e.to_string(),
    }
}

impl SqliteKv {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KeyValueError> {
        Self::init(Connection::open(path.as_ref()).map_err(io_err)?)
    }

    pub fn open_in_memory() -> Result<Self, KeyValueError> {
        Self::init(Connection::open_in_memory().map_err(io_err)?)
    }

    fn init(conn: Connection) -> Result<Self, KeyValueError> {
        conn.execute_batch(SCHEMA).map_err(io_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Executes the operation on a blocking worker so the async runtime
    /// keeps serving other effects meanwhile.
    pub async fn run(self: Arc<Self>, operation: KeyValueOperation) -> KeyValueResult {
        match tokio::task::spawn_blocking(move || self.handle(operation)).await {
            Ok(result) => result,
            Err(e) => KeyValueResult::Err {
                error: KeyValueError::Other {
                    message: format!("key-value worker failed: {e}"),
                },
            },
        }
    }

    /// Executes one operation synchronously.
    pub fn handle(&self, operation: KeyValueOperation) -> KeyValueResult {
        let response = match operation {
            KeyValueOperation::Get { key } => self
                .get(&key)
                .map(|value| KeyValueResponse::Get { value: value.into() }),
            KeyValueOperation::Set { key, value } => self
                .set(&key, value)
                .map(|previous| KeyValueResponse::Set {
                    previous: previous.into(),
                }),
            KeyValueOperation::Delete { key } => self
                .delete(&key)
                .map(|previous| KeyValueResponse::Delete {
                    previous: previous.into(),
                }),
            KeyValueOperation::Exists { key } => self
                .get(&key)
                .map(|value| KeyValueResponse::Exists {
                    is_present: value.is_some(),
                }),
            KeyValueOperation::ListKeys { prefix, cursor } => self
                .list_keys(&prefix, cursor)
                .map(|(keys, next_cursor)| KeyValueResponse::ListKeys { keys, next_cursor }),
        };

        match response {
            Ok(response) => KeyValueResult::Ok { response },
            Err(error) => KeyValueResult::Err { error },
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, KeyValueError> {
        let mut conn = self.conn.lock().map_err(|_| KeyValueError::Other {
            message: "sqlite connection lock poisoned".to_string(),
        })?;
        f(&mut conn).map_err(io_err)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KeyValueError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
        })
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>, KeyValueError> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(KeyValueError::Other {
                message: format!(
                    "value too large: {} bytes exceeds maximum of {MAX_VALUE_SIZE} bytes",
                    value.len()
                ),
            });
        }
        let now = i64::try_from(crate::model::get_current_time_ms()).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let previous = tx
                .query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            tx.execute(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
            tx.commit()?;
            Ok(previous)
        })
    }

    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>, KeyValueError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let previous = tx
                .query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            tx.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
            tx.commit()?;
            Ok(previous)
        })
    }

    /// The cursor is an offset into the prefix's keys in sorted order;
    /// zero in a response means there are no more.
    fn list_keys(&self, prefix: &str, cursor: u64) -> Result<(Vec<String>, u64), KeyValueError> {
        let offset = i64::try_from(cursor).map_err(|_| KeyValueError::CursorNotFound)?;
        let mut keys = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM kv_entries WHERE substr(key, 1, length(?1)) = ?1
                 ORDER BY key LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(
                params![prefix, i64::try_from(LIST_PAGE_SIZE + 1).unwrap_or(i64::MAX), offset],
                |row| row.get::<_, String>(0),
            )?;
            let mut keys = Vec::new();
            for key in rows {
                keys.push(key?);
            }
            Ok(keys)
        })?;

        if cursor > 0 && keys.is_empty() {
            return Err(KeyValueError::CursorNotFound);
        }
        let next_cursor = if keys.len() > LIST_PAGE_SIZE {
            keys.truncate(LIST_PAGE_SIZE);
            cursor + u64::try_from(LIST_PAGE_SIZE).unwrap_or(u64::MAX)
        } else {
            0
        };
        Ok((keys, next_cursor))
    }
}
