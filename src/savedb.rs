//! Per-directory database: one [`SaveDb`] per containing directory, bundling
//! the connection and the six operations [`crate::handler::CallHandler`]
//! composes into the open/read/write/truncate/delete state machine.

use std::path::{Path, PathBuf};

use rusqlite::{params, OptionalExtension};
use snafu::ResultExt;

use crate::error::{self, Result};
use crate::esew::{self, BlobHandle, Connection};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS files (name TEXT PRIMARY KEY, data BLOB)";

/// Name of the table backing every virtual file in a directory.
pub const TABLE: &str = "files";
/// Name of the blob column inside [`TABLE`].
pub const COLUMN: &str = "data";

/// One database per containing directory. Row names are base names, never
/// full paths — two different directories each get their own `SaveDb` and
/// their own `files` table, so a name collision across directories is not
/// possible.
pub struct SaveDb {
    conn: Connection,
}

impl SaveDb {
    /// Opens (or creates) `<directory>/<db_filename>`. The on-closed hook
    /// removes `directory` from the real filesystem if it is empty once
    /// this `SaveDb` is dropped.
    pub fn open(directory: PathBuf, db_filename: &str) -> Result<Self> {
        let db_path = directory.join(db_filename);
        let hook_dir = directory.clone();
        let conn = Connection::open(
            db_path,
            SCHEMA,
            Box::new(move |_closed_db_path| {
                let is_empty = std::fs::read_dir(&hook_dir)
                    .map(|mut entries| entries.next().is_none())
                    .unwrap_or(false);
                if is_empty {
                    if let Err(err) = std::fs::remove_dir(&hook_dir) {
                        tracing::warn!(dir = %hook_dir.display(), %err, "failed to remove empty save directory");
                    } else {
                        tracing::debug!(dir = %hook_dir.display(), "removed empty save directory");
                    }
                }
            }),
        )?;
        Ok(Self { conn })
    }

    pub fn path(&self) -> &Path {
        self.conn.path()
    }

    /// Runs `f` with exclusive access to the underlying connection. Every
    /// multi-step sequence in [`crate::handler`] (the write/truncate grow
    /// paths in particular) must go through a single call to this so the
    /// whole sequence is atomic with respect to other threads touching the
    /// same directory.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T>,
    {
        self.conn.with_conn(f)
    }
}

/// `SELECT rowid FROM files WHERE name = ?`
pub fn get_rowid(conn: &rusqlite::Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT rowid FROM files WHERE name = ?1 AND data IS NOT NULL",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .context(error::EngineSnafu {
        operation: "get rowid",
        path: PathBuf::from(name),
    })
}

/// `SELECT COUNT(1) FROM files WHERE name = ?`, interpreted as "does a
/// non-NULL blob exist under this name".
pub fn exists(conn: &rusqlite::Connection, name: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(1) FROM files WHERE name = ?1 AND data IS NOT NULL",
            params![name],
            |row| row.get(0),
        )
        .context(error::EngineSnafu {
            operation: "check existence",
            path: PathBuf::from(name),
        })?;
    Ok(count != 0)
}

/// `INSERT OR REPLACE INTO files(name, data) VALUES(?1, ?2)` with the
/// caller's bytes as the payload.
pub fn upsert_bytes(conn: &rusqlite::Connection, name: &str, bytes: &[u8]) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO files(name, data) VALUES(?1, ?2)",
        params![name, bytes],
    )
    .context(error::EngineSnafu {
        operation: "upsert blob",
        path: PathBuf::from(name),
    })?;
    Ok(())
}

/// Same statement, but with a zero-filled placeholder blob of `len` bytes
/// instead of real payload. Returns the new row's rowid so the caller can
/// [`BlobHandle::reopen`] against it.
pub fn upsert_zeroblob(conn: &rusqlite::Connection, name: &str, len: i64) -> Result<i64> {
    conn.execute(
        "INSERT OR REPLACE INTO files(name, data) VALUES(?1, ?2)",
        params![name, esew::zero_blob(len)],
    )
    .context(error::EngineSnafu {
        operation: "upsert zero-blob",
        path: PathBuf::from(name),
    })?;
    Ok(conn.last_insert_rowid())
}

/// `SELECT length(data) FROM files WHERE name = ?`, guarded by the same
/// `data IS NOT NULL` filter as [`exists`] — without it, a soft-deleted row
/// (`data` is SQL NULL) would make `length(data)` itself NULL, which fails
/// to convert into `i64` instead of resolving to "no such blob".
pub fn blob_size(conn: &rusqlite::Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT length(data) FROM files WHERE name = ?1 AND data IS NOT NULL",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .context(error::EngineSnafu {
        operation: "blob size",
        path: PathBuf::from(name),
    })
}

/// `UPDATE files SET data = substr(data, ?1, ?2) WHERE name = ?3`.
///
/// Retains exactly the first `length` bytes of the blob. SQL `substr` is
/// 1-based, so "keep bytes `[0, length)`" is expressed as `substr(data, 1,
/// length)` — offset `1` here is correct 1-based indexing for "start at the
/// first byte", not an off-by-one error (see `DESIGN.md`).
pub fn truncate_substr(conn: &rusqlite::Connection, length: i64, name: &str) -> Result<()> {
    conn.execute(
        "UPDATE files SET data = substr(data, 1, ?1) WHERE name = ?2",
        params![length, name],
    )
    .context(error::EngineSnafu {
        operation: "truncate",
        path: PathBuf::from(name),
    })?;
    Ok(())
}

/// `UPDATE files SET data = NULL WHERE name = ?1 AND data IS NOT NULL`.
/// Returns the number of rows changed, which is how the caller
/// distinguishes "deleted something" from "nothing there to delete".
///
/// The `data IS NOT NULL` guard is what makes delete idempotent: a row
/// whose blob is already NULL no longer counts as a name match, so a
/// second delete on the same name changes zero rows instead of touching an
/// already-null column and reporting a change anyway. Without the guard,
/// `rowid`/name rows persist across a logical delete and the row would
/// keep matching `WHERE name = ?1` forever, making every repeat delete
/// report success — see `DESIGN.md` for why this reading was chosen over
/// the literal statement text.
pub fn delete(conn: &rusqlite::Connection, name: &str) -> Result<usize> {
    conn.execute(
        "UPDATE files SET data = NULL WHERE name = ?1 AND data IS NOT NULL",
        params![name],
    )
    .context(error::EngineSnafu {
        operation: "delete",
        path: PathBuf::from(name),
    })
}

/// Opens a read-write blob handle against `files.data` for `rowid`.
pub fn open_blob<'conn>(
    conn: &'conn rusqlite::Connection,
    path: &Path,
    rowid: i64,
) -> Result<BlobHandle<'conn>> {
    BlobHandle::open(conn, path, TABLE, COLUMN, rowid)
}
