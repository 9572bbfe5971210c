use std::path::PathBuf;

use snafu::Snafu;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every fallible outcome the core can produce.
///
/// Logical misses (missing row, cursor past end-of-file, a path that isn't
/// ours to handle) are *not* represented here — those are encoded directly
/// as a [`crate::intent::FileIntent`] by the call handler. This enum only
/// covers conditions the embedded engine itself considers fatal, plus
/// configuration mistakes made by the embedding process.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("sqlite engine error while {operation} on {path:?}: {source}"))]
    Engine {
        operation: &'static str,
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[snafu(display("failed to open blob for {table}.{column} row {rowid} in {path:?}: {source}"))]
    BlobOpen {
        path: PathBuf,
        table: &'static str,
        column: &'static str,
        rowid: i64,
        source: rusqlite::Error,
    },

    #[snafu(display("blob I/O error in {path:?}: {source}"))]
    BlobIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to memory-map {path:?}: {source}"))]
    MemMap {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to remove empty directory {path:?}: {source}"))]
    DirectoryCleanup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("invalid configuration: {message}"))]
    Config { message: String },
}
