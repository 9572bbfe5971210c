//! The two narrow boundaries the call handler talks across: the
//! [`OSCallHandler`] trait it implements and exports upward, and the
//! [`FileOps`] trait it consumes for pass-through queries and imports.
//!
//! Neither trait says anything about *how* OS calls reach this crate or
//! how `FileOps` is wired to the real filesystem — that glue lives outside
//! this crate entirely.

use std::path::{Path, PathBuf};

/// One open file, as seen by the interception layer: the path it was
/// opened with, and the opaque handle the layer uses to refer to it on
/// every subsequent call.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub handle: i64,
}

/// What the call handler wants the caller to do with a dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileIntent {
    /// The call was handled; treat it as if the real OS call had succeeded.
    Succeed,
    /// The call was handled; treat it as if the real OS call had failed.
    Fail,
    /// This path is not ours — defer to the real OS.
    Passthru,
}

/// Mirrors `SEEK_SET` / `SEEK_CUR` / `SEEK_END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Begin,
    Current,
    End,
}

/// Result of an attribute query — a superset of [`FileIntent`] with the
/// two outcomes a directory-vs-file distinction needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAttribute {
    Normal,
    Directory,
    NotFound,
    Passthru,
}

/// Unix-epoch-seconds timestamps for a file, as a real OS would report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileTimes {
    pub creation_time: i64,
    pub last_modified: i64,
    pub last_accessed: i64,
}

/// The inbound capability set: every OS-style file call the host's
/// interception layer may dispatch into this crate.
///
/// Implementations must be safe to call concurrently from arbitrary host
/// threads; see the crate's concurrency notes for what "safe" means here
/// (per-handle ordering is the caller's responsibility, everything else
/// is internally serialized).
pub trait OSCallHandler {
    fn file_open_only(&self, info: FileInfo) -> FileIntent;
    fn file_create_only(&self, info: FileInfo) -> FileIntent;
    fn file_open_or_create(&self, info: FileInfo) -> FileIntent;
    fn file_create_and_wipe(&self, info: FileInfo) -> FileIntent;
    fn file_open_only_and_wipe(&self, info: FileInfo) -> FileIntent;

    fn file_read(&self, info: FileInfo, buf: &mut [u8], len: &mut u32) -> FileIntent;
    fn file_write(&self, info: FileInfo, buf: &[u8], len: &mut u32) -> FileIntent;
    fn file_seek(&self, info: FileInfo, from: SeekFrom, distance: &mut i64) -> FileIntent;

    fn file_truncate_to_cursor(&self, info: FileInfo) -> FileIntent;
    fn file_truncate(&self, info: FileInfo, len: u64) -> FileIntent;

    fn file_delete(&self, path: &Path) -> FileIntent;
    fn file_set_attrib(&self, path: &Path) -> FileIntent;

    fn file_get_size(&self, info: FileInfo, size_out: &mut u64, stateless: bool) -> FileIntent;
    fn file_get_attrib(&self, path: &Path) -> FileAttribute;
    fn file_get_times(&self, path: &Path) -> FileTimes;

    fn file_closed(&self, info: FileInfo);
}

/// A memory-mapped view of a real file, handed back by [`FileOps::mmap_file`].
/// Unmapping happens on drop.
pub trait MemMappedFile {
    fn data(&self) -> &[u8];
    fn size(&self) -> usize {
        self.data().len()
    }
}

/// The outbound capability set: everything the call handler needs from the
/// real filesystem. A production embedding wires this to `std::fs` (see
/// [`crate::fileops::RealFileOps`]); tests wire it to a temp directory the
/// same way.
pub trait FileOps: Send + Sync {
    fn file_exists(&self, path: &Path) -> bool;
    fn mmap_file(&self, path: &Path) -> std::io::Result<Box<dyn MemMappedFile>>;
    fn get_file_times(&self, path: &Path) -> FileTimes;
}
