//! The production [`FileOps`] implementation: `std::fs` for existence and
//! timestamp queries, `memmap2` for the memory-mapping the import path
//! needs. This is what a host embeds; tests typically use a stub instead.

use std::path::Path;

use memmap2::Mmap;

use crate::interfaces::{FileOps, FileTimes, MemMappedFile};

/// Backs [`FileOps`] with the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileOps;

impl FileOps for RealFileOps {
    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn mmap_file(&self, path: &Path) -> std::io::Result<Box<dyn MemMappedFile>> {
        let file = std::fs::File::open(path)?;
        // SAFETY: the mapped file is read-only for the lifetime of the
        // returned handle; truncation by another process while mapped is a
        // pre-existing hazard of memory-mapped I/O, not one this crate
        // introduces.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Box::new(MappedFile(mmap)))
    }

    fn get_file_times(&self, path: &Path) -> FileTimes {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return FileTimes::default(),
        };
        FileTimes {
            creation_time: system_time_to_unix(metadata.created().ok()),
            last_modified: system_time_to_unix(metadata.modified().ok()),
            last_accessed: system_time_to_unix(metadata.accessed().ok()),
        }
    }
}

struct MappedFile(Mmap);

impl MemMappedFile for MappedFile {
    fn data(&self) -> &[u8] {
        &self.0
    }
}

fn system_time_to_unix(time: Option<std::time::SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn file_exists_reflects_the_real_filesystem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let ops = RealFileOps;
        assert!(!ops.file_exists(&path));
        std::fs::File::create(&path).unwrap();
        assert!(ops.file_exists(&path));
    }

    #[test]
    fn mmap_file_exposes_the_written_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"mapped contents").unwrap();
        drop(file);

        let ops = RealFileOps;
        let mapped = ops.mmap_file(&path).unwrap();
        assert_eq!(mapped.data(), b"mapped contents");
    }

    #[test]
    fn get_file_times_on_a_missing_path_is_zeroed() {
        let ops = RealFileOps;
        let times = ops.get_file_times(Path::new("/does/not/exist"));
        assert_eq!(times, FileTimes::default());
    }
}
