//! The interception predicate: decides whether a path is ours to redirect
//! into a [`crate::savedb::SaveDb`] at all, before any database is touched.
//!
//! Grounded on `OSCallHandler::ShouldIntercept` in the distilled source: a
//! path qualifies only if it ends in the configured extension, sits three
//! directories below a `Saves`-named ancestor, and its immediate parent
//! directory actually exists on the real filesystem.

use std::path::Path;

use crate::config::Config;
use crate::interfaces::FileOps;

/// Returns `true` if `path` should be redirected into a per-directory
/// database rather than passed through to the real filesystem.
///
/// `path` is expected to be the full path a host call was made with.
/// `handle_is_tracked` lets a handle-carrying call (read, write, seek, ...)
/// stay intercepted for a handle this crate already opened even if the
/// path shape check below would otherwise say no — a file can outlive a
/// rename of some ancestor directory between open and close.
pub fn should_intercept(
    config: &Config,
    file_ops: &dyn FileOps,
    path: &Path,
    handle_is_tracked: bool,
) -> bool {
    if handle_is_tracked {
        return true;
    }
    if !config.enabled {
        return false;
    }
    matches_path_shape(config, file_ops, path)
}

fn matches_path_shape(config: &Config, file_ops: &dyn FileOps, path: &Path) -> bool {
    let has_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(&config.intercepted_extension));
    if !has_extension {
        return false;
    }

    let Some(parent) = path.parent() else {
        return false;
    };
    let Some(saves_ancestor) = parent.parent().and_then(Path::parent) else {
        return false;
    };
    if saves_ancestor.parent().is_none() {
        return false;
    }
    let is_under_saves_marker = saves_ancestor
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == config.saves_marker);
    if !is_under_saves_marker {
        return false;
    }

    file_ops.file_exists(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{FileTimes, MemMappedFile};
    use std::path::PathBuf;

    struct StubFileOps {
        existing_dirs: Vec<PathBuf>,
    }

    impl FileOps for StubFileOps {
        fn file_exists(&self, path: &Path) -> bool {
            self.existing_dirs.iter().any(|dir| dir == path)
        }
        fn mmap_file(&self, _path: &Path) -> std::io::Result<Box<dyn MemMappedFile>> {
            unimplemented!("not exercised by policy tests")
        }
        fn get_file_times(&self, _path: &Path) -> FileTimes {
            FileTimes::default()
        }
    }

    fn qualifying_path() -> PathBuf {
        PathBuf::from("/home/user/Zomboid/Saves/Sandbox/slot1/map_0_0.bin")
    }

    #[test]
    fn matches_a_correctly_shaped_path_with_existing_parent() {
        let config = Config::default();
        let path = qualifying_path();
        let ops = StubFileOps {
            existing_dirs: vec![path.parent().unwrap().to_path_buf()],
        };
        assert!(should_intercept(&config, &ops, &path, false));
    }

    #[test]
    fn rejects_when_parent_directory_is_missing() {
        let config = Config::default();
        let path = qualifying_path();
        let ops = StubFileOps {
            existing_dirs: vec![],
        };
        assert!(!should_intercept(&config, &ops, &path, false));
    }

    #[test]
    fn rejects_wrong_extension() {
        let config = Config::default();
        let path = PathBuf::from("/home/user/Zomboid/Saves/Sandbox/slot1/map_0_0.txt");
        let ops = StubFileOps {
            existing_dirs: vec![path.parent().unwrap().to_path_buf()],
        };
        assert!(!should_intercept(&config, &ops, &path, false));
    }

    #[test]
    fn rejects_wrong_saves_marker() {
        let config = Config::default();
        let path = PathBuf::from("/home/user/Zomboid/Backups/Sandbox/slot1/map_0_0.bin");
        let ops = StubFileOps {
            existing_dirs: vec![path.parent().unwrap().to_path_buf()],
        };
        assert!(!should_intercept(&config, &ops, &path, false));
    }

    #[test]
    fn a_tracked_handle_is_always_intercepted() {
        let config = Config::default();
        let path = PathBuf::from("/anything.txt");
        let ops = StubFileOps {
            existing_dirs: vec![],
        };
        assert!(should_intercept(&config, &ops, &path, true));
    }

    #[test]
    fn disabled_config_never_intercepts() {
        let mut config = Config::default();
        config.enabled = false;
        let path = qualifying_path();
        let ops = StubFileOps {
            existing_dirs: vec![path.parent().unwrap().to_path_buf()],
        };
        assert!(!should_intercept(&config, &ops, &path, false));
    }
}
