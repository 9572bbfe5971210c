//! Black-box replays of the scenarios this crate is meant to satisfy,
//! driven through [`vfiledb::CallHandler`] and the real filesystem via
//! [`vfiledb::fileops::RealFileOps`].

use std::path::PathBuf;

use tempfile::tempdir;
use vfiledb::fileops::RealFileOps;
use vfiledb::{CallHandler, Config, FileInfo, FileIntent, SeekFrom};

fn saves_path(root: &std::path::Path, name: &str) -> PathBuf {
    let dir = root
        .join("Zomboid")
        .join("Saves")
        .join("Sandbox")
        .join("slot1");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn handler() -> CallHandler {
    CallHandler::new(Config::default(), Box::new(RealFileOps))
}

#[test]
fn import_on_first_open() {
    let root = tempdir().unwrap();
    let path = saves_path(root.path(), "map_0_0.bin");
    std::fs::write(&path, b"already on disk").unwrap();

    let handler = handler();
    let info = FileInfo {
        path: path.clone(),
        handle: 1,
    };
    assert_eq!(handler.file_open_only(info.clone()), FileIntent::Succeed);

    let mut buf = vec![0u8; 32];
    let mut len = buf.len() as u32;
    assert_eq!(
        handler.file_read(info, &mut buf, &mut len),
        FileIntent::Succeed
    );
    assert_eq!(&buf[..len as usize], b"already on disk");
}

#[test]
fn write_past_end_zero_pads() {
    let root = tempdir().unwrap();
    let path = saves_path(root.path(), "map_0_0.bin");
    let handler = handler();

    let info = FileInfo {
        path: path.clone(),
        handle: 1,
    };
    assert_eq!(
        handler.file_create_and_wipe(info.clone()),
        FileIntent::Succeed
    );

    let mut distance = 10i64;
    handler.file_seek(info.clone(), SeekFrom::Begin, &mut distance);

    let mut len = 1u32;
    assert_eq!(
        handler.file_write(info.clone(), b"Z", &mut len),
        FileIntent::Succeed
    );

    let mut distance = 0i64;
    handler.file_seek(info.clone(), SeekFrom::Begin, &mut distance);

    let mut buf = vec![0xFFu8; 11];
    let mut len = 11u32;
    assert_eq!(
        handler.file_read(info, &mut buf, &mut len),
        FileIntent::Succeed
    );
    assert_eq!(len, 11);
    assert_eq!(&buf[..10], &[0u8; 10]);
    assert_eq!(buf[10], b'Z');
}

#[test]
fn non_intercepted_path_is_untouched() {
    let root = tempdir().unwrap();
    let path = root.path().join("readme.txt");
    std::fs::write(&path, b"plain file").unwrap();

    let handler = handler();
    let info = FileInfo {
        path: path.clone(),
        handle: 1,
    };
    assert_eq!(handler.file_open_only(info), FileIntent::Passthru);
    // Nothing was written alongside it.
    assert_eq!(
        std::fs::read_dir(root.path()).unwrap().count(),
        1,
        "no per-directory database should have been created"
    );
}

#[test]
fn create_exclusive_fails_but_still_imports() {
    let root = tempdir().unwrap();
    let path = saves_path(root.path(), "map_0_0.bin");
    std::fs::write(&path, b"pre-existing").unwrap();

    let handler = handler();
    let info = FileInfo {
        path: path.clone(),
        handle: 1,
    };
    assert_eq!(handler.file_create_only(info.clone()), FileIntent::Fail);

    let reopen = FileInfo {
        path: path.clone(),
        handle: 2,
    };
    assert_eq!(handler.file_open_only(reopen.clone()), FileIntent::Succeed);

    let mut buf = vec![0u8; 32];
    let mut len = buf.len() as u32;
    handler.file_read(reopen, &mut buf, &mut len);
    assert_eq!(&buf[..len as usize], b"pre-existing");
}

#[test]
fn delete_clears_row_but_leaves_real_file_for_reimport() {
    let root = tempdir().unwrap();
    let path = saves_path(root.path(), "map_0_0.bin");
    std::fs::write(&path, b"will be deleted from the db, not disk").unwrap();

    let handler = handler();
    let first = FileInfo {
        path: path.clone(),
        handle: 1,
    };
    assert_eq!(handler.file_open_only(first), FileIntent::Succeed);
    assert_eq!(handler.file_delete(&path), FileIntent::Succeed);
    assert_eq!(handler.file_delete(&path), FileIntent::Fail);

    // The real file on disk was never touched.
    assert!(path.exists());

    let second = FileInfo {
        path: path.clone(),
        handle: 2,
    };
    assert_eq!(handler.file_open_only(second.clone()), FileIntent::Succeed);
    let mut buf = vec![0u8; 64];
    let mut len = buf.len() as u32;
    handler.file_read(second, &mut buf, &mut len);
    assert_eq!(&buf[..len as usize], b"will be deleted from the db, not disk");
}

#[test]
fn two_handles_on_the_same_path_have_independent_cursors() {
    let root = tempdir().unwrap();
    let path = saves_path(root.path(), "map_0_0.bin");
    let handler = handler();

    let a = FileInfo {
        path: path.clone(),
        handle: 1,
    };
    let b = FileInfo {
        path: path.clone(),
        handle: 2,
    };
    assert_eq!(
        handler.file_create_and_wipe(a.clone()),
        FileIntent::Succeed
    );

    let mut len = 5u32;
    handler.file_write(a.clone(), b"alpha", &mut len);

    // b opens after the row already exists, so its open succeeds too.
    assert_eq!(handler.file_open_only(b.clone()), FileIntent::Succeed);

    let mut distance_a = 0i64;
    handler.file_seek(a, SeekFrom::Current, &mut distance_a);
    assert_eq!(distance_a, 5);

    let mut distance_b = 0i64;
    handler.file_seek(b, SeekFrom::Current, &mut distance_b);
    assert_eq!(distance_b, 0, "handle b's cursor must be untouched by handle a's write");
}

#[test]
fn round_trip_write_then_read_back() {
    let root = tempdir().unwrap();
    let path = saves_path(root.path(), "map_0_0.bin");
    let handler = handler();

    let info = FileInfo {
        path: path.clone(),
        handle: 1,
    };
    handler.file_create_and_wipe(info.clone());

    let payload = b"the quick brown fox jumps over the lazy dog";
    let mut len = payload.len() as u32;
    assert_eq!(
        handler.file_write(info.clone(), payload, &mut len),
        FileIntent::Succeed
    );

    let mut distance = 0i64;
    handler.file_seek(info.clone(), SeekFrom::Begin, &mut distance);

    let mut buf = vec![0u8; payload.len()];
    let mut read_len = payload.len() as u32;
    assert_eq!(
        handler.file_read(info, &mut buf, &mut read_len),
        FileIntent::Succeed
    );
    assert_eq!(&buf[..], payload);
}

#[test]
fn truncate_on_a_never_written_handle_is_a_no_op() {
    let root = tempdir().unwrap();
    let path = saves_path(root.path(), "map_0_0.bin");
    let handler = handler();

    let info = FileInfo {
        path: path.clone(),
        handle: 1,
    };
    assert_eq!(handler.file_create_only(info.clone()), FileIntent::Succeed);

    assert_eq!(handler.file_truncate(info.clone(), 128), FileIntent::Succeed);

    let mut buf = vec![0u8; 8];
    let mut len = buf.len() as u32;
    assert_eq!(
        handler.file_read(info, &mut buf, &mut len),
        FileIntent::Fail,
        "truncate must not have materialized a row where none existed"
    );
}

#[test]
fn seek_from_end_on_a_never_written_handle_keeps_the_prior_cursor() {
    let root = tempdir().unwrap();
    let path = saves_path(root.path(), "map_0_0.bin");
    let handler = handler();

    let info = FileInfo {
        path: path.clone(),
        handle: 1,
    };
    assert_eq!(handler.file_create_only(info.clone()), FileIntent::Succeed);

    let mut distance = 3i64;
    handler.file_seek(info.clone(), SeekFrom::Begin, &mut distance);
    assert_eq!(distance, 3);

    let mut distance = 50i64;
    handler.file_seek(info.clone(), SeekFrom::End, &mut distance);
    assert_eq!(
        distance, 3,
        "with no row to size against, the cursor must stay where it was"
    );
}
