use std::sync::Arc;

use wasi_memfs_host::{FileSystem, MemFs, OpenOptions, WasiConfig};

use crate::integration_tests::test_utils::{data_fs, read_file, run};

/// Creates `out.txt` within the preopen on fd 3 and writes `hello` to it.
///
/// Exits with `100 + errno` if opening fails and with `200 + errno` if writing fails.
const WRITE_FILE: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_close" (func $fd_close (param i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "out.txt")
  (data (i32.const 32) "hello")
  (func (export "_start")
    (local $err i32)
    ;; oflags = CREAT | TRUNC, rights = FD_WRITE
    (local.set $err
      (call $path_open
        (i32.const 3) (i32.const 0) (i32.const 16) (i32.const 7)
        (i32.const 9) (i64.const 64) (i64.const 0) (i32.const 0) (i32.const 0)))
    (if (local.get $err)
      (then (call $proc_exit (i32.add (i32.const 100) (local.get $err)))))

    (i32.store (i32.const 8) (i32.const 32))
    (i32.store (i32.const 12) (i32.const 5))
    (local.set $err
      (call $fd_write (i32.load (i32.const 0)) (i32.const 8) (i32.const 1) (i32.const 4)))
    (if (local.get $err)
      (then (call $proc_exit (i32.add (i32.const 200) (local.get $err)))))

    (drop (call $fd_close (i32.load (i32.const 0))))
  )
)
"#;

/// Opens `path` relative to fd 3 for reading and exits with the resulting errno.
fn open_path_guest(path: &str) -> String {
    format!(
        r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "{path}")
  (func (export "_start")
    (call $proc_exit
      (call $path_open
        (i32.const 3) (i32.const 0) (i32.const 16) (i32.const {len})
        (i32.const 0) (i64.const 2) (i64.const 0) (i32.const 0) (i32.const 0)))
  )
)
"#,
        len = path.len(),
    )
}

#[test]
fn test_write_file() {
    let fs = data_fs();
    let config = WasiConfig::new()
        .with_fs(Arc::clone(&fs) as Arc<dyn FileSystem>)
        .with_preopen("/data", "/data");

    let (_runtime, res) = run(config, WRITE_FILE);
    assert_eq!(res.unwrap(), 0);
    assert_eq!(read_file(&*fs, "/data/out.txt"), "hello");
}

#[test]
fn test_write_file_truncates() {
    let fs = data_fs();
    fs.open(
        "/data/out.txt",
        &OpenOptions::new().write(true).create(true),
    )
    .unwrap()
    .write_str("previous content")
    .unwrap();

    let config = WasiConfig::new()
        .with_fs(Arc::clone(&fs) as Arc<dyn FileSystem>)
        .with_preopen("/data", "/data");
    let (_runtime, res) = run(config, WRITE_FILE);
    assert_eq!(res.unwrap(), 0);
    assert_eq!(read_file(&*fs, "/data/out.txt"), "hello");
}

#[test]
fn test_write_file_storage_limit() {
    let fs = Arc::new(MemFs::new(wasi_memfs_host::VfsLimits {
        max_storage_bytes: 3,
        ..Default::default()
    }));
    fs.create_dir("/data").unwrap();
    let config = WasiConfig::new()
        .with_fs(Arc::clone(&fs) as Arc<dyn FileSystem>)
        .with_preopen("/data", "/data");

    // ENOSPC
    let (_runtime, res) = run(config, WRITE_FILE);
    assert_eq!(res.unwrap(), 251);
}

#[test]
fn test_default_fs_and_preopen() {
    let (runtime, res) = run(WasiConfig::new(), WRITE_FILE);
    assert_eq!(res.unwrap(), 0);
    assert_eq!(read_file(runtime.fs().as_ref(), "/out.txt"), "hello");
}

#[test]
fn test_sandbox_escape() {
    let fs = data_fs();
    fs.open("/secret", &OpenOptions::new().write(true).create(true))
        .unwrap();

    for path in ["../secret", "/secret", "a/../../secret"] {
        let config = WasiConfig::new()
            .with_fs(Arc::clone(&fs) as Arc<dyn FileSystem>)
            .with_preopen("/data", "/data");

        // ENOTCAPABLE
        let (_runtime, res) = run(config, &open_path_guest(path));
        assert_eq!(res.unwrap(), 76, "{path}");
    }
}

#[test]
fn test_open_missing() {
    let config = WasiConfig::new()
        .with_fs(data_fs())
        .with_preopen("/data", "/data");

    // ENOENT
    let (_runtime, res) = run(config, &open_path_guest("missing.txt"));
    assert_eq!(res.unwrap(), 44);
}

#[test]
fn test_read_seeded_file() {
    let mut builder = tar::Builder::new(Vec::new());

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, "data", std::io::empty())
        .unwrap();

    let content = b"seeded";
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "data/in.txt", &content[..])
        .unwrap();
    let archive = builder.into_inner().unwrap();

    let fs = Arc::new(MemFs::default());
    fs.populate_from_tar(&archive).unwrap();

    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "in.txt")
  (func (export "_start")
    (local $err i32)
    ;; rights = FD_READ
    (local.set $err
      (call $path_open
        (i32.const 3) (i32.const 0) (i32.const 16) (i32.const 6)
        (i32.const 0) (i64.const 2) (i64.const 0) (i32.const 0) (i32.const 0)))
    (if (local.get $err) (then (call $proc_exit (local.get $err))))

    (i32.store (i32.const 8) (i32.const 64))
    (i32.store (i32.const 12) (i32.const 64))
    (local.set $err
      (call $fd_read (i32.load (i32.const 0)) (i32.const 8) (i32.const 1) (i32.const 4)))
    (if (local.get $err) (then (call $proc_exit (local.get $err))))

    (i32.store (i32.const 12) (i32.load (i32.const 4)))
    (drop (call $fd_write (i32.const 1) (i32.const 8) (i32.const 1) (i32.const 4)))
  )
)
"#;
    let config = WasiConfig::new()
        .with_fs(fs)
        .with_preopen("/data", "/data");
    let (runtime, res) = run(config, wat);
    assert_eq!(res.unwrap(), 0);
    assert_eq!(runtime.stdout_string().unwrap(), "seeded");
}

#[test]
fn test_directories() {
    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "path_create_directory"
    (func $mkdir (param i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "path_rename"
    (func $rename (param i32 i32 i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "path_remove_directory"
    (func $rmdir (param i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "a")
  (data (i32.const 32) "b")
  (data (i32.const 48) "c")
  (func (export "_start")
    (local $err i32)
    (local.set $err (call $mkdir (i32.const 3) (i32.const 16) (i32.const 1)))
    (if (local.get $err) (then (call $proc_exit (local.get $err))))
    (local.set $err (call $mkdir (i32.const 3) (i32.const 48) (i32.const 1)))
    (if (local.get $err) (then (call $proc_exit (local.get $err))))
    (local.set $err
      (call $rename (i32.const 3) (i32.const 16) (i32.const 1) (i32.const 3) (i32.const 32) (i32.const 1)))
    (if (local.get $err) (then (call $proc_exit (local.get $err))))
    (call $proc_exit (call $rmdir (i32.const 3) (i32.const 48) (i32.const 1)))
  )
)
"#;
    let fs = data_fs();
    let config = WasiConfig::new()
        .with_fs(Arc::clone(&fs) as Arc<dyn FileSystem>)
        .with_preopen("/data", "/data");
    let (_runtime, res) = run(config, wat);
    assert_eq!(res.unwrap(), 0);

    assert!(fs.metadata("/data/a").is_err());
    assert!(fs.metadata("/data/b").unwrap().is_dir());
    assert!(fs.metadata("/data/c").is_err());
}
