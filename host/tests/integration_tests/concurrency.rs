use std::sync::Arc;

use wasi_memfs_host::{FileSystem, WasiConfig};

use crate::integration_tests::test_utils::{data_fs, read_file, run};

/// Guest that writes its first argument into a file named after the same argument.
const WRITE_ARG: &str = r#"
(module
  (import "wasi_snapshot_preview1" "args_sizes_get"
    (func $args_sizes_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "args_get"
    (func $args_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (local $err i32)
    (local $len i32)
    (drop (call $args_sizes_get (i32.const 0) (i32.const 4)))
    (drop (call $args_get (i32.const 64) (i32.const 256)))
    ;; without the trailing NULL byte
    (local.set $len (i32.sub (i32.load (i32.const 4)) (i32.const 1)))

    (local.set $err
      (call $path_open
        (i32.const 3) (i32.const 0) (i32.const 256) (local.get $len)
        (i32.const 9) (i64.const 64) (i64.const 0) (i32.const 0) (i32.const 8)))
    (if (local.get $err) (then (call $proc_exit (local.get $err))))

    (i32.store (i32.const 16) (i32.const 256))
    (i32.store (i32.const 20) (local.get $len))
    (call $proc_exit
      (call $fd_write (i32.load (i32.const 8)) (i32.const 16) (i32.const 1) (i32.const 24)))
  )
)
"#;

#[test]
fn test_shared_fs() {
    let fs = data_fs();

    std::thread::scope(|s| {
        for name in ["first", "second", "third"] {
            let fs = Arc::clone(&fs);
            s.spawn(move || {
                let config = WasiConfig::new()
                    .with_arg(name)
                    .with_fs(fs)
                    .with_preopen("/data", "/data");
                let (_runtime, res) = run(config, WRITE_ARG);
                assert_eq!(res.unwrap(), 0);
            });
        }
    });

    for name in ["first", "second", "third"] {
        assert_eq!(read_file(&*fs, &format!("/data/{name}")), name);
    }
    assert_eq!(fs.read_dir("/data").unwrap().len(), 3);
}
