use wasi_memfs_host::WasiConfig;

use crate::integration_tests::test_utils::run;

#[test]
fn test_argc_exit_code() {
    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "args_sizes_get"
    (func $args_sizes_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (drop (call $args_sizes_get (i32.const 0) (i32.const 4)))
    (call $proc_exit (i32.load (i32.const 0)))
  )
)
"#;
    let config = WasiConfig::new().with_args(["prog", "a", "b"]);
    let (_runtime, res) = run(config, wat);
    assert_eq!(res.unwrap(), 3);
}

#[test]
fn test_args_and_env_output() {
    // writes the argument buffer followed by the environment buffer to stdout
    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "args_sizes_get"
    (func $args_sizes_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "args_get"
    (func $args_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "environ_sizes_get"
    (func $environ_sizes_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "environ_get"
    (func $environ_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    ;; arguments: pointers at 64, strings at 256
    (drop (call $args_sizes_get (i32.const 0) (i32.const 4)))
    (drop (call $args_get (i32.const 64) (i32.const 256)))
    (i32.store (i32.const 16) (i32.const 256))
    (i32.store (i32.const 20) (i32.load (i32.const 4)))

    ;; environment: pointers at 128, strings at 512
    (drop (call $environ_sizes_get (i32.const 8) (i32.const 12)))
    (drop (call $environ_get (i32.const 128) (i32.const 512)))
    (i32.store (i32.const 24) (i32.const 512))
    (i32.store (i32.const 28) (i32.load (i32.const 12)))

    (drop (call $fd_write (i32.const 1) (i32.const 16) (i32.const 2) (i32.const 32)))
  )
)
"#;
    let config = WasiConfig::new()
        .with_arg("prog")
        .with_env("A", "1")
        .with_env("B", "two");
    let (runtime, res) = run(config, wat);
    assert_eq!(res.unwrap(), 0);
    assert_eq!(runtime.stdout_string().unwrap(), "prog\0A=1\0B=two\0");
}

#[test]
fn test_clock_and_random() {
    // exits with 0 if the realtime clock is after 2020 and random bytes were written
    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "clock_time_get"
    (func $clock_time_get (param i32 i64 i32) (result i32)))
  (import "wasi_snapshot_preview1" "random_get"
    (func $random_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (local $err i32)
    (local.set $err (call $clock_time_get (i32.const 0) (i64.const 1) (i32.const 0)))
    (if (local.get $err) (then (call $proc_exit (local.get $err))))
    (if (i64.lt_u (i64.load (i32.const 0)) (i64.const 1577836800000000000))
      (then (call $proc_exit (i32.const 100))))

    (local.set $err (call $random_get (i32.const 16) (i32.const 32)))
    (if (local.get $err) (then (call $proc_exit (local.get $err))))
    (if (i64.eqz
          (i64.or
            (i64.or (i64.load (i32.const 16)) (i64.load (i32.const 24)))
            (i64.or (i64.load (i32.const 32)) (i64.load (i32.const 40)))))
      (then (call $proc_exit (i32.const 101))))

    ;; unknown clock -> EINVAL
    (call $proc_exit (call $clock_time_get (i32.const 9) (i64.const 1) (i32.const 0)))
  )
)
"#;
    let (_runtime, res) = run(WasiConfig::new(), wat);
    assert_eq!(res.unwrap(), 28);
}
