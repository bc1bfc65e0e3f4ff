use wasi_memfs_host::WasiConfig;

use crate::integration_tests::test_utils::{instantiate, run};

/// Writes `hello\n` to stdout and `oops` to stderr.
const HELLO: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 32) "hello\n")
  (data (i32.const 48) "oops")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 32))
    (i32.store (i32.const 4) (i32.const 6))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 16)))
    (i32.store (i32.const 0) (i32.const 48))
    (i32.store (i32.const 4) (i32.const 4))
    (drop (call $fd_write (i32.const 2) (i32.const 0) (i32.const 1) (i32.const 16)))
  )
)
"#;

/// Copies up to 256 bytes from stdin to stdout.
const ECHO: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 64))
    (i32.store (i32.const 4) (i32.const 256))
    (drop (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 8)))
    (i32.store (i32.const 4) (i32.load (i32.const 8)))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))
  )
)
"#;

#[test]
fn test_stdout_stderr() {
    let (runtime, res) = run(WasiConfig::new(), HELLO);
    assert_eq!(res.unwrap(), 0);

    assert_eq!(runtime.stdout_string().unwrap(), "hello\n");
    assert_eq!(runtime.stderr_string().unwrap(), "oops");

    // drained
    assert_eq!(runtime.stdout_string().unwrap(), "");
    assert!(runtime.stderr_buffer().is_empty());
}

#[test]
fn test_stdin_echo() {
    let mut runtime = instantiate(WasiConfig::new(), ECHO);
    runtime.set_stdin_string("ping");
    assert_eq!(runtime.start().unwrap(), 0);
    assert_eq!(runtime.stdout_buffer().as_ref(), b"ping");
}

#[test]
fn test_stdin_empty() {
    let (runtime, res) = run(WasiConfig::new(), ECHO);
    assert_eq!(res.unwrap(), 0);
    assert!(runtime.stdout_buffer().is_empty());
}

#[test]
fn test_stdio_handle() {
    let mut runtime = instantiate(WasiConfig::new(), ECHO);
    let stdio = runtime.stdio();
    stdio.push_stdin(b"a");
    stdio.push_stdin(b"b");
    runtime.start().unwrap();
    assert_eq!(stdio.take_stdout().as_ref(), b"ab");
}
