use wasi_memfs_host::{InstanceStatus, WasiConfig, WasiError, WasiRuntime};
use wasmtime::Trap;

use crate::integration_tests::test_utils::{instantiate, run};

/// Loads from beyond the single memory page.
const OUT_OF_BOUNDS: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "_start")
    (drop (i32.load (i32.const 70000)))
  )
)
"#;

#[test]
fn test_out_of_bounds_trap() {
    let (mut runtime, res) = run(WasiConfig::new(), OUT_OF_BOUNDS);
    let err = res.unwrap_err();
    let WasiError::RuntimeAborted { trap, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*trap, Some(Trap::MemoryOutOfBounds));
    assert_eq!(runtime.status(), InstanceStatus::Aborted);

    assert!(matches!(
        runtime.start().unwrap_err(),
        WasiError::AlreadyFinished
    ));
    assert!(matches!(
        runtime.instantiate(OUT_OF_BOUNDS).unwrap_err(),
        WasiError::AlreadyFinished
    ));
}

#[test]
fn test_unreachable_trap() {
    let (runtime, res) = run(
        WasiConfig::new(),
        r#"(module (func (export "_start") unreachable))"#,
    );
    assert!(matches!(
        res.unwrap_err(),
        WasiError::RuntimeAborted {
            trap: Some(Trap::UnreachableCodeReached),
            ..
        }
    ));
    assert_eq!(runtime.status(), InstanceStatus::Aborted);
}

#[test]
fn test_normal_return() {
    let mut runtime = instantiate(WasiConfig::new(), r#"(module (func (export "_start")))"#);
    assert_eq!(runtime.status(), InstanceStatus::Instantiated);
    assert_eq!(runtime.start().unwrap(), 0);
    assert_eq!(runtime.status(), InstanceStatus::Exited(0));

    assert!(matches!(
        runtime.start().unwrap_err(),
        WasiError::AlreadyFinished
    ));
}

#[test]
fn test_proc_exit() {
    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (call $proc_exit (i32.const 3))
    unreachable
  )
)
"#;
    let (runtime, res) = run(WasiConfig::new(), wat);
    assert_eq!(res.unwrap(), 3);
    assert_eq!(runtime.status(), InstanceStatus::Exited(3));
}

#[test]
fn test_entry_point_missing() {
    let mut runtime = instantiate(WasiConfig::new(), r#"(module (func (export "main")))"#);
    insta::assert_snapshot!(
        runtime.start().unwrap_err(),
        @"guest module does not export a `_start: () -> ()` function",
    );
    assert_eq!(runtime.status(), InstanceStatus::Instantiated);

    let mut runtime = instantiate(
        WasiConfig::new(),
        r#"(module (func (export "_start") (param i32)))"#,
    );
    assert!(matches!(
        runtime.start().unwrap_err(),
        WasiError::EntryPointMissing { name: "_start" }
    ));
}

#[test]
fn test_instantiate_twice() {
    let mut runtime = instantiate(WasiConfig::new(), r#"(module)"#);
    assert!(matches!(
        runtime.instantiate(r#"(module)"#).unwrap_err(),
        WasiError::AlreadyInstantiated
    ));
}

#[test]
fn test_unknown_import() {
    let mut runtime = WasiRuntime::new(WasiConfig::new()).unwrap();
    let err = runtime
        .instantiate(r#"(module (import "wasi_snapshot_preview1" "does_not_exist" (func)))"#)
        .unwrap_err();
    assert!(matches!(
        err,
        WasiError::Engine {
            context: "instantiate guest module",
            ..
        }
    ));
    assert_eq!(runtime.status(), InstanceStatus::Configured);
}

#[test]
fn test_unsupported_syscall() {
    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "sock_shutdown" (func $sock_shutdown (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (call $proc_exit (call $sock_shutdown (i32.const 3) (i32.const 0)))
  )
)
"#;

    // ENOTSUP
    let (_runtime, res) = run(WasiConfig::new(), wat);
    assert_eq!(res.unwrap(), 58);
}

#[test]
fn test_missing_memory_export() {
    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "args_sizes_get" (func $args_sizes_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory 1)
  (func (export "_start")
    (call $proc_exit (call $args_sizes_get (i32.const 0) (i32.const 4)))
  )
)
"#;

    let (runtime, res) = run(WasiConfig::new(), wat);
    let err = res.unwrap_err();
    let WasiError::RuntimeAborted { trap, message } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*trap, None);
    assert!(message.contains("memory"), "{message}");
    assert_eq!(runtime.status(), InstanceStatus::Aborted);
}

#[test]
fn test_invalid_enum_argument() {
    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "fd_seek" (func $fd_seek (param i32 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (call $proc_exit (call $fd_seek (i32.const 1) (i64.const 0) (i32.const 7) (i32.const 0)))
  )
)
"#;

    // EINVAL
    let (_runtime, res) = run(WasiConfig::new(), wat);
    assert_eq!(res.unwrap(), 28);
}

#[test]
fn test_result_pointer_out_of_bounds() {
    let wat = r#"
(module
  (import "wasi_snapshot_preview1" "args_sizes_get" (func $args_sizes_get (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    (call $proc_exit (call $args_sizes_get (i32.const 0) (i32.const 65535)))
  )
)
"#;

    // EFAULT
    let (_runtime, res) = run(WasiConfig::new(), wat);
    assert_eq!(res.unwrap(), 21);
}

#[test]
fn test_invalid_preopen() {
    insta::assert_snapshot!(
        WasiRuntime::new(WasiConfig::new().with_preopen("/data", "/data")).unwrap_err(),
        @"invalid configuration: invalid preopen `/data` -> `/data`: entity not found",
    );
}
