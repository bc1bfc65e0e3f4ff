use wasi_memfs_host::{FileSystem, InstanceStatus, WasiConfig, WasiError, WasiRuntime, WasiState};
use wasmtime::{Caller, Module};

/// Adds two numbers through a host import and prints the sum through `fd_write`.
const ADD_AND_PRINT: &str = r#"
(module
  (import "env" "host_add" (func $host_add (param i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start")
    ;; single ASCII digit
    (i32.store8 (i32.const 32) (i32.add (i32.const 48) (call $host_add (i32.const 2) (i32.const 5))))
    (i32.store (i32.const 0) (i32.const 32))
    (i32.store (i32.const 4) (i32.const 1))
    (call $proc_exit (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))
  )
)
"#;

#[test]
fn test_extra_host_import() {
    let mut runtime = WasiRuntime::new(WasiConfig::new()).unwrap();
    let module = Module::new(runtime.engine(), ADD_AND_PRINT).unwrap();

    runtime
        .instantiate_with(&module, |linker| {
            linker.func_wrap(
                "env",
                "host_add",
                |caller: Caller<'_, WasiState>, a: i32, b: i32| {
                    // the guest state is reachable from host imports
                    caller.data().fs().create_dir("/host_add").unwrap();
                    a + b
                },
            )?;
            Ok(())
        })
        .unwrap();
    assert_eq!(runtime.status(), InstanceStatus::Instantiated);

    assert_eq!(runtime.start().unwrap(), 0);
    assert_eq!(runtime.stdout_string().unwrap(), "7");
    assert!(runtime.fs().metadata("/host_add").unwrap().is_dir());
}

#[test]
fn test_missing_host_import() {
    let mut runtime = WasiRuntime::new(WasiConfig::new()).unwrap();
    let err = runtime.instantiate(ADD_AND_PRINT).unwrap_err();
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
fn test_module_from_other_engine() {
    let mut runtime = WasiRuntime::new(WasiConfig::new()).unwrap();
    let module = Module::new(&wasmtime::Engine::default(), r#"(module)"#).unwrap();
    assert!(runtime.instantiate_with(&module, |_linker| Ok(())).is_err());
    assert_eq!(runtime.status(), InstanceStatus::Configured);
}
