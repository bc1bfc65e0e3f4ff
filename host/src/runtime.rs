//! Guest lifecycle.

use std::sync::Arc;

use bytes::Bytes;
use wasmtime::{Engine, Instance, Linker, Module, Store};

use crate::{
    config::WasiConfig,
    error::{ProcExit, WasiError},
    linker::link,
    state::WasiState,
    stdio::Stdio,
    vfs::{FileSystem, MemFs},
};

/// Exported function that runs the guest program.
const ENTRY_POINT: &str = "_start";

/// Lifecycle stage.
#[derive(Debug)]
enum Stage {
    /// Created, no module yet.
    Configured,

    /// Module is instantiated, entry point not called yet.
    Instantiated(Instance),

    /// Entry point returned or the guest called `proc_exit`.
    Exited(i32),

    /// Guest trapped.
    Aborted,
}

/// Observable status of a [`WasiRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    /// No module instantiated yet.
    Configured,

    /// Module instantiated and ready to [start](WasiRuntime::start).
    Instantiated,

    /// Guest finished with the given exit code.
    Exited(i32),

    /// Guest trapped.
    Aborted,
}

/// Runs a single `wasi_snapshot_preview1` guest module.
///
/// ```text
/// Configured --instantiate--> Instantiated --start--> Exited | Aborted
/// ```
///
/// Each runtime owns its descriptor table and standard streams. The filesystem may be shared with other runtimes.
pub struct WasiRuntime {
    /// Engine used for compilation.
    engine: Engine,

    /// Store holding the guest state.
    store: Store<WasiState>,

    /// Current stage.
    stage: Stage,

    /// Handle to the standard streams of the guest.
    stdio: Stdio,

    /// Filesystem backend.
    fs: Arc<dyn FileSystem>,
}

impl WasiRuntime {
    /// Create runtime.
    ///
    /// This validates the configuration and checks that every preopen exists and is a directory.
    pub fn new(config: WasiConfig) -> Result<Self, WasiError> {
        config.validate()?;

        let fs: Arc<dyn FileSystem> = match &config.fs {
            Some(fs) => Arc::clone(fs),
            None => Arc::new(MemFs::new(config.vfs.clone())),
        };
        let stdio = Stdio::new();
        let state = WasiState::new(&config, Arc::clone(&fs), stdio.clone())?;

        let engine = Engine::default();
        let store = Store::new(&engine, state);
        log::debug!(
            "runtime configured: {} args, {} env vars",
            config.args.len(),
            config.envs.len()
        );

        Ok(Self {
            engine,
            store,
            stage: Stage::Configured,
            stdio,
            fs,
        })
    }

    /// Engine that modules passed to [`instantiate_with`](Self::instantiate_with) must be compiled with.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Fail unless no module was instantiated yet.
    fn ensure_configured(&self) -> Result<(), WasiError> {
        match self.stage {
            Stage::Configured => Ok(()),
            Stage::Instantiated(_) => Err(WasiError::AlreadyInstantiated),
            Stage::Exited(_) | Stage::Aborted => Err(WasiError::AlreadyFinished),
        }
    }

    /// Compile and instantiate a guest module.
    ///
    /// Accepts both the binary and the text format.
    pub fn instantiate(&mut self, wasm: impl AsRef<[u8]>) -> Result<(), WasiError> {
        self.ensure_configured()?;
        let module = Module::new(&self.engine, wasm)
            .map_err(|e| WasiError::engine("compile guest module", &e))?;
        self.instantiate_with(&module, |_linker| Ok(()))
    }

    /// Instantiate a compiled guest module with additional host imports.
    ///
    /// `extend` runs after the WASI imports are linked and may define further imports, e.g. with
    /// [`Linker::func_wrap`]. Redefining a WASI import fails. The module must be compiled with
    /// [`engine`](Self::engine).
    pub fn instantiate_with<F>(&mut self, module: &Module, extend: F) -> Result<(), WasiError>
    where
        F: FnOnce(&mut Linker<WasiState>) -> wasmtime::Result<()>,
    {
        self.ensure_configured()?;

        let mut linker = Linker::new(&self.engine);
        link(&mut linker).map_err(|e| WasiError::engine("link WASI preview1", &e))?;
        extend(&mut linker).map_err(|e| WasiError::engine("link host imports", &e))?;

        let instance = linker
            .instantiate(&mut self.store, module)
            .map_err(|e| WasiError::engine("instantiate guest module", &e))?;
        self.stage = Stage::Instantiated(instance);
        log::debug!("guest instantiated");

        Ok(())
    }

    /// Run the entry point of the guest.
    ///
    /// Returns the exit code. The entry point can only be called once.
    pub fn start(&mut self) -> Result<i32, WasiError> {
        let instance = match self.stage {
            Stage::Configured => return Err(WasiError::NotInstantiated),
            Stage::Instantiated(instance) => instance,
            Stage::Exited(_) | Stage::Aborted => return Err(WasiError::AlreadyFinished),
        };

        let entry_point = instance
            .get_typed_func::<(), ()>(&mut self.store, ENTRY_POINT)
            .map_err(|_| WasiError::EntryPointMissing { name: ENTRY_POINT })?;

        log::debug!("call {ENTRY_POINT}");
        let res = entry_point.call(&mut self.store, ());
        self.store.data_mut().flush_all();

        match res {
            Ok(()) => Ok(self.exit(0)),
            Err(e) => {
                if let Some(ProcExit(code)) = e.downcast_ref::<ProcExit>() {
                    return Ok(self.exit(*code));
                }

                self.stage = Stage::Aborted;
                let trap = e.downcast_ref::<wasmtime::Trap>().copied();
                log::debug!("guest aborted: {e}");
                Err(WasiError::RuntimeAborted {
                    trap,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Record exit.
    fn exit(&mut self, code: i32) -> i32 {
        log::debug!("guest exited with status {code}");
        self.stage = Stage::Exited(code);
        code
    }

    /// Current status.
    pub fn status(&self) -> InstanceStatus {
        match self.stage {
            Stage::Configured => InstanceStatus::Configured,
            Stage::Instantiated(_) => InstanceStatus::Instantiated,
            Stage::Exited(code) => InstanceStatus::Exited(code),
            Stage::Aborted => InstanceStatus::Aborted,
        }
    }

    /// Handle to the standard streams.
    ///
    /// Can be used from other threads while the guest runs.
    pub fn stdio(&self) -> Stdio {
        self.stdio.clone()
    }

    /// Drain stdout.
    pub fn stdout_buffer(&self) -> Bytes {
        self.stdio.take_stdout()
    }

    /// Drain stdout and decode it as UTF-8.
    ///
    /// The buffer is drained even if decoding fails.
    pub fn stdout_string(&self) -> Result<String, WasiError> {
        decode(self.stdio.take_stdout())
    }

    /// Drain stderr.
    pub fn stderr_buffer(&self) -> Bytes {
        self.stdio.take_stderr()
    }

    /// Drain stderr and decode it as UTF-8.
    ///
    /// The buffer is drained even if decoding fails.
    pub fn stderr_string(&self) -> Result<String, WasiError> {
        decode(self.stdio.take_stderr())
    }

    /// Replace pending stdin content.
    pub fn set_stdin_buffer(&self, data: &[u8]) {
        self.stdio.set_stdin(data);
    }

    /// Replace pending stdin content.
    pub fn set_stdin_string(&self, data: &str) {
        self.stdio.set_stdin(data.as_bytes());
    }

    /// Filesystem backend.
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }
}

impl std::fmt::Debug for WasiRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            engine: _,
            store: _,
            stage,
            stdio,
            fs,
        } = self;

        f.debug_struct("WasiRuntime")
            .field("engine", &"<ENGINE>")
            .field("store", &"<STORE>")
            .field("stage", stage)
            .field("stdio", stdio)
            .field("fs", fs)
            .finish()
    }
}

/// Decode drained output.
fn decode(data: Bytes) -> Result<String, WasiError> {
    String::from_utf8(data.into()).map_err(|_| WasiError::InvalidEncoding)
}
