use crate::stdlib;
use lua_compiler::{Compiler, DEFAULT_MAX_CALL_DEPTH};
use lua_core::events;
use lua_core::{LuaArgs, LuaError, LuaFunction, LuaValue, Scope};
use std::path::Path;

/// Settings for a new [`Lua`] context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuaConfig {
    /// Nested script-function invocations allowed before `StackOverflow`.
    pub max_call_depth: usize,
    /// Install `assert`, `pairs`, `setmetatable`, ... into the globals.
    pub open_base_library: bool,
}

impl Default for LuaConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            open_base_library: true,
        }
    }
}

/// An execution context: one global scope plus the settings chunks are
/// compiled with.
///
/// Dropping the context clears its globals, which releases the reference
/// cycles formed by script functions stored in global variables.
pub struct Lua {
    globals: Scope,
    config: LuaConfig,
}

impl Lua {
    /// A context with the base library installed.
    pub fn new() -> Self {
        Self::with_config(LuaConfig::default())
    }

    pub fn with_config(config: LuaConfig) -> Self {
        let globals = Scope::root();
        if config.open_base_library {
            stdlib::register(&globals, &config);
        }
        Self { globals, config }
    }

    pub fn config(&self) -> &LuaConfig {
        &self.config
    }

    /// The global scope every chunk of this context runs against.
    pub fn context(&self) -> &Scope {
        &self.globals
    }

    /// Compile `source` without running it.
    pub fn load(&self, source: &str, chunk_name: &str) -> Result<LuaFunction, LuaError> {
        load_chunk(&self.globals, &self.config, source, chunk_name)
    }

    /// Compile and run a chunk, returning the values of its `return`.
    pub fn run_string(&self, source: &str) -> Result<LuaArgs, LuaError> {
        let chunk = self.load(source, "=(string)")?;
        run_chunk(&chunk, LuaArgs::new())
    }

    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<LuaArgs, LuaError> {
        run_file_in(&self.globals, &self.config, path.as_ref())
    }

    /// Call any callable value (functions, or values with `__call`).
    pub fn call(&self, func: &LuaValue, args: impl Into<LuaArgs>) -> Result<LuaArgs, LuaError> {
        events::call_event(func, args.into())
    }

    pub fn set_global(&self, name: &str, value: impl Into<LuaValue>) {
        self.globals.declare(name, value.into());
    }

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.globals.get(name)
    }

    /// Expose a host function to scripts as the global `name`.
    pub fn register<F>(&self, name: &str, func: F)
    where
        F: Fn(LuaArgs) -> Result<LuaArgs, LuaError> + Send + Sync + 'static,
    {
        self.set_global(name, LuaFunction::new(name, func));
    }
}

impl Default for Lua {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lua {
    fn drop(&mut self) {
        self.globals.clear();
    }
}

// ── Chunk helpers shared with `dofile` ────────────────────────────────────────

pub(crate) fn load_chunk(
    globals: &Scope,
    config: &LuaConfig,
    source: &str,
    chunk_name: &str,
) -> Result<LuaFunction, LuaError> {
    tracing::debug!(chunk = chunk_name, bytes = source.len(), "loading chunk");
    let block = lua_parser::parse(source)?;
    Compiler::new(chunk_name)
        .max_call_depth(config.max_call_depth)
        .compile_chunk(&block, globals)
}

pub(crate) fn run_chunk(chunk: &LuaFunction, args: LuaArgs) -> Result<LuaArgs, LuaError> {
    let results = chunk.call(args)?;
    tracing::debug!(chunk = chunk.name(), results = results.len(), "chunk finished");
    Ok(results)
}

pub(crate) fn run_file_in(globals: &Scope, config: &LuaConfig, path: &Path) -> Result<LuaArgs, LuaError> {
    let source = std::fs::read_to_string(path).map_err(|e| LuaError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let chunk = load_chunk(globals, config, &source, &path.display().to_string())?;
    run_chunk(&chunk, LuaArgs::new())
}
