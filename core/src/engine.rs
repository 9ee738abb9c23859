//! Embedder entry point
//!
//! An `Engine` owns the logical threads (one main thread plus the async
//! workers), the native registry, and compiles modules against them.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::logging;
use crate::interpreter::natives::{NativeHandle, NativeObject, NativeRegistry};
use crate::interpreter::scope::{Scope, ScopeKind};
use crate::interpreter::types::Value;
use crate::module::{ContanModule, ModuleDef};
use crate::thread::{ContanThread, ThreadShutdown};

/// Module-scope variable holding the main thread handle
pub const MAIN_THREAD_VAR: &str = "MainThread";
/// Module-scope variable holding the first async worker
pub const ASYNC_THREAD_VAR: &str = "AsyncThread";

pub struct Engine {
    config: EngineConfig,
    main_thread: ContanThread,
    async_threads: Vec<ContanThread>,
    natives: Arc<NativeRegistry>,
}

/// Per-thread outcome of `Engine::shutdown`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub threads: Vec<ThreadShutdown>,
}

impl ShutdownReport {
    /// True when every thread drained within the grace period
    pub fn is_complete(&self) -> bool {
        self.threads.iter().all(|thread| thread.drained)
    }

    /// Threads that still had work when the grace period ran out
    pub fn incomplete(&self) -> impl Iterator<Item = &ThreadShutdown> {
        self.threads.iter().filter(|thread| !thread.drained)
    }

    pub fn abandoned_tasks(&self) -> usize {
        self.threads.iter().map(|thread| thread.abandoned).sum()
    }
}

impl Engine {
    /// Engine with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(EngineConfig::default())
    }

    /// Start an engine from `config`
    ///
    /// Installs the tracing subscriber with `config.log_filter` unless the
    /// embedder already installed one.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        logging::init(&config.log_filter);

        let prefix = &config.thread_name_prefix;
        let main_thread = ContanThread::spawn(format!("{prefix}-main"))
            .context("Failed to start main thread")?;
        let async_threads = (0..config.async_threads)
            .map(|index| {
                ContanThread::spawn(format!("{prefix}-async-{index}"))
                    .with_context(|| format!("Failed to start async thread {index}"))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            main = %main_thread.name(),
            async_threads = async_threads.len(),
            "engine started"
        );

        Ok(Engine {
            config,
            main_thread,
            async_threads,
            natives: Arc::new(NativeRegistry::with_builtins()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn main_thread(&self) -> &ContanThread {
        &self.main_thread
    }

    pub fn async_threads(&self) -> &[ContanThread] {
        &self.async_threads
    }

    /// First async worker; the one bound to `AsyncThread`
    pub fn async_thread(&self) -> &ContanThread {
        self.async_threads.first().unwrap_or(&self.main_thread)
    }

    pub fn natives(&self) -> &Arc<NativeRegistry> {
        &self.natives
    }

    /// Make `object` importable as `path`
    pub fn register_native(&self, path: impl Into<String>, object: impl NativeObject + 'static) {
        let path = path.into();
        debug!(path = %path, "registering native");
        self.natives.register(path, NativeHandle::new(object));
    }

    /// Compile a parsed module; it runs on the main thread
    pub fn compile(&self, root_name: &str, def: ModuleDef) -> Result<ContanModule> {
        let scope = Scope::root(
            ScopeKind::Module,
            self.main_thread.clone(),
            self.natives.clone(),
        );
        scope.declare(MAIN_THREAD_VAR, Value::Thread(self.main_thread.clone()));
        scope.declare(ASYNC_THREAD_VAR, Value::Thread(self.async_thread().clone()));

        ContanModule::compile(root_name, def, scope)
    }

    /// Compile a module from its JSON tree
    pub fn compile_json(&self, root_name: &str, json: &str) -> Result<ContanModule> {
        let def: ModuleDef = serde_json::from_str(json)
            .with_context(|| format!("Failed to parse module `{root_name}`"))?;
        self.compile(root_name, def)
    }

    /// Stop every thread, waiting up to the grace period for each queue
    ///
    /// Async workers go first so work they still owe the main thread can
    /// land before it stops.
    pub fn shutdown(&self) -> ShutdownReport {
        let grace = self.config.shutdown_grace();
        let threads: Vec<ThreadShutdown> = self
            .async_threads
            .iter()
            .chain(std::iter::once(&self.main_thread))
            .map(|thread| thread.shutdown_with_await(grace))
            .collect();

        let report = ShutdownReport { threads };
        info!(
            complete = report.is_complete(),
            abandoned = report.abandoned_tasks(),
            "engine shut down"
        );
        report
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("main_thread", &self.main_thread)
            .field("async_threads", &self.async_threads)
            .field("natives", &self.natives)
            .finish()
    }
}
