pub mod config;
pub mod engine;
pub mod errors;
pub mod interpreter;
pub mod logging;
pub mod module;
pub mod thread;

// Re-export main types
pub use config::{ConfigBuilder, EngineConfig};
pub use engine::{Engine, ShutdownReport};
pub use errors::{ErrorKind, RuntimeError, RuntimeResult};
pub use module::{ClassDef, ContanModule, ModuleDef};
pub use thread::{ContanThread, ThreadShutdown};
